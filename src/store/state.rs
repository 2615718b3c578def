// Mutable state owned by one store.
// Window, remote totals, correlation ids and the generation bookkeeping live together.

use chrono::{DateTime, Utc};

use crate::cache::PageWindow;
use crate::config::StoreConfig;

use super::pending::Ticket;

/// Totals reported by the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RemoteState {
    pub item_count: usize,
    pub page_count: usize,
    pub hit_count: usize,
}

#[derive(Debug)]
pub(crate) struct StoreState {
    pub config: StoreConfig,
    pub window: PageWindow,
    pub remote: RemoteState,
    /// No fetch has completed since construction or the last reset.
    pub first_fetch: bool,
    /// Store id issued by the server.
    pub store_id: Option<String>,
    /// Client-generated id sent until the server issues one.
    pub placeholder_id: Option<String>,
    pub geo: Option<String>,
    /// Generation whose response is still awaited.
    pub expected: Option<u64>,
    /// The caller-blocking request, if one is pending.
    pub blocking: Option<Ticket>,
    next_generation: u64,
}

impl StoreState {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            window: PageWindow::new(),
            remote: RemoteState::default(),
            first_fetch: true,
            store_id: None,
            placeholder_id: None,
            geo: None,
            expected: None,
            blocking: None,
            next_generation: 0,
        }
    }

    pub fn is_loaded(
        &self,
        page_id: usize,
        count: usize,
        allow_old: bool,
        now: DateTime<Utc>,
    ) -> bool {
        self.window
            .is_loaded(page_id, count, allow_old, self.config.cache_timeout, now)
    }

    /// Issue a generation id greater than every id issued before.
    pub fn issue_generation(&mut self) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        generation
    }

    /// Discard cached pages and correlation ids, and cancel the pending blocking request.
    ///
    /// In-flight responses become inert because no generation is expected anymore.
    pub fn reset(&mut self) {
        self.window.clear();
        self.first_fetch = true;
        self.store_id = None;
        self.placeholder_id = None;
        self.expected = None;
        if let Some(ticket) = self.blocking.take() {
            ticket.cancel();
        }
    }
}
