// Paginated store facade.
// Serves cached pages, dispatches fetches through the transport and keeps the window current.

pub mod capabilities;
mod coordinator;
mod pending;
mod resolver;
mod state;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::error::{StoreError, TransportError};
use crate::remote::{FetchResponse, Transport};

pub use capabilities::{Clock, Connectivity, IdGenerator, SystemClock, UuidGenerator};
pub use pending::PageFuture;
pub use resolver::PageResult;

use coordinator::InFlight;
use pending::Ticket;
use state::StoreState;

struct Shared {
    command: String,
    transport: Arc<dyn Transport>,
    connectivity: Connectivity,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    state: Mutex<StoreState>,
}

impl Shared {
    /// The lock is never held across an await point.
    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply the outcome of the request described by `in_flight`.
    fn complete(
        &self,
        in_flight: InFlight,
        ticket: Option<Ticket>,
        outcome: Result<FetchResponse, TransportError>,
    ) {
        let now = self.clock.now();
        let mut state = self.lock();

        if state.expected != Some(in_flight.generation) {
            debug!(
                generation = in_flight.generation,
                "Dropping response for superseded request"
            );
            return;
        }
        state.expected = None;
        let ticket = ticket.or_else(|| {
            state
                .blocking
                .take_if(|ticket| ticket.generation() == in_flight.generation)
        });

        let (start, max_pages) = in_flight.result_range();
        match outcome {
            Ok(response) => {
                let collapsed = coordinator::apply_response(&mut state, &in_flight, response, now);
                debug!(
                    generation = in_flight.generation,
                    item_count = state.remote.item_count,
                    loaded_pages = state.window.len(),
                    "Merged response"
                );
                let (start, max_pages) = if collapsed {
                    (0, 1)
                } else {
                    (in_flight.start, in_flight.max_pages)
                };
                if let Some(ticket) = ticket {
                    ticket.settle(resolver::resolve(&state, now, start, max_pages, false, None));
                }
            }
            Err(err) if in_flight.blocking => {
                let result = if state.config.use_old_on_error {
                    info!(
                        generation = in_flight.generation,
                        error = %err,
                        "Fetch failed, falling back to cached pages"
                    );
                    resolver::resolve(&state, now, start, max_pages, true, Some(err))
                } else {
                    warn!(generation = in_flight.generation, error = %err, "Fetch failed");
                    Err(StoreError::Fetch(err))
                };
                if let Some(ticket) = ticket {
                    ticket.settle(result);
                }
            }
            Err(err) => {
                debug!(
                    generation = in_flight.generation,
                    error = %err,
                    "Background prefetch failed"
                );
            }
        }
    }
}

/// Builder for a [`Store`].
pub struct StoreBuilder {
    command: String,
    transport: Arc<dyn Transport>,
    config: StoreConfig,
    connectivity: Connectivity,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
}

impl StoreBuilder {
    pub fn new(command: impl Into<String>, transport: impl Transport) -> Self {
        Self {
            command: command.into(),
            transport: Arc::new(transport),
            config: StoreConfig::default(),
            connectivity: Connectivity::default(),
            ids: Arc::new(UuidGenerator),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a connectivity flag with the store.
    pub fn connectivity(mut self, connectivity: Connectivity) -> Self {
        self.connectivity = connectivity;
        self
    }

    pub fn id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn build(self) -> Store {
        Store {
            shared: Arc::new(Shared {
                command: self.command,
                transport: self.transport,
                connectivity: self.connectivity,
                ids: self.ids,
                clock: self.clock,
                state: Mutex::new(StoreState::new(self.config.normalized())),
            }),
        }
    }
}

/// Client-side accessor for one remote paginated data set.
///
/// Clones share the same cache. Separate stores share nothing.
#[derive(Clone)]
pub struct Store {
    shared: Arc<Shared>,
}

impl Store {
    pub fn builder(command: impl Into<String>, transport: impl Transport) -> StoreBuilder {
        StoreBuilder::new(command, transport)
    }

    pub fn new(command: impl Into<String>, transport: impl Transport, config: StoreConfig) -> Self {
        StoreBuilder::new(command, transport).config(config).build()
    }

    /// Replace the configuration.
    ///
    /// A change to an identity field discards cached pages, cancels the pending
    /// request and then calls the configured reset hook.
    pub fn set_options(&self, config: StoreConfig) {
        let config = config.normalized();
        let hook = {
            let mut state = self.shared.lock();
            let reset = state.config.identity_changed(&config);
            if config.page_size != state.config.page_size {
                state.remote.page_count = state.remote.item_count.div_ceil(config.page_size);
            }
            if reset {
                info!(
                    command = %self.shared.command,
                    "Configuration changed, resetting cached pages"
                );
                state.reset();
            }
            state.config = config;
            if reset {
                state.config.on_reset.clone()
            } else {
                None
            }
        };
        if let Some(hook) = hook {
            hook.call();
        }
    }

    /// Modify a copy of the current configuration and apply it.
    pub fn update_options(&self, update: impl FnOnce(&mut StoreConfig)) {
        let mut config = self.options();
        update(&mut config);
        self.set_options(config);
    }

    /// Snapshot of the current configuration.
    pub fn options(&self) -> StoreConfig {
        self.shared.lock().config.clone()
    }

    /// Request `max_pages` pages starting at `page_id`.
    ///
    /// Fresh cached pages resolve immediately. Otherwise a fetch is dispatched
    /// right away and any earlier pending request is cancelled. Must be called
    /// from within a Tokio runtime.
    pub fn get_page(&self, page_id: usize, max_pages: usize) -> PageFuture {
        let max_pages = max_pages.max(1);
        let now = self.shared.clock.now();
        let mut state = self.shared.lock();

        if state.is_loaded(page_id, max_pages, false, now) {
            let result = resolver::resolve(&state, now, page_id, max_pages, false, None);
            // A prefetch only goes out while no request of any kind is outstanding.
            if state.config.prefetch && state.expected.is_none() {
                if let Some(neighbour) =
                    coordinator::prefetch_neighbour(&state, now, page_id, max_pages)
                {
                    debug!(page = neighbour, "Prefetching neighbour of cache hit");
                    let _ = self.dispatch(&mut state, neighbour, 1, false);
                }
            }
            return PageFuture::ready(result);
        }

        self.dispatch(&mut state, page_id, max_pages, true)
    }

    fn dispatch(
        &self,
        state: &mut StoreState,
        start: usize,
        max_pages: usize,
        blocking: bool,
    ) -> PageFuture {
        let now = self.shared.clock.now();

        if let Err(err) = coordinator::validate(&self.shared.command, &state.config) {
            debug!(error = %err, "Not dispatching request");
            return PageFuture::ready(Err(err));
        }

        if !self.shared.connectivity.is_online() {
            debug!(start, max_pages, "Offline, serving cached pages");
            return PageFuture::ready(resolver::resolve(
                state,
                now,
                start,
                max_pages,
                true,
                Some(TransportError::Network("offline".to_string())),
            ));
        }

        let full_fetch = state.config.full_fetch;
        let (fetch_start, fetch_pages) = coordinator::plan_range(state, now, start, max_pages);
        let range = match coordinator::item_range(
            state,
            start,
            (!full_fetch).then_some((fetch_start, fetch_pages)),
        ) {
            Ok(range) => range,
            Err(err) => {
                debug!(error = %err, "Not dispatching request");
                return PageFuture::ready(Err(err));
            }
        };

        let generation = state.issue_generation();
        let (ticket, future) = Ticket::issue(generation);
        let background = if blocking {
            if let Some(previous) = state.blocking.take() {
                debug!(
                    generation = previous.generation(),
                    "Cancelling superseded request"
                );
                previous.cancel();
            }
            state.blocking = Some(ticket);
            None
        } else {
            Some(ticket)
        };
        state.expected = Some(generation);

        if state.store_id.is_none() && state.placeholder_id.is_none() {
            state.placeholder_id = Some(self.shared.ids.generate());
        }
        let request = coordinator::build_request(&self.shared.command, state, range);

        let in_flight = InFlight {
            generation,
            blocking,
            start,
            max_pages,
            fetch_start,
            full_fetch,
        };
        debug!(
            generation,
            blocking,
            start = fetch_start,
            pages = fetch_pages,
            full_fetch,
            "Dispatching request"
        );

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let outcome = shared.transport.fetch(request).await;
            shared.complete(in_flight, background, outcome);
        });

        future
    }

    /// Check if `count` pages from `page_id` are cached, and fresh unless `allow_old`.
    pub fn is_page_loaded(&self, page_id: usize, count: usize, allow_old: bool) -> bool {
        let now = self.shared.clock.now();
        self.shared.lock().is_loaded(page_id, count, allow_old, now)
    }

    /// Total items of the remote data set.
    pub fn items_count(&self) -> usize {
        self.shared.lock().remote.item_count
    }

    /// Search hits reported by the server; always zero for catalog stores.
    pub fn hits_count(&self) -> usize {
        self.shared.lock().remote.hit_count
    }

    /// Total pages of the remote data set.
    pub fn pages_count(&self) -> usize {
        self.shared.lock().remote.page_count
    }

    pub fn page_size(&self) -> usize {
        self.shared.lock().config.page_size
    }

    pub fn set_page_size(&self, page_size: usize) {
        self.update_options(|config| config.page_size = page_size);
    }

    /// Cached items, stale pages included.
    pub fn loaded_items_count(&self) -> usize {
        self.shared.lock().window.item_count()
    }

    /// Cached pages, stale pages included.
    pub fn loaded_pages_count(&self) -> usize {
        self.shared.lock().window.len()
    }

    /// Discard cached pages and correlation ids, cancelling any pending request.
    pub fn clear(&self) {
        let hook = {
            let mut state = self.shared.lock();
            state.reset();
            state.config.on_reset.clone()
        };
        if let Some(hook) = hook {
            hook.call();
        }
    }

    /// Store id issued by the server, if any.
    pub fn store_id(&self) -> Option<String> {
        self.shared.lock().store_id.clone()
    }

    /// Set the opaque location token forwarded with every request.
    pub fn set_geo_token(&self, geo: Option<String>) {
        self.shared.lock().geo = geo;
    }

    pub fn geo_token(&self) -> Option<String> {
        self.shared.lock().geo.clone()
    }

    pub fn connectivity(&self) -> &Connectivity {
        &self.shared.connectivity
    }

    pub fn set_connectivity(&self, online: bool) {
        self.shared.connectivity.set_online(online);
    }

    /// Whether a caller-blocking request is pending.
    pub fn is_fetching(&self) -> bool {
        self.shared.lock().blocking.is_some()
    }
}
