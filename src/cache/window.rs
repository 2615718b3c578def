// Contiguous window of cached pages.
// Merges fetched items as a sliding window and discards anything that would leave a gap.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::page::{Item, Page};

/// Pages held for absolute indices `first .. first + pages.len()`.
#[derive(Debug, Clone, Default)]
pub struct PageWindow {
    first: usize,
    pages: Vec<Page>,
}

impl PageWindow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absolute index of the first held page.
    pub fn first(&self) -> usize {
        self.first
    }

    /// Absolute index one past the last held page.
    pub fn end(&self) -> usize {
        self.first + self.pages.len()
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Get the page at absolute index `page_id`.
    pub fn page(&self, page_id: usize) -> Option<&Page> {
        page_id
            .checked_sub(self.first)
            .and_then(|offset| self.pages.get(offset))
    }

    /// Number of held items, stale pages included.
    pub fn item_count(&self) -> usize {
        self.pages.iter().map(Page::len).sum()
    }

    /// Check that `count` pages starting at `page_id` are held, and fresh unless `allow_old`.
    pub fn is_loaded(
        &self,
        page_id: usize,
        count: usize,
        allow_old: bool,
        timeout: Duration,
        now: DateTime<Utc>,
    ) -> bool {
        let count = count.max(1);
        let Some(offset) = page_id.checked_sub(self.first) else {
            return false;
        };
        let Some(held) = offset
            .checked_add(count)
            .and_then(|end| self.pages.get(offset..end))
        else {
            return false;
        };
        allow_old || held.iter().all(|page| !page.is_expired(timeout, now))
    }

    /// Merge `items`, split into pages of `page_size`, starting at absolute page `start`.
    ///
    /// Held pages before `start` and after the new range survive only while they
    /// stay contiguous with it. Empty `items` leave the window untouched.
    pub fn merge(&mut self, start: usize, items: &[Item], page_size: usize, now: DateTime<Utc>) {
        if items.is_empty() {
            return;
        }

        let fresh: Vec<Page> = items
            .chunks(page_size.max(1))
            .map(|chunk| Page::new(chunk.to_vec(), now))
            .collect();
        let end = start.saturating_add(fresh.len());

        let old_first = self.first;
        let old_end = self.end();
        let old = std::mem::take(&mut self.pages);

        let mut merged = Vec::with_capacity(fresh.len() + old.len());
        if !old.is_empty() && old_first <= start && start <= old_end {
            self.first = old_first;
            merged.extend_from_slice(&old[..start - old_first]);
        } else {
            self.first = start;
        }
        merged.extend(fresh);
        if !old.is_empty() && old_first <= end && end < old_end {
            merged.extend_from_slice(&old[end - old_first..]);
        }
        self.pages = merged;
    }

    /// Replace the whole window with a single page at index 0, or empty it.
    pub fn replace_with_single(&mut self, items: Vec<Item>, now: DateTime<Utc>) {
        self.first = 0;
        self.pages.clear();
        if !items.is_empty() {
            self.pages.push(Page::new(items, now));
        }
    }

    pub fn clear(&mut self) {
        self.first = 0;
        self.pages.clear();
    }
}
