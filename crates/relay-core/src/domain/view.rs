//! Selection and filter state over the buffer list, plus the collaborators a
//! selection change talks to.
//!
//! # Why is the selection an index? (for beginners)
//!
//! The presentation layer shows buffers as a list, and the session-restore
//! store remembers "the third buffer was open".  Buffer pointers change on
//! every reconnect, positions mostly do not, so the selection is an index
//! into the *unfiltered* buffer list.  `None` plays the role of "-1, nothing
//! selected".
//!
//! The filter is a separate projection: it never moves the selection, it only
//! decides which buffers a list widget should show.

use crate::protocol::messages::Pointer;

/// Persists the selected index across runs.
#[cfg_attr(test, mockall::automock)]
pub trait SessionStore: Send {
    /// Index stored by a previous run, if any.
    fn last_open_index(&self) -> Option<usize>;
    fn set_last_open_index(&mut self, index: usize);
}

/// Requests more history for a buffer that just became selected.
#[cfg_attr(test, mockall::automock)]
pub trait HistoryFetcher: Send {
    /// `loaded` is the number of lines already held for the buffer.
    fn fetch_more_lines(&self, buffer: Pointer, loaded: usize);
}

/// Session store that forgets everything when dropped.
#[derive(Debug, Default, Clone)]
pub struct MemorySessionStore {
    index: Option<usize>,
}

impl MemorySessionStore {
    pub fn new(index: Option<usize>) -> Self {
        Self { index }
    }
}

impl SessionStore for MemorySessionStore {
    fn last_open_index(&self) -> Option<usize> {
        self.index
    }

    fn set_last_open_index(&mut self, index: usize) {
        self.index = Some(index);
    }
}

/// History fetcher that never fetches.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHistory;

impl HistoryFetcher for NoHistory {
    fn fetch_more_lines(&self, _buffer: Pointer, _loaded: usize) {}
}

/// Filter string, its filtered projection and the selected index.
#[derive(Debug, Default, Clone)]
pub struct BufferView {
    filter: String,
    filter_folded: String,
    filtered: Vec<Pointer>,
    selected: Option<usize>,
}

impl BufferView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Stores a new filter string.  Returns `false` when it did not change.
    pub fn set_filter(&mut self, filter: &str) -> bool {
        if self.filter == filter {
            return false;
        }
        self.filter = filter.to_string();
        self.filter_folded = filter.to_lowercase();
        true
    }

    /// Case-insensitive substring match against the current filter.
    pub fn matches(&self, name: &str) -> bool {
        self.filter_folded.is_empty() || name.to_lowercase().contains(&self.filter_folded)
    }

    /// Rebuilds the projection from `(pointer, name)` pairs in list order.
    ///
    /// Returns `true` when the projection changed.
    pub fn recompute<'a, I>(&mut self, buffers: I) -> bool
    where
        I: IntoIterator<Item = (Pointer, &'a str)>,
    {
        let filtered: Vec<Pointer> = buffers
            .into_iter()
            .filter(|(_, name)| self.matches(name))
            .map(|(ptr, _)| ptr)
            .collect();
        if filtered == self.filtered {
            return false;
        }
        self.filtered = filtered;
        true
    }

    /// Pointers of the buffers that pass the filter, in list order.
    pub fn filtered(&self) -> &[Pointer] {
        &self.filtered
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub(crate) fn set_selected(&mut self, index: Option<usize>) {
        self.selected = index;
    }

    /// Drops the selection if it no longer addresses a buffer.
    ///
    /// Returns `true` when the selection was reset.
    pub fn revalidate(&mut self, buffer_count: usize) -> bool {
        match self.selected {
            Some(index) if index >= buffer_count => {
                self.selected = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter_matches_everything() {
        let view = BufferView::new();
        assert!(view.matches("anything"));
        assert!(view.matches(""));
    }

    #[test]
    fn test_filter_is_case_insensitive_substring() {
        // Arrange
        let mut view = BufferView::new();
        view.set_filter("RuSt");

        // Act
        view.recompute([
            (Pointer(1), "libera.#rust"),
            (Pointer(2), "libera.#python"),
            (Pointer(3), "oftc.#Rust-offtopic"),
        ]);

        // Assert
        assert_eq!(view.filtered(), &[Pointer(1), Pointer(3)]);
    }

    #[test]
    fn test_set_filter_reports_no_change_for_same_string() {
        let mut view = BufferView::new();
        assert!(view.set_filter("abc"));
        assert!(!view.set_filter("abc"));
        assert_eq!(view.filter(), "abc");
    }

    #[test]
    fn test_recompute_reports_unchanged_projection() {
        let mut view = BufferView::new();
        assert!(view.recompute([(Pointer(1), "a")]));
        assert!(!view.recompute([(Pointer(1), "a")]));
    }

    #[test]
    fn test_revalidate_resets_out_of_range_selection() {
        let mut view = BufferView::new();
        view.set_selected(Some(2));

        assert!(!view.revalidate(3));
        assert_eq!(view.selected(), Some(2));

        assert!(view.revalidate(2));
        assert_eq!(view.selected(), None);
    }

    #[test]
    fn test_memory_session_store_remembers_index() {
        let mut store = MemorySessionStore::default();
        assert_eq!(store.last_open_index(), None);

        store.set_last_open_index(4);

        assert_eq!(store.last_open_index(), Some(4));
    }
}
