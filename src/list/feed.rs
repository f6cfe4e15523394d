use crate::list::state::{display_number, ListState};
use crate::storage::{StoreError, TodoStore};

/// Endless-scroll style accumulation: an initial window, then `load_more`
/// appends the next window starting at however many items are already
/// loaded. The loaded-item count is the whole cursor.
///
/// What triggers `load_more` is the caller's business (the bundled TUI fires
/// it when the selection reaches the last loaded row); the feed only exposes
/// the operation and the `has_more` / `loading_more` flags.
pub struct TodoFeed<S> {
    store: S,
    state: ListState,
    window: usize,
}

impl<S: TodoStore> TodoFeed<S> {
    pub fn open(store: S, window: usize) -> Result<Self, StoreError> {
        let mut feed = Self {
            store,
            state: ListState::new(),
            window: window.max(1),
        };
        feed.refresh()?;
        Ok(feed)
    }

    pub fn state(&self) -> &ListState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ListState {
        &mut self.state
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Re-runs the initial fetch, superseding everything loaded so far.
    pub fn refresh(&mut self) -> Result<(), StoreError> {
        self.state.begin_loading();
        let fetched = match self.store.fetch_range(0, self.window) {
            Ok(fetched) => fetched,
            Err(err) => {
                self.state.abort_loading();
                return Err(err);
            }
        };
        let has_more = self.window < fetched.total_count;
        self.state
            .replace(fetched.items, fetched.total_count, has_more);
        Ok(())
    }

    /// Fetches the next window and appends it. Returns whether a fetch was
    /// actually issued; exhausted feeds and feeds with a load already in
    /// flight are left alone.
    pub fn load_more(&mut self) -> Result<bool, StoreError> {
        if !self.state.has_more() || self.state.is_loading_more() {
            return Ok(false);
        }
        self.state.begin_loading_more();
        let offset = self.state.len();
        let fetched = match self.store.fetch_range(offset, self.window) {
            Ok(fetched) => fetched,
            Err(err) => {
                self.state.abort_loading();
                return Err(err);
            }
        };
        let has_more = offset + self.window < fetched.total_count;
        self.state.append(fetched.items, has_more);
        Ok(true)
    }

    /// Number shown next to the row at `index` of the accumulated list. The
    /// feed always starts at the head of the collection, so the consumed
    /// offset is zero.
    pub fn display_number(&self, index: usize) -> usize {
        display_number(self.state.total_count(), 0, index)
    }
}
