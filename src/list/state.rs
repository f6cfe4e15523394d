use crate::storage::{TodoPatch, TodoRecord};

/// The client-held window over the todo collection. Transitions are applied
/// synchronously and never perform I/O; callers commit an operation only
/// after the matching store call has succeeded.
///
/// Operations address items purely by identity. An id that is no longer
/// present (a delete raced an edit, a late completion against stale state)
/// makes the operation a no-op; the next full fetch re-derives everything
/// from the store.
#[derive(Debug, Clone, Default)]
pub struct ListState {
    items: Vec<TodoRecord>,
    total_count: usize,
    has_more: bool,
    loading: bool,
    loading_more: bool,
}

impl ListState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> &[TodoRecord] {
        &self.items
    }

    pub fn get(&self, id: i64) -> Option<&TodoRecord> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_count(&self) -> usize {
        self.total_count
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_loading_more(&self) -> bool {
        self.loading_more
    }

    pub fn begin_loading(&mut self) {
        self.loading = true;
    }

    pub fn begin_loading_more(&mut self) {
        self.loading_more = true;
    }

    /// Clears whichever busy flag a failed fetch left set; the rest of the
    /// state stays untouched.
    pub fn abort_loading(&mut self) {
        self.loading = false;
        self.loading_more = false;
    }

    /// Full supersession after a (re)fetch. Nothing of the previous window
    /// survives.
    pub fn replace(&mut self, items: Vec<TodoRecord>, total_count: usize, has_more: bool) {
        self.items = items;
        self.total_count = total_count;
        self.has_more = has_more;
        self.loading = false;
        self.loading_more = false;
    }

    /// Concatenates an incremental fetch in received order; existing items
    /// are preserved as a prefix and `has_more` takes the latest signal.
    pub fn append(&mut self, items: Vec<TodoRecord>, has_more: bool) {
        self.items.extend(items);
        self.has_more = has_more;
        self.loading_more = false;
    }

    /// Places a freshly created item at the head and counts it.
    pub fn insert(&mut self, item: TodoRecord) {
        self.items.insert(0, item);
        self.total_count += 1;
    }

    /// Excises the item with the given identity. Unknown ids leave the state
    /// unchanged; the count never drops below zero.
    pub fn remove(&mut self, id: i64) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id != id);
        if self.items.len() == before {
            return false;
        }
        self.total_count = self.total_count.saturating_sub(1);
        true
    }

    /// Applies the present fields of `patch` to the matching item. Count and
    /// ordering are untouched.
    pub fn patch(&mut self, id: i64, patch: &TodoPatch) -> bool {
        let Some(item) = self.items.iter_mut().find(|item| item.id == id) else {
            return false;
        };
        if let Some(title) = patch.title.as_deref() {
            item.title = title.trim().to_string();
        }
        if let Some(content) = patch.content.as_ref() {
            item.content = Some(content.clone());
        }
        if let Some(completed) = patch.completed {
            item.completed = completed;
        }
        true
    }

    /// Inverts the matching item's completion flag.
    pub fn toggle(&mut self, id: i64) -> bool {
        let Some(item) = self.items.iter_mut().find(|item| item.id == id) else {
            return false;
        };
        item.completed = !item.completed;
        true
    }
}

/// Stable human-facing number for a displayed row: with `total` rows overall,
/// `offset` rows consumed before the current window, and in-window index
/// `index`, the newest row gets the highest number. Derived on render, never
/// cached per item, so a changed total renumbers everything consistently.
pub fn display_number(total: usize, offset: usize, index: usize) -> usize {
    total.saturating_sub(offset + index)
}
