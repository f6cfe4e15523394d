use unicode_segmentation::UnicodeSegmentation;

use crate::list::PendingMutations;

/// Which browsing mode drives the list: discrete pages or the endless,
/// accumulate-as-you-scroll window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowseMode {
    Paged,
    Endless,
}

#[derive(Debug, Clone, Default)]
pub struct NewTodoOverlay {
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct RenameTodoOverlay {
    pub todo_id: i64,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct DeleteTodoOverlay {
    pub todo_id: i64,
    pub title: String,
}

#[derive(Debug, Clone)]
pub enum OverlayState {
    NewTodo(NewTodoOverlay),
    RenameTodo(RenameTodoOverlay),
    DeleteTodo(DeleteTodoOverlay),
}

/// View-level state: everything the TUI needs besides the two list windows
/// themselves (which live with their retrieval strategies).
#[derive(Debug)]
pub struct AppState {
    pub mode: BrowseMode,
    pub selected: usize,
    pub status_message: Option<String>,
    pub overlay: Option<OverlayState>,
    pub pending: PendingMutations,
    pub user_label: Option<String>,
}

impl AppState {
    pub fn new(user_label: Option<String>) -> Self {
        Self {
            mode: BrowseMode::Paged,
            selected: 0,
            status_message: None,
            overlay: None,
            pending: PendingMutations::new(),
            user_label,
        }
    }

    pub fn set_status_message<S: Into<String>>(&mut self, message: Option<S>) {
        self.status_message = message.map(Into::into);
    }

    pub fn overlay(&self) -> Option<&OverlayState> {
        self.overlay.as_ref()
    }

    pub fn close_overlay(&mut self) {
        self.overlay = None;
    }

    pub fn open_new_todo(&mut self) {
        self.overlay = Some(OverlayState::NewTodo(NewTodoOverlay::default()));
    }

    pub fn open_rename_todo(&mut self, todo_id: i64, title: String) {
        self.overlay = Some(OverlayState::RenameTodo(RenameTodoOverlay { todo_id, title }));
    }

    pub fn open_delete_todo(&mut self, todo_id: i64, title: String) {
        self.overlay = Some(OverlayState::DeleteTodo(DeleteTodoOverlay { todo_id, title }));
    }

    pub fn new_todo_overlay(&self) -> Option<&NewTodoOverlay> {
        match self.overlay.as_ref() {
            Some(OverlayState::NewTodo(overlay)) => Some(overlay),
            _ => None,
        }
    }

    pub fn new_todo_overlay_mut(&mut self) -> Option<&mut NewTodoOverlay> {
        match self.overlay.as_mut() {
            Some(OverlayState::NewTodo(overlay)) => Some(overlay),
            _ => None,
        }
    }

    pub fn rename_todo_overlay(&self) -> Option<&RenameTodoOverlay> {
        match self.overlay.as_ref() {
            Some(OverlayState::RenameTodo(overlay)) => Some(overlay),
            _ => None,
        }
    }

    pub fn rename_todo_overlay_mut(&mut self) -> Option<&mut RenameTodoOverlay> {
        match self.overlay.as_mut() {
            Some(OverlayState::RenameTodo(overlay)) => Some(overlay),
            _ => None,
        }
    }

    pub fn delete_todo_overlay(&self) -> Option<&DeleteTodoOverlay> {
        match self.overlay.as_ref() {
            Some(OverlayState::DeleteTodo(overlay)) => Some(overlay),
            _ => None,
        }
    }

    /// Moves the selection by `delta`, clamped to the currently loaded rows.
    pub fn move_selection(&mut self, delta: isize, len: usize) {
        if len == 0 {
            self.selected = 0;
            return;
        }
        let last = (len - 1) as isize;
        let next = (self.selected as isize + delta).clamp(0, last);
        self.selected = next as usize;
    }

    /// Pulls the selection back into range after the list shrank or was
    /// replaced.
    pub fn normalize_selection(&mut self, len: usize) {
        if len == 0 {
            self.selected = 0;
        } else if self.selected >= len {
            self.selected = len - 1;
        }
    }
}

/// Removes the last user-perceived character from an input buffer.
pub fn pop_grapheme(text: &mut String) {
    if let Some((boundary, _)) = text.grapheme_indices(true).last() {
        text.truncate(boundary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_is_clamped_to_loaded_rows() {
        let mut state = AppState::new(None);
        state.move_selection(1, 0);
        assert_eq!(state.selected, 0);

        state.move_selection(5, 3);
        assert_eq!(state.selected, 2);
        state.move_selection(-10, 3);
        assert_eq!(state.selected, 0);
    }

    #[test]
    fn normalize_pulls_selection_back_after_shrink() {
        let mut state = AppState::new(None);
        state.selected = 9;
        state.normalize_selection(4);
        assert_eq!(state.selected, 3);
        state.normalize_selection(0);
        assert_eq!(state.selected, 0);
    }

    #[test]
    fn pop_grapheme_respects_cluster_boundaries() {
        let mut text = String::from("ab🇩🇪");
        pop_grapheme(&mut text);
        assert_eq!(text, "ab");
        pop_grapheme(&mut text);
        pop_grapheme(&mut text);
        pop_grapheme(&mut text);
        assert_eq!(text, "");
    }
}
