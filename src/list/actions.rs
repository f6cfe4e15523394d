use std::collections::HashSet;

use crate::content::MediaStore;
use crate::list::state::ListState;
use crate::session::Session;
use crate::storage::{StoreError, TodoDraft, TodoPatch, TodoRecord, TodoStore};

/// Confirm-then-apply mutation dispatch: the store call is issued first, and
/// the matching [`ListState`] transition is committed only on success. The
/// view never shows an uncommitted row; the store is the authority for
/// identity assignment and field validation.
pub struct TodoActions<'a, S> {
    store: &'a S,
    session: &'a Session,
    media: Option<&'a MediaStore>,
}

impl<'a, S: TodoStore> TodoActions<'a, S> {
    pub fn new(store: &'a S, session: &'a Session) -> Self {
        Self {
            store,
            session,
            media: None,
        }
    }

    /// Enables orphaned-asset cleanup on content edits and deletes.
    pub fn with_media(mut self, media: &'a MediaStore) -> Self {
        self.media = Some(media);
        self
    }

    /// Creates a todo and prepends the confirmed row. Blank titles and
    /// signed-out sessions are rejected before any store round trip.
    pub fn add(
        &self,
        list: &mut ListState,
        title: &str,
        content: Option<String>,
    ) -> Result<TodoRecord, StoreError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(StoreError::EmptyTitle);
        }
        if !self.session.is_signed_in() {
            return Err(StoreError::SignInRequired);
        }
        let mut draft = TodoDraft::new(title);
        draft.content = content;
        let record = self.store.create(self.session, draft)?;
        list.insert(record.clone());
        Ok(record)
    }

    pub fn rename(
        &self,
        list: &mut ListState,
        id: i64,
        title: &str,
    ) -> Result<TodoRecord, StoreError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(StoreError::EmptyTitle);
        }
        let patch = TodoPatch::rename(title);
        let record = self.store.update(id, patch.clone())?;
        list.patch(id, &patch);
        Ok(record)
    }

    /// Replaces the content field, then deletes any media assets the edit
    /// orphaned.
    pub fn edit_content(
        &self,
        list: &mut ListState,
        id: i64,
        content: String,
    ) -> Result<TodoRecord, StoreError> {
        let previous = match list.get(id) {
            Some(item) => item.content.clone(),
            None => self.store.fetch_by_id(id)?.and_then(|item| item.content),
        };
        let patch = TodoPatch::content(content.clone());
        let record = self.store.update(id, patch.clone())?;
        list.patch(id, &patch);
        if let (Some(media), Some(old)) = (self.media, previous) {
            media.cleanup_orphans(&old, &content);
        }
        Ok(record)
    }

    /// Inverts the completion flag. The current value is read from local
    /// state; an identity that is no longer there is a soft `NotFound`.
    pub fn toggle(&self, list: &mut ListState, id: i64) -> Result<bool, StoreError> {
        let current = list.get(id).ok_or(StoreError::NotFound { id })?.completed;
        let target = !current;
        self.store.update(id, TodoPatch::completion(target))?;
        list.toggle(id);
        Ok(target)
    }

    /// Deletes the row, excises it locally, and drops every media asset its
    /// content referenced.
    pub fn delete(&self, list: &mut ListState, id: i64) -> Result<(), StoreError> {
        let previous = match list.get(id) {
            Some(item) => item.content.clone(),
            None => self.store.fetch_by_id(id)?.and_then(|item| item.content),
        };
        self.store.remove(id)?;
        list.remove(id);
        if let (Some(media), Some(old)) = (self.media, previous) {
            media.cleanup_all(&old);
        }
        Ok(())
    }
}

/// Per-item mutation guard: while a mutation for an identity is in flight the
/// UI refuses to start another one for the same identity, while every other
/// item stays operable. There is deliberately no global lock.
#[derive(Debug, Default)]
pub struct PendingMutations {
    in_flight: HashSet<i64>,
}

impl PendingMutations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the identity; returns `false` when a mutation for it is
    /// already running.
    pub fn begin(&mut self, id: i64) -> bool {
        self.in_flight.insert(id)
    }

    pub fn finish(&mut self, id: i64) {
        self.in_flight.remove(&id);
    }

    pub fn is_pending(&self, id: i64) -> bool {
        self.in_flight.contains(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigPaths, StorageOptions};
    use crate::session::UserId;
    use crate::storage::{self, StorageHandle};
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn open_store(root: &TempDir) -> anyhow::Result<StorageHandle> {
        let base = root.path();
        let paths = ConfigPaths {
            config_dir: base.join("config"),
            config_file: base.join("config/config.toml"),
            data_dir: base.join("data"),
            database_path: base.join("data/todos.db"),
            media_dir: base.join("data/media"),
            state_dir: base.join("state"),
            log_dir: base.join("logs"),
        };
        paths.ensure_directories()?;
        let mut options = StorageOptions::default();
        options.database_path = paths.database_path.clone();
        Ok(storage::init(&paths, &options)?)
    }

    fn session() -> Session {
        Session::signed_in(UserId::new("mika").expect("id"))
    }

    fn loaded_list(store: &StorageHandle, limit: usize) -> anyhow::Result<ListState> {
        let page = store.fetch_range(0, limit)?;
        let mut list = ListState::new();
        let total = page.total_count;
        let has_more = page.items.len() < total;
        list.replace(page.items, total, has_more);
        Ok(list)
    }

    #[test]
    fn add_prepends_the_confirmed_row() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let store = open_store(&temp)?;
        let session = session();
        let actions = TodoActions::new(&store, &session);
        let mut list = ListState::new();

        let record = actions.add(&mut list, "Buy oat milk", None)?;
        assert_eq!(list.len(), 1);
        assert_eq!(list.total_count(), 1);
        assert_eq!(list.items()[0].id, record.id);
        assert_eq!(store.fetch_range(0, 10)?.total_count, 1);
        Ok(())
    }

    #[test]
    fn blank_title_is_rejected_before_any_store_call() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let store = open_store(&temp)?;
        // A signed-out session would fail too, but the title check runs
        // first, which proves no round trip was issued.
        let anonymous = Session::anonymous();
        let actions = TodoActions::new(&store, &anonymous);
        let mut list = ListState::new();

        let err = actions.add(&mut list, "  ", None).unwrap_err();
        assert_matches!(err, StoreError::EmptyTitle);
        assert_eq!(list.len(), 0);
        Ok(())
    }

    #[test]
    fn signed_out_session_cannot_add() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let store = open_store(&temp)?;
        let anonymous = Session::anonymous();
        let actions = TodoActions::new(&store, &anonymous);
        let mut list = ListState::new();

        let err = actions.add(&mut list, "real title", None).unwrap_err();
        assert_matches!(err, StoreError::SignInRequired);
        assert_eq!(list.len(), 0);
        assert_eq!(store.fetch_range(0, 10)?.total_count, 0);
        Ok(())
    }

    #[test]
    fn toggle_confirms_in_store_then_applies() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let store = open_store(&temp)?;
        let session = session();
        let actions = TodoActions::new(&store, &session);
        let mut list = ListState::new();
        let record = actions.add(&mut list, "stretch", None)?;

        assert!(actions.toggle(&mut list, record.id)?);
        assert!(list.get(record.id).expect("present").completed);
        assert!(store.fetch_by_id(record.id)?.expect("row").completed);

        assert!(!actions.toggle(&mut list, record.id)?);
        assert!(!list.get(record.id).expect("present").completed);
        Ok(())
    }

    #[test]
    fn toggle_of_a_vanished_id_is_a_soft_failure() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let store = open_store(&temp)?;
        let session = session();
        let actions = TodoActions::new(&store, &session);
        let mut list = loaded_list(&store, 10)?;

        let err = actions.toggle(&mut list, 777).unwrap_err();
        assert_matches!(err, StoreError::NotFound { id: 777 });
        assert_eq!(list.len(), 0);
        Ok(())
    }

    #[test]
    fn rename_patches_only_the_title() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let store = open_store(&temp)?;
        let session = session();
        let actions = TodoActions::new(&store, &session);
        let mut list = ListState::new();
        let record = actions.add(&mut list, "old name", Some("keep me".into()))?;

        actions.rename(&mut list, record.id, "  new name  ")?;
        let item = list.get(record.id).expect("present");
        assert_eq!(item.title, "new name");
        assert_eq!(item.content.as_deref(), Some("keep me"));
        Ok(())
    }

    #[test]
    fn delete_drops_row_and_referenced_media() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let store = open_store(&temp)?;
        let media = MediaStore::new(temp.path().join("data/media"));
        let source = temp.path().join("receipt.png");
        std::fs::write(&source, b"bytes")?;
        let reference = media.import(&source)?;

        let session = session();
        let actions = TodoActions::new(&store, &session).with_media(&media);
        let mut list = ListState::new();
        let record = actions.add(
            &mut list,
            "expense report",
            Some(format!("receipt: ![r]({reference})")),
        )?;

        actions.delete(&mut list, record.id)?;
        assert_eq!(list.len(), 0);
        assert_eq!(list.total_count(), 0);
        assert!(store.fetch_by_id(record.id)?.is_none());
        assert!(!media.local_path(&reference).expect("owned").exists());
        Ok(())
    }

    #[test]
    fn content_edit_cleans_orphaned_assets() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let store = open_store(&temp)?;
        let media = MediaStore::new(temp.path().join("data/media"));
        let source = temp.path().join("sketch.png");
        std::fs::write(&source, b"bytes")?;
        let kept = media.import(&source)?;
        let dropped = media.import(&source)?;

        let session = session();
        let actions = TodoActions::new(&store, &session).with_media(&media);
        let mut list = ListState::new();
        let record = actions.add(
            &mut list,
            "design notes",
            Some(format!("![a]({kept}) ![b]({dropped})")),
        )?;

        actions.edit_content(&mut list, record.id, format!("![a]({kept})"))?;
        assert!(media.local_path(&kept).expect("owned").exists());
        assert!(!media.local_path(&dropped).expect("owned").exists());
        assert_eq!(
            list.get(record.id).expect("present").content.as_deref(),
            Some(format!("![a]({kept})").as_str())
        );
        Ok(())
    }

    #[test]
    fn pending_guard_locks_per_item() {
        let mut pending = PendingMutations::new();
        assert!(pending.begin(1));
        assert!(!pending.begin(1));
        assert!(pending.begin(2), "other items stay operable");
        pending.finish(1);
        assert!(pending.begin(1));
    }
}
