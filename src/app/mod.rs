use std::io::Stdout;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use ratatui::backend::CrosstermBackend;
use ratatui::widgets::ListState;
use ratatui::Terminal;

use crate::config::{AppConfig, ConfigPaths};
use crate::content::MediaStore;
use crate::list::{PagedTodos, TodoActions, TodoFeed};
use crate::session::Session;
use crate::storage::{StorageHandle, TodoRecord};
use crate::ui;

pub mod state;

pub use state::{AppState, BrowseMode, OverlayState};

use state::pop_grapheme;

const MAX_TITLE_INPUT: usize = 120;

enum Action {
    Quit,
    SelectNext,
    SelectPrevious,
    FirstRow,
    LastRow,
    NextPage,
    PreviousPage,
    Refresh,
    NewTodo,
    RenameTodo,
    ToggleDone,
    DeleteTodo,
    SwitchMode,
    LoadMore,
}

pub struct App {
    pub config: Arc<AppConfig>,
    storage: StorageHandle,
    session: Session,
    media: MediaStore,
    pager: PagedTodos<StorageHandle>,
    feed: TodoFeed<StorageHandle>,
    state: AppState,
    list_state: ListState,
    should_quit: bool,
    tick_rate: Duration,
}

impl App {
    pub fn new(
        config: Arc<AppConfig>,
        storage: StorageHandle,
        session: Session,
        paths: ConfigPaths,
    ) -> Result<Self> {
        let pager = PagedTodos::open(storage.clone(), config.list.page_size)
            .context("loading the first page of todos")?;
        let feed = TodoFeed::open(storage.clone(), config.list.window_size)
            .context("loading the initial todo window")?;
        let media = MediaStore::new(paths.media_dir.clone());
        let user_label = session.user().map(|user| user.to_string());
        let mut state = AppState::new(user_label);
        if !session.is_signed_in() {
            state.set_status_message(Some(
                "Browsing read-only; set a user to add or change todos.",
            ));
        }
        let mut list_state = ListState::default();
        if !pager.state().is_empty() {
            list_state.select(Some(0));
        }
        Ok(Self {
            config,
            storage,
            session,
            media,
            pager,
            feed,
            state,
            list_state,
            should_quit: false,
            tick_rate: Duration::from_millis(250),
        })
    }

    pub fn run(&mut self) -> Result<()> {
        let mut terminal = setup_terminal()?;
        let result = self.event_loop(&mut terminal);
        restore_terminal(&mut terminal)?;
        result
    }

    fn event_loop(&mut self, terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
        loop {
            terminal
                .draw(|frame| {
                    if self.active_items().is_empty() {
                        self.list_state.select(None);
                    } else {
                        self.list_state.select(Some(self.state.selected));
                    }
                    ui::draw_app(frame, &self.state, &self.pager, &self.feed, &mut self.list_state);
                })
                .context("rendering frame")?;

            if self.should_quit {
                break;
            }

            if event::poll(self.tick_rate).context("polling for terminal events")? {
                match event::read().context("reading terminal event")? {
                    Event::Key(key) => self.handle_key(key),
                    Event::Resize(_, _) => {
                        // next draw adapts to the new size
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn active_items(&self) -> &[TodoRecord] {
        match self.state.mode {
            BrowseMode::Paged => self.pager.state().items(),
            BrowseMode::Endless => self.feed.state().items(),
        }
    }

    fn selected_todo(&self) -> Option<&TodoRecord> {
        self.active_items().get(self.state.selected)
    }

    fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }

        if self.handle_overlay_key(key) {
            return;
        }

        let plain = !key
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER);
        let action = match key.code {
            KeyCode::Char('q') if plain => Some(Action::Quit),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::Quit)
            }
            KeyCode::Char('j') | KeyCode::Down => Some(Action::SelectNext),
            KeyCode::Char('k') | KeyCode::Up => Some(Action::SelectPrevious),
            KeyCode::Char('g') if plain => Some(Action::FirstRow),
            KeyCode::Char('G') => Some(Action::LastRow),
            KeyCode::Char('h') | KeyCode::Left => Some(Action::PreviousPage),
            KeyCode::Char('l') | KeyCode::Right => Some(Action::NextPage),
            KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::Refresh)
            }
            KeyCode::Char('a') if plain => Some(Action::NewTodo),
            KeyCode::Char('r') if plain => Some(Action::RenameTodo),
            KeyCode::Char(' ') | KeyCode::Char('x') if plain => Some(Action::ToggleDone),
            KeyCode::Char('d') if plain => Some(Action::DeleteTodo),
            KeyCode::Char('v') if plain => Some(Action::SwitchMode),
            KeyCode::Char('m') if plain => Some(Action::LoadMore),
            _ => None,
        };

        if let Some(action) = action {
            self.handle_action(action);
        }
    }

    fn handle_action(&mut self, action: Action) {
        match action {
            Action::Quit => {
                self.should_quit = true;
            }
            Action::SelectNext => {
                self.state.move_selection(1, self.active_items().len());
                self.maybe_load_more_at_end();
            }
            Action::SelectPrevious => {
                self.state.move_selection(-1, self.active_items().len());
            }
            Action::FirstRow => {
                self.state.selected = 0;
            }
            Action::LastRow => {
                let len = self.active_items().len();
                self.state.selected = len.saturating_sub(1);
                self.maybe_load_more_at_end();
            }
            Action::NextPage => self.handle_change_page(1),
            Action::PreviousPage => self.handle_change_page(-1),
            Action::Refresh => self.handle_refresh(),
            Action::NewTodo => {
                if self.state.overlay().is_none() {
                    self.state.open_new_todo();
                    self.state
                        .set_status_message(Some("Enter a title and press Enter"));
                }
            }
            Action::RenameTodo => self.handle_rename_todo(),
            Action::ToggleDone => self.handle_toggle_done(),
            Action::DeleteTodo => self.handle_delete_todo(),
            Action::SwitchMode => self.handle_switch_mode(),
            Action::LoadMore => self.handle_load_more(false),
        }
    }

    fn handle_overlay_key(&mut self, key: KeyEvent) -> bool {
        let plain = !key
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT | KeyModifiers::SUPER);
        match self.state.overlay() {
            Some(OverlayState::NewTodo(_)) => {
                match key.code {
                    KeyCode::Esc => {
                        self.state.close_overlay();
                        self.state.set_status_message(Some("Canceled new todo"));
                    }
                    KeyCode::Enter => {
                        self.submit_new_todo();
                    }
                    KeyCode::Backspace => {
                        if let Some(draft) = self.state.new_todo_overlay_mut() {
                            pop_grapheme(&mut draft.title);
                        }
                    }
                    KeyCode::Char(ch) if plain => {
                        if let Some(draft) = self.state.new_todo_overlay_mut() {
                            if draft.title.len() < MAX_TITLE_INPUT {
                                draft.title.push(ch);
                            }
                        }
                    }
                    _ => {}
                }
                true
            }
            Some(OverlayState::RenameTodo(_)) => {
                match key.code {
                    KeyCode::Esc => {
                        self.state.close_overlay();
                        self.state.set_status_message(Some("Rename canceled"));
                    }
                    KeyCode::Enter => {
                        self.submit_rename_todo();
                    }
                    KeyCode::Backspace => {
                        if let Some(draft) = self.state.rename_todo_overlay_mut() {
                            pop_grapheme(&mut draft.title);
                        }
                    }
                    KeyCode::Char(ch) if plain => {
                        if let Some(draft) = self.state.rename_todo_overlay_mut() {
                            if draft.title.len() < MAX_TITLE_INPUT {
                                draft.title.push(ch);
                            }
                        }
                    }
                    _ => {}
                }
                true
            }
            Some(OverlayState::DeleteTodo(_)) => {
                match key.code {
                    KeyCode::Esc => {
                        self.state.close_overlay();
                        self.state.set_status_message(Some("Delete canceled"));
                    }
                    KeyCode::Enter => {
                        self.submit_delete_todo();
                    }
                    _ => {}
                }
                true
            }
            None => false,
        }
    }

    fn handle_change_page(&mut self, delta: isize) {
        if self.state.mode != BrowseMode::Paged {
            self.state
                .set_status_message(Some("Page keys only work in the paged view"));
            return;
        }
        let result = if delta < 0 {
            self.pager.previous_page()
        } else {
            self.pager.next_page()
        };
        match result {
            Ok(()) => {
                self.state.selected = 0;
                self.state
                    .normalize_selection(self.pager.state().len());
            }
            Err(err) => {
                tracing::error!(?err, "failed to change page");
                self.state
                    .set_status_message(Some("Failed to load that page"));
            }
        }
    }

    fn handle_refresh(&mut self) {
        let result = match self.state.mode {
            BrowseMode::Paged => self.pager.refresh(),
            BrowseMode::Endless => self.feed.refresh(),
        };
        match result {
            Ok(()) => {
                self.state.normalize_selection(self.active_items().len());
                self.state.set_status_message(Some("Refreshed"));
            }
            Err(err) => {
                tracing::error!(?err, "failed to refresh todos");
                self.state
                    .set_status_message(Some("Failed to refresh todos"));
            }
        }
    }

    fn handle_switch_mode(&mut self) {
        let (next, result, label) = match self.state.mode {
            BrowseMode::Paged => (
                BrowseMode::Endless,
                self.feed.refresh(),
                "Endless view: j/k browse • m or scroll to bottom loads more",
            ),
            BrowseMode::Endless => (
                BrowseMode::Paged,
                self.pager.refresh(),
                "Paged view: h/l change pages",
            ),
        };
        if let Err(err) = result {
            tracing::error!(?err, "failed to load the other view");
            self.state
                .set_status_message(Some("Failed to switch views"));
            return;
        }
        self.state.mode = next;
        self.state.selected = 0;
        self.state.normalize_selection(self.active_items().len());
        self.state.set_status_message(Some(label));
    }

    /// The endless view's load trigger: the selection having reached the last
    /// loaded row plays the role a viewport intersection plays in a browser.
    fn maybe_load_more_at_end(&mut self) {
        if self.state.mode != BrowseMode::Endless {
            return;
        }
        let len = self.feed.state().len();
        if len == 0 || self.state.selected + 1 < len {
            return;
        }
        if self.feed.state().has_more() {
            self.handle_load_more(true);
        }
    }

    fn handle_load_more(&mut self, quiet: bool) {
        if self.state.mode != BrowseMode::Endless {
            self.state
                .set_status_message(Some("Load more only works in the endless view"));
            return;
        }
        match self.feed.load_more() {
            Ok(true) => {
                if !quiet {
                    self.state.set_status_message(Some("Loaded more todos"));
                }
            }
            Ok(false) => {
                if !quiet {
                    self.state.set_status_message(Some("All todos loaded"));
                }
            }
            Err(err) => {
                tracing::error!(?err, "failed to load more todos");
                self.state
                    .set_status_message(Some("Failed to load more todos"));
            }
        }
    }

    fn handle_rename_todo(&mut self) {
        if self.state.overlay().is_some() {
            return;
        }
        let Some(todo) = self.selected_todo() else {
            self.state.set_status_message(Some("No todo selected"));
            return;
        };
        if self.state.pending.is_pending(todo.id) {
            self.state
                .set_status_message(Some("That todo already has a change in flight"));
            return;
        }
        let (id, title) = (todo.id, todo.title.clone());
        self.state.open_rename_todo(id, title);
        self.state.set_status_message(Some(
            "Rename todo: type new title • Enter save • Esc cancel",
        ));
    }

    fn handle_delete_todo(&mut self) {
        if self.state.overlay().is_some() {
            return;
        }
        let Some(todo) = self.selected_todo() else {
            self.state.set_status_message(Some("No todo selected"));
            return;
        };
        if self.state.pending.is_pending(todo.id) {
            self.state
                .set_status_message(Some("That todo already has a change in flight"));
            return;
        }
        let (id, title) = (todo.id, todo.title.clone());
        self.state.open_delete_todo(id, title);
        self.state
            .set_status_message(Some("Delete todo: Enter confirm • Esc cancel"));
    }

    fn handle_toggle_done(&mut self) {
        let Some(todo) = self.selected_todo() else {
            self.state.set_status_message(Some("No todo selected"));
            return;
        };
        let id = todo.id;
        if !self.state.pending.begin(id) {
            self.state
                .set_status_message(Some("That todo already has a change in flight"));
            return;
        }
        let result = {
            let actions = TodoActions::new(&self.storage, &self.session).with_media(&self.media);
            match self.state.mode {
                BrowseMode::Paged => actions.toggle(self.pager.state_mut(), id),
                BrowseMode::Endless => actions.toggle(self.feed.state_mut(), id),
            }
        };
        self.state.pending.finish(id);
        match result {
            Ok(true) => self.state.set_status_message(Some("Todo marked done")),
            Ok(false) => self.state.set_status_message(Some("Todo marked pending")),
            Err(err) => {
                tracing::error!(?err, todo_id = id, "failed to toggle todo");
                self.state
                    .set_status_message(Some(format!("Failed to update todo: {err}")));
            }
        }
    }

    fn submit_new_todo(&mut self) {
        let Some(draft) = self.state.new_todo_overlay() else {
            return;
        };
        let title = draft.title.trim().to_string();
        if title.is_empty() {
            self.state.set_status_message(Some("Title cannot be empty"));
            return;
        }
        let result = {
            let actions = TodoActions::new(&self.storage, &self.session).with_media(&self.media);
            match self.state.mode {
                BrowseMode::Paged => actions.add(self.pager.state_mut(), &title, None),
                BrowseMode::Endless => actions.add(self.feed.state_mut(), &title, None),
            }
        };
        match result {
            Ok(_record) => {
                self.state.close_overlay();
                // The paged view snaps back to page one so the new row is
                // visible under its final numbering.
                if self.state.mode == BrowseMode::Paged {
                    if let Err(err) = self.pager.change_page(1) {
                        tracing::error!(?err, "failed to reload page one after create");
                        self.state
                            .set_status_message(Some("Todo created, refresh failed"));
                        return;
                    }
                }
                self.state.selected = 0;
                self.state.set_status_message(Some("Todo created"));
            }
            Err(err) => {
                tracing::error!(?err, "failed to create todo");
                self.state
                    .set_status_message(Some(format!("Failed to create todo: {err}")));
            }
        }
    }

    fn submit_rename_todo(&mut self) {
        let Some((id, title)) = self
            .state
            .rename_todo_overlay()
            .map(|draft| (draft.todo_id, draft.title.trim().to_string()))
        else {
            return;
        };
        if title.is_empty() {
            self.state.set_status_message(Some("Title cannot be empty"));
            return;
        }
        if !self.state.pending.begin(id) {
            self.state
                .set_status_message(Some("That todo already has a change in flight"));
            return;
        }
        let result = {
            let actions = TodoActions::new(&self.storage, &self.session).with_media(&self.media);
            match self.state.mode {
                BrowseMode::Paged => actions.rename(self.pager.state_mut(), id, &title),
                BrowseMode::Endless => actions.rename(self.feed.state_mut(), id, &title),
            }
        };
        self.state.pending.finish(id);
        match result {
            Ok(_) => {
                self.state.close_overlay();
                self.state.set_status_message(Some("Todo renamed"));
            }
            Err(err) => {
                tracing::error!(?err, todo_id = id, "failed to rename todo");
                self.state
                    .set_status_message(Some(format!("Failed to rename todo: {err}")));
            }
        }
    }

    fn submit_delete_todo(&mut self) {
        let Some(id) = self.state.delete_todo_overlay().map(|draft| draft.todo_id) else {
            return;
        };
        if !self.state.pending.begin(id) {
            self.state
                .set_status_message(Some("That todo already has a change in flight"));
            return;
        }
        let result = {
            let actions = TodoActions::new(&self.storage, &self.session).with_media(&self.media);
            match self.state.mode {
                BrowseMode::Paged => actions.delete(self.pager.state_mut(), id),
                BrowseMode::Endless => actions.delete(self.feed.state_mut(), id),
            }
        };
        self.state.pending.finish(id);
        match result {
            Ok(()) => {
                self.state.close_overlay();
                // Re-fetch the page so numbering stays dense and an emptied
                // final page falls back; the endless view just keeps its
                // locally decremented count.
                if self.state.mode == BrowseMode::Paged {
                    if let Err(err) = self.pager.refresh() {
                        tracing::error!(?err, "failed to refresh after delete");
                        self.state
                            .set_status_message(Some("Deleted, refresh failed"));
                        return;
                    }
                }
                self.state.normalize_selection(self.active_items().len());
                self.state.set_status_message(Some("Todo deleted"));
            }
            Err(err) => {
                tracing::error!(?err, todo_id = id, "failed to delete todo");
                self.state
                    .set_status_message(Some(format!("Failed to delete todo: {err}")));
            }
        }
    }
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode().context("enabling raw mode")?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen).context("entering alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).context("creating terminal")
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode().context("disabling raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen).context("leaving alternate screen")?;
    terminal.show_cursor().context("restoring cursor")?;
    Ok(())
}
