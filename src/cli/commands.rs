use std::fmt::Write as _;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use crate::app::App;
use crate::config::{AppConfig, ConfigPaths};
use crate::content::MediaStore;
use crate::list::{ListState, PagedTodos, TodoActions};
use crate::session::Session;
use crate::storage::{StorageHandle, TodoRecord, TodoStore};

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    /// Title for the todo (prompted if omitted)
    #[arg()]
    pub title: Option<String>,
    /// Provide the content inline. If omitted, reads from stdin.
    #[arg(long)]
    pub content: Option<String>,
    /// Import a file into the media store and reference it from the content
    #[arg(long)]
    pub attach: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Page to print (1-based)
    #[arg(long, default_value_t = 1)]
    pub page: usize,
    /// Rows per page (defaults to the configured page size)
    #[arg(long)]
    pub per_page: Option<usize>,
    /// Emit JSON instead of the table
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ShowArgs {
    /// Todo identifier
    pub id: i64,
    /// Emit JSON instead of the detail view
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct IdArgs {
    /// Todo identifier
    pub id: i64,
}

#[derive(Args, Debug, Clone)]
pub struct EditArgs {
    /// Todo identifier
    pub id: i64,
    /// New title
    #[arg(long)]
    pub title: Option<String>,
    /// New content (replaces the old content)
    #[arg(long)]
    pub content: Option<String>,
    /// Import a file into the media store and reference it from the content
    #[arg(long)]
    pub attach: Vec<PathBuf>,
}

pub fn run_tui(app: &mut App) -> Result<()> {
    app.run()
}

pub fn add_todo(
    _config: Arc<AppConfig>,
    storage: StorageHandle,
    session: Session,
    paths: ConfigPaths,
    args: AddArgs,
) -> Result<()> {
    let mut title = match args.title {
        Some(t) => t,
        None => prompt("Title")?,
    };
    title = title.trim().to_owned();
    if title.is_empty() {
        bail!("todo title cannot be empty");
    }
    let mut content = match args.content {
        Some(content) => Some(content),
        None => read_stdin()?,
    };
    if !args.attach.is_empty() {
        let media = MediaStore::new(paths.media_dir.clone());
        content = Some(attach_files(&media, content.unwrap_or_default(), &args.attach)?);
    }

    let actions = TodoActions::new(&storage, &session);
    let mut scratch = ListState::new();
    let record = actions
        .add(&mut scratch, &title, content)
        .context("creating todo")?;
    println!("Created todo #{}", record.id);
    Ok(())
}

pub fn list_todos(config: Arc<AppConfig>, storage: StorageHandle, args: ListArgs) -> Result<()> {
    let per_page = args.per_page.unwrap_or(config.list.page_size);
    let mut pager = PagedTodos::open(storage, per_page).context("loading todo list")?;
    if args.page > 1 {
        pager.change_page(args.page).context("changing page")?;
    }
    if args.json {
        let payload = serde_json::json!({
            "items": pager.state().items(),
            "total_count": pager.state().total_count(),
            "total_pages": pager.total_pages(),
            "current_page": pager.current_page(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print!("{}", format_todo_page(&pager));
    }
    Ok(())
}

pub fn show_todo(storage: StorageHandle, args: ShowArgs) -> Result<()> {
    let Some(record) = storage.fetch_by_id(args.id).context("loading todo")? else {
        bail!("todo #{} not found", args.id);
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print!("{}", format_todo_detail(&record));
    }
    Ok(())
}

pub fn toggle_todo(storage: StorageHandle, session: Session, args: IdArgs) -> Result<()> {
    let mut window = load_single(&storage, args.id)?;
    let actions = TodoActions::new(&storage, &session);
    let completed = actions
        .toggle(&mut window, args.id)
        .with_context(|| format!("toggling todo #{}", args.id))?;
    println!(
        "Todo #{} marked {}",
        args.id,
        if completed { "done" } else { "pending" }
    );
    Ok(())
}

pub fn edit_todo(
    storage: StorageHandle,
    session: Session,
    paths: ConfigPaths,
    args: EditArgs,
) -> Result<()> {
    if args.title.is_none() && args.content.is_none() && args.attach.is_empty() {
        bail!("nothing to change: pass --title, --content, or --attach");
    }
    let media = MediaStore::new(paths.media_dir.clone());
    let mut window = load_single(&storage, args.id)?;
    let actions = TodoActions::new(&storage, &session).with_media(&media);

    if let Some(title) = args.title.as_deref() {
        actions
            .rename(&mut window, args.id, title)
            .with_context(|| format!("renaming todo #{}", args.id))?;
    }

    if args.content.is_some() || !args.attach.is_empty() {
        let base = match args.content {
            Some(content) => content,
            // Attach-only edits keep the existing content and append to it.
            None => window
                .get(args.id)
                .and_then(|item| item.content.clone())
                .unwrap_or_default(),
        };
        let content = if args.attach.is_empty() {
            base
        } else {
            attach_files(&media, base, &args.attach)?
        };
        actions
            .edit_content(&mut window, args.id, content)
            .with_context(|| format!("updating content of todo #{}", args.id))?;
    }

    println!("Updated todo #{}", args.id);
    Ok(())
}

pub fn remove_todo(
    storage: StorageHandle,
    session: Session,
    paths: ConfigPaths,
    args: IdArgs,
) -> Result<()> {
    let media = MediaStore::new(paths.media_dir.clone());
    let mut window = load_single(&storage, args.id)?;
    let actions = TodoActions::new(&storage, &session).with_media(&media);
    actions
        .delete(&mut window, args.id)
        .with_context(|| format!("deleting todo #{}", args.id))?;
    println!("Deleted todo #{}", args.id);
    Ok(())
}

/// A one-row window over the collection, so the CLI drives the same
/// confirm-then-apply path the TUI uses.
fn load_single(storage: &StorageHandle, id: i64) -> Result<ListState> {
    let mut window = ListState::new();
    if let Some(record) = storage.fetch_by_id(id).context("loading todo")? {
        window.replace(vec![record], 1, false);
    }
    Ok(window)
}

fn attach_files(media: &MediaStore, mut content: String, files: &[PathBuf]) -> Result<String> {
    for file in files {
        let reference = media
            .import(file)
            .with_context(|| format!("attaching {}", file.display()))?;
        let label = file
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("attachment");
        if !content.is_empty() {
            content.push('\n');
        }
        let _ = write!(&mut content, "![{label}]({reference})");
    }
    Ok(content)
}

fn format_todo_page(pager: &PagedTodos<StorageHandle>) -> String {
    let state = pager.state();
    if state.is_empty() {
        return "No todos yet.\n".to_string();
    }
    let mut out = String::new();
    for (index, todo) in state.items().iter().enumerate() {
        let check = if todo.completed { "x" } else { " " };
        let _ = writeln!(
            &mut out,
            "{:>4}. [{check}] {}  (created {})",
            pager.display_number(index),
            todo.title,
            format_timestamp(todo.created_at)
        );
    }
    let _ = writeln!(
        &mut out,
        "Page {}/{} • showing {}-{} of {}",
        pager.current_page(),
        pager.total_pages(),
        pager.first_item_position(),
        pager.last_item_position(),
        state.total_count()
    );
    out
}

fn format_todo_detail(record: &TodoRecord) -> String {
    let mut out = String::new();
    let status = if record.completed { "done" } else { "pending" };
    let _ = writeln!(&mut out, "#{}  {}", record.id, record.title);
    let _ = writeln!(&mut out, "    status  {status}");
    let _ = writeln!(&mut out, "    owner   {}", record.owner);
    let _ = writeln!(
        &mut out,
        "    created {}",
        format_timestamp(record.created_at)
    );
    let _ = writeln!(
        &mut out,
        "    updated {}",
        format_timestamp(record.updated_at)
    );
    if let Some(content) = record.content.as_deref() {
        out.push('\n');
        for line in content.lines() {
            let _ = writeln!(&mut out, "    {line}");
        }
    }
    out
}

fn format_timestamp(epoch: i64) -> String {
    OffsetDateTime::from_unix_timestamp(epoch)
        .map(|dt| dt.format(&Rfc3339).unwrap_or_else(|_| epoch.to_string()))
        .unwrap_or_else(|_| epoch.to_string())
}

fn prompt(label: &str) -> Result<String> {
    use std::io::Write;
    let mut stdout = io::stdout();
    write!(stdout, "{}: ", label)?;
    stdout.flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim_end().to_owned())
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    if buf.is_empty() {
        Ok(None)
    } else {
        Ok(Some(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageOptions;
    use crate::session::UserId;
    use crate::storage::{self, TodoDraft};
    use tempfile::TempDir;

    type TestResult<T = ()> = Result<T>;

    fn setup() -> TestResult<(TempDir, ConfigPaths, StorageHandle)> {
        let temp = TempDir::new().context("creating temp dir")?;
        let root = temp.path();
        let paths = ConfigPaths {
            config_dir: root.join("config"),
            config_file: root.join("config/config.toml"),
            data_dir: root.join("data"),
            database_path: root.join("data/todos.db"),
            media_dir: root.join("data/media"),
            state_dir: root.join("state"),
            log_dir: root.join("logs"),
        };
        paths.ensure_directories()?;
        let mut storage_opts = StorageOptions::default();
        storage_opts.database_path = paths.database_path.clone();
        let handle = storage::init(&paths, &storage_opts)?;
        Ok((temp, paths, handle))
    }

    fn session() -> Session {
        Session::signed_in(UserId::new("mika").expect("id"))
    }

    #[test]
    fn list_output_numbers_rows_newest_first() -> TestResult {
        let (_temp, _paths, storage) = setup()?;
        for n in 1..=11 {
            storage.create(&session(), TodoDraft::new(format!("todo {n}")))?;
        }

        let pager = PagedTodos::open(storage, 10)?;
        let output = format_todo_page(&pager);
        assert!(output.contains("  11. [ ] todo 11"));
        assert!(output.contains("   2. [ ] todo 2"));
        assert!(!output.contains("todo 1  "), "page 1 stops before the oldest row");
        assert!(output.contains("Page 1/2 • showing 1-10 of 11"));
        Ok(())
    }

    #[test]
    fn empty_collection_prints_a_hint() -> TestResult {
        let (_temp, _paths, storage) = setup()?;
        let pager = PagedTodos::open(storage, 10)?;
        assert_eq!(format_todo_page(&pager), "No todos yet.\n");
        Ok(())
    }

    #[test]
    fn toggle_command_round_trips_through_the_store() -> TestResult {
        let (_temp, _paths, storage) = setup()?;
        let record = storage.create(&session(), TodoDraft::new("flip me"))?;

        toggle_todo(storage.clone(), session(), IdArgs { id: record.id })?;
        assert!(storage.fetch_by_id(record.id)?.expect("row").completed);

        toggle_todo(storage.clone(), session(), IdArgs { id: record.id })?;
        assert!(!storage.fetch_by_id(record.id)?.expect("row").completed);
        Ok(())
    }

    #[test]
    fn edit_without_changes_is_refused() -> TestResult {
        let (_temp, paths, storage) = setup()?;
        let record = storage.create(&session(), TodoDraft::new("stubborn"))?;
        let result = edit_todo(
            storage,
            session(),
            paths,
            EditArgs {
                id: record.id,
                title: None,
                content: None,
                attach: Vec::new(),
            },
        );
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn remove_command_cleans_up_referenced_media() -> TestResult {
        let (temp, paths, storage) = setup()?;
        let media = MediaStore::new(paths.media_dir.clone());
        let source = temp.path().join("scan.png");
        std::fs::write(&source, b"bytes")?;
        let reference = media.import(&source)?;

        let record = storage.create(
            &session(),
            TodoDraft::new("attachment holder").with_content(format!("![scan]({reference})")),
        )?;
        remove_todo(storage.clone(), session(), paths, IdArgs { id: record.id })?;

        assert!(storage.fetch_by_id(record.id)?.is_none());
        assert!(!media.local_path(&reference).expect("owned").exists());
        Ok(())
    }

    #[test]
    fn detail_view_indents_content() -> TestResult {
        let record = TodoRecord {
            id: 7,
            title: "Write report".into(),
            content: Some("first line\nsecond line".into()),
            completed: true,
            created_at: 1_700_000_000,
            updated_at: 1_700_000_100,
            owner: "mika".into(),
        };
        let output = format_todo_detail(&record);
        assert!(output.starts_with("#7  Write report\n"));
        assert!(output.contains("    status  done"));
        assert!(output.contains("    first line\n    second line\n"));
        Ok(())
    }
}
