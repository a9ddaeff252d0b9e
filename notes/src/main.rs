use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use notes::archive::create_archive;
use notes::calendar::render_month;
use notes::config::NotesConfig;
use notes::daily::{DailyNotes, OpenState, OpenedNote};
use notes::date::{CalendarDate, parse_year_month};
use notes::editor::{CommandEditor, Editor};
use notes::general::GeneralNotes;
use notes::paths::NoteLayout;
use notes::scan::daily_dates;
use notes::storage::{FsStore, NoteStore};
use notes::summary::summarize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "notes",
    about = "Daily and general notes kept as plain text files",
    version
)]
struct Cli {
    /// Enable verbose logging for debugging.
    #[arg(long, global = true)]
    verbose: bool,
    /// Config file (defaults to $NOTES_CONFIG or the user config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Note store root, overriding config and $NOTES_DIR.
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Editor command, overriding config and $NOTES_EDITOR.
    #[arg(long, global = true)]
    editor: Option<String>,
    /// Create notes but do not launch the editor.
    #[arg(long, global = true)]
    no_edit: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Open today's daily note, carrying open items forward if it is new.
    Today,

    /// Open yesterday's daily note.
    Yesterday,

    /// Open the daily note for a given date.
    Day(DayArgs),

    /// Print a daily note without opening the editor.
    Show(ShowArgs),

    /// Create or open a general note.
    Note(NoteArgs),

    /// List general notes.
    Notes,

    /// Search and edit general note tags.
    Tags(TagsArgs),

    /// Show a month calendar marking days with notes.
    Cal(CalArgs),

    /// Count notes in the store.
    Summary(SummaryArgs),

    /// Write a gzip tarball of the whole store.
    Archive(ArchiveArgs),
}

#[derive(Debug, Args)]
struct DayArgs {
    /// Date of the note (YYYY-MM-DD).
    date: CalendarDate,
}

#[derive(Debug, Args)]
struct ShowArgs {
    /// Date of the note (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    date: Option<CalendarDate>,
}

#[derive(Debug, Args)]
struct NoteArgs {
    /// Note name, used as the file name.
    name: String,
    /// Tags to attach (repeatable).
    #[arg(long = "tag", short = 't')]
    tags: Vec<String>,
}

#[derive(Debug, Args)]
struct TagsArgs {
    #[command(subcommand)]
    command: TagsCommand,
}

#[derive(Debug, Subcommand)]
enum TagsCommand {
    /// List general notes carrying a tag.
    Search { tag: String },
    /// Add tags to a general note.
    Add {
        name: String,
        #[arg(required = true)]
        tags: Vec<String>,
    },
    /// Remove tags from a general note.
    Remove {
        name: String,
        #[arg(required = true)]
        tags: Vec<String>,
    },
}

#[derive(Debug, Args)]
struct CalArgs {
    /// Month to show (YYYY-MM). Defaults to the current month.
    #[arg(long)]
    month: Option<String>,
}

#[derive(Debug, Args)]
struct SummaryArgs {
    /// Emit JSON instead of a human-readable report.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct ArchiveArgs {
    /// Output file, e.g. notes-backup.tar.gz.
    output: PathBuf,
}

/// Resolved settings shared by every subcommand.
struct Session {
    config: NotesConfig,
    layout: NoteLayout,
    editor: Option<CommandEditor>,
}

impl Session {
    fn daily(&self) -> DailyNotes<FsStore> {
        DailyNotes::from_config(FsStore, &self.config)
    }

    fn general(&self) -> GeneralNotes<FsStore> {
        GeneralNotes::new(FsStore, self.layout.clone())
    }

    fn edit(&self, path: &Path) -> Result<()> {
        if let Some(editor) = &self.editor {
            editor
                .edit(path)
                .with_context(|| format!("editing {:?}", path))?;
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let ctx = load_session(&cli)?;
    match cli.command {
        Commands::Today => handle_daily(&ctx, CalendarDate::today()),
        Commands::Yesterday => handle_daily(&ctx, CalendarDate::today().previous_day()),
        Commands::Day(args) => handle_daily(&ctx, args.date),
        Commands::Show(args) => handle_show(&ctx, args),
        Commands::Note(args) => handle_note(&ctx, args),
        Commands::Notes => handle_list_notes(&ctx),
        Commands::Tags(args) => handle_tags(&ctx, args),
        Commands::Cal(args) => handle_cal(&ctx, args),
        Commands::Summary(args) => handle_summary(&ctx, args),
        Commands::Archive(args) => handle_archive(&ctx, args),
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("NOTES_LOG")
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_session(cli: &Cli) -> Result<Session> {
    let path = cli.config.clone().unwrap_or_else(NotesConfig::default_path);
    let mut config = NotesConfig::load_from(&path)
        .with_context(|| format!("loading config {:?}", path))?
        .with_env_overrides(|key| std::env::var(key).ok());
    if let Some(root) = &cli.root {
        config.root = root.clone();
    }
    if let Some(editor) = &cli.editor {
        config.editor = Some(editor.clone());
    }
    tracing::debug!(root = ?config.root, "configuration loaded");

    let editor = (!cli.no_edit).then(|| CommandEditor::new(config.resolved_editor()));
    let layout = NoteLayout::new(&config.root, &config.extension);
    Ok(Session {
        config,
        layout,
        editor,
    })
}

fn handle_daily(ctx: &Session, date: CalendarDate) -> Result<()> {
    let note = ctx
        .daily()
        .prepare(date)
        .with_context(|| format!("preparing daily note for {date}"))?;
    report_opened(&note);
    ctx.edit(&note.path)
}

fn report_opened(note: &OpenedNote) {
    match note.state {
        OpenState::Existing => println!("Opened {:?}", note.path),
        OpenState::Created {
            carried_from: Some(from),
        } => println!("Wrote new daily note to {:?} (carried from {from})", note.path),
        OpenState::Created { carried_from: None } => {
            println!("Wrote new daily note to {:?}", note.path)
        }
    }
}

fn handle_show(ctx: &Session, args: ShowArgs) -> Result<()> {
    let date = args.date.unwrap_or_else(CalendarDate::today);
    let daily = ctx.daily();
    let note = daily
        .prepare(date)
        .with_context(|| format!("preparing daily note for {date}"))?;
    let text = daily
        .store()
        .read(&note.path)
        .with_context(|| format!("reading {:?}", note.path))?;
    print!("{text}");
    if !text.ends_with('\n') {
        println!();
    }
    Ok(())
}

fn handle_note(ctx: &Session, args: NoteArgs) -> Result<()> {
    let NoteArgs { name, tags } = args;
    let (path, created) = ctx
        .general()
        .create_or_open(&name, &tags)
        .with_context(|| format!("opening general note {name:?}"))?;
    if created {
        println!("Wrote new note to {:?}", path);
    } else {
        println!("Opened {:?}", path);
    }
    ctx.edit(&path)
}

fn handle_list_notes(ctx: &Session) -> Result<()> {
    let general = ctx.general();
    let names = general.list().context("listing general notes")?;
    if names.is_empty() {
        eprintln!("No general notes in {:?}", ctx.layout.general_dir());
        return Ok(());
    }
    for name in names {
        let tags = general
            .tags(&name)
            .with_context(|| format!("reading tags of {name:?}"))?;
        if tags.is_empty() {
            println!("{name}");
        } else {
            let tags: Vec<&str> = tags.iter().map(String::as_str).collect();
            println!("{name} [{}]", tags.join(" "));
        }
    }
    Ok(())
}

fn handle_tags(ctx: &Session, args: TagsArgs) -> Result<()> {
    let general = ctx.general();
    match args.command {
        TagsCommand::Search { tag } => {
            let hits = general
                .search_by_tag(&tag)
                .with_context(|| format!("searching for tag {tag:?}"))?;
            if hits.is_empty() {
                eprintln!("No notes tagged {tag:?}");
            }
            for name in hits {
                println!("{name}");
            }
        }
        TagsCommand::Add { name, tags } => {
            let now = general
                .add_tags(&name, &tags)
                .with_context(|| format!("tagging {name:?}"))?;
            print_tags(&name, now.iter());
        }
        TagsCommand::Remove { name, tags } => {
            let now = general
                .remove_tags(&name, &tags)
                .with_context(|| format!("untagging {name:?}"))?;
            print_tags(&name, now.iter());
        }
    }
    Ok(())
}

fn print_tags<'a>(name: &str, tags: impl Iterator<Item = &'a String>) {
    let tags: Vec<&str> = tags.map(String::as_str).collect();
    println!("{name}: {}", tags.join(" "));
}

fn handle_cal(ctx: &Session, args: CalArgs) -> Result<()> {
    let (year, month) = match args.month {
        Some(raw) => parse_year_month(&raw)?,
        None => {
            let today = CalendarDate::today();
            (today.year(), today.month())
        }
    };
    let marked: BTreeSet<CalendarDate> = daily_dates(&FsStore, &ctx.layout)
        .context("listing daily notes")?
        .into_iter()
        .filter(|date| date.year() == year && date.month() == month)
        .collect();
    let grid = render_month(year, month, |date| marked.contains(&date))?;
    print!("{grid}");
    Ok(())
}

fn handle_summary(ctx: &Session, args: SummaryArgs) -> Result<()> {
    let summary = summarize(
        &FsStore,
        &ctx.layout,
        &ctx.config.sections,
        &ctx.config.format,
    )
    .context("summarizing note store")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Daily notes:   {}", summary.daily_notes);
    for (year, count) in &summary.per_year {
        println!("  {year}:        {count}");
    }
    println!("General notes: {}", summary.general_notes);
    if let (Some(first), Some(last)) = (summary.first_daily, summary.last_daily) {
        println!("First / last:  {first} / {last}");
    }
    println!("Open items:    {}", summary.open_items);
    Ok(())
}

fn handle_archive(ctx: &Session, args: ArchiveArgs) -> Result<()> {
    create_archive(&ctx.config.root, &args.output)
        .with_context(|| format!("archiving {:?}", ctx.config.root))?;
    println!("Wrote archive to {:?}", args.output);
    Ok(())
}
