use std::{
    fs::File,
    io::stdout,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use log::{error, info, warn};
use ratatui::{Terminal, backend::CrosstermBackend};
use simplelog::{Config, LevelFilter, WriteLogger};

use pageturn::{
    App, BookData, ReaderSession,
    event_source::KeyboardEventSource,
    flow::build_flow_parts,
    measure::WrapMeasure,
    metrics::{Insets, Viewport, compute_metrics},
    pagination::build_pagination,
    panic_handler,
    run_app_with_event_source,
    settings::{Settings, default_storage_path},
    state::LaunchOverrides,
    storage::{self, FileStorage, MemoryStorage},
    style::ReaderStyle,
    voice::{CommandSpeech, SilentSpeech},
};

#[derive(Parser)]
#[command(name = "pageturn")]
#[command(version, about = "Column-flow paginated reader", long_about = None)]
#[command(after_help = "EXAMPLES:
    pageturn book.json                      Resume where you left off
    pageturn book.json --chapter c2         Open a chapter
    pageturn book.json --query 'point=p7'   Open a point via a query string
    pageturn book.json --dump               Print page counts and exit")]
struct Cli {
    /// Book file (JSON tree or XHTML)
    #[arg(value_name = "BOOK")]
    book: PathBuf,

    #[arg(long)]
    chapter: Option<String>,

    #[arg(long)]
    section: Option<String>,

    #[arg(long)]
    point: Option<String>,

    /// Zero-based page within the chapter
    #[arg(long, alias = "chunk")]
    page: Option<usize>,

    /// Position as a query string, e.g. `chapter=c1&point=p3&page=2`
    #[arg(long)]
    query: Option<String>,

    /// Settings file (default: platform config dir)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Where reading progress and preferences are kept
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    #[arg(long, value_name = "FILE", default_value = "pageturn.log")]
    log_file: PathBuf,

    /// off, error, warn, info, debug or trace
    #[arg(long, value_parser = parse_level, default_value = "info")]
    log_level: LevelFilter,

    /// Print the pagination of every chapter and exit
    #[arg(long)]
    dump: bool,

    /// Viewport in px used by --dump
    #[arg(long, value_parser = parse_viewport, default_value = "1280x800")]
    viewport: Viewport,
}

fn parse_level(value: &str) -> Result<LevelFilter, String> {
    value
        .parse()
        .map_err(|_| format!("unknown log level: {value}"))
}

fn parse_viewport(value: &str) -> Result<Viewport, String> {
    let (w, h) = value
        .split_once('x')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {value}"))?;
    let width: f32 = w.trim().parse().map_err(|_| format!("bad width: {w}"))?;
    let height: f32 = h.trim().parse().map_err(|_| format!("bad height: {h}"))?;
    Ok(Viewport::new(width, height))
}

impl Cli {
    /// Query string first, explicit flags on top.
    fn overrides(&self) -> LaunchOverrides {
        let mut overrides = self
            .query
            .as_deref()
            .map(LaunchOverrides::from_query)
            .unwrap_or_default();
        if let Some(chapter) = &self.chapter {
            overrides.chapter = Some(chapter.clone());
        }
        if let Some(section) = &self.section {
            overrides.section = Some(section.clone());
        }
        if let Some(point) = &self.point {
            overrides.point = Some(point.clone());
        }
        if self.page.is_some() {
            overrides.page = self.page;
        }
        overrides
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    WriteLogger::init(
        cli.log_level,
        Config::default(),
        File::create(&cli.log_file)
            .with_context(|| format!("Failed to create log file {}", cli.log_file.display()))?,
    )?;
    info!("Starting pageturn");

    let settings = Settings::load(cli.config.as_deref());
    let book = BookData::load(&cli.book)?;

    if cli.dump {
        return dump(&book, &settings, &cli);
    }

    panic_handler::initialize_panic_handler();

    let mut builder = ReaderSession::builder(book)
        .config(settings.session_config())
        .overrides(cli.overrides())
        .measurer(WrapMeasure::cells(
            settings.terminal.cell_width_px,
            settings.terminal.cell_height_px,
        ));
    builder = match default_storage_path(cli.data_dir.as_deref()) {
        Some(path) => builder.storage(FileStorage::open(&path)),
        None => {
            warn!("No data directory available, progress will not be saved");
            builder.storage(MemoryStorage::new())
        }
    };
    builder = if settings.speech.enabled {
        builder.speech(CommandSpeech::new(
            settings.speech.program.clone(),
            settings.speech.args.clone(),
        ))
    } else {
        builder.speech(SilentSpeech)
    };
    let mut app = App::new(builder.build(), &settings.terminal);

    // Terminal initialization
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app_with_event_source(&mut terminal, &mut app, &mut KeyboardEventSource);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        error!("Application error: {err:?}");
        println!("{err:?}");
    }

    info!("Shutting down pageturn");
    Ok(())
}

/// Paginates every chapter with the proportional text model and prints one
/// line per page.
fn dump(book: &BookData, settings: &Settings, cli: &Cli) -> Result<()> {
    let style = saved_style(cli.data_dir.as_deref());
    let measurer = WrapMeasure::default();
    let metrics = compute_metrics(cli.viewport, Insets::default(), &style, &settings.layout)
        .context("Viewport too small for a column")?;

    println!(
        "column {:.0}x{:.0}px, gap {:.0}px, style {} {}px/{:.1}/{}",
        metrics.column_width,
        metrics.column_height,
        metrics.column_gap,
        style.font_id,
        style.font_size,
        style.line_height,
        style.font_weight
    );
    for chapter in &book.chapters {
        let parts = build_flow_parts(chapter);
        let pagination = build_pagination(
            &chapter.id,
            &parts,
            &metrics,
            &style,
            &measurer,
            &settings.pagination,
        )?;
        println!(
            "{} ({}): {} page(s)",
            chapter.id,
            chapter.title.as_deref().unwrap_or("untitled"),
            pagination.total_pages
        );
        for (page, anchor) in pagination.page_anchors.iter().enumerate() {
            match anchor {
                Some(anchor) => println!("  {page:>3}  {}/{}", anchor.section_id, anchor.point_id),
                None => println!("  {page:>3}  -"),
            }
        }
    }
    Ok(())
}

fn saved_style(data_dir: Option<&Path>) -> ReaderStyle {
    default_storage_path(data_dir)
        .map(|path| FileStorage::open(&path))
        .and_then(|storage| storage::load_preferences(&storage))
        .map(|prefs| prefs.style.clamped())
        .unwrap_or_default()
}
