mod directory;
mod logger;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use directory::{DirectoryProvider, DirectoryRasterizer};
use log::LevelFilter;
use logger::ConsoleLogger;
use press_compile::merge::{BookMetadata, load_fragments, merge_book_async, save_book};
use press_compile::{
    ArtifactStore, CompileConfig, CompileRequest, FsJobRepository, FsObjectStore, JobId,
    JobRepository, Orchestrator, PageId, TokenIssuer, UrlSigner,
};
use press_layout::constants::px_to_in;
use press_layout::{CoverBinding, CoverOptions, PaperGrade, TrimSize, calculate_cover};
use press_runtime::{CompileUpdate, spawn_worker};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const CONFIG_FILE: &str = "config.json";
const LOG_HISTORY: usize = 200;
const ERROR_LOG: &str = "last-error.log";

#[derive(Parser)]
#[command(name = "pressctl", about = "Print-ready book compiler", version)]
struct Cli {
    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Pipeline config file (JSON); defaults to <state-dir>/config.json
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding artifacts and job records
    #[arg(long, global = true, default_value = ".press")]
    state_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show page geometry for a trim size
    Layout {
        #[arg(long, default_value = "8x8", value_enum)]
        trim: TrimArg,

        /// Number of pages in the book
        #[arg(long, default_value = "20")]
        pages: usize,

        /// Lay out without bleed
        #[arg(long)]
        no_bleed: bool,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show cover spread geometry
    Cover {
        #[arg(long, default_value = "8x8", value_enum)]
        trim: TrimArg,

        #[arg(long, default_value = "20")]
        pages: usize,

        #[arg(long, default_value = "softcover", value_enum)]
        binding: BindingArg,

        #[arg(long, default_value = "standard", value_enum)]
        paper: PaperArg,

        #[arg(long)]
        json: bool,
    },

    /// Merge page PDFs into one book, padding to an even page count
    Merge {
        /// Input PDF files, in book order
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        /// Output PDF file
        #[arg(short, long)]
        output: PathBuf,

        #[arg(long, default_value = "8x8", value_enum)]
        trim: TrimArg,

        #[arg(long, default_value = "Untitled")]
        title: String,

        #[arg(long, default_value = "")]
        owner: String,
    },

    /// Compile a collection of pre-rendered pages
    Compile {
        /// Collection id
        collection: String,

        /// Directory with one <page-id>.pdf per page
        #[arg(long)]
        pages_dir: PathBuf,

        #[arg(long, default_value = "8x8", value_enum)]
        trim: TrimArg,

        /// Page ids in book order; defaults to every page in the directory
        #[arg(long = "page")]
        pages: Vec<String>,

        /// Owner name for the book metadata
        #[arg(long)]
        owner: Option<String>,

        /// Ignore a previously compiled identical book
        #[arg(long)]
        force: bool,

        /// Proceed despite critical pre-flight violations
        #[arg(long)]
        acknowledge_warnings: bool,
    },

    /// Continue an interrupted job
    Resume {
        job_id: JobId,

        #[arg(long)]
        pages_dir: PathBuf,
    },

    /// Print a job record
    Status { job_id: JobId },

    /// Issue a signed URL for a stored artifact
    SignUrl {
        /// Object key; use --job to sign a job's book instead
        key: Option<String>,

        #[arg(long, conflicts_with = "key")]
        job: Option<JobId>,

        /// Use the long fulfillment TTL instead of the download TTL
        #[arg(long)]
        fulfillment: bool,

        /// Explicit TTL in seconds
        #[arg(long)]
        ttl_secs: Option<u64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum TrimArg {
    #[value(name = "8x8")]
    Square8,
    #[value(name = "10x10")]
    Square10,
    #[value(name = "12x12")]
    Square12,
    #[value(name = "8.5x11")]
    LetterPortrait,
    #[value(name = "11x8.5")]
    LetterLandscape,
}

#[derive(Clone, Copy, ValueEnum)]
enum BindingArg {
    Softcover,
    Hardcover,
}

#[derive(Clone, Copy, ValueEnum)]
enum PaperArg {
    Standard,
    Premium,
    Lustre,
}

impl From<TrimArg> for TrimSize {
    fn from(arg: TrimArg) -> Self {
        match arg {
            TrimArg::Square8 => Self::Square8,
            TrimArg::Square10 => Self::Square10,
            TrimArg::Square12 => Self::Square12,
            TrimArg::LetterPortrait => Self::LetterPortrait,
            TrimArg::LetterLandscape => Self::LetterLandscape,
        }
    }
}

impl From<BindingArg> for CoverBinding {
    fn from(arg: BindingArg) -> Self {
        match arg {
            BindingArg::Softcover => Self::Softcover,
            BindingArg::Hardcover => Self::Hardcover,
        }
    }
}

impl From<PaperArg> for PaperGrade {
    fn from(arg: PaperArg) -> Self {
        match arg {
            PaperArg::Standard => Self::Standard,
            PaperArg::Premium => Self::Premium,
            PaperArg::Lustre => Self::Lustre,
        }
    }
}

/// Explicit config file, else the state directory's, else fresh defaults
/// saved there so signing secrets stay stable between runs
async fn load_config(explicit: Option<&Path>, state_dir: &Path) -> Result<CompileConfig> {
    if let Some(path) = explicit {
        return CompileConfig::load(path)
            .await
            .with_context(|| format!("loading config {}", path.display()));
    }

    let path = state_dir.join(CONFIG_FILE);
    if tokio::fs::try_exists(&path).await? {
        return Ok(CompileConfig::load(&path).await?);
    }

    let config = CompileConfig::default();
    tokio::fs::create_dir_all(state_dir).await?;
    config.save(&path).await?;
    log::info!("Wrote default config to {}", path.display());
    Ok(config)
}

fn object_store(config: &CompileConfig, state_dir: &Path) -> FsObjectStore {
    let signer = UrlSigner::new(&config.public_base_url, &config.signing_secret);
    FsObjectStore::new(state_dir.join("store"), signer)
}

fn job_repository(state_dir: &Path) -> FsJobRepository {
    FsJobRepository::new(state_dir.join("jobs"))
}

fn orchestrator(
    config: CompileConfig,
    state_dir: &Path,
    pages_dir: &Path,
    owner: Option<String>,
) -> Result<Orchestrator> {
    let tokens = TokenIssuer::new(&config.signing_secret, config.capability_token_ttl());
    let store = object_store(&config, state_dir);
    Ok(Orchestrator::new(
        config,
        Arc::new(store),
        Arc::new(job_repository(state_dir)),
        Arc::new(DirectoryProvider::new(pages_dir, owner)),
        Arc::new(DirectoryRasterizer::new(pages_dir, tokens)),
    )?)
}

/// Run a job on the background worker, printing updates until it settles
async fn follow(orchestrator: Orchestrator, first: press_runtime::CompileCommand) -> Result<()> {
    let (handle, mut updates, task) = spawn_worker(Arc::new(orchestrator));
    handle.send(first)?;

    let mut outcome = Ok(());
    while let Some(update) = updates.recv().await {
        match &update {
            CompileUpdate::Accepted {
                job_id,
                estimated_minutes,
            } => println!("Job {job_id} accepted (about {estimated_minutes} min)"),
            CompileUpdate::Cached {
                job_id,
                download_url,
            } => println!("Unchanged since job {job_id}\n{download_url}"),
            CompileUpdate::Progress {
                pages_rendered,
                total_pages,
                ..
            } => println!("  rendered {pages_rendered}/{total_pages} pages"),
            CompileUpdate::Completed {
                job_id,
                download_url,
                page_count,
            } => println!("Job {job_id} complete: {page_count} pages\n{download_url}"),
            CompileUpdate::Failed {
                job_id,
                page_id,
                message,
            } => {
                outcome = Err(match page_id {
                    Some(page_id) => {
                        anyhow::anyhow!("job {job_id} failed on page {page_id}: {message}")
                    }
                    None => anyhow::anyhow!("job {job_id} failed: {message}"),
                });
            }
            CompileUpdate::Error { message, .. } => {
                outcome = Err(anyhow::anyhow!("{message}"));
            }
        }
        if update.is_final() || matches!(update, CompileUpdate::Error { .. }) {
            break;
        }
    }

    handle.shutdown()?;
    task.await?;
    outcome
}

/// Keep the log leading up to a failure next to the job state
async fn save_history(logger: &ConsoleLogger, state_dir: &Path) {
    if !tokio::fs::try_exists(state_dir).await.unwrap_or(false) {
        return;
    }
    let path = state_dir.join(ERROR_LOG);
    match tokio::fs::write(&path, logger.history()).await {
        Ok(()) => eprintln!("Log of this run saved to {}", path.display()),
        Err(e) => eprintln!("Could not save log to {}: {e}", path.display()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let logger = ConsoleLogger::new(LOG_HISTORY, level);
    logger.init()?;

    let state_dir = cli.state_dir.clone();
    let result = run(cli).await;
    if result.is_err() {
        save_history(&logger, &state_dir).await;
    }
    result
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Layout {
            trim,
            pages,
            no_bleed,
            json,
        } => {
            let layout = TrimSize::from(trim).layout(!no_bleed, pages);
            if json {
                println!("{}", serde_json::to_string_pretty(&layout)?);
                return Ok(());
            }
            println!("Layout {} ({} pages):", layout.trim_size, pages);
            println!(
                "  Viewport: {}x{} pt",
                layout.viewport.width, layout.viewport.height
            );
            println!(
                "  Output: {}x{} px @ 300 dpi",
                layout.output_pixels.width, layout.output_pixels.height
            );
            println!(
                "  Trim box: ({}, {}) {}x{}",
                layout.trim_box.x,
                layout.trim_box.y,
                layout.trim_box.width,
                layout.trim_box.height
            );
            println!(
                "  Safety box: ({}, {}) {}x{}",
                layout.safety_box.x,
                layout.safety_box.y,
                layout.safety_box.width,
                layout.safety_box.height
            );
            println!(
                "  Live area: {:.3}x{:.3} in",
                px_to_in(layout.safety_box.width),
                px_to_in(layout.safety_box.height)
            );
            println!("  Gutter: {} px", layout.gutter_px);
            println!("  Scale factor: {:.4}", layout.scale_factor);
        }

        Commands::Cover {
            trim,
            pages,
            binding,
            paper,
            json,
        } => {
            let options = CoverOptions {
                binding: binding.into(),
                paper: paper.into(),
            };
            let cover = calculate_cover(trim.into(), pages, options);
            if json {
                println!("{}", serde_json::to_string_pretty(&cover)?);
                return Ok(());
            }
            println!("Cover spread {} ({} pages):", cover.trim_size, pages);
            println!(
                "  Size: {:.3}x{:.3} in, {}x{} px",
                cover.total_width_in,
                cover.total_height_in,
                cover.output_pixels.width,
                cover.output_pixels.height
            );
            println!("  Spine: {:.3} in at x={} px", cover.spine_width_in, cover.spine.x);
            println!(
                "  Back panel: ({}, {}) {}x{}",
                cover.back_panel.x,
                cover.back_panel.y,
                cover.back_panel.width,
                cover.back_panel.height
            );
            println!(
                "  Front panel: ({}, {}) {}x{}",
                cover.front_panel.x,
                cover.front_panel.y,
                cover.front_panel.width,
                cover.front_panel.height
            );
        }

        Commands::Merge {
            input,
            output,
            trim,
            title,
            owner,
        } => {
            let fragments = load_fragments(&input).await?;
            let metadata = BookMetadata {
                title,
                owner_name: owner,
                job_id: String::new(),
                trim_size: trim.into(),
                page_ids: input
                    .iter()
                    .filter_map(|p| p.file_stem().and_then(|s| s.to_str()))
                    .map(PageId::new)
                    .collect(),
                created_at: Utc::now(),
            };
            let book = merge_book_async(fragments, metadata).await?;
            save_book(&book.bytes, &output).await?;
            println!(
                "Merged {} pages{} → {}",
                book.content_pages,
                if book.blank_added { " (+1 blank)" } else { "" },
                output.display()
            );
        }

        Commands::Compile {
            collection,
            pages_dir,
            trim,
            pages,
            owner,
            force,
            acknowledge_warnings,
        } => {
            let config = load_config(cli.config.as_deref(), &cli.state_dir).await?;
            let orchestrator = orchestrator(config, &cli.state_dir, &pages_dir, owner)?;
            let request = CompileRequest {
                page_ids: (!pages.is_empty()).then_some(pages),
                force_recompile: force,
                acknowledge_warnings,
                ..CompileRequest::new(collection, TrimSize::from(trim).key())
            };
            follow(orchestrator, press_runtime::CompileCommand::Request(request)).await?;
        }

        Commands::Resume { job_id, pages_dir } => {
            let config = load_config(cli.config.as_deref(), &cli.state_dir).await?;
            let orchestrator = orchestrator(config, &cli.state_dir, &pages_dir, None)?;
            follow(orchestrator, press_runtime::CompileCommand::Resume { job_id }).await?;
        }

        Commands::Status { job_id } => {
            let Some(job) = job_repository(&cli.state_dir).get(&job_id).await? else {
                bail!("job {job_id} not found");
            };
            println!("{}", serde_json::to_string_pretty(&job)?);
        }

        Commands::SignUrl {
            key,
            job,
            fulfillment,
            ttl_secs,
        } => {
            let config = load_config(cli.config.as_deref(), &cli.state_dir).await?;
            let key = match (key, job) {
                (Some(key), _) => key,
                (None, Some(job_id)) => {
                    let Some(job) = job_repository(&cli.state_dir).get(&job_id).await? else {
                        bail!("job {job_id} not found");
                    };
                    job.storage_key()
                }
                (None, None) => bail!("give an object key or --job"),
            };
            let ttl = match (ttl_secs, fulfillment) {
                (Some(secs), _) => Duration::from_secs(secs),
                (None, true) => config.fulfillment_url_ttl(),
                (None, false) => config.download_url_ttl(),
            };
            let store = ArtifactStore::new(Arc::new(object_store(&config, &cli.state_dir)));
            println!("{}", store.signed_url(&key, ttl).await?);
        }
    }

    Ok(())
}
