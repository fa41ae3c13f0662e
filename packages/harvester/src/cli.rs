//! Command-line interface for the harvester.

use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::cache::{CacheStore, FileCache, NoCache, TAG_ANNOTATIONS, TAG_PYBOSSA};
use crate::config::{
    HarvestConfig, ANNOTATION_SERVER_URL, CATALOGUE_COLLECTION, PLAYBILLS_COLLECTION,
    TASK_SERVER_URL,
};
use crate::error::{HarvesterError, Result};
use crate::harvester::Harvester;
use crate::http::HttpGet;
use crate::lookup::VolumeIndex;
use crate::output::{write_records, OutputFormat};
use crate::reconcile::{
    catalogue_candidates, control_number_index, performances_on, reconcile_performances,
    reconcile_sheets, title_index, transcriptions_by_tag, SheetPolicy, TitleIndexRow,
};
use crate::shelfmark::ShelfmarkIndex;

/// Default location of the on-disk harvest cache.
const DEFAULT_CACHE_DIR: &str = ".harvest-cache";

/// Annotation Harvester - Harvest and reconcile crowdsourced transcriptions.
#[derive(Parser)]
#[command(name = "annotation-harvester")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Base URL of the annotation server
    #[arg(long, global = true, env = "ANNOTATION_SERVER_URL", default_value = ANNOTATION_SERVER_URL)]
    pub annotation_server: String,

    /// Base URL of the task server
    #[arg(long, global = true, env = "TASK_SERVER_URL", default_value = TASK_SERVER_URL)]
    pub task_server: String,

    /// Directory of the harvest cache
    #[arg(long, global = true, env = "HARVEST_CACHE_DIR", default_value = DEFAULT_CACHE_DIR)]
    pub cache_dir: PathBuf,

    /// Always fetch from the servers
    #[arg(long, global = true)]
    pub no_cache: bool,

    /// Output file (default: stdout)
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Harvest and normalize the describing annotations of a collection.
    Annotations {
        /// Annotation collection id (e.g., playbills-results)
        collection: String,

        /// Output annotations exactly as served
        #[arg(long)]
        raw: bool,
    },

    /// Harvest every object of a task server domain type.
    Objects {
        /// Domain object name (e.g., task, project)
        object: String,
    },

    /// Reconcile one record per annotated sheet.
    Sheets {
        #[arg(long, default_value = PLAYBILLS_COLLECTION)]
        collection: String,

        /// YAML or JSON list of volume metadata
        #[arg(long)]
        volumes: Option<PathBuf>,

        /// Only keep sheets with a title and one full date
        #[arg(long)]
        catalogue: bool,
    },

    /// List the titles of each canvas.
    TitleIndex {
        #[arg(long, default_value = PLAYBILLS_COLLECTION)]
        collection: String,

        /// Keep every title instead of a one-line summary
        #[arg(long)]
        all_titles: bool,
    },

    /// Reconcile performances from playbill titles, dates and genres.
    Performances {
        #[arg(long, default_value = PLAYBILLS_COLLECTION)]
        collection: String,

        /// YAML or JSON list of volume metadata
        #[arg(long)]
        volumes: Option<PathBuf>,

        /// Only performances on this day of any year (MM-DD)
        #[arg(long, value_parser = parse_month_day)]
        on: Option<(u32, u32)>,
    },

    /// List catalogue cards whose records have not been created yet.
    Catalogue {
        #[arg(long, default_value = CATALOGUE_COLLECTION)]
        collection: String,

        /// File of already ingested shelfmarks, one per line
        #[arg(long)]
        ingested: Option<PathBuf>,
    },

    /// List control numbers with the shelfmark of their card.
    ControlNumbers {
        #[arg(long, default_value = CATALOGUE_COLLECTION)]
        collection: String,
    },

    /// Group transcriptions by tag.
    Transcriptions {
        #[arg(long, default_value = PLAYBILLS_COLLECTION)]
        collection: String,
    },

    /// Remove cached harvests.
    CacheClear {
        /// Only remove entries with this tag (annotations or pybossa)
        #[arg(long, value_parser = [TAG_ANNOTATIONS, TAG_PYBOSSA])]
        tag: Option<String>,
    },
}

/// Parse `MM-DD` into `(month, day)`.
fn parse_month_day(value: &str) -> std::result::Result<(u32, u32), String> {
    let invalid = || format!("expected MM-DD, got '{value}'");
    let (month, day) = value.split_once('-').ok_or_else(invalid)?;
    let month: u32 = month.parse().map_err(|_| invalid())?;
    let day: u32 = day.parse().map_err(|_| invalid())?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return Err(invalid());
    }
    Ok((month, day))
}

/// Run the CLI.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let cache = open_cache(&cli.global)?;

    let config = HarvestConfig {
        annotation_server: cli.global.annotation_server.clone(),
        task_server: cli.global.task_server.clone(),
        ..HarvestConfig::default()
    };
    let harvester =
        Harvester::connect(cache.as_ref(), config)?.with_progress(std::io::stderr().is_terminal());

    run_command(&harvester, &cli.command, &cli.global)
}

fn open_cache(global: &GlobalArgs) -> Result<Box<dyn CacheStore>> {
    if global.no_cache {
        return Ok(Box::new(NoCache));
    }
    Ok(Box::new(FileCache::open(&global.cache_dir)?))
}

fn run_command<H, C>(harvester: &Harvester<H, C>, command: &Commands, global: &GlobalArgs) -> Result<()>
where
    H: HttpGet,
    C: CacheStore,
{
    match command {
        Commands::Annotations { collection, raw } => {
            heading("Harvesting", collection);
            if *raw {
                emit(&harvester.raw_annotations(collection)?, global)
            } else {
                emit(&harvester.annotations(collection)?, global)
            }
        }
        Commands::Objects { object } => {
            heading("Harvesting", object);
            emit(&harvester.objects(object)?, global)
        }
        Commands::Sheets {
            collection,
            volumes,
            catalogue,
        } => {
            heading("Reconciling sheets of", collection);
            let volumes = load_volumes(volumes.as_deref())?;
            let annotations = harvester.annotations(collection)?;
            let policy = if *catalogue {
                SheetPolicy::catalogue()
            } else {
                SheetPolicy::default()
            };
            let records = with_spinner("Reconciling sheets...", || {
                reconcile_sheets(&annotations, &volumes, &policy)
            });
            emit(&records, global)
        }
        Commands::TitleIndex {
            collection,
            all_titles,
        } => {
            heading("Indexing titles of", collection);
            let index = title_index(&harvester.annotations(collection)?);
            if *all_titles {
                emit(&index, global)
            } else {
                let rows: Vec<TitleIndexRow> = index.iter().map(|entry| entry.to_row()).collect();
                emit(&rows, global)
            }
        }
        Commands::Performances {
            collection,
            volumes,
            on,
        } => {
            heading("Reconciling performances of", collection);
            let volumes = load_volumes(volumes.as_deref())?;
            let annotations = harvester.annotations(collection)?;
            let tasks = harvester.tasks()?;
            let records = with_spinner("Joining titles, dates and genres...", || {
                reconcile_performances(&annotations, &tasks, &volumes)
            });
            match on {
                Some((month, day)) => emit(&performances_on(&records, *month, *day), global),
                None => emit(&records, global),
            }
        }
        Commands::Catalogue {
            collection,
            ingested,
        } => {
            heading("Reconciling catalogue cards of", collection);
            // Read local inputs before any request is made.
            let ingested = load_ingested(ingested.as_deref())?;
            let annotations = harvester.annotations(collection)?;
            let tasks = harvester.tasks()?;
            let projects = harvester.projects()?;
            let records = catalogue_candidates(&annotations, &ingested, &tasks, &projects)?;
            emit(&records, global)
        }
        Commands::ControlNumbers { collection } => {
            heading("Indexing control numbers of", collection);
            emit(&control_number_index(&harvester.annotations(collection)?)?, global)
        }
        Commands::Transcriptions { collection } => {
            heading("Grouping transcriptions of", collection);
            emit(&transcriptions_by_tag(&harvester.annotations(collection)?), global)
        }
        Commands::CacheClear { tag } => cache_clear_command(harvester.cache(), tag.as_deref()),
    }
}

fn cache_clear_command(cache: &dyn CacheStore, tag: Option<&str>) -> Result<()> {
    let removed = match tag {
        Some(tag) => cache.evict_tag(tag)?,
        None => cache.clear()?,
    };
    eprintln!(
        "{} {} cached harvest(s)",
        style("Removed").green().bold(),
        style(removed).cyan()
    );
    Ok(())
}

/// Load volume metadata, or an empty index when no file is given.
fn load_volumes(path: Option<&Path>) -> Result<VolumeIndex> {
    match path {
        Some(path) => {
            ensure_file(path)?;
            VolumeIndex::from_file(path)
        }
        None => Ok(VolumeIndex::default()),
    }
}

/// Load ingested shelfmarks, one per line; blank lines are ignored.
fn load_ingested(path: Option<&Path>) -> Result<ShelfmarkIndex> {
    let Some(path) = path else {
        return Ok(ShelfmarkIndex::default());
    };
    ensure_file(path)?;
    let text = fs::read_to_string(path)?;
    let index = ShelfmarkIndex::new(text.lines().map(str::trim).filter(|line| !line.is_empty()));
    eprintln!("  Ingested shelfmarks: {}", style(index.len()).cyan());
    Ok(index)
}

fn ensure_file(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(HarvesterError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Input file does not exist: {}", path.display()),
        )));
    }
    Ok(())
}

fn heading(action: &str, subject: &str) {
    eprintln!("{} {}", style(action).bold(), style(subject).cyan());
}

fn with_spinner<T>(message: &'static str, work: impl FnOnce() -> T) -> T {
    let pb = ProgressBar::new_spinner();
    #[allow(clippy::expect_used)] // Static template string that is guaranteed to be valid
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .expect("valid template"),
    );
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(100));
    let result = work();
    pb.finish_and_clear();
    result
}

fn emit<T: Serialize + ?Sized>(records: &T, global: &GlobalArgs) -> Result<()> {
    if let Some(path) = write_records(records, global.format, global.output.as_deref())? {
        eprintln!(
            "{} {}",
            style("Saved to:").green().bold(),
            path.display()
        );
    }
    Ok(())
}
