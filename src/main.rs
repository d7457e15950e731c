use std::io;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand};
use sqlx::SqlitePool;

use icd10_import_lib::config::{self, DEFAULT_PROGRESS_INTERVAL};
use icd10_import_lib::importer::cleanup_logs;
use icd10_import_lib::store::{self, VersionStats};
use icd10_import_lib::{
    db, find_xml_files, import, read_source, validate_xml_file, AppError, AppResult,
    CodingSystemVersion, DocumentKind, IcdDocument, ImportCounts, ImportError, ImportLogger,
    ImportOptions, ImportSummary, Interrupt, ProgressPrinter, StoreConfig,
};

const EXIT_INTERRUPTED: i32 = 130;

#[derive(Debug, Parser)]
#[command(
    name = "icd10-import",
    about = "Import ICD-10 diagnosis codes from XML into the HIS diagnosis store",
    version
)]
struct Cli {
    /// Diagnosis store path (defaults to $ICD10_IMPORT_DB or the platform data dir)
    #[arg(long, value_name = "PATH", global = true)]
    db: Option<PathBuf>,

    /// Also write logs and per-run import logs under this directory
    #[arg(long, value_name = "DIR", global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Import diagnosis codes from an ICD-10 XML file or directory.
    Import(ImportArgs),
    /// Check that a file is a recognised ICD-10 XML document.
    Validate {
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
    /// List ICD-10 XML files found under a directory.
    Scan {
        #[arg(value_name = "DIR")]
        dir: PathBuf,
        /// Emit JSON instead of the table view.
        #[arg(long)]
        json: bool,
    },
    /// Show record counts per coding system version.
    Stats {
        /// Emit JSON instead of the table view.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Args)]
struct ImportArgs {
    /// XML file, or a directory when --dir is given
    #[arg(value_name = "PATH")]
    path: PathBuf,

    /// Treat PATH as a directory and import every ICD-10 XML file below it
    #[arg(long)]
    dir: bool,

    /// Run the import and roll it back instead of committing
    #[arg(long)]
    dry_run: bool,

    /// Coding system version tag written on every record
    #[arg(long, value_name = "VERSION", default_value = "icd10")]
    coding_version: CodingSystemVersion,

    /// Print a progress line every N created or updated records
    #[arg(
        long,
        value_name = "N",
        default_value_t = DEFAULT_PROGRESS_INTERVAL,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    progress_every: u64,

    /// Write a JSON report per imported file into this directory
    #[arg(long, value_name = "DIR")]
    report_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let guard = match icd10_import_lib::logging::init(cli.log_dir.as_deref()) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    };

    let code = match handle_cli(cli).await {
        Ok(code) => code,
        Err(err) if err.is_interrupted() => {
            err.log_with_event("import_interrupted");
            eprintln!("Import interrupted by user; the current file was rolled back.");
            EXIT_INTERRUPTED
        }
        Err(err) => {
            err.log_with_event("cli_failed");
            eprintln!("Error: {err}");
            1
        }
    };
    drop(guard);
    process::exit(code);
}

async fn handle_cli(cli: Cli) -> AppResult<i32> {
    match cli.command {
        Command::Import(args) => {
            let store_cfg = StoreConfig::resolve(cli.db)?;
            handle_import(&store_cfg, cli.log_dir.as_deref(), args).await
        }
        Command::Validate { path } => {
            let kind = validate_xml_file(&path)?;
            println!("{}: valid ICD-10 XML ({})", path.display(), kind.as_str());
            Ok(0)
        }
        Command::Scan { dir, json } => {
            let found = find_xml_files(&dir);
            if json {
                println!("{}", serde_json::to_string_pretty(&found)?);
            } else if found.is_empty() {
                println!("No ICD-10 XML files found under {}", dir.display());
            } else {
                for file in &found {
                    println!("{:<18}  {}", file.kind.as_str(), file.path.display());
                }
            }
            Ok(0)
        }
        Command::Stats { json } => {
            let store_cfg = StoreConfig::resolve(cli.db)?;
            let pool = db::open_pool(&store_cfg).await?;
            let stats = store::stats(&pool).await;
            pool.close().await;
            print_stats(&stats?, json)?;
            Ok(0)
        }
    }
}

fn print_stats(stats: &[VersionStats], json: bool) -> AppResult<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(stats)?);
        return Ok(());
    }
    if stats.is_empty() {
        println!("No diagnosis records.");
        return Ok(());
    }
    println!("{:<8}  {:>8}  {:>8}", "VERSION", "TOTAL", "ACTIVE");
    for row in stats {
        println!("{:<8}  {:>8}  {:>8}", row.version, row.total, row.active);
    }
    Ok(())
}

async fn handle_import(
    store_cfg: &StoreConfig,
    log_dir: Option<&Path>,
    args: ImportArgs,
) -> AppResult<i32> {
    let interrupt = Interrupt::ctrl_c();
    let files: Vec<PathBuf> = if args.dir {
        let found = find_xml_files(&args.path);
        if found.is_empty() {
            return Err(
                AppError::new("IMPORT/NO_FILES", "No ICD-10 XML files found")
                    .with_context("path", args.path.display().to_string()),
            );
        }
        found.into_iter().map(|f| f.path).collect()
    } else {
        vec![args.path.clone()]
    };

    let options = ImportOptions {
        version: args.coding_version,
        progress_interval: args.progress_every,
        dry_run: args.dry_run,
    };

    println!("Import Configuration:");
    println!("  Database: {}", store_cfg.db_path.display());
    println!("  XML Path: {}", args.path.display());
    println!("  Version:  {}", options.version);
    if options.dry_run {
        println!("  Dry run:  changes will be rolled back");
    }

    let pool = db::open_pool(store_cfg).await?;
    let mut totals = ImportCounts::default();
    for path in &files {
        if interrupt.is_raised() {
            pool.close().await;
            return Err(ImportError::Interrupted.into());
        }
        let result = import_file(
            &pool,
            path,
            &options,
            log_dir,
            args.report_dir.as_deref(),
            &interrupt,
        )
        .await;
        match result {
            Ok(summary) => {
                totals.created += summary.counts.created;
                totals.updated += summary.counts.updated;
                totals.skipped += summary.counts.skipped;
            }
            Err(err) => {
                pool.close().await;
                return Err(err.with_context("file", path.display().to_string()));
            }
        }
    }
    pool.close().await;

    if files.len() > 1 {
        println!(
            "All files: {} created, {} updated, {} skipped",
            totals.created, totals.updated, totals.skipped
        );
    }
    Ok(0)
}

async fn import_file(
    pool: &SqlitePool,
    path: &Path,
    options: &ImportOptions,
    log_dir: Option<&Path>,
    report_dir: Option<&Path>,
    interrupt: &Interrupt,
) -> AppResult<ImportSummary> {
    let text = read_source(path)?;
    let document = IcdDocument::parse(&text)?;
    if document.kind() == DocumentKind::Generic && !document.has_chapters() {
        tracing::warn!(
            target: "icd10_import",
            event = "no_chapters",
            path = %path.display(),
            root = %document.root_tag()
        );
    }

    let imports_dir = log_dir.map(|dir| dir.join("imports"));
    let mut logger = match &imports_dir {
        Some(dir) => Some(ImportLogger::new(dir)?.0),
        None => None,
    };
    if let Some(logger) = logger.as_mut() {
        logger.start(path, options);
    }

    println!("Starting ICD-10 import of {}...", path.display());
    let mut observer = (ProgressPrinter::new(io::stdout()), logger);
    let result =
        import::run_import(pool, &document, options, &mut observer, interrupt.raised()).await;
    let (_, mut logger) = observer;

    let outcome = match result {
        Ok(summary) => {
            if let Some(logger) = logger.as_mut() {
                logger.done(&summary);
            }
            let counts = summary.counts;
            println!(
                "Import completed: {} created, {} updated",
                counts.created, counts.updated
            );
            if counts.skipped > 0 {
                println!("  Skipped {} incomplete entries", counts.skipped);
            }
            if summary.dry_run {
                println!("  Dry run: all changes rolled back");
            }
            if let Some(dir) = report_dir {
                let report = import::write_import_report(dir, path, &summary)?;
                println!("  Report: {}", report.display());
            }
            Ok(summary)
        }
        Err(err) => {
            if let Some(logger) = logger.as_mut() {
                logger.error(&err);
            }
            Err(AppError::from(err))
        }
    };

    drop(logger);
    if let Some(dir) = &imports_dir {
        cleanup_logs(dir, config::log_retention());
    }
    outcome
}
