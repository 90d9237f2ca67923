//! Filecat CLI - build and query a filesystem catalog

use clap::{Parser, Subcommand};
use filecat_core::{CatalogError, Config, FileMatch, Indexer, SqliteCatalog};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "filecat")]
#[command(about = "Incremental filesystem catalog", long_about = None)]
struct Cli {
    /// Catalog database file
    #[arg(long, global = true, env = "FILECAT_DB", default_value = "filecat.db")]
    db: PathBuf,

    /// Config file (defaults are used when it does not exist)
    #[arg(long, global = true, env = "FILECAT_CONFIG", default_value = "filecat.toml")]
    config: PathBuf,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log progress to stderr (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk a directory tree and bring the catalog up to date
    Index {
        /// Root directory to index
        root: PathBuf,

        /// Override the flush watermark in bytes
        #[arg(long)]
        watermark: Option<usize>,
    },

    /// Look up files by name
    Find {
        /// Exact file name, or a glob pattern with --pattern
        name: String,

        /// Treat NAME as a glob pattern (*, ?, [...])
        #[arg(short, long)]
        pattern: bool,

        /// Override default result limit
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show catalog stats
    Status,

    /// Write the default config file
    InitConfig,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match &cli.command {
        Commands::Index { root, watermark } => {
            cmd_index(&cli.db, &cli.config, root, *watermark, cli.json)
        }
        Commands::Find {
            name,
            pattern,
            limit,
        } => cmd_find(&cli.db, &cli.config, name, *pattern, *limit, cli.json),
        Commands::Status => cmd_status(&cli.db, cli.json),
        Commands::InitConfig => cmd_init_config(&cli.config),
    };

    if let Err(e) = result {
        if cli.json {
            let error_json = serde_json::json!({ "error": e.to_string() });
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&error_json).unwrap_or_else(|_| e.to_string())
            );
        } else {
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_index(
    db: &Path,
    config_path: &Path,
    root: &Path,
    watermark: Option<usize>,
    json: bool,
) -> filecat_core::Result<()> {
    use colored::Colorize;

    let mut config = Config::load_or_default(config_path)?;
    if let Some(bytes) = watermark {
        config = config.with_watermark(bytes);
    }

    let catalog = SqliteCatalog::open(db)?;
    let mut indexer = Indexer::new(catalog, config);
    let stats = indexer.index(root)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!(
        "{}: {} directories, {} files",
        "Indexed".green(),
        stats.directories_seen,
        stats.files_seen
    );
    println!(
        "{}: {} directories, {} files",
        "Removed".yellow(),
        stats.directories_deleted,
        stats.files_deleted
    );
    if stats.entries_skipped > 0 || stats.files_dropped > 0 {
        println!(
            "{}: {} unreadable entries, {} files without parent",
            "Skipped".yellow(),
            stats.entries_skipped,
            stats.files_dropped
        );
    }
    println!(
        "{}: {} flushes ({} retried), peak staged {:.1} MB, {} ms",
        "Writes".blue(),
        stats.flushes,
        stats.flush_retries,
        stats.peak_staged_bytes as f64 / 1_000_000.0,
        stats.elapsed_ms
    );
    Ok(())
}

fn cmd_find(
    db: &Path,
    config_path: &Path,
    name: &str,
    pattern: bool,
    limit: Option<usize>,
    json: bool,
) -> filecat_core::Result<()> {
    let config = Config::load_or_default(config_path)?;
    let limit = limit.unwrap_or(config.query.default_limit);
    let catalog = open_existing(db)?;

    let matches = if pattern {
        catalog.find_matching(name, limit)?
    } else {
        catalog.find_by_name(name, limit)?
    };

    print_matches(&matches, json)
}

fn print_matches(matches: &[FileMatch], json: bool) -> filecat_core::Result<()> {
    use colored::Colorize;

    if json {
        println!("{}", serde_json::to_string_pretty(matches)?);
        return Ok(());
    }

    if matches.is_empty() {
        println!("{}", "No matches".yellow());
        return Ok(());
    }

    for m in matches {
        println!("{}", m.path);
    }
    Ok(())
}

fn cmd_status(db: &Path, json: bool) -> filecat_core::Result<()> {
    use colored::Colorize;

    let catalog = open_existing(db)?;
    let status = catalog.status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}: {}", "Directories".blue(), status.directories);
    println!("{}: {}", "Files".blue(), status.files);
    println!(
        "{}: {}",
        "Name index".blue(),
        if status.name_index { "present" } else { "missing" }
    );
    println!(
        "{}: {} (v{}, {:.1} MB)",
        "Catalog".blue(),
        db.display(),
        status.schema_version,
        status.size_bytes as f64 / 1_000_000.0
    );
    Ok(())
}

fn cmd_init_config(config_path: &Path) -> filecat_core::Result<()> {
    use colored::Colorize;

    Config::write_default(config_path)?;
    println!("{} {}", "Created".green(), config_path.display());
    Ok(())
}

/// Queries never create a catalog as a side effect
fn open_existing(db: &Path) -> filecat_core::Result<SqliteCatalog> {
    if !db.exists() {
        return Err(CatalogError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("no catalog at {} (run 'filecat index' first)", db.display()),
        )));
    }
    SqliteCatalog::open(db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cli_parses_index_with_globals() {
        let cli = Cli::try_parse_from([
            "filecat",
            "--db",
            "/tmp/cat.db",
            "index",
            "/data",
            "--watermark",
            "1024",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.db, PathBuf::from("/tmp/cat.db"));
        assert!(cli.json);
        match cli.command {
            Commands::Index { root, watermark } => {
                assert_eq!(root, PathBuf::from("/data"));
                assert_eq!(watermark, Some(1024));
            }
            _ => panic!("expected index command"),
        }
    }

    #[test]
    fn test_cli_parses_find_pattern() {
        let cli = Cli::try_parse_from(["filecat", "find", "*.rs", "--pattern", "--limit", "5"])
            .unwrap();
        match cli.command {
            Commands::Find {
                name,
                pattern,
                limit,
            } => {
                assert_eq!(name, "*.rs");
                assert!(pattern);
                assert_eq!(limit, Some(5));
            }
            _ => panic!("expected find command"),
        }
    }

    #[test]
    fn test_open_existing_requires_catalog() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("missing.db");

        assert!(open_existing(&db).is_err());
        // The failed open must not leave an empty catalog behind
        assert!(!db.exists());

        SqliteCatalog::open(&db).unwrap();
        assert!(open_existing(&db).is_ok());
    }
}
