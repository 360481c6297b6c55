//! kiln-cli - Command-line interface for the kiln installer
//!
//! This crate provides the `kiln` binary:
//! - Installing a downloaded package file into a fresh destination
//! - Reporting what kind of file a download turned out to be
//! - Showing and editing the user configuration

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use kiln_core::config::Config;
use kiln_core::{DestinationPlan, InstallOptions, InstallSession, Progress, ProgressReporter};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// kiln - install packages from archives of any format
///
/// The archive type is detected from its contents, never its name. The
/// destination only ever appears complete and read-only; a failed install
/// leaves nothing behind.
#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about = "Install packages from archives of any format", long_about = None)]
struct Cli {
    /// Enable verbose output for debugging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Show progress bar during operations
    #[arg(long, global = true)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install a package file into a new directory
    Install {
        /// Downloaded package file
        source: PathBuf,

        /// Destination directory; must not exist yet
        #[arg(short, long, required_unless_present = "plan")]
        dest: Option<PathBuf>,

        /// Install plan in TOML; flags given alongside override its fields
        #[arg(long)]
        plan: Option<PathBuf>,

        /// Remove the specified number of leading path elements
        #[arg(long)]
        strip: Option<usize>,

        /// Package root inside the destination that renames are relative to
        #[arg(long)]
        root: Option<PathBuf>,

        /// Move OLD to NEW after extraction (repeatable)
        #[arg(long, value_name = "OLD=NEW", value_parser = parse_rename)]
        rename: Vec<(PathBuf, PathBuf)>,

        /// Application bundle to copy out of a disk image (repeatable)
        #[arg(long = "app")]
        apps: Vec<PathBuf>,

        /// Name the file was published under; names raw executables
        #[arg(long)]
        source_name: Option<String>,
    },

    /// Report the detected type of a file
    Detect {
        /// File to inspect
        source: PathBuf,

        /// Output format as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show or edit configuration
    Config {
        /// Show current configuration
        #[arg(long, conflicts_with_all = ["edit", "path"])]
        show: bool,

        /// Edit configuration file
        #[arg(long, conflicts_with_all = ["show", "path"])]
        edit: bool,

        /// Show configuration file path
        #[arg(long, conflicts_with_all = ["show", "edit"])]
        path: bool,
    },
}

fn parse_rename(value: &str) -> std::result::Result<(PathBuf, PathBuf), String> {
    match value.split_once('=') {
        Some((from, to)) if !from.is_empty() && !to.is_empty() => {
            Ok((PathBuf::from(from), PathBuf::from(to)))
        }
        _ => Err(format!("expected OLD=NEW, got {:?}", value)),
    }
}

fn setup_logging(verbose: bool, quiet: bool, default_level: &str) {
    if quiet {
        return;
    }

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let result = run();

    match result {
        Ok(_) => process::exit(0),
        Err(e) => {
            eprintln!("Error: {:#}", e);

            let exit_code = map_error_to_exit_code(&e);
            process::exit(exit_code);
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load();
    let level = config
        .as_ref()
        .map(|config| config.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    setup_logging(cli.verbose, cli.quiet, &level);

    match cli.command {
        Commands::Install {
            source,
            dest,
            plan,
            strip,
            root,
            rename,
            apps,
            source_name,
        } => {
            let config = config?;

            let mut install_plan = match plan {
                Some(path) => DestinationPlan::load(&path)?,
                None => {
                    let dest = dest.clone().ok_or_else(|| anyhow!("--dest is required"))?;
                    DestinationPlan::new(dest)
                }
            };
            if let Some(dest) = dest {
                install_plan.dest = dest;
            }
            if let Some(strip) = strip {
                install_plan.strip = strip;
            }
            if let Some(root) = root {
                install_plan.root = Some(root);
            }
            install_plan.rename.extend(rename);
            install_plan.apps.extend(apps);
            if let Some(name) = source_name {
                install_plan.source = Some(name);
            }

            info!(
                "Installing {} into {}",
                source.display(),
                install_plan.dest.display()
            );

            let reporter: Arc<dyn Progress> = Arc::new(ProgressReporter::new(
                &format!("Installing {}", source.display()),
                cli.progress && !cli.quiet,
            ));
            InstallSession::new(&install_plan)
                .with_progress(reporter)
                .with_options(InstallOptions::from_config(&config))
                .install(&source)?;

            let entries = kiln_core::utils::count_entries(&install_plan.dest);
            let size = kiln_core::utils::calculate_path_size(&install_plan.dest);
            info!(
                "Installed {} entries ({} bytes) into {}",
                entries,
                size,
                install_plan.dest.display()
            );
        }

        Commands::Detect { source, json } => {
            let detected = kiln_core::detect(&source)?;

            if json {
                let output = serde_json::json!({
                    "path": detected.path(),
                    "content_type": detected.content_type().to_string(),
                    "compression": detected.compression().to_string(),
                    "size": detected.size(),
                    "extractor": kiln_core::extractor_for(detected.content_type())
                        .map(|extractor| extractor.format_name()),
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("{:<14} {}", "Path:", detected.path().display());
                println!("{:<14} {}", "Content type:", detected.content_type());
                println!("{:<14} {}", "Compression:", detected.compression());
                println!("{:<14} {}", "Size:", detected.size());
            }
        }

        Commands::Config { show, edit, path } => {
            if show {
                match config {
                    Ok(config) => {
                        let toml_str = toml::to_string_pretty(&config)?;
                        println!("{}", toml_str);
                    }
                    Err(e) => {
                        error!("Failed to load configuration: {}", e);
                        return Err(e.into());
                    }
                }
            } else if edit {
                let config_path = Config::config_path()
                    .map_err(|e| anyhow!("Failed to get config path: {}", e))?;

                if !config_path.exists() {
                    info!("Creating default configuration file...");
                    if let Some(parent) = config_path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&config_path, Config::default_config_content())?;
                }

                let editor = std::env::var("EDITOR").unwrap_or_else(|_| {
                    if cfg!(windows) {
                        "notepad".to_string()
                    } else {
                        "nano".to_string()
                    }
                });

                info!("Opening configuration file in {}", editor);
                process::Command::new(&editor)
                    .arg(&config_path)
                    .status()
                    .map_err(|e| anyhow!("Failed to open editor: {}", e))?;
            } else if path {
                let config_path = Config::config_path()
                    .map_err(|e| anyhow!("Failed to get config path: {}", e))?;
                println!("{}", config_path.display());
            } else {
                eprintln!("Please specify --show, --edit, or --path");
            }
        }
    }

    Ok(())
}

/// Map errors to exit codes:
/// - 0: Success
/// - 1: General error
/// - 2: IO error
/// - 3: Invalid arguments or unsupported input
/// - 4: Malformed archive
/// - 5: External installer failed
fn map_error_to_exit_code(err: &anyhow::Error) -> i32 {
    use kiln_core::Error;

    if let Some(kiln_err) = err.downcast_ref::<Error>() {
        match kiln_err {
            Error::Io(_) | Error::IoAt { .. } => 2,
            Error::DestinationExists(_) => 3,
            Error::UnsupportedOption(_) => 3,
            Error::UnsupportedFormat { .. } => 3,
            Error::UnsupportedOperation(_) => 3,
            Error::InvalidPath(_) => 4,
            Error::Sniff { .. } | Error::EmptyStream { .. } => 4,
            Error::Archive { .. } | Error::Zip(_) => 4,
            Error::NestingTooDeep { .. } => 4,
            Error::Command { .. } | Error::ToolNotFound(_) => 5,
            Error::Config(_) => 1,
        }
    } else if err.is::<std::io::Error>() {
        2
    } else {
        1
    }
}
