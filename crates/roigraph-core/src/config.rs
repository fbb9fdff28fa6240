//! Output directory configuration for roigraph binaries.
//!
//! Checkpoints and run artifacts go to one output directory, resolved in
//! priority order:
//! 1. CLI arguments (`--output-dir`, then `--base-dir`)
//! 2. Environment variables (`ROIGRAPH_OUTPUT_DIR`, `ROIGRAPH_BASE_DIR`)
//! 3. Config file (`~/.config/roigraph/config.toml`)
//! 4. Default system directories
//!
//! # Example
//!
//! ```ignore
//! #[derive(Parser)]
//! struct Args {
//!     #[command(flatten)]
//!     paths: PathArgs,
//! }
//!
//! let paths = PathConfig::from_path_args(args.paths);
//! paths.ensure_dirs()?;
//! let checkpoint = paths.output_dir().join("model.safetensors");
//! ```

use clap::Parser;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// CLI arguments for path configuration
#[derive(Parser, Debug, Clone, Default)]
#[command(author, version, about = "roigraph path configuration")]
pub struct PathArgs {
    /// Output directory for checkpoints
    #[arg(long, env = "ROIGRAPH_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Base directory for all roigraph files (outputs go to `<base>/output`)
    #[arg(long, env = "ROIGRAPH_BASE_DIR")]
    pub base_dir: Option<PathBuf>,

    /// Path to config file
    #[arg(long, env = "ROIGRAPH_CONFIG_FILE")]
    pub config_file: Option<PathBuf>,
}

/// Path configuration from config file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PathConfigFile {
    pub output_dir: Option<PathBuf>,
    /// Base directory (used when `output_dir` is not set)
    pub base_dir: Option<PathBuf>,
}

/// Resolved directories.
#[derive(Debug, Clone)]
pub struct PathConfig {
    output_dir: PathBuf,
}

impl PathConfig {
    /// Create configuration from [`PathArgs`].
    ///
    /// Use this when [`PathArgs`] is flattened into a binary's own parser.
    pub fn from_path_args(args: PathArgs) -> Self {
        let file_config = Self::load_config_file(args.config_file.as_deref());

        let output_dir = args
            .output_dir
            .or_else(|| args.base_dir.map(|b| b.join("output")))
            .or(file_config.output_dir)
            .or_else(|| file_config.base_dir.map(|b| b.join("output")))
            .unwrap_or_else(Self::default_output_dir);

        PathConfig { output_dir }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Ensure the output directory exists, creating it if necessary
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.output_dir)
    }

    /// Log configuration summary
    pub fn log_summary(&self) {
        log::info!("roigraph output: {:?}", self.output_dir);
    }

    fn default_output_dir() -> PathBuf {
        match ProjectDirs::from("", "", "roigraph") {
            Some(proj_dirs) => proj_dirs.data_dir().join("output"),
            None => env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join("output"),
        }
    }

    fn load_config_file(path: Option<&Path>) -> PathConfigFile {
        let config_path = path.map(PathBuf::from).or_else(|| {
            ProjectDirs::from("", "", "roigraph").map(|dirs| dirs.config_dir().join("config.toml"))
        });

        if let Some(path) = config_path {
            if path.exists() {
                match fs::read_to_string(&path).map(|s| toml::from_str::<PathConfigFile>(&s)) {
                    Ok(Ok(config)) => return config,
                    Ok(Err(e)) => log::warn!("ignoring malformed config {:?}: {}", path, e),
                    Err(e) => log::warn!("cannot read config {:?}: {}", path, e),
                }
            }
        }

        PathConfigFile::default()
    }
}
