//! Initialization helpers for `.conductor/` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{ConductorConfig, write_config};

const CONDUCTOR_GITIGNORE: &str = "runs/\nmetrics.jsonl\n";

/// Canonical paths within `.conductor/` for a project root.
#[derive(Debug, Clone)]
pub struct ConductorPaths {
    pub root: PathBuf,
    pub conductor_dir: PathBuf,
    pub config_path: PathBuf,
    pub gitignore_path: PathBuf,
}

impl ConductorPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let conductor_dir = root.join(".conductor");
        Self {
            root,
            config_path: conductor_dir.join("config.toml"),
            gitignore_path: conductor_dir.join(".gitignore"),
            conductor_dir,
        }
    }
}

/// Options for `init_conductor`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite an existing config.
    pub force: bool,
}

/// Write the default config and `.gitignore` under `root/.conductor/`.
///
/// Fails if a config already exists unless `options.force` is set.
pub fn init_conductor(root: &Path, options: &InitOptions) -> Result<ConductorPaths> {
    let paths = ConductorPaths::new(root);
    if paths.conductor_dir.exists() && !paths.conductor_dir.is_dir() {
        return Err(anyhow!(
            "conductor init: .conductor exists but is not a directory"
        ));
    }
    if paths.config_path.exists() && !options.force {
        return Err(anyhow!(
            "conductor init: .conductor/config.toml already exists (use --force to overwrite)"
        ));
    }

    fs::create_dir_all(&paths.conductor_dir)
        .with_context(|| format!("create directory {}", paths.conductor_dir.display()))?;
    write_config(&paths.config_path, &ConductorConfig::default())?;
    fs::write(&paths.gitignore_path, CONDUCTOR_GITIGNORE)
        .with_context(|| format!("write {}", paths.gitignore_path.display()))?;
    Ok(paths)
}
