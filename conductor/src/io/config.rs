//! Conductor configuration stored under `.conductor/config.toml`.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};

use crate::core::gate::{DEFAULT_MAX_RETRIES_PER_STAGE, MAX_SCORE, MIN_SCORE, RetryLimits};
use crate::core::selector::{DEFAULT_THRESHOLD, Preset, PresetStages, RiskConfig, SelectorConfig};
use crate::core::types::StageName;

/// Conductor configuration (TOML).
///
/// Edited by humans; missing fields take defaults. Relative paths are
/// resolved against the project root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConductorConfig {
    /// Quality-gate retries allowed per gated stage.
    pub max_retries_per_stage: u32,

    /// Wall-clock budget for one run, checked between stages. 0 disables it.
    pub run_timeout_secs: u64,

    /// Append-only JSONL log of execution events.
    pub metrics_log: PathBuf,

    /// Directory for per-run result files and agent logs.
    pub runs_dir: PathBuf,

    /// Gate thresholds keyed by stage name.
    pub thresholds: BTreeMap<String, f64>,

    pub presets: PresetStages,

    pub risk: RiskConfig,

    /// Command-backed agents keyed by stage name.
    pub agents: BTreeMap<String, AgentConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Program and arguments, e.g. `["my-agent", "--stage", "implement"]`.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    /// Truncate captured agent stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
    /// Record failures of this stage without failing the run.
    pub best_effort: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: 15 * 60,
            output_limit_bytes: 100_000,
            best_effort: false,
        }
    }
}

impl AgentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ConductorConfig {
    fn default() -> Self {
        Self {
            max_retries_per_stage: DEFAULT_MAX_RETRIES_PER_STAGE,
            run_timeout_secs: 60 * 60,
            metrics_log: PathBuf::from(".conductor/metrics.jsonl"),
            runs_dir: PathBuf::from(".conductor/runs"),
            thresholds: StageName::GATED
                .into_iter()
                .map(|stage| (stage.to_string(), DEFAULT_THRESHOLD))
                .collect(),
            presets: PresetStages::default(),
            risk: RiskConfig::default(),
            agents: BTreeMap::new(),
        }
    }
}

impl ConductorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.metrics_log.as_os_str().is_empty() {
            return Err(anyhow!("metrics_log must not be empty"));
        }
        if self.runs_dir.as_os_str().is_empty() {
            return Err(anyhow!("runs_dir must not be empty"));
        }
        self.gate_thresholds()?;
        for preset in Preset::ALL {
            validate_preset(preset, self.presets.stages(preset))?;
        }
        if self.risk.large_change_loc == 0 {
            return Err(anyhow!("risk.large_change_loc must be > 0"));
        }
        for (key, agent) in &self.agents {
            parse_stage_key("agents", key)?;
            if agent.command.is_empty() || agent.command[0].trim().is_empty() {
                return Err(anyhow!("agents.{key}.command must be a non-empty array"));
            }
            if agent.timeout_secs == 0 {
                return Err(anyhow!("agents.{key}.timeout_secs must be > 0"));
            }
            if agent.output_limit_bytes == 0 {
                return Err(anyhow!("agents.{key}.output_limit_bytes must be > 0"));
            }
        }
        Ok(())
    }

    /// Gate thresholds keyed by stage. Only gated stages may carry one.
    pub fn gate_thresholds(&self) -> Result<BTreeMap<StageName, f64>> {
        let mut thresholds = BTreeMap::new();
        for (key, value) in &self.thresholds {
            let stage = parse_stage_key("thresholds", key)?;
            if !stage.is_gated() {
                bail!("thresholds.{key}: only implement, review and test are gated");
            }
            if !value.is_finite() || !(MIN_SCORE..=MAX_SCORE).contains(value) {
                bail!("thresholds.{key} must be within [0, 100], got {value}");
            }
            thresholds.insert(stage, *value);
        }
        Ok(thresholds)
    }

    /// Agent configs keyed by stage.
    pub fn stage_agents(&self) -> Result<BTreeMap<StageName, &AgentConfig>> {
        self.agents
            .iter()
            .map(|(key, agent)| Ok((parse_stage_key("agents", key)?, agent)))
            .collect()
    }

    pub fn selector_config(&self) -> Result<SelectorConfig> {
        let best_effort: BTreeSet<StageName> = self
            .stage_agents()?
            .into_iter()
            .filter(|(_, agent)| agent.best_effort)
            .map(|(stage, _)| stage)
            .collect();
        Ok(SelectorConfig {
            presets: self.presets.clone(),
            thresholds: self.gate_thresholds()?,
            risk: self.risk,
            best_effort,
        })
    }

    pub fn retry_limits(&self) -> RetryLimits {
        RetryLimits {
            max_retries_per_stage: self.max_retries_per_stage,
        }
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        (self.run_timeout_secs > 0).then(|| Duration::from_secs(self.run_timeout_secs))
    }

    pub fn metrics_log_path(&self, root: &Path) -> PathBuf {
        root.join(&self.metrics_log)
    }

    pub fn runs_dir_path(&self, root: &Path) -> PathBuf {
        root.join(&self.runs_dir)
    }
}

fn parse_stage_key(table: &str, key: &str) -> Result<StageName> {
    key.parse::<StageName>()
        .with_context(|| format!("{table}.{key}: not a stage name"))
}

fn validate_preset(preset: Preset, stages: &[StageName]) -> Result<()> {
    if stages.is_empty() {
        bail!("presets.{preset} must list at least one stage");
    }
    let mut seen = BTreeSet::new();
    for stage in stages {
        if !seen.insert(*stage) {
            bail!("presets.{preset} lists '{stage}' more than once");
        }
    }
    Ok(())
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ConductorConfig::default()`.
pub fn load_config(path: &Path) -> Result<ConductorConfig> {
    if !path.exists() {
        let cfg = ConductorConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ConductorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &ConductorConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, ConductorConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(".conductor").join("config.toml");
        let mut cfg = ConductorConfig::default();
        cfg.agents.insert(
            "implement".to_string(),
            AgentConfig {
                command: vec!["agent".to_string(), "--stage".to_string()],
                best_effort: true,
                ..AgentConfig::default()
            },
        );
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_takes_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "max_retries_per_stage = 1\n\n[thresholds]\nreview = 90.0\n\n[risk]\nlarge_change_loc = 1000\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.max_retries_per_stage, 1);
        assert_eq!(cfg.run_timeout_secs, 3600);
        assert_eq!(cfg.risk.large_change_loc, 1000);
        assert_eq!(cfg.risk.minimal_loc_ceiling, 40);
        assert_eq!(cfg.presets, PresetStages::default());

        let selector = cfg.selector_config().expect("selector config");
        assert_eq!(selector.threshold(StageName::Review), 90.0);
        assert_eq!(selector.threshold(StageName::Implement), DEFAULT_THRESHOLD);
    }

    #[test]
    fn rejects_threshold_on_advisory_stage() {
        let mut cfg = ConductorConfig::default();
        cfg.thresholds.insert("design".to_string(), 50.0);
        let err = cfg.validate().expect_err("invalid");
        assert!(err.to_string().contains("only implement, review and test"));
    }

    #[test]
    fn rejects_out_of_range_threshold_and_unknown_stage() {
        let mut cfg = ConductorConfig::default();
        cfg.thresholds.insert("test".to_string(), 101.0);
        assert!(cfg.validate().is_err());

        let mut cfg = ConductorConfig::default();
        cfg.agents.insert(
            "deploy".to_string(),
            AgentConfig {
                command: vec!["x".to_string()],
                ..AgentConfig::default()
            },
        );
        let err = cfg.validate().expect_err("invalid");
        assert!(format!("{err:#}").contains("agents.deploy: not a stage name"));
    }

    #[test]
    fn rejects_empty_agent_command_and_duplicate_preset_stage() {
        let mut cfg = ConductorConfig::default();
        cfg.agents.insert("test".to_string(), AgentConfig::default());
        assert!(cfg.validate().is_err());

        let mut cfg = ConductorConfig::default();
        cfg.presets.minimal = vec![StageName::Test, StageName::Test];
        let err = cfg.validate().expect_err("invalid");
        assert!(err.to_string().contains("presets.minimal"));
    }

    #[test]
    fn zero_run_timeout_disables_deadline() {
        let cfg = ConductorConfig {
            run_timeout_secs: 0,
            ..ConductorConfig::default()
        };
        assert_eq!(cfg.run_timeout(), None);
        assert_eq!(
            ConductorConfig::default().run_timeout(),
            Some(Duration::from_secs(3600))
        );
    }
}
