// src/config.rs
//! Process configuration (`PulseConfig`), loaded from TOML.
//!
//! Lookup order:
//! 1) `$PULSE_CONFIG_PATH` (must exist)
//! 2) `config/pulse.toml`
//! 3) built-in defaults
//!
//! `PULSE_CADENCE_SECS` and `PULSE_STORE_PATH` override the file afterwards.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::model::SourceSpec;

const ENV_PATH: &str = "PULSE_CONFIG_PATH";
const ENV_CADENCE: &str = "PULSE_CADENCE_SECS";
const ENV_STORE: &str = "PULSE_STORE_PATH";
const FALLBACK_PATH: &str = "config/pulse.toml";

/// Upper bound for day-based retention settings (about a century).
const MAX_RETENTION_DAYS: u32 = 36_500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub cadence_secs: u64,
    pub shutdown_grace_secs: u64,
    pub run_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cadence_secs: 1800,
            shutdown_grace_secs: 30,
            run_on_start: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CurationConfig {
    pub dedup_window_hours: u32,
    pub min_weight: f64,
    pub retention_days: u32,
    /// Age after which cleanup removes cards regardless of status.
    pub hard_ceiling_days: Option<u32>,
    pub fetch_concurrency: usize,
    pub fetch_timeout_secs: u64,
    pub max_items_per_source: usize,
    pub vocabulary_path: Option<PathBuf>,
}

impl Default for CurationConfig {
    fn default() -> Self {
        Self {
            dedup_window_hours: 72,
            min_weight: 0.2,
            retention_days: 14,
            hard_ceiling_days: None,
            fetch_concurrency: 4,
            fetch_timeout_secs: 20,
            max_items_per_source: 50,
            vocabulary_path: None,
        }
    }
}

impl CurationConfig {
    pub fn dedup_window(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.dedup_window_hours))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON snapshot location; `None` keeps everything in memory.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    pub scheduler: SchedulerConfig,
    pub curation: CurationConfig,
    pub store: StoreConfig,
    pub sources: Vec<SourceSpec>,
}

impl PulseConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: PulseConfig = toml::from_str(s).context("parsing pulse config toml")?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Load from an explicit path. Env overrides are not applied.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading pulse config from {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("invalid pulse config at {}", path.display()))
    }

    /// Env path, then `config/pulse.toml`, then defaults; env overrides last.
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let fallback = PathBuf::from(FALLBACK_PATH);
            if fallback.exists() {
                Self::load_from(&fallback)?
            } else {
                tracing::info!(target: "pulse::config", "no config file found, using defaults");
                Self::default()
            }
        };
        cfg.apply_env_overrides()?;
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(v) = std::env::var(ENV_CADENCE) {
            self.scheduler.cadence_secs = v
                .trim()
                .parse()
                .with_context(|| format!("{ENV_CADENCE} must be an integer, got '{v}'"))?;
        }
        if let Ok(v) = std::env::var(ENV_STORE) {
            let v = v.trim();
            self.store.path = (!v.is_empty()).then(|| PathBuf::from(v));
        }
        Ok(())
    }

    /// Clamp values into workable ranges and drop duplicate source ids.
    pub fn sanitize(&mut self) {
        let c = &mut self.curation;
        if !c.min_weight.is_finite() {
            c.min_weight = CurationConfig::default().min_weight;
        }
        c.min_weight = c.min_weight.clamp(0.0, 1.0);
        c.fetch_concurrency = c.fetch_concurrency.max(1);
        c.fetch_timeout_secs = c.fetch_timeout_secs.max(1);
        c.max_items_per_source = c.max_items_per_source.max(1);
        c.retention_days = c.retention_days.min(MAX_RETENTION_DAYS);
        c.hard_ceiling_days = c.hard_ceiling_days.map(|d| d.min(MAX_RETENTION_DAYS));
        c.dedup_window_hours = c.dedup_window_hours.min(MAX_RETENTION_DAYS * 24);
        self.scheduler.cadence_secs = self.scheduler.cadence_secs.max(1);

        let mut seen = HashSet::new();
        self.sources.retain(|s| {
            let id = s.id.trim();
            if id.is_empty() || !seen.insert(id.to_string()) {
                tracing::warn!(target: "pulse::config", source = %s.id, "dropping empty or duplicate source id");
                return false;
            }
            true
        });
    }

    pub fn cadence(&self) -> Duration {
        Duration::from_secs(self.scheduler.cadence_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.scheduler.shutdown_grace_secs)
    }
}
