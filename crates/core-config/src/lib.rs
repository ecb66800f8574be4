//! Search configuration loading and parsing.
//!
//! A `plan7.toml` in the working directory (or an explicit path from the
//! driver) supplies defaults for thresholds, the memory cap, and the worker
//! count. CLI flags always override file values; unknown fields are ignored
//! so the file can grow without breaking older binaries.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::Path, path::PathBuf};
use tracing::info;

pub const CONFIG_FILE: &str = "plan7.toml";

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ThresholdSection {
    /// Whole-sequence E-value cutoff.
    pub glob_e: f64,
    /// Whole-sequence bit-score cutoff; unset means no cutoff.
    pub glob_t: Option<f32>,
    /// Per-domain E-value cutoff; unset means no cutoff.
    pub dom_e: Option<f64>,
    /// Per-domain bit-score cutoff; unset means no cutoff.
    pub dom_t: Option<f32>,
}

impl Default for ThresholdSection {
    fn default() -> Self {
        Self {
            glob_e: 10.0,
            glob_t: None,
            dom_e: None,
            dom_t: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemorySection {
    /// Soft cap before full-matrix Viterbi yields to the linear-memory
    /// variant.
    pub ram_limit_mb: usize,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self { ram_limit_mb: 32 }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct RunSection {
    /// Worker threads for the scan driver; unset means one per CPU.
    pub threads: Option<usize>,
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ConfigFile {
    pub thresholds: ThresholdSection,
    pub memory: MemorySection,
    pub run: RunSection,
}

#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Original file text, kept for diagnostics.
    pub raw: Option<String>,
    pub file: ConfigFile,
    pub source: Option<PathBuf>,
}

/// Configuration path: an explicit override wins, else `plan7.toml` in the
/// working directory.
pub fn discover(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.to_path_buf());
    }
    let local = PathBuf::from(CONFIG_FILE);
    local.exists().then_some(local)
}

/// Load a configuration, tolerating a missing file (defaults apply) but not
/// a malformed one.
pub fn load_from(path: Option<&Path>) -> Result<Config> {
    let Some(path) = discover(path) else {
        return Ok(Config::default());
    };
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let file: ConfigFile = toml::from_str(&raw)
        .with_context(|| format!("parsing config {}", path.display()))?;
    info!(
        target: "config",
        path = %path.display(),
        ram_limit_mb = file.memory.ram_limit_mb,
        "config loaded"
    );
    Ok(Config {
        raw: Some(raw),
        file,
        source: Some(path),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_a_file() {
        let cfg = load_from(Some(Path::new("/definitely/not/here.toml"))).err();
        assert!(cfg.is_some()); // explicit missing path is an error

        let cfg = Config::default();
        assert_eq!(cfg.file.thresholds.glob_e, 10.0);
        assert_eq!(cfg.file.memory.ram_limit_mb, 32);
        assert!(cfg.file.run.threads.is_none());
    }

    #[test]
    fn parses_sections_and_ignores_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan7.toml");
        std::fs::write(
            &path,
            r#"
[thresholds]
glob_e = 0.01
dom_t = 22.5

[memory]
ram_limit_mb = 64

[run]
threads = 4

[future_section]
whatever = true
"#,
        )
        .unwrap();
        let cfg = load_from(Some(&path)).unwrap();
        assert_eq!(cfg.file.thresholds.glob_e, 0.01);
        assert_eq!(cfg.file.thresholds.dom_t, Some(22.5));
        assert!(cfg.file.thresholds.glob_t.is_none());
        assert_eq!(cfg.file.memory.ram_limit_mb, 64);
        assert_eq!(cfg.file.run.threads, Some(4));
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan7.toml");
        std::fs::write(&path, "[thresholds\nglob_e = ").unwrap();
        assert!(load_from(Some(&path)).is_err());
    }
}
