//! Scenario file management for the demo binary.
//!
//! A scenario is a TOML file describing services, task types, and a burst
//! of work to submit — enough to watch a coordinator admit, throttle, and
//! retry work without writing any Rust. XDG layout, same as most CLI tools
//! in this family: `$XDG_CONFIG_HOME/coordinator` or `~/.config/coordinator`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct ScenarioFile {
    #[serde(default)]
    pub service: Vec<ServiceSection>,
    #[serde(default)]
    pub task: Vec<TaskSection>,
    #[serde(default)]
    pub submit: Vec<SubmitSection>,
    /// How long to wait for the whole scenario to drain before giving up.
    #[serde(default = "default_stop_after_secs")]
    pub stop_after_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceSection {
    pub name: String,
    pub concurrent: Option<u32>,
    /// Rate limit string, e.g. `"60/min"` — see `coordinator_core::parse_rate`.
    pub rate: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TaskSection {
    pub name: String,
    pub service: String,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// Simulated handler latency.
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,
    /// Probability in `[0, 1]` that a given attempt fails, for exercising
    /// the retry and failure paths.
    #[serde(default)]
    pub fail_rate: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitSection {
    pub task: String,
    #[serde(default = "default_submit_count")]
    pub count: u32,
}

fn default_duration_ms() -> u64 {
    100
}

fn default_submit_count() -> u32 {
    1
}

fn default_stop_after_secs() -> u64 {
    30
}

/// Return the coordinator CLI's config directory.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("coordinator");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("coordinator")
}

pub fn default_scenario_path() -> PathBuf {
    config_dir().join("scenario.toml")
}

pub fn load_scenario(path: &PathBuf) -> Result<ScenarioFile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read scenario file at {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("failed to parse scenario file at {}", path.display()))
}

/// A small scenario exercising one throttled service, a flaky task, and a
/// burst of ten submissions — written by `coordinator init`.
pub fn sample_scenario() -> ScenarioFile {
    ScenarioFile {
        service: vec![ServiceSection {
            name: "example-api".to_string(),
            concurrent: Some(2),
            rate: Some("5/sec".to_string()),
        }],
        task: vec![TaskSection {
            name: "fetch".to_string(),
            service: "example-api".to_string(),
            max_attempts: Some(3),
            duration_ms: 250,
            fail_rate: 0.2,
        }],
        submit: vec![SubmitSection { task: "fetch".to_string(), count: 10 }],
        stop_after_secs: default_stop_after_secs(),
    }
}

pub fn save_scenario(path: &PathBuf, scenario: &ScenarioFile) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create directory {}", dir.display()))?;
    }
    let contents = toml::to_string_pretty(scenario).context("failed to serialize scenario")?;
    std::fs::write(path, contents).with_context(|| format!("failed to write scenario file at {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_scenario_round_trips_through_toml() {
        let scenario = sample_scenario();
        let contents = toml::to_string_pretty(&scenario).unwrap();
        let parsed: ScenarioFile = toml::from_str(&contents).unwrap();
        assert_eq!(parsed.service.len(), 1);
        assert_eq!(parsed.task[0].fail_rate, 0.2);
        assert_eq!(parsed.submit[0].count, 10);
    }

    #[test]
    fn save_and_load_scenario_round_trips() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("scenario.toml");
        save_scenario(&path, &sample_scenario()).unwrap();
        let loaded = load_scenario(&path).unwrap();
        assert_eq!(loaded.task[0].name, "fetch");
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let toml_src = r#"
            [[service]]
            name = "svc"

            [[task]]
            name = "t"
            service = "svc"

            [[submit]]
            task = "t"
        "#;
        let parsed: ScenarioFile = toml::from_str(toml_src).unwrap();
        assert_eq!(parsed.task[0].duration_ms, 100);
        assert_eq!(parsed.submit[0].count, 1);
        assert_eq!(parsed.stop_after_secs, 30);
    }
}
