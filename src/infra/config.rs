//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use anyhow::{bail, Context};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// One reward category: any keyword matching the label earns `points`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CategoryConfig {
    pub name: String,
    pub keywords: Vec<String>,
    pub points: u32,
}

impl CategoryConfig {
    pub fn new(name: &str, keywords: &[&str], points: u32) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            points,
        }
    }
}

/// Reference category table, in priority order
fn default_categories() -> Vec<CategoryConfig> {
    vec![
        CategoryConfig::new("plastic", &["plastic", "пластик"], 10),
        CategoryConfig::new("metal", &["metal", "металл"], 20),
        CategoryConfig::new("glass", &["glass", "стекло"], 30),
    ]
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_required_streak_length")]
    pub required_streak_length: u32,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    /// Frame gap that ends a camera session (0 to disable)
    #[serde(default = "default_session_gap_ms")]
    pub session_gap_ms: u64,
    /// Largest forward step between consecutive frames (0 to disable)
    #[serde(default = "default_max_forward_jump_ms")]
    pub max_forward_jump_ms: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            required_streak_length: default_required_streak_length(),
            cooldown_ms: default_cooldown_ms(),
            session_gap_ms: default_session_gap_ms(),
            max_forward_jump_ms: default_max_forward_jump_ms(),
        }
    }
}

fn default_confidence_threshold() -> f32 {
    0.75
}

fn default_required_streak_length() -> u32 {
    8
}

fn default_cooldown_ms() -> u64 {
    5000
}

fn default_session_gap_ms() -> u64 {
    2000
}

fn default_max_forward_jump_ms() -> u64 {
    60_000
}

/// Zero disables an optional window
fn optional_millis(ms: u64) -> Option<Duration> {
    match ms {
        0 => None,
        ms => Some(Duration::from_millis(ms)),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    /// Bounded capacity of the classification command channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { channel_capacity: default_channel_capacity() }
    }
}

fn default_channel_capacity() -> usize {
    1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerConfig {
    /// File path for awarded rewards (JSONL format)
    #[serde(default = "default_ledger_file")]
    pub file: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { file: default_ledger_file() }
    }
}

fn default_ledger_file() -> String {
    "ledger.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default = "default_categories")]
    pub categories: Vec<CategoryConfig>,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Immutable decision table handed to the reward engine at construction
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub confidence_threshold: f32,
    pub required_streak_length: u32,
    pub cooldown: Duration,
    /// `None` disables gap-based session resets
    pub session_gap: Option<Duration>,
    /// Frames further ahead than this are held back as outliers; `None` disables
    pub max_forward_jump: Option<Duration>,
    /// Ordered by priority: first matching category wins
    pub categories: Vec<CategoryConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_section(&EngineSection::default(), default_categories())
    }
}

impl EngineConfig {
    fn from_section(section: &EngineSection, categories: Vec<CategoryConfig>) -> Self {
        Self {
            confidence_threshold: section.confidence_threshold,
            required_streak_length: section.required_streak_length,
            cooldown: Duration::from_millis(section.cooldown_ms),
            session_gap: optional_millis(section.session_gap_ms),
            max_forward_jump: optional_millis(section.max_forward_jump_ms),
            categories,
        }
    }

    /// Reject tables the engine cannot run with
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..1.0).contains(&self.confidence_threshold) {
            bail!(
                "engine.confidence_threshold must be in [0, 1), got {}",
                self.confidence_threshold
            );
        }
        if self.required_streak_length == 0 {
            bail!("engine.required_streak_length must be at least 1");
        }
        for category in &self.categories {
            if category.points == 0 {
                bail!("category {} must award at least 1 point", category.name);
            }
            if category.keywords.iter().all(|k| k.trim().is_empty()) {
                bail!("category {} has no keywords", category.name);
            }
        }
        Ok(())
    }

    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    pub fn with_required_streak_length(mut self, frames: u32) -> Self {
        self.required_streak_length = frames;
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_session_gap(mut self, gap: Option<Duration>) -> Self {
        self.session_gap = gap;
        self
    }

    pub fn with_max_forward_jump(mut self, limit: Option<Duration>) -> Self {
        self.max_forward_jump = limit;
        self
    }

    pub fn with_categories(mut self, categories: Vec<CategoryConfig>) -> Self {
        self.categories = categories;
        self
    }
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    engine: EngineConfig,
    channel_capacity: usize,
    ledger_file: String,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            channel_capacity: default_channel_capacity(),
            ledger_file: default_ledger_file(),
            metrics_interval_secs: default_metrics_interval(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Determine config file path from an explicit argument or environment
    pub fn resolve_config_path(arg: Option<&str>) -> String {
        if let Some(path) = arg {
            return path.to_string();
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let engine = EngineConfig::from_section(&toml_config.engine, toml_config.categories);
        engine
            .validate()
            .with_context(|| format!("Invalid engine config in {}", path.display()))?;

        if toml_config.ingest.channel_capacity == 0 {
            bail!("ingest.channel_capacity must be at least 1 in {}", path.display());
        }

        Ok(Self {
            engine,
            channel_capacity: toml_config.ingest.channel_capacity,
            ledger_file: toml_config.ledger.file,
            metrics_interval_secs: toml_config.metrics.interval_secs.max(1),
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    pub fn ledger_file(&self) -> &str {
        &self.ledger_file
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to point the ledger at a temp file
    pub fn with_ledger_file(mut self, file: &str) -> Self {
        self.ledger_file = file.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        let engine = config.engine();
        assert_eq!(engine.confidence_threshold, 0.75);
        assert_eq!(engine.required_streak_length, 8);
        assert_eq!(engine.cooldown, Duration::from_secs(5));
        assert_eq!(engine.session_gap, Some(Duration::from_secs(2)));
        assert_eq!(engine.max_forward_jump, Some(Duration::from_secs(60)));
        assert_eq!(config.channel_capacity(), 1024);
        assert_eq!(config.ledger_file(), "ledger.jsonl");
        assert_eq!(config.metrics_interval_secs(), 10);
    }

    #[test]
    fn test_default_categories_in_priority_order() {
        let engine = EngineConfig::default();
        let names: Vec<&str> = engine.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["plastic", "metal", "glass"]);
        let points: Vec<u32> = engine.categories.iter().map(|c| c.points).collect();
        assert_eq!(points, vec![10, 20, 30]);
        assert!(engine.categories[0].keywords.contains(&"пластик".to_string()));
    }

    #[test]
    fn test_default_engine_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let engine = EngineConfig::default().with_confidence_threshold(1.0);
        assert!(engine.validate().is_err());

        let engine = EngineConfig::default().with_confidence_threshold(f32::NAN);
        assert!(engine.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_streak() {
        let engine = EngineConfig::default().with_required_streak_length(0);
        let err = engine.validate().unwrap_err();
        assert!(err.to_string().contains("required_streak_length"));
    }

    #[test]
    fn test_validate_rejects_zero_point_category() {
        let engine = EngineConfig::default()
            .with_categories(vec![CategoryConfig::new("paper", &["paper"], 0)]);
        assert!(engine.validate().is_err());
    }

    #[test]
    fn test_session_gap_zero_disables() {
        let section = EngineSection {
            session_gap_ms: 0,
            max_forward_jump_ms: 0,
            ..EngineSection::default()
        };
        let engine = EngineConfig::from_section(&section, default_categories());
        assert_eq!(engine.session_gap, None);
        assert_eq!(engine.max_forward_jump, None);
    }

    #[test]
    fn test_resolve_config_path_from_arg() {
        assert_eq!(Config::resolve_config_path(Some("config/prod.toml")), "config/prod.toml");
    }
}
