//! Configuration management with file persistence
//!
//! Every tunable constant of the prediction core lives here and is handed to
//! the component that needs it at construction time.

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::RelationshipKind;

/// Upper bound for every configured duration (one year)
pub const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Lorelink configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub features: FeatureConfig,
    pub prediction: PredictionConfig,
    pub learning: LearningConfig,
    pub scheduler: SchedulerConfig,
    pub llm: LlmConfig,
    pub storage: StorageConfig,
}

/// Feature extraction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// How long a computed pair feature stays cached
    pub cache_ttl_secs: u64,
    /// Shared-event count that maps to a full timeline count score
    pub timeline_event_cap: u32,
    /// Joint-mention count that maps to a full mention score
    pub mention_cap: u32,
    /// Shared-location count that maps to a full location score
    pub shared_location_cap: u32,
    /// Importance scores closer than this count as similar
    pub importance_tolerance: f64,
    /// Edge types that lead from an entity to a location
    pub location_edge_types: Vec<String>,
    /// Edge types that lead from an entity to a faction
    pub faction_edge_types: Vec<String>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            timeline_event_cap: 10,
            mention_cap: 10,
            shared_location_cap: 5,
            importance_tolerance: 20.0,
            location_edge_types: vec![
                "located_at".to_string(),
                "lives_in".to_string(),
                "born_in".to_string(),
                "visited".to_string(),
            ],
            faction_edge_types: vec![
                "member_of".to_string(),
                "leads".to_string(),
                "allied_with".to_string(),
            ],
        }
    }
}

impl FeatureConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Confidence and typing model settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Suggestions below this confidence are discarded
    pub min_confidence: f64,
    /// Suggestions at or above this confidence are auto-accepted
    pub auto_accept_threshold: f64,
    /// Most-important entities considered by graph-wide prediction
    pub max_entities: usize,
    /// co_occurrence and timeline_proximity at or above this are ambiguous
    pub ambiguity_threshold: f64,
    /// shared_faction at or above this resolves to an alliance
    pub faction_ally_threshold: f64,
    /// Features at or above this are cited in reasoning
    pub reasoning_threshold: f64,
    /// Type used when no rule fires
    pub default_relationship_type: String,
}

impl PredictionConfig {
    /// The configured fallback type, parsed
    pub fn default_kind(&self) -> RelationshipKind {
        RelationshipKind::parse(&self.default_relationship_type).unwrap_or(RelationshipKind::Ally)
    }
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            min_confidence: 40.0,
            auto_accept_threshold: 95.0,
            max_entities: 100,
            ambiguity_threshold: 0.7,
            faction_ally_threshold: 0.8,
            reasoning_threshold: 0.6,
            default_relationship_type: "ally".to_string(),
        }
    }
}

/// Learning engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningConfig {
    pub learning_rate: f64,
    /// Feedback rows needed before weights are touched
    pub min_samples: u64,
    /// Minimum time between automatic weight updates for one graph
    pub cooldown_secs: u64,
    /// Confidence at or above this counts as a high-confidence prediction
    pub high_confidence_cutoff: f64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            min_samples: 5,
            cooldown_secs: 3600,
            high_confidence_cutoff: 70.0,
        }
    }
}

impl LearningConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Batch scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Pairs processed per batch
    pub batch_size: usize,
    /// Pause between batches
    pub batch_pause_ms: u64,
    /// Jobs allowed per graph within one rate window
    pub max_jobs_per_window: u32,
    pub rate_window_secs: u64,
    /// Lifetime of a progress record
    pub progress_ttl_secs: u64,
    /// Delay between graphs during a full refresh
    pub stagger_ms: u64,
    /// Period of the background refresh loop
    pub refresh_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            batch_pause_ms: 100,
            max_jobs_per_window: 5,
            rate_window_secs: 3600,
            progress_ttl_secs: 3600,
            stagger_ms: 5000,
            refresh_interval_secs: 6 * 3600,
        }
    }
}

impl SchedulerConfig {
    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_ms)
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_secs(self.rate_window_secs)
    }

    pub fn progress_ttl(&self) -> Duration {
        Duration::from_secs(self.progress_ttl_secs)
    }

    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }

    /// Never zero, since a zero-period interval cannot tick
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }
}

/// Settings for the optional relationship-type classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    #[serde(skip)]
    pub api_key: Option<String>,
    /// Whether ambiguous pairs are sent to the classifier at all
    pub enabled: bool,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            enabled: false,
            model: "anthropic/claude-3-5-haiku-latest".to_string(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            temperature: 0.0,
            max_tokens: 16,
            timeout_secs: 30,
        }
    }
}

impl LlmConfig {
    pub fn resolved_api_key(&self) -> anyhow::Result<Option<String>> {
        self.enforce_env_only()?;

        Ok(env::var("LORELINK_API_KEY")
            .or_else(|_| env::var("OPENROUTER_API_KEY"))
            .ok())
    }

    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.api_key.is_some() {
            return Err(anyhow!(
                "LLM API keys must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(())
    }
}

/// Storage settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file; defaults to the config directory
    pub database_path: Option<PathBuf>,
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("LORELINK_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("lorelink")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or fall back to defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_toml(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Resolve the database path, defaulting to the config directory
    pub fn database_path(&self) -> anyhow::Result<PathBuf> {
        match &self.storage.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join("lorelink.db")),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.llm.enforce_env_only()?;

        let p = &self.prediction;
        for (name, value) in [
            ("prediction.min_confidence", p.min_confidence),
            ("prediction.auto_accept_threshold", p.auto_accept_threshold),
            ("learning.high_confidence_cutoff", self.learning.high_confidence_cutoff),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(anyhow!("{} must be between 0 and 100, got {}", name, value));
            }
        }
        if p.min_confidence > p.auto_accept_threshold {
            return Err(anyhow!(
                "prediction.min_confidence ({}) must not exceed prediction.auto_accept_threshold ({})",
                p.min_confidence,
                p.auto_accept_threshold
            ));
        }
        for (name, value) in [
            ("prediction.ambiguity_threshold", p.ambiguity_threshold),
            ("prediction.faction_ally_threshold", p.faction_ally_threshold),
            ("prediction.reasoning_threshold", p.reasoning_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(anyhow!("{} must be between 0.0 and 1.0, got {}", name, value));
            }
        }
        if RelationshipKind::parse(&p.default_relationship_type).is_none() {
            return Err(anyhow!(
                "prediction.default_relationship_type '{}' is not a known relationship type",
                p.default_relationship_type
            ));
        }
        if p.max_entities < 2 {
            return Err(anyhow!("prediction.max_entities must be at least 2"));
        }

        let rate = self.learning.learning_rate;
        if !(rate > 0.0 && rate <= 1.0) {
            return Err(anyhow!("learning.learning_rate must be in (0, 1], got {}", rate));
        }

        if self.scheduler.batch_size == 0 {
            return Err(anyhow!("scheduler.batch_size must be positive"));
        }
        if self.scheduler.max_jobs_per_window == 0 {
            return Err(anyhow!("scheduler.max_jobs_per_window must be positive"));
        }
        let s = &self.scheduler;
        for (name, value) in [
            ("scheduler.rate_window_secs", s.rate_window_secs),
            ("scheduler.progress_ttl_secs", s.progress_ttl_secs),
            ("scheduler.refresh_interval_secs", s.refresh_interval_secs),
        ] {
            if value == 0 {
                return Err(anyhow!("{} must be positive", name));
            }
        }
        for (name, secs) in [
            ("features.cache_ttl_secs", self.features.cache_ttl_secs),
            ("learning.cooldown_secs", self.learning.cooldown_secs),
            ("scheduler.rate_window_secs", s.rate_window_secs),
            ("scheduler.progress_ttl_secs", s.progress_ttl_secs),
            ("scheduler.refresh_interval_secs", s.refresh_interval_secs),
            ("scheduler.batch_pause_ms", s.batch_pause_ms / 1000),
            ("scheduler.stagger_ms", s.stagger_ms / 1000),
            ("llm.timeout_secs", self.llm.timeout_secs),
        ] {
            if secs > MAX_DURATION_SECS {
                return Err(anyhow!(
                    "{} must not exceed {} days",
                    name,
                    MAX_DURATION_SECS / 86_400
                ));
            }
        }

        if self.features.timeline_event_cap == 0
            || self.features.mention_cap == 0
            || self.features.shared_location_cap == 0
        {
            return Err(anyhow!("feature caps must be positive"));
        }

        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "prediction.min_confidence" => Ok(self.prediction.min_confidence.to_string()),
            "prediction.auto_accept_threshold" => {
                Ok(self.prediction.auto_accept_threshold.to_string())
            }
            "prediction.max_entities" => Ok(self.prediction.max_entities.to_string()),
            "prediction.default_relationship_type" => {
                Ok(self.prediction.default_relationship_type.clone())
            }
            "learning.learning_rate" => Ok(self.learning.learning_rate.to_string()),
            "learning.min_samples" => Ok(self.learning.min_samples.to_string()),
            "learning.cooldown_secs" => Ok(self.learning.cooldown_secs.to_string()),
            "scheduler.batch_size" => Ok(self.scheduler.batch_size.to_string()),
            "scheduler.max_jobs_per_window" => Ok(self.scheduler.max_jobs_per_window.to_string()),
            "scheduler.stagger_ms" => Ok(self.scheduler.stagger_ms.to_string()),
            "llm.enabled" => Ok(self.llm.enabled.to_string()),
            "llm.model" => Ok(self.llm.model.clone()),
            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `lorelink config show` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        fn parse<T: std::str::FromStr>(key: &str, value: &str) -> anyhow::Result<T>
        where
            T::Err: std::error::Error + Send + Sync + 'static,
        {
            value
                .parse()
                .with_context(|| format!("Invalid value for {}: {}", key, value))
        }

        let mut updated = self.clone();
        match key {
            "prediction.min_confidence" => updated.prediction.min_confidence = parse(key, value)?,
            "prediction.auto_accept_threshold" => {
                updated.prediction.auto_accept_threshold = parse(key, value)?
            }
            "prediction.max_entities" => updated.prediction.max_entities = parse(key, value)?,
            "prediction.default_relationship_type" => {
                updated.prediction.default_relationship_type = value.to_string()
            }
            "learning.learning_rate" => updated.learning.learning_rate = parse(key, value)?,
            "learning.min_samples" => updated.learning.min_samples = parse(key, value)?,
            "learning.cooldown_secs" => updated.learning.cooldown_secs = parse(key, value)?,
            "scheduler.batch_size" => updated.scheduler.batch_size = parse(key, value)?,
            "scheduler.max_jobs_per_window" => {
                updated.scheduler.max_jobs_per_window = parse(key, value)?
            }
            "scheduler.stagger_ms" => updated.scheduler.stagger_ms = parse(key, value)?,
            "llm.enabled" => updated.llm.enabled = parse(key, value)?,
            "llm.model" => updated.llm.model = value.to_string(),
            "llm.api_key" | "api_key" => {
                return Err(anyhow!(
                    "API keys cannot be stored in configuration. \
                     Set the LORELINK_API_KEY or OPENROUTER_API_KEY environment variable instead."
                ));
            }
            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `lorelink config show` to see available keys.",
                    key
                ));
            }
        }

        updated.validate()?;
        *self = updated;
        Ok(())
    }
}
