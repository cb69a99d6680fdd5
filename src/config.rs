use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::NexusError;
use crate::llm::openai::{DEFAULT_API_KEY_ENV, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::llm::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, ProviderSettings, RetryPolicy};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub provider: ProviderConfig,
    pub models: ModelsConfig,
    pub chat: ChatConfig,
    pub roadmap: RoadmapConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub timeout_ms: u64,
    pub connect_timeout_ms: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            timeout_ms: 300000,
            connect_timeout_ms: 30000,
            max_retries: 2,
            retry_base_delay_ms: 2000,
            retry_max_delay_ms: 30000,
        }
    }
}

impl ProviderConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    /// Client settings, with `default_model` as the client's fallback model
    pub fn settings(&self, default_model: &str) -> ProviderSettings {
        ProviderSettings {
            base_url: self.base_url.clone(),
            api_key_env: self.api_key_env.clone(),
            default_model: default_model.to_string(),
            timeout: Duration::from_millis(self.timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            retry: self.retry_policy(),
        }
    }
}

fn default_model_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

fn default_category() -> String {
    "general".to_string()
}

/// A model the provider offers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_model_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub supports_streaming: bool,
    #[serde(default)]
    pub supports_thinking: bool,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub default_model: String,
    pub models: Vec<ModelInfo>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            models: vec![
                ModelInfo {
                    id: DEFAULT_MODEL.to_string(),
                    name: "MiniMax M2.1".to_string(),
                    provider: "MiniMax".to_string(),
                    description: "Default model".to_string(),
                    max_tokens: DEFAULT_MAX_TOKENS,
                    supports_streaming: true,
                    supports_thinking: false,
                    category: "general".to_string(),
                    tags: vec!["default".to_string()],
                },
                ModelInfo {
                    id: "deepseek-ai/deepseek-r1".to_string(),
                    name: "DeepSeek R1".to_string(),
                    provider: "DeepSeek".to_string(),
                    description: "Reasoning model".to_string(),
                    max_tokens: DEFAULT_MAX_TOKENS,
                    supports_streaming: true,
                    supports_thinking: true,
                    category: "reasoning".to_string(),
                    tags: vec!["thinking".to_string()],
                },
            ],
        }
    }
}

impl ModelsConfig {
    pub fn get(&self, id: &str) -> Option<&ModelInfo> {
        self.models.iter().find(|m| m.id == id)
    }

    /// Blank or unknown ids resolve to the default model
    pub fn resolve_model_id(&self, requested: Option<&str>) -> String {
        match requested.map(str::trim) {
            Some(id) if !id.is_empty() && self.get(id).is_some() => id.to_string(),
            Some(id) if !id.is_empty() => {
                log::warn!("Unknown model {}, using {}", id, self.default_model);
                self.default_model.clone()
            }
            _ => self.default_model.clone(),
        }
    }

    pub fn resolve_max_tokens(&self, requested: Option<&str>) -> u32 {
        let id = self.resolve_model_id(requested);
        self.get(&id).map(|m| m.max_tokens).unwrap_or(DEFAULT_MAX_TOKENS)
    }

    pub fn supports_thinking(&self, id: &str) -> bool {
        self.get(id).is_some_and(|m| m.supports_thinking)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub temperature: f32,
    pub system_prompt: String,
    pub title_max_chars: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            system_prompt: "You are a patient, knowledgeable tutor helping a student understand concepts. \
                Answer clearly and directly, use examples, and adapt explanations to the student's level."
                .to_string(),
            title_max_chars: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoadmapConfig {
    pub temperature: f32,
    pub system_prompt: String,
    /// Placeholders: {goal} {level} {difficulty} {hours} {style}
    pub prompt_template: String,
}

impl Default for RoadmapConfig {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            system_prompt: "You are an expert educational assistant specializing in personalized learning roadmaps. \
                Topics build progressively, each with clear objectives, prerequisites and realistic time estimates."
                .to_string(),
            prompt_template: "Create a learning roadmap for the following goal:\n\n\
                GOAL: {goal}\n\
                CURRENT LEVEL: {level}\n\
                DIFFICULTY: {difficulty}\n\
                ESTIMATED HOURS PER WEEK: {hours}\n\
                PREFERRED STYLE: {style}\n\n\
                First write a line starting with THINKING: followed by your reasoning about how to structure the path.\n\
                Then, for each topic, write a line starting with TOPIC: followed by one JSON object with the fields \
                title, description, estimatedMinutes, learningObjectives, prerequisites and resources \
                (each resource has type, title, url and description).\n"
                .to_string(),
        }
    }
}

impl RoadmapConfig {
    pub fn render_prompt(&self, goal: &str, level: &str, difficulty: &str, hours: u32, style: &str) -> String {
        self.prompt_template
            .replace("{goal}", goal)
            .replace("{level}", level)
            .replace("{difficulty}", difficulty)
            .replace("{hours}", &hours.to_string())
            .replace("{style}", style)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(env!("CARGO_PKG_NAME"))
                .join("data"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            provider: ProviderConfig::default(),
            models: ModelsConfig::default(),
            chat: ChatConfig::default(),
            roadmap: RoadmapConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Reject settings no session could run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.provider.base_url.trim().is_empty() {
            return Err(NexusError::Config("provider.base_url is empty".to_string()));
        }
        if self.provider.timeout_ms == 0 {
            return Err(NexusError::Config("provider.timeout_ms must be > 0".to_string()));
        }
        if self.models.default_model.trim().is_empty() {
            return Err(NexusError::Config("models.default_model is empty".to_string()));
        }
        Ok(())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}
