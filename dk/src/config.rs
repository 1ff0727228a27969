//! Docket configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main Docket configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Document cleanup before extraction
    pub normalize: NormalizeConfig,

    /// Prompt template overrides
    pub prompts: PromptsConfig,

    /// Issue tracker (Jira) configuration
    pub tracker: TrackerConfig,

    /// Source host (GitHub) configuration
    pub scm: ScmConfig,

    /// Run behaviour
    pub pipeline: PipelineConfig,
}

/// Which collaborators a command is about to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirements {
    pub llm: bool,
    pub tracker: bool,
    pub scm: bool,
}

impl Requirements {
    /// `dk plan`: model only
    pub fn extraction() -> Self {
        Self {
            llm: true,
            tracker: false,
            scm: false,
        }
    }

    /// `dk run`: model, tracker and (optionally) source host
    pub fn full_run(create_branches: bool) -> Self {
        Self {
            llm: true,
            tracker: true,
            scm: create_branches,
        }
    }
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks that the environment variables holding credentials for the
    /// collaborators in `needs` are set. Call this early in startup to fail
    /// fast with clear error messages.
    pub fn validate(&self, needs: Requirements) -> Result<()> {
        self.validate_with(needs, |name| std::env::var(name).is_ok())
    }

    /// [`Config::validate`] with an injectable environment lookup
    pub fn validate_with(&self, needs: Requirements, has_env: impl Fn(&str) -> bool) -> Result<()> {
        let mut missing = Vec::new();

        if needs.llm && self.llm.needs_api_key() && !has_env(&self.llm.api_key_env) {
            missing.push(format!("{} (LLM API key)", self.llm.api_key_env));
        }
        if needs.tracker {
            if self.tracker.base_url.is_empty() {
                return Err(eyre::eyre!("tracker.base-url is not configured"));
            }
            if self.tracker.project_key.is_empty() {
                return Err(eyre::eyre!("tracker.project-key is not configured"));
            }
            if !has_env(&self.tracker.email_env) {
                missing.push(format!("{} (tracker account email)", self.tracker.email_env));
            }
            if !has_env(&self.tracker.api_token_env) {
                missing.push(format!("{} (tracker API token)", self.tracker.api_token_env));
            }
        }
        if needs.scm {
            if self.scm.repository.is_empty() {
                return Err(eyre::eyre!("scm.repository is not configured (expected owner/repo)"));
            }
            if !has_env(&self.scm.token_env) {
                missing.push(format!("{} (source host token)", self.scm.token_env));
            }
        }
        if self.pipeline.branch_concurrency == 0 {
            return Err(eyre::eyre!("pipeline.branch-concurrency must be at least 1"));
        }

        if !missing.is_empty() {
            return Err(eyre::eyre!(
                "Missing environment variables: {}",
                missing.join(", ")
            ));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .docket.yml
        let local_config = PathBuf::from(".docket.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/docket/docket.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("docket").join("docket.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

fn read_env(name: &str, what: &str) -> Result<String> {
    std::env::var(name).map_err(|_| eyre::eyre!("{} not found. Set the {} environment variable.", what, name))
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: "openai" (any OpenAI-compatible endpoint), "groq" or "ollama"
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key (unused for ollama)
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl LlmConfig {
    pub fn needs_api_key(&self) -> bool {
        self.provider != "ollama"
    }

    pub fn api_key(&self) -> Result<String> {
        read_env(&self.api_key_env, "LLM API key")
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "groq".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            base_url: "https://api.groq.com/openai".to_string(),
            max_tokens: 1024,
            temperature: 0.3,
            timeout_ms: 120_000,
        }
    }
}

/// Document cleanup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Character budget for the text sent to the model
    #[serde(rename = "max-chars")]
    pub max_chars: usize,

    /// Drop lines that are empty after trimming
    #[serde(rename = "drop-empty-lines")]
    pub drop_empty_lines: bool,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            max_chars: 24_000,
            drop_empty_lines: true,
        }
    }
}

/// Prompt template configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Directory containing `decompose-system.pmt` / `decompose-user.pmt` overrides
    #[serde(rename = "override-dir")]
    pub override_dir: Option<PathBuf>,
}

/// How ticket descriptions are sent to the tracker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptionFormat {
    /// Atlassian Document Format (REST v3)
    #[default]
    Adf,
    /// Plain string (REST v2)
    Plain,
}

/// Issue tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Jira site, e.g. https://example.atlassian.net
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Project the tickets are created in
    #[serde(rename = "project-key")]
    pub project_key: String,

    /// Environment variable holding the account email
    #[serde(rename = "email-env")]
    pub email_env: String,

    /// Environment variable holding the API token
    #[serde(rename = "api-token-env")]
    pub api_token_env: String,

    /// Issue type per tree depth; deeper levels reuse the last entry
    #[serde(rename = "issue-types")]
    pub issue_types: Vec<String>,

    /// Used when the requested type is not valid for the project
    #[serde(rename = "fallback-issue-type")]
    pub fallback_issue_type: String,

    #[serde(rename = "description-format")]
    pub description_format: DescriptionFormat,

    /// Description for top-level tickets
    #[serde(rename = "root-description")]
    pub root_description: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl TrackerConfig {
    pub fn email(&self) -> Result<String> {
        read_env(&self.email_env, "Tracker account email")
    }

    pub fn api_token(&self) -> Result<String> {
        read_env(&self.api_token_env, "Tracker API token")
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            project_key: String::new(),
            email_env: "JIRA_EMAIL".to_string(),
            api_token_env: "JIRA_API_TOKEN".to_string(),
            issue_types: vec!["Epic".to_string(), "Task".to_string()],
            fallback_issue_type: "Task".to_string(),
            description_format: DescriptionFormat::Adf,
            root_description: "Created by docket from project documentation".to_string(),
            timeout_ms: 30_000,
        }
    }
}

/// Source host configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScmConfig {
    /// REST API root
    #[serde(rename = "api-url")]
    pub api_url: String,

    /// owner/repo
    pub repository: String,

    /// Environment variable holding the access token
    #[serde(rename = "token-env")]
    pub token_env: String,

    /// Branch new branches are cut from
    #[serde(rename = "base-branch")]
    pub base_branch: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl ScmConfig {
    pub fn token(&self) -> Result<String> {
        read_env(&self.token_env, "Source host token")
    }
}

impl Default for ScmConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            repository: String::new(),
            token_env: "GITHUB_TOKEN".to_string(),
            base_branch: "main".to_string(),
            timeout_ms: 30_000,
        }
    }
}

/// Run behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum branch creations in flight
    #[serde(rename = "branch-concurrency")]
    pub branch_concurrency: usize,

    /// Create a branch per task
    #[serde(rename = "create-branches")]
    pub create_branches: bool,

    /// Where raw model responses are saved when parsing fails
    #[serde(rename = "responses-dir")]
    pub responses_dir: Option<PathBuf>,
}

impl PipelineConfig {
    /// Configured responses directory, or `<data dir>/docket/responses`
    pub fn responses_dir(&self) -> PathBuf {
        self.responses_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("docket")
                .join("responses")
        })
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            branch_concurrency: 1,
            create_branches: true,
            responses_dir: None,
        }
    }
}
