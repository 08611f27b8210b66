use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const PLACEHOLDER_API_KEY: &str = "sk-placeholder";

// ── Top-level config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Workspace directory - computed from home, not serialized
    #[serde(skip)]
    pub workspace_dir: PathBuf,
    /// Path to config.toml - computed from home, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Which backend family drives generate/evaluate/patch
    #[serde(default)]
    pub backend: BackendMode,

    /// SQLite database path (default: `<workspace>/runs.db`)
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub simulation: SimulationConfig,

    #[serde(default)]
    pub runs: RunsConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,
}

// ── Backend selection ────────────────────────────────────────────

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BackendMode {
    #[default]
    Simulation,
    Live,
}

// ── Live LLM endpoint ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// API credential for the OpenAI-compatible endpoint
    #[serde(default)]
    pub api_key: Option<String>,
    /// Base URL, without the `/chat/completions` suffix
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_generate_temperature")]
    pub generate_temperature: f64,
    #[serde(default = "default_evaluate_temperature")]
    pub evaluate_temperature: f64,
    #[serde(default = "default_patch_temperature")]
    pub patch_temperature: f64,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_generate_temperature() -> f64 {
    0.4
}

fn default_evaluate_temperature() -> f64 {
    0.1
}

fn default_patch_temperature() -> f64 {
    0.2
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
            generate_temperature: default_generate_temperature(),
            evaluate_temperature: default_evaluate_temperature(),
            patch_temperature: default_patch_temperature(),
        }
    }
}

impl LlmConfig {
    /// The usable credential, if any. Blank and placeholder keys count as absent.
    pub fn resolved_api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty() && *key != PLACEHOLDER_API_KEY)
    }

    pub fn normalized_base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

// ── Simulation ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_generate_delay_ms")]
    pub generate_delay_ms: u64,
    #[serde(default = "default_evaluate_delay_ms")]
    pub evaluate_delay_ms: u64,
    #[serde(default = "default_patch_delay_ms")]
    pub patch_delay_ms: u64,
}

fn default_generate_delay_ms() -> u64 {
    600
}

fn default_evaluate_delay_ms() -> u64 {
    400
}

fn default_patch_delay_ms() -> u64 {
    300
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            generate_delay_ms: default_generate_delay_ms(),
            evaluate_delay_ms: default_evaluate_delay_ms(),
            patch_delay_ms: default_patch_delay_ms(),
        }
    }
}

impl SimulationConfig {
    pub fn instant() -> Self {
        Self {
            generate_delay_ms: 0,
            evaluate_delay_ms: 0,
            patch_delay_ms: 0,
        }
    }
}

// ── Run defaults ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunsConfig {
    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: u32,
    #[serde(default = "default_target_score")]
    pub default_target_score: u32,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_target_score() -> u32 {
    90
}

impl Default for RunsConfig {
    fn default() -> Self {
        Self {
            default_max_attempts: default_max_attempts(),
            default_target_score: default_target_score(),
        }
    }
}

// ── Gateway ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway host (default: 127.0.0.1)
    #[serde(default = "default_gateway_host")]
    pub host: String,
    /// Gateway port (default: 3000)
    #[serde(default = "default_gateway_port")]
    pub port: u16,
}

fn default_gateway_host() -> String {
    "127.0.0.1".into()
}

fn default_gateway_port() -> u16 {
    3000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

fn rulesmith_dir() -> PathBuf {
    UserDirs::new()
        .map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf())
        .join(".rulesmith")
}

impl Default for Config {
    fn default() -> Self {
        let dir = rulesmith_dir();
        Self {
            workspace_dir: dir.join("workspace"),
            config_path: dir.join("config.toml"),
            backend: BackendMode::default(),
            database_path: None,
            llm: LlmConfig::default(),
            simulation: SimulationConfig::default(),
            runs: RunsConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl Config {
    pub fn load_or_init() -> Result<Self> {
        let dir = rulesmith_dir();
        if !dir.exists() {
            fs::create_dir_all(dir.join("workspace"))
                .context("Failed to create .rulesmith workspace directory")?;
        }
        let mut config = Self::load_or_init_at(&dir.join("config.toml"))?;
        config.workspace_dir = dir.join("workspace");
        config.apply_env_overrides();
        Ok(config)
    }

    /// Read `config_path`, or write defaults there when it does not exist yet.
    pub fn load_or_init_at(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let contents =
                fs::read_to_string(config_path).context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path = config_path.to_path_buf();
            if let Some(parent) = config_path.parent() {
                config.workspace_dir = parent.join("workspace");
            }
            config.validate()?;
            Ok(config)
        } else {
            let mut config = Self {
                config_path: config_path.to_path_buf(),
                ..Self::default()
            };
            if let Some(parent) = config_path.parent() {
                config.workspace_dir = parent.join("workspace");
            }
            config.validate()?;
            config.save()?;
            Ok(config)
        }
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.runs.default_max_attempts >= 1,
            "runs.default_max_attempts must be at least 1"
        );
        anyhow::ensure!(
            (1..=100).contains(&self.runs.default_target_score),
            "runs.default_target_score must be within 1..=100"
        );
        for (name, temp) in [
            ("generate_temperature", self.llm.generate_temperature),
            ("evaluate_temperature", self.llm.evaluate_temperature),
            ("patch_temperature", self.llm.patch_temperature),
        ] {
            anyhow::ensure!(
                (0.0..=2.0).contains(&temp),
                "llm.{name} must be within 0.0..=2.0"
            );
        }
        Ok(())
    }

    /// Resolved SQLite database location.
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.workspace_dir.join("runs.db"))
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Same as [`Self::apply_env_overrides`], reading through `lookup`.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let first_non_empty = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| lookup(name).filter(|value| !value.trim().is_empty()))
        };

        // API key: RULESMITH_API_KEY or OPENAI_API_KEY
        if let Some(key) = first_non_empty(&["RULESMITH_API_KEY", "OPENAI_API_KEY"]) {
            self.llm.api_key = Some(key);
        }

        if let Some(url) = first_non_empty(&["RULESMITH_BASE_URL", "OPENAI_BASE_URL"]) {
            self.llm.base_url = url.trim_end_matches('/').to_string();
        }

        if let Some(model) = first_non_empty(&["RULESMITH_MODEL", "OPENAI_MODEL"]) {
            self.llm.model = model;
        }

        // One-way: a falsy value leaves the configured backend alone.
        if first_non_empty(&["RULESMITH_SIMULATE"]).is_some_and(|flag| is_truthy(&flag)) {
            self.backend = BackendMode::Simulation;
        }

        if let Some(path) = first_non_empty(&["RULESMITH_DATABASE"]) {
            self.database_path = Some(PathBuf::from(path));
        }

        if let Some(host) = first_non_empty(&["RULESMITH_GATEWAY_HOST"]) {
            self.gateway.host = host;
        }

        if let Some(port) = first_non_empty(&["RULESMITH_GATEWAY_PORT"])
            .and_then(|raw| raw.trim().parse::<u16>().ok())
        {
            self.gateway.port = port;
        }
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&self.config_path, toml_str).context("Failed to write config file")?;
        Ok(())
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
