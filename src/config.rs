use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub artifacts: ArtifactConfig,
    pub llm: LlmConfig,
    pub voice: VoiceConfig,
    pub agent: AgentConfig,
    pub logging: LoggingConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Cluster centroid storage (level-1 / level-2 tables)
    pub url: String,
}

/// Pre-computed artifact layout: CSV files keyed by `source_file` under `dir`,
/// text summaries under `dir`/summaries/<product_id>.txt
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    pub dir: String,
    /// Static catalog definition (relative paths resolve against `dir`)
    pub catalog_file: String,
    /// Row limit for generated summary previews
    pub summary_preview_rows: usize,
    /// Product whose preview grounds the planner prompt
    pub sample_product: String,
    /// Artifact load timeout in seconds
    pub load_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Credential for the generative model vendor. Empty at validate() is a
    /// startup configuration error.
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub embedding_model: String,
    /// Must match the dimension the centroid tables were built with
    pub embedding_dim: usize,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Per-attempt timeout in seconds
    pub timeout_secs: u64,
    /// Upper bound on concatenated summary characters sent to the analyzer
    pub input_budget_chars: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Absent key disables the voice layer; voice endpoints return 503
    pub api_key: Option<String>,
    pub api_base: String,
    pub default_voice: String,
    /// Total TTS timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Chat follow-ups matching this pattern get a cluster prediction before
    /// the chat reply
    pub domain_token_pattern: String,
    /// Chat follow-ups matching this pattern get the glow_on UI hint
    pub deep_research_pattern: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowlisted dashboard origin; unset falls back to permissive (dev)
    pub frontend_origin: Option<String>,
}

/// Command line arguments for configuration overrides
#[derive(Parser, Debug, Clone)]
#[command(name = "meridian")]
#[command(version, about = "Meridian - Analytics Assistant Backend")]
pub struct CommandLineArgs {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Server host (overrides config file)
    #[arg(long, value_name = "HOST")]
    pub server_host: Option<String>,

    /// Server port (overrides config file)
    #[arg(long, value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Centroid database URL (overrides config file)
    #[arg(long, value_name = "URL")]
    pub database_url: Option<String>,

    /// Artifact directory (overrides config file)
    #[arg(long, value_name = "PATH")]
    pub artifact_dir: Option<String>,

    /// Logging level (overrides config file, e.g., "info,meridian=debug")
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration with command line, environment variable, and file support
    ///
    /// Loading order (priority from highest to lowest):
    /// 1. Command line arguments
    /// 2. Environment variables
    /// 3. Configuration file (config.toml)
    /// 4. Default values
    pub fn load() -> Result<Self, anyhow::Error> {
        let cli_args = CommandLineArgs::parse();
        Self::load_with_args(&cli_args)
    }

    pub fn load_with_args(cli_args: &CommandLineArgs) -> Result<Self, anyhow::Error> {
        // .env is optional; a missing file is not an error
        let _ = dotenvy::dotenv();

        // 1. Load from config file (use CLI --config if provided, otherwise find default)
        let config_path = cli_args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            tracing::warn!("Configuration file not found, using defaults");
            Config::default()
        };

        // 2. Override with environment variables
        config.apply_env_overrides();

        // 3. Override with command line arguments (highest priority)
        config.apply_cli_overrides(cli_args);

        // 4. Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - LLM_API_KEY: credential for the generative model vendor (required)
    /// - VOICE_API_KEY: credential for the voice vendor (absent disables voice)
    /// - DATABASE_URL: centroid and cluster storage
    /// - ARTIFACT_DIR: path to CSV and summary files
    /// - FRONTEND_ORIGIN: CORS allowlist entry
    /// - APP_SERVER_HOST / APP_SERVER_PORT: bind address
    /// - APP_LOG_LEVEL: logging level
    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            self.llm.api_key = key;
        }

        if let Ok(key) = std::env::var("VOICE_API_KEY") {
            if !key.trim().is_empty() {
                self.voice.api_key = Some(key);
            }
        }

        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = url;
            tracing::info!("Override database.url from env");
        }

        if let Ok(dir) = std::env::var("ARTIFACT_DIR") {
            self.artifacts.dir = dir;
            tracing::info!("Override artifacts.dir from env: {}", self.artifacts.dir);
        }

        if let Ok(origin) = std::env::var("FRONTEND_ORIGIN") {
            self.cors.frontend_origin = Some(origin);
        }

        if let Ok(host) = std::env::var("APP_SERVER_HOST") {
            self.server.host = host;
            tracing::info!("Override server.host from env: {}", self.server.host);
        }

        if let Ok(port) = std::env::var("APP_SERVER_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
                tracing::info!("Override server.port from env: {}", self.server.port);
            }
        }

        if let Ok(level) = std::env::var("APP_LOG_LEVEL") {
            self.logging.level = level;
            tracing::info!("Override logging.level from env: {}", self.logging.level);
        }
    }

    /// Apply command line argument overrides (highest priority)
    fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(host) = &args.server_host {
            self.server.host = host.clone();
            tracing::info!("Override server.host from CLI: {}", self.server.host);
        }

        if let Some(port) = args.server_port {
            self.server.port = port;
            tracing::info!("Override server.port from CLI: {}", self.server.port);
        }

        if let Some(db_url) = &args.database_url {
            self.database.url = db_url.clone();
            tracing::info!("Override database.url from CLI");
        }

        if let Some(dir) = &args.artifact_dir {
            self.artifacts.dir = dir.clone();
            tracing::info!("Override artifacts.dir from CLI: {}", self.artifacts.dir);
        }

        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
            tracing::info!("Override logging.level from CLI: {}", self.logging.level);
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.llm.api_key.trim().is_empty() {
            anyhow::bail!("LLM_API_KEY is not set (llm.api_key)");
        }

        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.artifacts.dir.is_empty() {
            anyhow::bail!("Artifact directory cannot be empty");
        }

        if self.artifacts.summary_preview_rows == 0 {
            anyhow::bail!("artifacts.summary_preview_rows must be > 0");
        }

        if self.llm.embedding_dim == 0 {
            anyhow::bail!("llm.embedding_dim must be > 0");
        }

        if self.llm.input_budget_chars == 0 {
            anyhow::bail!("llm.input_budget_chars must be > 0");
        }

        regex::Regex::new(&self.agent.domain_token_pattern)
            .map_err(|e| anyhow::anyhow!("invalid agent.domain_token_pattern: {}", e))?;
        regex::Regex::new(&self.agent.deep_research_pattern)
            .map_err(|e| anyhow::anyhow!("invalid agent.deep_research_pattern: {}", e))?;

        Ok(())
    }

    /// Full path to the catalog definition, resolved against the artifact dir
    pub fn catalog_path(&self) -> std::path::PathBuf {
        let path = Path::new(&self.artifacts.catalog_file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.artifacts.dir).join(path)
        }
    }

    fn find_config_file() -> Option<String> {
        let possible_paths =
            ["conf/config.toml", "config.toml", "./conf/config.toml", "./config.toml"];

        for path in &possible_paths {
            if Path::new(path).exists() {
                return Some(path.to_string());
            }
        }
        None
    }

    fn from_toml(path: &str) -> Result<Self, anyhow::Error> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { url: "sqlite://data/clusters.db".to_string() }
    }
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            dir: "data/artifacts".to_string(),
            catalog_file: "catalog.toml".to_string(),
            summary_preview_rows: 50,
            sample_product: "top10_volume_30d".to_string(),
            load_timeout_secs: 5,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dim: 384,
            max_tokens: 2048,
            temperature: 0.2,
            timeout_secs: 30,
            input_budget_chars: 24_000,
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: "https://api.elevenlabs.io".to_string(),
            default_voice: "nova".to_string(),
            timeout_secs: 60,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            domain_token_pattern:
                r"(?i)\b(streetlight|pothole|graffiti|garbage|noise|parking|sidewalk|backlog|cluster)\b"
                    .to_string(),
            deep_research_pattern: r"(?i)\b(deep|research|investigate|dig into)\b".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info,meridian=debug".to_string(),
            file: Some("logs/meridian.log".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_toml() -> &'static str {
        r#"
            [server]
            host = "127.0.0.1"
            port = 9090

            [llm]
            api_key = "sk-test"
            embedding_dim = 384

            [artifacts]
            dir = "/tmp/artifacts"
        "#
    }

    #[test]
    fn toml_round_trip_with_defaults() {
        let config: Config = toml::from_str(base_toml()).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.artifacts.summary_preview_rows, 50);
        assert_eq!(config.llm.timeout_secs, 30);
        assert!(config.voice.api_key.is_none());
    }

    #[test]
    fn validate_rejects_missing_llm_key() {
        let config = Config::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("LLM_API_KEY"));
    }

    #[test]
    fn validate_rejects_bad_pattern() {
        let mut config: Config = toml::from_str(base_toml()).unwrap();
        config.agent.domain_token_pattern = "([unclosed".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn catalog_path_resolves_relative_against_dir() {
        let config: Config = toml::from_str(base_toml()).unwrap();
        assert_eq!(
            config.catalog_path(),
            std::path::PathBuf::from("/tmp/artifacts/catalog.toml")
        );
    }
}
