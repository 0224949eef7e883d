use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub logging: LoggingConfig,
    pub cache: CacheConfig,
    pub limits: LimitsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding the partition files
    pub root: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Optional log file; stderr-only when unset (stdout is the transport)
    pub file: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum cached responses before LRU eviction
    pub max_entries: usize,
    /// TTL for bar query responses (seconds)
    pub bars_ttl_secs: u64,
    /// TTL for option chain responses (seconds)
    pub options_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Wall-clock budget for a single partition scan (milliseconds)
    pub scan_timeout_ms: u64,
    /// Deadline for one tool call (milliseconds)
    pub tool_timeout_ms: u64,
    /// Materialized row cap per query
    pub max_rows: usize,
    /// Concurrent tool calls; also the partition connection budget
    pub max_in_flight: usize,
    /// Metric samples retained in the ring
    pub metrics_capacity: usize,
}

/// Command line arguments for configuration overrides
#[derive(Parser, Debug, Clone)]
#[command(name = "stroll-history")]
#[command(version, about = "Historical market-data query service (stdio JSON-RPC)")]
pub struct CommandLineArgs {
    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<String>,

    /// Data root containing partition files (overrides config file)
    #[arg(long, value_name = "DIR")]
    pub data_root: Option<String>,

    /// Logging level (overrides config file, e.g. "info" or "stroll_history=debug")
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Maximum response cache entries (overrides config file)
    #[arg(long, value_name = "N")]
    pub cache_size: Option<usize>,
}

impl Config {
    /// Load configuration with command line, environment variable, and file
    /// support.
    ///
    /// Loading order (priority from highest to lowest):
    /// 1. Command line arguments
    /// 2. Environment variables (STROLL_DATA, LOG_LEVEL, CACHE_SIZE)
    /// 3. Configuration file (conf/config.toml or config.toml)
    /// 4. Default values
    pub fn load() -> Result<Self, anyhow::Error> {
        let cli_args = CommandLineArgs::parse();

        let config_path = cli_args.config.clone().or_else(Self::find_config_file);
        let mut config = if let Some(config_path) = config_path {
            Self::from_toml(&config_path)?
        } else {
            Config::default()
        };

        config.apply_env_overrides();
        config.apply_cli_overrides(&cli_args);
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - STROLL_DATA: data root directory (default: ./data)
    /// - LOG_LEVEL: one of debug|info|warn|error (default: info)
    /// - CACHE_SIZE: maximum cache entries (default: 4096)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var("STROLL_DATA") {
            self.data.root = root;
        }
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(size) = std::env::var("CACHE_SIZE") {
            match size.parse::<usize>() {
                Ok(val) if val > 0 => self.cache.max_entries = val,
                _ => tracing::warn!(
                    "Invalid CACHE_SIZE '{}' (keep {})",
                    size,
                    self.cache.max_entries
                ),
            }
        }
    }

    /// Apply command line argument overrides (highest priority)
    pub fn apply_cli_overrides(&mut self, args: &CommandLineArgs) {
        if let Some(root) = &args.data_root {
            self.data.root = root.clone();
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if let Some(size) = args.cache_size {
            self.cache.max_entries = size;
        }
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.data.root.is_empty() {
            anyhow::bail!("data.root cannot be empty");
        }
        if self.cache.max_entries == 0 {
            anyhow::bail!("cache.max_entries must be > 0");
        }
        if self.limits.scan_timeout_ms == 0 {
            anyhow::bail!("limits.scan_timeout_ms must be > 0");
        }
        if self.limits.tool_timeout_ms < self.limits.scan_timeout_ms {
            anyhow::bail!("limits.tool_timeout_ms must be >= limits.scan_timeout_ms");
        }
        if self.limits.max_rows == 0 {
            anyhow::bail!("limits.max_rows must be > 0");
        }
        if self.limits.max_in_flight == 0 {
            anyhow::bail!("limits.max_in_flight must be > 0");
        }
        Ok(())
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

fn default_parallelism() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4)
}

impl Default for DataConfig {
    fn default() -> Self {
        Self { root: "./data".to_string() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), file: None }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_entries: 4096, bars_ttl_secs: 300, options_ttl_secs: 600 }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            scan_timeout_ms: 250,
            tool_timeout_ms: 2_000,
            max_rows: 1_000_000,
            max_in_flight: 2 * default_parallelism(),
            metrics_capacity: 10_000,
        }
    }
}
