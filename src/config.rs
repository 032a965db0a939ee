use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Bounds on iterations per run
pub const MIN_ITERATIONS: u32 = 1;
pub const MAX_ITERATIONS: u32 = 20;
const MAX_PAUSE_MS: u64 = 10_000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    /// Where the region label comes from
    #[serde(default)]
    pub region: RegionConfig,
    /// Defaults for orchestrated runs
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionConfig {
    /// Environment variable holding the hosting platform's region
    #[serde(default = "default_region_env")]
    pub env_var: String,
    /// Label used when the variable is unset or blank
    #[serde(default = "default_region_fallback")]
    pub fallback: String,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            env_var: default_region_env(),
            fallback: default_region_fallback(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Target measured when none is given on the command line
    #[serde(default)]
    pub target_url: Option<String>,
    /// Iterations per run
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    /// Pause between iterations in milliseconds
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,
    /// Calls per page assumed for the projected-impact figure
    #[serde(default = "default_assumed_calls")]
    pub assumed_calls: u32,
    /// Measure a deployed instance instead of the in-process server
    #[serde(default)]
    pub measurer_base_url: Option<String>,
}

impl OrchestratorConfig {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            target_url: None,
            iterations: default_iterations(),
            pause_ms: default_pause_ms(),
            assumed_calls: default_assumed_calls(),
            measurer_base_url: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    3000
}
fn default_region_env() -> String {
    "VERCEL_REGION".to_string()
}
fn default_region_fallback() -> String {
    crate::region::UNKNOWN_REGION.to_string()
}
fn default_iterations() -> u32 {
    5
}
fn default_pause_ms() -> u64 {
    100
}
fn default_assumed_calls() -> u32 {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}

/// Clamp a user-entered iteration count into the supported range
pub fn clamp_iterations(iterations: u32) -> u32 {
    iterations.clamp(MIN_ITERATIONS, MAX_ITERATIONS)
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        load_dotenv();

        let content = fs::read_to_string(&path).map_err(|e| {
            anyhow::anyhow!(
                "❌ Failed to read config file {}: {}\n💡 Make sure the file exists and is readable",
                path.as_ref().display(),
                e
            )
        })?;

        Self::from_toml_str(&content)
    }

    /// Load `config.toml` from the working directory, or built-in defaults
    pub fn load_default() -> anyhow::Result<(Self, String)> {
        let path = "config.toml";
        if Path::new(path).exists() {
            return Ok((Self::load_from_file(path)?, path.to_string()));
        }

        load_dotenv();
        Ok((Self::default(), "built-in defaults".to_string()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content).map_err(|e| {
            anyhow::anyhow!(
                "❌ Failed to parse config file: {}\n💡 Check your TOML syntax; see config.toml.example",
                e
            )
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let orchestrator = &self.orchestrator;

        if !(MIN_ITERATIONS..=MAX_ITERATIONS).contains(&orchestrator.iterations) {
            return Err(anyhow::anyhow!(
                "❌ orchestrator.iterations must be between {} and {} (got {})",
                MIN_ITERATIONS,
                MAX_ITERATIONS,
                orchestrator.iterations
            ));
        }

        if orchestrator.pause_ms > MAX_PAUSE_MS {
            return Err(anyhow::anyhow!(
                "❌ orchestrator.pause_ms ({}) cannot exceed {}ms",
                orchestrator.pause_ms,
                MAX_PAUSE_MS
            ));
        }

        if orchestrator.assumed_calls == 0 {
            return Err(anyhow::anyhow!(
                "❌ orchestrator.assumed_calls cannot be 0"
            ));
        }

        if let Some(target) = &orchestrator.target_url {
            validate_http_url("orchestrator.target_url", target)?;
        }
        if let Some(base) = &orchestrator.measurer_base_url {
            validate_http_url("orchestrator.measurer_base_url", base)?;
        }

        if self.region.env_var.trim().is_empty() {
            return Err(anyhow::anyhow!("❌ region.env_var cannot be empty"));
        }

        self.bind_addr()?;
        Ok(())
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| {
                anyhow::anyhow!(
                    "❌ Invalid server address {}:{}: {}",
                    self.server.host,
                    self.server.port,
                    e
                )
            })
    }
}

fn load_dotenv() {
    if Path::new(".env").exists() {
        dotenv::dotenv().ok();
    }
}

fn validate_http_url(field: &str, value: &str) -> anyhow::Result<()> {
    let url = Url::parse(value)
        .map_err(|e| anyhow::anyhow!("❌ {} is not a valid URL ({}): {}", field, value, e))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(anyhow::anyhow!(
            "❌ {} must use http or https (got {})",
            field,
            url.scheme()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_file_yields_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.region.env_var, "VERCEL_REGION");
        assert_eq!(config.region.fallback, "unknown");
        assert_eq!(config.orchestrator.iterations, 5);
        assert_eq!(config.orchestrator.pause_ms, 100);
        assert_eq!(config.orchestrator.assumed_calls, 10);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.orchestrator.pause(), Duration::from_millis(100));
    }

    #[test]
    fn test_full_file() {
        let config = Config::from_toml_str(
            r#"
            [server]
            host = "127.0.0.1"
            port = 8088

            [region]
            env_var = "FLY_REGION"

            [orchestrator]
            target_url = "https://api.example.test/ping"
            iterations = 12
            pause_ms = 250
            assumed_calls = 4
            measurer_base_url = "https://edge.example.test"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1:8088");
        assert_eq!(config.region.env_var, "FLY_REGION");
        assert_eq!(
            config.orchestrator.target_url.as_deref(),
            Some("https://api.example.test/ping")
        );
        assert_eq!(config.orchestrator.iterations, 12);
        assert_eq!(config.orchestrator.assumed_calls, 4);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_rejects_out_of_range_iterations() {
        assert!(Config::from_toml_str("[orchestrator]\niterations = 0").is_err());
        assert!(Config::from_toml_str("[orchestrator]\niterations = 21").is_err());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(Config::from_toml_str("[orchestrator]\npause_ms = 60000").is_err());
        assert!(Config::from_toml_str("[orchestrator]\nassumed_calls = 0").is_err());
        assert!(Config::from_toml_str("[orchestrator]\ntarget_url = \"nope\"").is_err());
        assert!(
            Config::from_toml_str("[orchestrator]\nmeasurer_base_url = \"ftp://x.test\"").is_err()
        );
        assert!(Config::from_toml_str("[region]\nenv_var = \"\"").is_err());
        assert!(Config::from_toml_str("[server]\nhost = \"not an ip\"").is_err());
    }

    #[test]
    fn test_clamp_iterations() {
        assert_eq!(clamp_iterations(0), 1);
        assert_eq!(clamp_iterations(7), 7);
        assert_eq!(clamp_iterations(500), 20);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 9100").unwrap();
        let config = Config::load_from_file(file.path()).unwrap();
        assert_eq!(config.server.port, 9100);

        assert!(Config::load_from_file("/definitely/not/here.toml").is_err());
    }
}
