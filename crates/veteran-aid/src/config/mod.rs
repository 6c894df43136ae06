use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

const DEFAULT_UPLOAD_MAX_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_ORACLE_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_ORACLE_MODEL: &str = "gpt-4.1-mini";
const DEFAULT_ORACLE_TIMEOUT_SECS: u64 = 60;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub uploads: UploadConfig,
    pub oracle: OracleConfig,
    pub renderer: RendererConfig,
    pub catalog: CatalogConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let upload_dir = env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string());
        let max_bytes = match optional_var("UPLOAD_MAX_BYTES") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|value| *value > 0)
                .ok_or(ConfigError::InvalidUploadLimit)?,
            None => DEFAULT_UPLOAD_MAX_BYTES,
        };

        let timeout_secs = match optional_var("OPENAI_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .map_err(|_| ConfigError::InvalidOracleTimeout)?,
            None => DEFAULT_ORACLE_TIMEOUT_SECS,
        };

        let labels = match optional_var("PDF_LABELS") {
            Some(raw) => LabelLanguage::parse(&raw).ok_or(ConfigError::UnknownLabelLanguage(raw))?,
            None => LabelLanguage::English,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            uploads: UploadConfig {
                dir: PathBuf::from(upload_dir),
                max_bytes,
            },
            oracle: OracleConfig {
                api_key: optional_var("OPENAI_API_KEY"),
                base_url: optional_var("OPENAI_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_ORACLE_BASE_URL.to_string()),
                model: optional_var("OPENAI_MODEL")
                    .unwrap_or_else(|| DEFAULT_ORACLE_MODEL.to_string()),
                timeout_secs,
            },
            renderer: RendererConfig {
                font_path: optional_var("PDF_FONT_PATH").map(PathBuf::from),
                bold_font_path: optional_var("PDF_FONT_BOLD_PATH").map(PathBuf::from),
                labels,
            },
            catalog: CatalogConfig {
                seed_csv: optional_var("BENEFIT_CATALOG_CSV").map(PathBuf::from),
            },
        })
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Where evidence files land and how large they may be.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub dir: PathBuf,
    pub max_bytes: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("uploads"),
            max_bytes: DEFAULT_UPLOAD_MAX_BYTES,
        }
    }
}

/// Text-generation backend. A missing API key leaves the oracle unconfigured.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_ORACLE_BASE_URL.to_string(),
            model: DEFAULT_ORACLE_MODEL.to_string(),
            timeout_secs: DEFAULT_ORACLE_TIMEOUT_SECS,
        }
    }
}

/// Language used for the fixed labels printed on generated applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelLanguage {
    #[default]
    English,
    Ukrainian,
}

impl LabelLanguage {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Some(Self::English),
            "uk" | "ua" | "ukrainian" => Some(Self::Ukrainian),
            _ => None,
        }
    }
}

/// Font and label settings for the application renderer.
#[derive(Debug, Clone, Default)]
pub struct RendererConfig {
    /// TrueType font embedded into generated documents. Built-in Helvetica when absent.
    pub font_path: Option<PathBuf>,
    pub bold_font_path: Option<PathBuf>,
    pub labels: LabelLanguage,
}

#[derive(Debug, Clone, Default)]
pub struct CatalogConfig {
    pub seed_csv: Option<PathBuf>,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidUploadLimit,
    InvalidOracleTimeout,
    UnknownLabelLanguage(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidUploadLimit => {
                write!(f, "UPLOAD_MAX_BYTES must be a positive integer")
            }
            ConfigError::InvalidOracleTimeout => {
                write!(f, "OPENAI_TIMEOUT_SECS must be a non-negative integer")
            }
            ConfigError::UnknownLabelLanguage(value) => {
                write!(f, "PDF_LABELS must be 'en' or 'uk', found '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
