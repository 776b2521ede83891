use envconfig::Envconfig;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::ops::Deref;
use std::str::FromStr;
use std::time::Duration;

/// Environment used when an SDK connection doesn't name one.
pub const DEFAULT_ENVIRONMENT: &str = "production";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlexBool(pub bool);

impl FromStr for FlexBool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(FlexBool(true)),
            "false" | "0" | "no" | "off" | "" => Ok(FlexBool(false)),
            _ => Err(format!("Invalid boolean value: {}", s)),
        }
    }
}

impl From<FlexBool> for bool {
    fn from(flex: FlexBool) -> Self {
        flex.0
    }
}

impl Deref for FlexBool {
    type Target = bool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(default = "127.0.0.1:3001")]
    pub address: SocketAddr,

    #[envconfig(from = "DEFAULT_ENVIRONMENT", default = "production")]
    pub default_environment: String,

    // Apply an environment's project restriction to SDK connections that declare no projects
    #[envconfig(from = "STRICT_ENVIRONMENT_PROJECTS", default = "true")]
    pub strict_environment_projects: FlexBool,

    // JSON file with organizations, sdk connections and features to load on boot
    #[envconfig(from = "SEED_DATA_PATH", default = "")]
    pub seed_data_path: String,

    #[envconfig(from = "WEBHOOK_URL", default = "")]
    pub webhook_url: String,

    #[envconfig(from = "WEBHOOK_TIMEOUT_MS", default = "5000")]
    pub webhook_timeout_ms: u64,

    #[envconfig(default = "1000")]
    pub max_concurrency: usize,

    #[envconfig(default = "false")]
    pub enable_metrics: bool,

    #[envconfig(from = "DEBUG", default = "false")]
    pub debug: FlexBool,

    #[envconfig(from = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otel_url: Option<String>,

    #[envconfig(from = "OTEL_TRACES_SAMPLER_ARG", default = "1.0")]
    pub otel_sampling_rate: f64,

    #[envconfig(from = "OTEL_SERVICE_NAME", default = "feature-definitions")]
    pub otel_service_name: String,

    #[envconfig(from = "OTEL_EXPORTER_TIMEOUT_SECS", default = "3")]
    pub otel_export_timeout_secs: u64,

    #[envconfig(from = "OTEL_LOG_LEVEL", default = "info")]
    pub otel_log_level: tracing::Level,
}

impl Config {
    pub fn default_test_config() -> Self {
        Self {
            address: SocketAddr::from_str("127.0.0.1:0").unwrap(),
            default_environment: DEFAULT_ENVIRONMENT.to_string(),
            strict_environment_projects: FlexBool(true),
            seed_data_path: "".to_string(),
            webhook_url: "".to_string(),
            webhook_timeout_ms: 1000,
            max_concurrency: 1000,
            enable_metrics: false,
            debug: FlexBool(false),
            otel_url: None,
            otel_sampling_rate: 1.0,
            otel_service_name: "feature-definitions".to_string(),
            otel_export_timeout_secs: 3,
            otel_log_level: tracing::Level::ERROR,
        }
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_millis(self.webhook_timeout_ms)
    }

    /// Environment to compile for, given what the SDK connection asked for.
    pub fn resolve_environment<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        match requested {
            Some(env) if !env.is_empty() => env,
            _ => &self.default_environment,
        }
    }
}

pub static DEFAULT_TEST_CONFIG: Lazy<Config> = Lazy::new(Config::default_test_config);
