use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub loki_enabled: bool,
    pub loki_url: Option<String>,
    pub service_name: String,
    pub environment: String,
    pub log_level: String,
    /// Extra Loki stream labels from `LOKI_LABELS` ("region=us-east,pool=edgar")
    pub extra_labels: Vec<(String, String)>,
}

/// Chatty dependencies held at `warn` unless RUST_LOG names them
const QUIET_TARGETS: &[&str] = &["sqlx", "hyper", "reqwest", "html5ever", "tokio_cron_scheduler"];

/// Labels that are always attached and cannot be overridden
const RESERVED_LABELS: &[&str] = &["service", "environment"];

impl LoggingConfig {
    pub fn from_env() -> Self {
        Self {
            loki_enabled: std::env::var("LOKI_ENABLED")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            loki_url: std::env::var("LOKI_URL").ok(),
            service_name: std::env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "filing-analysis".to_string()),
            environment: std::env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
            log_level: std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info".to_string()),
            extra_labels: parse_labels(&std::env::var("LOKI_LABELS").unwrap_or_default()),
        }
    }

    /// RUST_LOG plus `warn` caps for dependencies it does not mention
    pub fn filter_directives(&self) -> String {
        let mut directives = self.log_level.trim().to_string();
        for target in QUIET_TARGETS {
            if !self.log_level.contains(target) {
                directives.push_str(&format!(",{}=warn", target));
            }
        }
        directives
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.loki_enabled && self.loki_url.is_none() {
            return Err("LOKI_ENABLED is true but LOKI_URL is not set".to_string());
        }
        Ok(())
    }
}

fn parse_labels(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() || value.is_empty() || RESERVED_LABELS.contains(&key) {
                return None;
            }
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Installs the global subscriber: env filter + fmt, plus a Loki push layer
/// when enabled and compiled in.
pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;

    #[cfg(feature = "loki")]
    {
        if config.loki_enabled {
            if let Some(loki_url) = config.loki_url.clone() {
                tracing::info!("📊 Initializing logging with Loki at {}", loki_url);
                return init_with_loki(config, &loki_url);
            }
        }
    }

    init_console_only(config)?;
    tracing::info!("📊 Console logging initialized");
    Ok(())
}

fn init_console_only(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.filter_directives()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    Ok(())
}

#[cfg(feature = "loki")]
fn init_with_loki(config: LoggingConfig, loki_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let url = url::Url::parse(loki_url)?;

    let mut builder = tracing_loki::builder()
        .label("service", &config.service_name)?
        .label("environment", &config.environment)?;
    for (key, value) in &config.extra_labels {
        builder = builder.label(key, value)?;
    }
    let (loki_layer, task) = builder.build_url(url)?;

    // Spawn the background task that sends logs to Loki
    tokio::spawn(task);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.filter_directives()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(loki_layer)
        .init();

    tracing::info!(
        "✅ Loki logging initialized for {} ({}) with {} extra labels",
        config.service_name,
        config.environment,
        config.extra_labels.len()
    );

    Ok(())
}
