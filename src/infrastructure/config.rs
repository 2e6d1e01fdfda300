use crate::application::batch_service::DEFAULT_BATCH_SIZE;
use serde::Deserialize;
use std::time::Duration;

/// Service configuration. Every field has a default so the service starts
/// without a config file.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub mqtt: MqttSettings,
    pub pipeline: PipelineSettings,
    pub forecast: ModelSettings,
    pub detection: ModelSettings,
    pub camera: CameraSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    pub connect_timeout_secs: u64,
    pub qos: u8,
    pub reconnect_backoff_secs: u64,
    pub publish_wait_ms: u64,
    pub subscribe: Vec<String>,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "192.168.196.202".to_string(),
            port: 1883,
            client_id: "backend_publisher".to_string(),
            keep_alive_secs: 60,
            connect_timeout_secs: 10,
            qos: 1,
            reconnect_backoff_secs: 5,
            publish_wait_ms: 2000,
            subscribe: vec!["sensor/temperatura".to_string()],
        }
    }
}

impl MqttSettings {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_secs)
    }

    pub fn publish_wait(&self) -> Duration {
        Duration::from_millis(self.publish_wait_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PipelineSettings {
    pub batch_size: usize,
    pub temperature_topic: String,
    pub notification_topic: String,
    pub temperature_alert_topic: String,
    pub person_alert_topic: String,
    pub location: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            temperature_topic: "sensor/temperatura".to_string(),
            notification_topic: "sistema/notificaciones".to_string(),
            temperature_alert_topic: "alertas/temperatura".to_string(),
            person_alert_topic: "alertas/personas".to_string(),
            location: "invernadero".to_string(),
        }
    }
}

/// One inference endpoint
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelSettings {
    pub url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: None,
            timeout_secs: 10,
        }
    }
}

impl ModelSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    fn or_url(mut self, url: &str) -> Self {
        if self.url.is_empty() {
            self.url = url.to_string();
        }
        self
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CameraSettings {
    pub capture_url: String,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    pub source_tag: String,
    pub restricted: bool,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            capture_url: "http://192.168.211.252/capture".to_string(),
            interval_secs: 20,
            timeout_secs: 10,
            source_tag: "esp32cam".to_string(),
            restricted: false,
        }
    }
}

impl CameraSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

const DEFAULT_FORECAST_URL: &str = "https://smhdxgp506.execute-api.us-east-1.amazonaws.com/prod";
const DEFAULT_DETECTION_URL: &str = "https://npdvcvx4o8.execute-api.us-east-1.amazonaws.com/prodfaces";

impl AppConfig {
    fn with_model_urls(mut self) -> Self {
        self.forecast = self.forecast.or_url(DEFAULT_FORECAST_URL);
        self.detection = self.detection.or_url(DEFAULT_DETECTION_URL);
        self
    }
}

/// `config/pipeline.{toml,json,yaml}` if present, overridden by
/// `PIPELINE__SECTION__KEY` environment variables.
pub fn load_config() -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/pipeline").required(false))
        .add_source(
            config::Environment::with_prefix("PIPELINE")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    let app: AppConfig = settings.try_deserialize()?;
    Ok(app.with_model_urls())
}
