use rescue_assignment::AssignmentConfig;
use rescue_assignment::engine::{DEFAULT_COMPENSATION_ATTEMPTS, DEFAULT_TIE_TOLERANCE_KM};
use rescue_notifications::{DispatcherConfig, ReconnectPolicy};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Nearest-resource selection and compensation
    #[serde(default)]
    pub assignment: AssignmentSettings,
    /// Live event fan-out
    #[serde(default)]
    pub notifications: NotificationSettings,
    /// Address lookup for cases reported without coordinates
    #[serde(default)]
    pub geocoding: GeocodingConfig,
    /// Hospitals, responders and codes loaded at startup
    #[serde(default)]
    pub seed: SeedConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        if self.server.body_limit_bytes == 0 {
            return Err("server.body_limit_bytes must be > 0".into());
        }
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        if !self.assignment.tie_tolerance_km.is_finite() || self.assignment.tie_tolerance_km < 0.0 {
            return Err("assignment.tie_tolerance_km must be a finite value >= 0".into());
        }
        if self.assignment.compensation_attempts == 0 {
            return Err("assignment.compensation_attempts must be > 0".into());
        }
        let n = &self.notifications;
        if n.reconnect_max_attempts == 0 {
            return Err("notifications.reconnect_max_attempts must be > 0".into());
        }
        if n.reconnect_base_delay_ms > n.reconnect_max_delay_ms {
            return Err(
                "notifications.reconnect_base_delay_ms must be <= notifications.reconnect_max_delay_ms"
                    .into(),
            );
        }
        if n.handler_timeout_ms == 0 {
            return Err("notifications.handler_timeout_ms must be > 0".into());
        }
        if n.queue_capacity == 0 || n.session_buffer == 0 {
            return Err("notifications queue and session buffers must be > 0".into());
        }
        if self.geocoding.enabled {
            if self.geocoding.base_url.trim().is_empty() {
                return Err("geocoding.base_url must be set when geocoding is enabled".into());
            }
            if self
                .geocoding
                .api_key
                .as_deref()
                .is_none_or(|k| k.trim().is_empty())
            {
                return Err("geocoding.api_key must be set when geocoding is enabled".into());
            }
            if self.geocoding.timeout_ms == 0 {
                return Err("geocoding.timeout_ms must be > 0".into());
            }
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }

    pub fn assignment_config(&self) -> AssignmentConfig {
        AssignmentConfig {
            tie_tolerance_km: self.assignment.tie_tolerance_km,
            compensation_attempts: self.assignment.compensation_attempts,
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        let n = &self.notifications;
        DispatcherConfig {
            reconnect: ReconnectPolicy::new(
                Duration::from_millis(n.reconnect_base_delay_ms),
                Duration::from_millis(n.reconnect_max_delay_ms),
                n.reconnect_max_attempts,
            ),
            handler_timeout: Duration::from_millis(n.handler_timeout_ms),
            queue_capacity: n.queue_capacity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    8080
}
fn default_body_limit() -> usize {
    64 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentSettings {
    /// Candidates within this many km of the nearest one count as tied.
    #[serde(default = "default_tie_tolerance_km")]
    pub tie_tolerance_km: f64,
    /// Attempts to give back a bed before reporting a failed release.
    #[serde(default = "default_compensation_attempts")]
    pub compensation_attempts: u32,
}

fn default_tie_tolerance_km() -> f64 {
    DEFAULT_TIE_TOLERANCE_KM
}
fn default_compensation_attempts() -> u32 {
    DEFAULT_COMPENSATION_ATTEMPTS
}

impl Default for AssignmentSettings {
    fn default() -> Self {
        Self {
            tie_tolerance_km: default_tie_tolerance_km(),
            compensation_attempts: default_compensation_attempts(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    #[serde(default = "default_reconnect_max_attempts")]
    pub reconnect_max_attempts: u32,
    #[serde(default = "default_handler_timeout_ms")]
    pub handler_timeout_ms: u64,
    /// Published events waiting for fan-out
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Envelopes buffered per connected socket
    #[serde(default = "default_session_buffer")]
    pub session_buffer: usize,
}

fn default_reconnect_base_delay_ms() -> u64 {
    1000
}
fn default_reconnect_max_delay_ms() -> u64 {
    5000
}
fn default_reconnect_max_attempts() -> u32 {
    5
}
fn default_handler_timeout_ms() -> u64 {
    5000
}
fn default_queue_capacity() -> usize {
    1024
}
fn default_session_buffer() -> usize {
    64
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            reconnect_max_attempts: default_reconnect_max_attempts(),
            handler_timeout_ms: default_handler_timeout_ms(),
            queue_capacity: default_queue_capacity(),
            session_buffer: default_session_buffer(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_geocoding_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_geocoding_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_geocoding_base_url() -> String {
    "https://us1.locationiq.com/v1".into()
}
fn default_geocoding_timeout_ms() -> u64 {
    5000
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_geocoding_base_url(),
            api_key: None,
            timeout_ms: default_geocoding_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SeedConfig {
    /// JSON file with `hospitals`, `responders` and `verification_codes`
    #[serde(default)]
    pub path: Option<String>,
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if pathbuf.exists() {
                    builder = builder.add_source(File::from(pathbuf));
                }
            }
            None => {
                let default_path = PathBuf::from("rescue.toml");
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // Environment variable overrides, e.g., RESCUE__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("RESCUE")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }

    pub fn load_config_with_default_path<P: AsRef<Path>>(
        path: Option<P>,
    ) -> Result<AppConfig, String> {
        let p = path
            .as_ref()
            .map(|p| p.as_ref().to_string_lossy().to_string());
        load_config(p.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.notifications.reconnect_max_attempts, 5);
        assert!(!cfg.geocoding.enabled);
    }

    #[test]
    fn test_dispatcher_config_from_settings() {
        let mut cfg = AppConfig::default();
        cfg.notifications.reconnect_base_delay_ms = 10;
        cfg.notifications.reconnect_max_delay_ms = 40;
        cfg.notifications.reconnect_max_attempts = 3;
        let dispatcher = cfg.dispatcher_config();
        assert_eq!(dispatcher.reconnect.base_delay, Duration::from_millis(10));
        assert_eq!(dispatcher.reconnect.max_delay, Duration::from_millis(40));
        assert_eq!(dispatcher.reconnect.max_attempts, 3);
        assert_eq!(dispatcher.queue_capacity, 1024);
    }

    #[test]
    fn test_geocoding_requires_key_when_enabled() {
        let mut cfg = AppConfig::default();
        cfg.geocoding.enabled = true;
        assert!(cfg.validate().unwrap_err().contains("api_key"));
        cfg.geocoding.api_key = Some("pk.test".into());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_rejects_negative_tolerance() {
        let mut cfg = AppConfig::default();
        cfg.assignment.tie_tolerance_km = -1.0;
        assert!(cfg.validate().is_err());
    }
}
