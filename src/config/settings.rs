use std::time::Duration;

use serde::Deserialize;

use crate::transport::DEFAULT_MAX_FRAME_LEN;

/// Top-level configuration settings for the application.
///
/// Includes settings for the broker service, for client handles and for logging.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub client: ClientSettings,
    pub log: LogSettings,
}

/// Configuration settings for the broker.
///
/// The control port is a hint: when it is taken the broker probes downward by
/// `port_probe_step` until a bind succeeds. Client ports are handed out from
/// `port_pool_size` sequential ports directly above the bound control port.
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    pub host: String,
    pub control_port: u16,
    pub port_pool_size: u16,
    pub port_probe_step: u16,
    pub startup_timeout_ms: u64,
    pub delivery_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub max_frame_len: usize,
}

impl BrokerSettings {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    /// How long a control connection may stay silent before it is dropped.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Configuration settings for client handles.
#[derive(Debug, Deserialize, Clone)]
pub struct ClientSettings {
    pub poll_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub max_frame_len: usize,
}

impl ClientSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub broker: Option<PartialBrokerSettings>,
    pub client: Option<PartialClientSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub host: Option<String>,
    pub control_port: Option<u16>,
    pub port_pool_size: Option<u16>,
    pub port_probe_step: Option<u16>,
    pub startup_timeout_ms: Option<u64>,
    pub delivery_timeout_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
    pub max_frame_len: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialClientSettings {
    pub poll_interval_ms: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub max_frame_len: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl PartialSettings {
    /// Fills every missing value from `default`.
    pub fn merge(self, default: Settings) -> Settings {
        let broker = self.broker;
        let client = self.client;
        let broker_default = default.broker;
        let client_default = default.client;

        Settings {
            broker: BrokerSettings {
                host: broker
                    .as_ref()
                    .and_then(|b| b.host.clone())
                    .unwrap_or(broker_default.host),
                control_port: broker
                    .as_ref()
                    .and_then(|b| b.control_port)
                    .unwrap_or(broker_default.control_port),
                port_pool_size: broker
                    .as_ref()
                    .and_then(|b| b.port_pool_size)
                    .unwrap_or(broker_default.port_pool_size),
                port_probe_step: broker
                    .as_ref()
                    .and_then(|b| b.port_probe_step)
                    .unwrap_or(broker_default.port_probe_step),
                startup_timeout_ms: broker
                    .as_ref()
                    .and_then(|b| b.startup_timeout_ms)
                    .unwrap_or(broker_default.startup_timeout_ms),
                delivery_timeout_ms: broker
                    .as_ref()
                    .and_then(|b| b.delivery_timeout_ms)
                    .unwrap_or(broker_default.delivery_timeout_ms),
                read_timeout_ms: broker
                    .as_ref()
                    .and_then(|b| b.read_timeout_ms)
                    .unwrap_or(broker_default.read_timeout_ms),
                max_frame_len: broker
                    .as_ref()
                    .and_then(|b| b.max_frame_len)
                    .unwrap_or(broker_default.max_frame_len),
            },
            client: ClientSettings {
                poll_interval_ms: client
                    .as_ref()
                    .and_then(|c| c.poll_interval_ms)
                    .unwrap_or(client_default.poll_interval_ms),
                request_timeout_ms: client
                    .as_ref()
                    .and_then(|c| c.request_timeout_ms)
                    .unwrap_or(client_default.request_timeout_ms),
                max_frame_len: client
                    .as_ref()
                    .and_then(|c| c.max_frame_len)
                    .unwrap_or(client_default.max_frame_len),
            },
            log: LogSettings {
                level: self
                    .log
                    .and_then(|l| l.level)
                    .unwrap_or(default.log.level),
            },
        }
    }
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            control_port: 58608,
            port_pool_size: 100,
            port_probe_step: 110,
            startup_timeout_ms: 2000,
            delivery_timeout_ms: 1000,
            read_timeout_ms: 2000,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            request_timeout_ms: 5000,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

/// Provides default values for `Settings`.
///
/// Ensures the application has sensible defaults if no configuration is provided.
impl Default for Settings {
    fn default() -> Self {
        Self {
            broker: BrokerSettings::default(),
            client: ClientSettings::default(),
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}
