use serde::Deserialize;

/// Top-level configuration settings for the application.
///
/// Includes settings for the relay server and the client defaults.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub client: ClientSettings,
}

/// Configuration settings for the relay server.
///
/// Defines the host and port the server will bind to.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Default behaviour of clients built from configuration.
///
/// Controls the idle keep-alive interval and the fixed delay between
/// reconnection attempts.
#[derive(Debug, Deserialize, Clone)]
pub struct ClientSettings {
    pub keep_alive_secs: u64,
    pub reconnect_delay_secs: u64,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub client: Option<PartialClientSettings>,
}

/// Partial server settings.
///
/// Used when loading server configuration from external sources with optional values.
#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Partial client settings.
///
/// Used for client configuration from external sources with optional values.
#[derive(Debug, Deserialize)]
pub struct PartialClientSettings {
    pub keep_alive_secs: Option<u64>,
    pub reconnect_delay_secs: Option<u64>,
}

/// Provides default values for `Settings`.
///
/// Ensures the application has sensible defaults if no configuration is provided.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            client: ClientSettings {
                keep_alive_secs: 60,
                reconnect_delay_secs: 5,
            },
        }
    }
}
