use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use crate::domains::envelope::LocalIdentities;
use crate::error::{IntakeError, Result};

pub const DEFAULT_MAX_CONCURRENT_ACKS: usize = 5;
pub const DEFAULT_MAX_ACK_ATTEMPTS: u32 = 3;
pub const DEFAULT_ACK_BACKOFF_MS: u64 = 250;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub connect_timeout_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
}

impl ServerConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.unwrap_or(3))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(10))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IdentitiesConfig {
    pub primary: Uuid,
    pub secondary: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AckConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub initial_backoff_ms: u64,
}

impl Default for AckConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT_ACKS,
            max_attempts: DEFAULT_MAX_ACK_ATTEMPTS,
            initial_backoff_ms: DEFAULT_ACK_BACKOFF_MS,
        }
    }
}

impl AckConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT_ACKS
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ACK_ATTEMPTS
}

fn default_backoff_ms() -> u64 {
    DEFAULT_ACK_BACKOFF_MS
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PushConfig {
    pub drain_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub identities: IdentitiesConfig,
    pub ack: Option<AckConfig>,
    pub push: Option<PushConfig>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| IntakeError::Config(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| IntakeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.base_url.trim().is_empty() {
            return Err(IntakeError::Config("server.base_url is empty".to_string()));
        }
        let ack = self.ack_config();
        if ack.max_concurrent == 0 {
            return Err(IntakeError::Config(
                "ack.max_concurrent must be at least 1".to_string(),
            ));
        }
        if ack.max_attempts == 0 {
            return Err(IntakeError::Config(
                "ack.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.identities.secondary == Some(self.identities.primary) {
            return Err(IntakeError::Config(
                "identities.secondary must differ from identities.primary".to_string(),
            ));
        }
        Ok(())
    }

    pub fn ack_config(&self) -> AckConfig {
        self.ack.clone().unwrap_or_default()
    }

    pub fn local_identities(&self) -> LocalIdentities {
        LocalIdentities::new(self.identities.primary, self.identities.secondary)
    }

    pub fn push_drain_timeout(&self) -> Option<Duration> {
        self.push
            .as_ref()
            .and_then(|push| push.drain_timeout_secs)
            .map(Duration::from_secs)
    }
}
