pub mod client;
pub mod config;
pub mod domains;
pub mod error;
pub mod interfaces;
pub mod services;

pub use crate::client::IntakeClient;
pub use crate::config::Config;
pub use crate::domains::envelope::{
    DecryptedEnvelope, Kind, LocalIdentities, LocalIdentity, RawEnvelope, ValidatedEnvelope,
};
pub use crate::error::{IntakeError, Result, ValidationError};
pub use crate::services::fetch::{FetchCoordinator, IntakeEvent, TransportMode};
