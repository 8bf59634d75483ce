use std::path::Path;
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::Config;
use crate::error::Result;
use crate::interfaces::processing::{Decryptor, MessageProcessor};
use crate::interfaces::transport::{Acknowledger, MessageSource, PushConnection};
use crate::services::ack::{AckManager, Fence};
use crate::services::fetch::{FetchCoordinator, FetchOptions, IntakeEvent, TransportMode};
use crate::services::pipeline::MessagePipeline;
use crate::services::rest_client::RestMessageClient;
use crate::services::validator::EnvelopeValidator;

pub struct IntakeClient {
    coordinator: FetchCoordinator,
    acks: AckManager,
}

impl IntakeClient {
    /// Builds the REST transport from `config`. Must be called inside a tokio runtime.
    pub fn from_config(
        config: Config,
        decryptor: Arc<dyn Decryptor>,
        processor: Arc<dyn MessageProcessor>,
        push: Option<Arc<dyn PushConnection>>,
    ) -> Result<Self> {
        config.validate()?;
        let rest = Arc::new(RestMessageClient::new(&config.server)?);
        let options = FetchOptions {
            push_drain_timeout: config.push_drain_timeout(),
        };
        Ok(Self::from_parts(
            &config,
            rest.clone(),
            rest,
            decryptor,
            processor,
            push,
            options,
        ))
    }

    pub fn from_config_path<P: AsRef<Path>>(
        path: P,
        decryptor: Arc<dyn Decryptor>,
        processor: Arc<dyn MessageProcessor>,
        push: Option<Arc<dyn PushConnection>>,
    ) -> Result<Self> {
        let config = Config::from_file(path)?;
        Self::from_config(config, decryptor, processor, push)
    }

    /// Wires the pipeline over caller-supplied transports.
    pub fn from_parts(
        config: &Config,
        source: Arc<dyn MessageSource>,
        acknowledger: Arc<dyn Acknowledger>,
        decryptor: Arc<dyn Decryptor>,
        processor: Arc<dyn MessageProcessor>,
        push: Option<Arc<dyn PushConnection>>,
        options: FetchOptions,
    ) -> Self {
        let acks = AckManager::new(acknowledger, config.ack_config());
        let validator = EnvelopeValidator::new(config.local_identities());
        let pipeline = Arc::new(MessagePipeline::new(
            validator,
            decryptor,
            processor,
            acks.clone(),
        ));
        let coordinator = FetchCoordinator::new(source, pipeline, push, options);
        Self { coordinator, acks }
    }

    pub async fn fetch(&self) -> Result<()> {
        self.coordinator.fetch().await
    }

    pub fn transport_mode(&self) -> TransportMode {
        self.coordinator.transport_mode()
    }

    pub fn has_completed_initial_fetch(&self) -> bool {
        self.coordinator.has_completed_initial_fetch()
    }

    pub async fn wait_for_initial_fetch(&self) {
        self.coordinator.wait_for_initial_fetch().await
    }

    pub fn pending_acks_fence(&self) -> Fence {
        self.acks.pending_completion_fence()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IntakeEvent> {
        self.coordinator.subscribe()
    }
}
