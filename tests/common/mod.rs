#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Semaphore};
use uuid::Uuid;

use message_intake::config::{AckConfig, Config, IdentitiesConfig, ServerConfig};
use message_intake::domains::envelope::{
    EnvelopeType, LocalIdentities, RawEnvelope, RestBatch, ValidatedEnvelope,
};
use message_intake::error::{AckError, DecryptionError, IntakeError, Result};
use message_intake::interfaces::processing::{
    DecryptResult, Decryptor, InboundItem, MessageProcessor, ProcessOutcome,
};
use message_intake::interfaces::transport::{
    Acknowledger, MessageSource, PushConnection, PushState,
};

pub const PRIMARY: &str = "11111111-1111-4111-8111-111111111111";
pub const SECONDARY: &str = "22222222-2222-4222-8222-222222222222";
pub const SENDER: &str = "33333333-3333-4333-8333-333333333333";
pub const SEALED_SENDER: &str = "44444444-4444-4444-8444-444444444444";

pub fn identities() -> LocalIdentities {
    LocalIdentities::new(
        Uuid::parse_str(PRIMARY).unwrap(),
        Some(Uuid::parse_str(SECONDARY).unwrap()),
    )
}

pub fn test_config(base_url: &str) -> Config {
    Config {
        server: ServerConfig {
            base_url: base_url.to_string(),
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            connect_timeout_secs: Some(1),
            timeout_secs: Some(5),
        },
        identities: IdentitiesConfig {
            primary: Uuid::parse_str(PRIMARY).unwrap(),
            secondary: Some(Uuid::parse_str(SECONDARY).unwrap()),
        },
        ack: Some(AckConfig {
            max_concurrent: 5,
            max_attempts: 3,
            initial_backoff_ms: 1,
        }),
        push: None,
    }
}

pub fn fast_ack_config() -> AckConfig {
    AckConfig {
        max_concurrent: 5,
        max_attempts: 3,
        initial_backoff_ms: 1,
    }
}

pub fn envelope(envelope_type: EnvelopeType, timestamp: u64) -> RawEnvelope {
    RawEnvelope {
        envelope_type: Some(envelope_type),
        timestamp,
        server_timestamp: Some(timestamp + 10),
        source_uuid: Some(SENDER.to_string()),
        source_device: Some(2),
        destination_uuid: Some(PRIMARY.to_string()),
        content: Some(br#"{"dataMessage":{"body":"hello"}}"#.to_vec()),
        guid: Some(format!("guid-{timestamp}")),
        story: false,
        report_spam_token: None,
    }
}

pub fn sealed_envelope(timestamp: u64) -> RawEnvelope {
    RawEnvelope {
        source_uuid: None,
        source_device: None,
        ..envelope(EnvelopeType::UnidentifiedSender, timestamp)
    }
}

pub fn batch(envelopes: Vec<RawEnvelope>, has_more: bool) -> RestBatch {
    RestBatch {
        envelopes,
        malformed: Vec::new(),
        server_delivery_timestamp: 1_700_000_000_000,
        has_more,
    }
}

/// Returns scripted batches in order; an empty script yields an empty terminal batch.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<RestBatch>>>,
    calls: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedSource {
    pub fn new(script: Vec<Result<RestBatch>>) -> Self {
        Self {
            script: Mutex::new(VecDeque::from(script)),
            calls: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// Every fetch waits for one permit on `gate`.
    pub fn gated(script: Vec<Result<RestBatch>>, gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new(script)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn push_script(&self, item: Result<RestBatch>) {
        self.script.lock().unwrap().push_back(item);
    }
}

#[async_trait]
impl MessageSource for ScriptedSource {
    async fn fetch_batch(&self) -> Result<RestBatch> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| IntakeError::Runtime(e.to_string()))?
                .forget();
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(batch(Vec::new(), false)))
    }
}

pub struct RecordingAcknowledger {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: Mutex<Vec<String>>,
    failures_left: Mutex<HashMap<String, usize>>,
    delay: Duration,
    gate: Option<Arc<Semaphore>>,
}

impl RecordingAcknowledger {
    pub fn new() -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            failures_left: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
            gate: None,
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    /// Every call waits for one permit on `gate` before answering.
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    pub fn fail_times(&self, guid: &str, times: usize) {
        self.failures_left
            .lock()
            .unwrap()
            .insert(guid.to_string(), times);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, guid: &str) -> usize {
        self.calls().iter().filter(|call| call.as_str() == guid).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Acknowledger for RecordingAcknowledger {
    async fn acknowledge(&self, server_guid: &str) -> std::result::Result<(), AckError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(server_guid.to_string());

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let should_fail = {
            let mut failures = self.failures_left.lock().unwrap();
            match failures.get_mut(server_guid) {
                Some(left) if *left > 0 => {
                    *left -= 1;
                    true
                }
                _ => false,
            }
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if should_fail {
            Err(AckError::Http("503 Service Unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Treats envelope content as plaintext. Sealed-sender envelopes resolve to `SEALED_SENDER`.
pub struct EchoDecryptor {
    failures: Mutex<HashMap<u64, DecryptionError>>,
}

impl EchoDecryptor {
    pub fn new() -> Self {
        Self {
            failures: Mutex::new(HashMap::new()),
        }
    }

    pub fn fail(&self, timestamp: u64, error: DecryptionError) {
        self.failures.lock().unwrap().insert(timestamp, error);
    }
}

#[async_trait]
impl Decryptor for EchoDecryptor {
    async fn decrypt(
        &self,
        envelope: &ValidatedEnvelope,
    ) -> std::result::Result<DecryptResult, DecryptionError> {
        if let Some(err) = self.failures.lock().unwrap().get(&envelope.timestamp()) {
            return Err(err.clone());
        }
        let (source_service_id, source_device_id) = match envelope.source() {
            Some(source) => (source.service_id, source.device_id),
            None => (Uuid::parse_str(SEALED_SENDER).unwrap(), 7),
        };
        Ok(DecryptResult {
            source_service_id,
            source_device_id,
            plaintext: envelope.content().unwrap_or_default().to_vec(),
        })
    }
}

pub struct RecordingProcessor {
    items: Mutex<Vec<InboundItem>>,
    outcomes: Mutex<HashMap<u64, ProcessOutcome>>,
}

impl RecordingProcessor {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            outcomes: Mutex::new(HashMap::new()),
        }
    }

    pub fn respond(&self, timestamp: u64, outcome: ProcessOutcome) {
        self.outcomes.lock().unwrap().insert(timestamp, outcome);
    }

    pub fn items(&self) -> Vec<InboundItem> {
        self.items.lock().unwrap().clone()
    }

    pub fn timestamps(&self) -> Vec<u64> {
        self.items()
            .iter()
            .map(|item| match item {
                InboundItem::ServerReceipt(envelope) => envelope.timestamp(),
                InboundItem::Message(envelope) => envelope.timestamp,
            })
            .collect()
    }
}

#[async_trait]
impl MessageProcessor for RecordingProcessor {
    async fn process(&self, item: InboundItem) -> ProcessOutcome {
        let timestamp = match &item {
            InboundItem::ServerReceipt(envelope) => envelope.timestamp(),
            InboundItem::Message(envelope) => envelope.timestamp,
        };
        self.items.lock().unwrap().push(item);
        self.outcomes
            .lock()
            .unwrap()
            .get(&timestamp)
            .cloned()
            .unwrap_or(Ok(()))
    }
}

pub struct FakePush {
    state: watch::Sender<PushState>,
    notifications: AtomicUsize,
}

impl FakePush {
    pub fn new(state: PushState) -> Self {
        let (state, _) = watch::channel(state);
        Self {
            state,
            notifications: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, state: PushState) {
        self.state.send_replace(state);
    }

    pub fn notifications(&self) -> usize {
        self.notifications.load(Ordering::SeqCst)
    }
}

impl PushConnection for FakePush {
    fn state(&self) -> watch::Receiver<PushState> {
        self.state.subscribe()
    }

    fn notify_data_available(&self) {
        self.notifications.fetch_add(1, Ordering::SeqCst);
    }
}
