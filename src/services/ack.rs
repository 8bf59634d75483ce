use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch, Semaphore};
use tracing::{debug, warn};

use crate::config::AckConfig;
use crate::domains::envelope::AckInfo;
use crate::error::AckError;
use crate::interfaces::transport::Acknowledger;

/// One in-flight acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAck {
    pub server_guid: Option<String>,
    pub timestamp: u64,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckReport {
    pub server_guid: Option<String>,
    pub timestamp: u64,
    pub attempts: u32,
    pub result: Result<(), AckError>,
}

pub struct AckTicket {
    rx: oneshot::Receiver<AckReport>,
}

impl AckTicket {
    /// `None` if the job was dropped before it finished (runtime shutdown).
    pub async fn outcome(self) -> Option<AckReport> {
        self.rx.await.ok()
    }
}

#[derive(Debug, Default)]
struct PendingSet {
    next_id: u64,
    ids: BTreeSet<u64>,
}

/// Registered-set barrier. A fence only waits on registrations that existed when it was taken.
#[derive(Debug)]
pub struct PendingBarrier {
    state: watch::Sender<PendingSet>,
}

impl Default for PendingBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingBarrier {
    pub fn new() -> Self {
        let (state, _) = watch::channel(PendingSet::default());
        Self { state }
    }

    pub fn register(self: &Arc<Self>) -> PendingRegistration {
        let mut id = 0;
        self.state.send_modify(|set| {
            id = set.next_id;
            set.next_id += 1;
            set.ids.insert(id);
        });
        PendingRegistration {
            id,
            barrier: self.clone(),
        }
    }

    pub fn fence(&self) -> Fence {
        let rx = self.state.subscribe();
        let cutoff = rx.borrow().next_id;
        Fence { cutoff, rx }
    }

    pub fn pending_count(&self) -> usize {
        self.state.borrow().ids.len()
    }

    fn deregister(&self, id: u64) {
        self.state.send_modify(|set| {
            set.ids.remove(&id);
        });
    }
}

/// Deregisters on drop, so cancellation and panics still release the barrier.
#[derive(Debug)]
pub struct PendingRegistration {
    id: u64,
    barrier: Arc<PendingBarrier>,
}

impl Drop for PendingRegistration {
    fn drop(&mut self) {
        self.barrier.deregister(self.id);
    }
}

pub struct Fence {
    cutoff: u64,
    rx: watch::Receiver<PendingSet>,
}

impl Fence {
    pub fn is_clear(&self) -> bool {
        self.rx.borrow().ids.range(..self.cutoff).next().is_none()
    }

    pub async fn wait(mut self) {
        let cutoff = self.cutoff;
        // The sender lives as long as the barrier; an error means nothing is left to wait on.
        let _ = self
            .rx
            .wait_for(|set| set.ids.range(..cutoff).next().is_none())
            .await;
    }
}

struct AckJob {
    pending: PendingAck,
    registration: PendingRegistration,
    respond_to: oneshot::Sender<AckReport>,
}

/// Best-effort delivery acknowledgments behind a bounded, arrival-ordered gate.
#[derive(Clone)]
pub struct AckManager {
    job_tx: mpsc::UnboundedSender<AckJob>,
    barrier: Arc<PendingBarrier>,
}

impl AckManager {
    /// Spawns the dispatcher; must be called inside a tokio runtime.
    pub fn new(acknowledger: Arc<dyn Acknowledger>, config: AckConfig) -> Self {
        let (job_tx, mut job_rx) = mpsc::unbounded_channel::<AckJob>();
        let gate = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        let max_attempts = config.max_attempts.max(1);
        let initial_backoff = config.initial_backoff();

        tokio::spawn(async move {
            while let Some(job) = job_rx.recv().await {
                let permit = match gate.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                let acknowledger = acknowledger.clone();
                tokio::spawn(async move {
                    let AckJob {
                        pending,
                        registration,
                        respond_to,
                    } = job;
                    let report =
                        run_with_retry(acknowledger.as_ref(), pending, max_attempts, initial_backoff)
                            .await;
                    drop(permit);
                    drop(registration);
                    let _ = respond_to.send(report);
                });
            }
        });

        Self {
            job_tx,
            barrier: Arc::new(PendingBarrier::new()),
        }
    }

    /// Fire-and-forget. The returned ticket may be dropped.
    pub fn acknowledge(&self, info: AckInfo) -> AckTicket {
        let (respond_to, rx) = oneshot::channel();
        let registration = self.barrier.register();
        let job = AckJob {
            pending: PendingAck {
                server_guid: info.server_guid,
                timestamp: info.timestamp,
                attempts: 0,
            },
            registration,
            respond_to,
        };
        if let Err(mpsc::error::SendError(job)) = self.job_tx.send(job) {
            warn!(
                timestamp = job.pending.timestamp,
                "ack dispatcher stopped; dropping acknowledgment"
            );
        }
        AckTicket { rx }
    }

    /// Resolves once every acknowledgment enqueued before this call has finished.
    pub fn pending_completion_fence(&self) -> Fence {
        self.barrier.fence()
    }

    pub fn pending_count(&self) -> usize {
        self.barrier.pending_count()
    }
}

async fn run_with_retry(
    acknowledger: &dyn Acknowledger,
    mut pending: PendingAck,
    max_attempts: u32,
    initial_backoff: Duration,
) -> AckReport {
    let result = match pending.server_guid.clone() {
        None => Err(AckError::MissingServerGuid),
        Some(guid) => loop {
            pending.attempts += 1;
            match acknowledger.acknowledge(&guid).await {
                Ok(()) => break Ok(()),
                Err(err) if err.is_retryable() && pending.attempts < max_attempts => {
                    let delay = backoff_delay(initial_backoff, pending.attempts);
                    debug!(
                        server_guid = %guid,
                        attempt = pending.attempts,
                        ?delay,
                        "ack failed, retrying: {err}"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => break Err(err),
            }
        },
    };

    if let Err(err) = &result {
        warn!(
            server_guid = ?pending.server_guid,
            timestamp = pending.timestamp,
            attempts = pending.attempts,
            "giving up on acknowledgment: {err}"
        );
    }

    AckReport {
        server_guid: pending.server_guid,
        timestamp: pending.timestamp,
        attempts: pending.attempts,
        result,
    }
}

fn backoff_delay(initial: Duration, attempt: u32) -> Duration {
    initial.saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
}
