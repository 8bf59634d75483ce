use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot, Notify};
use tracing::{debug, info, warn};

use crate::error::{IntakeError, Result};
use crate::interfaces::transport::{MessageSource, PushConnection};
use crate::services::pipeline::MessagePipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Push,
    Rest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeEvent {
    FetchStarted { transport: TransportMode },
    BatchReceived { count: usize, more: bool },
    FetchCompleted,
    FetchFailed { error: IntakeError },
}

type Waiter = oneshot::Sender<Result<()>>;

/// Owned by the coordinator task; nothing else reads or writes it.
enum FetchState {
    Idle,
    Fetching { waiters: Vec<Waiter> },
}

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Upper bound on waiting for the push connection to drain its backlog.
    pub push_drain_timeout: Option<Duration>,
}

struct FetchContext {
    source: Arc<dyn MessageSource>,
    pipeline: Arc<MessagePipeline>,
    push: Option<Arc<dyn PushConnection>>,
    options: FetchOptions,
    rest_fetch_completed: AtomicBool,
    readiness: Notify,
    events: broadcast::Sender<IntakeEvent>,
}

impl FetchContext {
    fn usable_push(&self) -> Option<Arc<dyn PushConnection>> {
        self.push.clone().filter(|push| push.is_usable())
    }

    fn has_completed_initial_fetch(&self) -> bool {
        match self.usable_push() {
            Some(push) => push.state().borrow().emptied_initial_queue,
            None => self.rest_fetch_completed.load(Ordering::SeqCst),
        }
    }

    fn emit(&self, event: IntakeEvent) {
        let _ = self.events.send(event);
    }

    fn set_rest_fetch_completed(&self, value: bool) {
        self.rest_fetch_completed.store(value, Ordering::SeqCst);
        self.readiness.notify_waiters();
    }

    async fn run(&self) -> Result<()> {
        match self.usable_push() {
            Some(push) => self.run_push(push).await,
            None => self.run_rest().await,
        }
    }

    async fn run_push(&self, push: Arc<dyn PushConnection>) -> Result<()> {
        self.emit(IntakeEvent::FetchStarted {
            transport: TransportMode::Push,
        });
        let mut state = push.state();
        push.notify_data_available();

        let drained = state.wait_for(|state| state.emptied_initial_queue || !state.open);
        let result = match self.options.push_drain_timeout {
            Some(limit) => tokio::time::timeout(limit, drained)
                .await
                .map_err(|_| {
                    IntakeError::PushConnection("timed out waiting for backlog".to_string())
                })?
                .map(|state| *state),
            None => drained.await.map(|state| *state),
        };
        match result {
            Ok(state) if state.emptied_initial_queue => {
                self.readiness.notify_waiters();
                Ok(())
            }
            Ok(_) => Err(IntakeError::PushConnection(
                "connection closed before backlog drained".to_string(),
            )),
            Err(_) => Err(IntakeError::PushConnection(
                "connection state channel closed".to_string(),
            )),
        }
    }

    async fn run_rest(&self) -> Result<()> {
        self.set_rest_fetch_completed(false);
        self.emit(IntakeEvent::FetchStarted {
            transport: TransportMode::Rest,
        });

        loop {
            let batch = self.source.fetch_batch().await?;
            let count = batch.len();
            debug!(count, more = batch.has_more, "fetched batch");
            self.emit(IntakeEvent::BatchReceived {
                count,
                more: batch.has_more,
            });
            for entry in &batch.malformed {
                self.pipeline.drop_malformed(entry);
            }
            for raw in batch.envelopes {
                self.pipeline
                    .route(raw, Some(batch.server_delivery_timestamp))
                    .await;
            }
            if !batch.has_more {
                break;
            }
        }

        info!("rest fetch complete");
        self.set_rest_fetch_completed(true);
        self.emit(IntakeEvent::FetchCompleted);
        Ok(())
    }
}

/// Single-flight fetch trigger. Concurrent callers share whichever operation is in flight.
#[derive(Clone)]
pub struct FetchCoordinator {
    request_tx: mpsc::UnboundedSender<Waiter>,
    context: Arc<FetchContext>,
}

impl FetchCoordinator {
    /// Spawns the coordination task; must be called inside a tokio runtime.
    pub fn new(
        source: Arc<dyn MessageSource>,
        pipeline: Arc<MessagePipeline>,
        push: Option<Arc<dyn PushConnection>>,
        options: FetchOptions,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        let context = Arc::new(FetchContext {
            source,
            pipeline,
            push,
            options,
            rest_fetch_completed: AtomicBool::new(false),
            readiness: Notify::new(),
            events,
        });

        let (request_tx, mut request_rx) = mpsc::unbounded_channel::<Waiter>();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Result<()>>();
        let task_context = context.clone();

        tokio::spawn(async move {
            let mut state = FetchState::Idle;
            loop {
                tokio::select! {
                    biased;
                    Some(result) = done_rx.recv() => {
                        let waiters = match std::mem::replace(&mut state, FetchState::Idle) {
                            FetchState::Fetching { waiters } => waiters,
                            FetchState::Idle => Vec::new(),
                        };
                        if let Err(error) = &result {
                            warn!("fetch failed: {error}");
                            task_context.emit(IntakeEvent::FetchFailed { error: error.clone() });
                        }
                        for waiter in waiters {
                            let _ = waiter.send(result.clone());
                        }
                    }
                    request = request_rx.recv() => {
                        let Some(waiter) = request else { break };
                        match &mut state {
                            FetchState::Idle => {
                                state = FetchState::Fetching { waiters: vec![waiter] };
                                let context = task_context.clone();
                                let done_tx = done_tx.clone();
                                tokio::spawn(async move {
                                    let operation = tokio::spawn(async move { context.run().await });
                                    let result = operation
                                        .await
                                        .unwrap_or_else(|e| Err(IntakeError::Runtime(e.to_string())));
                                    let _ = done_tx.send(result);
                                });
                            }
                            FetchState::Fetching { waiters } => {
                                debug!(waiting = waiters.len() + 1, "fetch already in flight; coalescing");
                                waiters.push(waiter);
                            }
                        }
                    }
                }
            }
        });

        Self {
            request_tx,
            context,
        }
    }

    /// Starts a fetch, or joins the one in flight, and resolves with its result.
    pub async fn fetch(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.request_tx
            .send(tx)
            .map_err(|_| IntakeError::Shutdown)?;
        rx.await.map_err(|_| IntakeError::Shutdown)?
    }

    pub fn transport_mode(&self) -> TransportMode {
        match self.context.usable_push() {
            Some(_) => TransportMode::Push,
            None => TransportMode::Rest,
        }
    }

    pub fn has_completed_initial_fetch(&self) -> bool {
        self.context.has_completed_initial_fetch()
    }

    /// Resolves once the initial fetch has completed. Wakeups are only hints; the
    /// condition is re-checked after every one.
    pub async fn wait_for_initial_fetch(&self) {
        loop {
            let notified = self.context.readiness.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let mut push_state = self.context.push.as_ref().map(|push| push.state());

            if self.context.has_completed_initial_fetch() {
                return;
            }

            match push_state.as_mut() {
                Some(state) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        changed = state.changed() => {
                            if changed.is_err() {
                                notified.await;
                            }
                        }
                    }
                }
                None => notified.await,
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<IntakeEvent> {
        self.context.events.subscribe()
    }
}
