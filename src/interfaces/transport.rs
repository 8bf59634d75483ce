use async_trait::async_trait;
use tokio::sync::watch;

use crate::domains::envelope::RestBatch;
use crate::error::{AckError, Result};

/// Pull transport: one call returns one page of queued envelopes.
#[async_trait]
pub trait MessageSource: Send + Sync {
    async fn fetch_batch(&self) -> Result<RestBatch>;
}

#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn acknowledge(&self, server_guid: &str) -> std::result::Result<(), AckError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushState {
    pub open: bool,
    pub emptied_initial_queue: bool,
}

/// Persistent push-style connection owned outside this crate.
pub trait PushConnection: Send + Sync {
    fn state(&self) -> watch::Receiver<PushState>;
    /// Tells the connection that the server may have queued data for us.
    fn notify_data_available(&self);

    fn is_usable(&self) -> bool {
        self.state().borrow().open
    }
}
