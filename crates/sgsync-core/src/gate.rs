use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use crate::error::SyncError;

/// "Is a sync already active" across the process.
pub trait SyncGate: Send + Sync {
    /// Returns false if another sync holds the gate.
    fn try_enter(&self) -> bool;
    fn leave(&self);
}

#[derive(Debug, Default)]
pub struct AtomicSyncGate {
    active: AtomicBool,
}

impl AtomicSyncGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl SyncGate for AtomicSyncGate {
    fn try_enter(&self) -> bool {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn leave(&self) {
        self.active.store(false, Ordering::Release);
    }
}

/// Leaves the gate when dropped.
pub struct GateGuard<'a> {
    gate: &'a dyn SyncGate,
}

impl<'a> GateGuard<'a> {
    pub fn enter(gate: &'a dyn SyncGate) -> Option<Self> {
        gate.try_enter().then_some(Self { gate })
    }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        self.gate.leave();
    }
}

pub trait Connectivity: Send + Sync {
    fn is_connected(&self) -> bool;
}

/// For hosts without a connectivity signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysConnected;

impl Connectivity for AlwaysConnected {
    fn is_connected(&self) -> bool {
        true
    }
}

/// Checked between two units of work, never inside a batch.
#[derive(Clone)]
pub struct Interrupt {
    token: CancellationToken,
    connectivity: Arc<dyn Connectivity>,
}

impl Interrupt {
    pub fn new(token: CancellationToken, connectivity: Arc<dyn Connectivity>) -> Self {
        Self { token, connectivity }
    }

    pub fn never() -> Self {
        Self::new(CancellationToken::new(), Arc::new(AlwaysConnected))
    }

    pub fn check(&self) -> Result<(), SyncError> {
        if self.token.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        if !self.connectivity.is_connected() {
            return Err(SyncError::NetworkUnavailable);
        }
        Ok(())
    }
}
