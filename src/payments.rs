//! Payment collaborator boundary
//!
//! Escrow capture, release, and refund live with an external payment
//! processor. The lifecycle engine invokes these operations, never
//! re-implements them; money-moving side effects carry defined failure
//! semantics (see the pending-release queue in the lifecycle module).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::OrderResult;
use crate::error::OrderError;

/// Escrow operations consumed from the payment processor
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Release escrowed funds to the seller-role party
    async fn release_escrow(&self, order_id: Uuid, amount: i64) -> OrderResult<()>;

    /// Return any escrow hold to the payer
    async fn refund_escrow(&self, order_id: Uuid) -> OrderResult<()>;
}

/// Recording gateway stand-in (replace with a real processor client in
/// production)
///
/// Counts invocations and can be switched into a failing mode, which the
/// tests use to exercise the degraded-success path.
#[derive(Default)]
pub struct RecordingGateway {
    releases: Mutex<Vec<(Uuid, i64)>>,
    refunds: Mutex<Vec<Uuid>>,
    release_calls: AtomicU32,
    refund_calls: AtomicU32,
    failing: AtomicBool,
}

impl RecordingGateway {
    /// Create a gateway that accepts every instruction
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Toggle failure mode for subsequent calls
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of release instructions received (including failed ones)
    pub fn release_calls(&self) -> u32 {
        self.release_calls.load(Ordering::SeqCst)
    }

    /// Number of refund instructions received (including failed ones)
    pub fn refund_calls(&self) -> u32 {
        self.refund_calls.load(Ordering::SeqCst)
    }

    /// Successfully recorded releases as (order id, amount)
    pub async fn recorded_releases(&self) -> Vec<(Uuid, i64)> {
        self.releases.lock().await.clone()
    }

    /// Successfully recorded refunds
    pub async fn recorded_refunds(&self) -> Vec<Uuid> {
        self.refunds.lock().await.clone()
    }
}

#[async_trait]
impl PaymentGateway for RecordingGateway {
    async fn release_escrow(&self, order_id: Uuid, amount: i64) -> OrderResult<()> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(OrderError::dependency("payment processor unreachable"));
        }

        self.releases.lock().await.push((order_id, amount));
        Ok(())
    }

    async fn refund_escrow(&self, order_id: Uuid) -> OrderResult<()> {
        self.refund_calls.fetch_add(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(OrderError::dependency("payment processor unreachable"));
        }

        self.refunds.lock().await.push(order_id);
        Ok(())
    }
}
