//! Order Lifecycle Engine - the sole authority over status transitions
//!
//! Serializes all mutating operations per order, validates legality and
//! authorization, commits through the store's compare-and-set primitive,
//! and only then triggers side effects: escrow release/refund instructions
//! and realtime notification. A payment failure after a committed
//! transition is a recoverable inconsistency, queued for retry, never
//! silently dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::OrderResult;
use crate::error::OrderError;
use crate::handover::HandoverVerifier;
use crate::models::{Order, OrderEvent, OrderKind, OrderStatus, StatusChange};
use crate::notifier::RealtimeNotifier;
use crate::payments::PaymentGateway;
use crate::store::OrderStore;

/// Configuration for the lifecycle engine
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Maximum synchronous attempts for an escrow instruction
    pub max_settlement_attempts: u32,
    /// Backoff between settlement attempts in milliseconds
    pub settlement_backoff_ms: u64,
    /// Maximum order amount in currency units
    pub max_order_amount: i64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            max_settlement_attempts: 3,
            settlement_backoff_ms: 200,
            max_order_amount: 1_000_000,
        }
    }
}

/// Order creation request
#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub kind: OrderKind,
    pub buyer_party_id: String,
    pub seller_party_id: String,
    pub item_ref: String,
    pub amount: i64,
}

/// How the money side of a committed transition resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// The escrow instruction was acknowledged by the payment processor
    Settled,
    /// The transition committed but the instruction is queued for retry
    Pending,
}

/// Result of a committed transition, including its payment side effect
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub order: Order,
    pub payment: PaymentOutcome,
}

/// Escrow instruction awaiting retry after exhausting synchronous attempts
#[derive(Debug, Clone)]
struct PendingSettlement {
    order_id: Uuid,
    instruction: SettlementInstruction,
}

#[derive(Debug, Clone, Copy)]
enum SettlementInstruction {
    Release { amount: i64 },
    Refund,
}

/// Main lifecycle engine coordinating store, payments, and notification
pub struct LifecycleEngine {
    config: LifecycleConfig,
    store: Arc<dyn OrderStore>,
    payments: Arc<dyn PaymentGateway>,
    notifier: Arc<RealtimeNotifier>,
    verifier: HandoverVerifier,
    /// Per-order locks serializing mutating operations (distinct orders
    /// proceed in parallel)
    order_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    /// Escrow instructions that outlived their synchronous attempts
    pending_settlements: Mutex<Vec<PendingSettlement>>,
}

impl LifecycleEngine {
    /// Create a new lifecycle engine
    pub fn new(
        config: LifecycleConfig,
        store: Arc<dyn OrderStore>,
        payments: Arc<dyn PaymentGateway>,
        notifier: Arc<RealtimeNotifier>,
        verifier: HandoverVerifier,
    ) -> Self {
        Self {
            config,
            store,
            payments,
            notifier,
            verifier,
            order_locks: Mutex::new(HashMap::new()),
            pending_settlements: Mutex::new(Vec::new()),
        }
    }

    /// Create a new order with a handover code unique among the seller's
    /// active orders
    pub async fn create_order(&self, request: CreateOrderRequest) -> OrderResult<Order> {
        self.validate_create_request(&request)?;

        let in_use = self
            .store
            .active_handover_codes(&request.seller_party_id)
            .await?;
        let token = self.verifier.generate_code(&in_use)?;

        let order = Order::new(
            request.kind,
            request.buyer_party_id,
            request.seller_party_id,
            request.item_ref,
            request.amount,
            token,
        );

        let order = self.store.create_order(order).await?;

        self.append_event(
            "order.created",
            order.id,
            None,
            Some(serde_json::json!({
                "kind": order.kind,
                "amount": order.amount,
                "item_ref": order.item_ref,
            })),
        )
        .await?;

        info!(order_id = %order.id, amount = order.amount, "created order");

        Ok(order)
    }

    /// Accept an order (seller-role party only)
    ///
    /// Re-accepting an already Accepted order is an idempotent success
    /// with no side effects, tolerating client retry after a dropped
    /// response.
    pub async fn accept(&self, order_id: Uuid, acting_party: &str) -> OrderResult<Order> {
        let lock = self.entity_lock(order_id).await;
        let _guard = lock.lock().await;

        let order = self.store.get_order(order_id).await?;

        if !order.is_seller_role(acting_party) {
            return Err(OrderError::unauthorized(
                "only the seller-role party can accept an order",
            ));
        }

        if order.status == OrderStatus::Accepted {
            info!(order_id = %order.id, "accept replayed on accepted order");
            return Ok(order);
        }

        order.validate_transition(OrderStatus::Accepted)?;
        let updated = self
            .store
            .compare_and_set_status(order_id, order.status, OrderStatus::Accepted)
            .await?;

        self.append_event("order.accepted", order_id, Some(acting_party), None)
            .await?;
        self.publish_change(&updated).await;

        info!(order_id = %order.id, "accepted order");

        Ok(updated)
    }

    /// Confirm physical handover and release escrow
    ///
    /// The buyer presents the code in person; the seller-role party
    /// submits it here. Re-confirming a Completed order with the matching
    /// code returns success without a second release instruction.
    pub async fn confirm_receipt(
        &self,
        order_id: Uuid,
        acting_party: &str,
        presented_token: &str,
    ) -> OrderResult<TransitionOutcome> {
        let lock = self.entity_lock(order_id).await;
        let _guard = lock.lock().await;

        let order = self.store.get_order(order_id).await?;

        if !order.is_seller_role(acting_party) {
            return Err(OrderError::unauthorized(
                "only the seller-role party submits handover verification",
            ));
        }

        match order.status {
            OrderStatus::Completed if presented_token == order.handover_token => {
                info!(order_id = %order.id, "confirm replayed on completed order");
                let payment = if self.is_settlement_pending(order_id).await {
                    PaymentOutcome::Pending
                } else {
                    PaymentOutcome::Settled
                };
                return Ok(TransitionOutcome { order, payment });
            }
            OrderStatus::Pending | OrderStatus::Requested => {
                return Err(OrderError::OrderNotReady {
                    status: order.status,
                });
            }
            OrderStatus::Completed | OrderStatus::Cancelled => {
                return Err(OrderError::invalid_transition(order.status, "Completed"));
            }
            OrderStatus::Accepted => {
                self.verifier.verify(&order, presented_token)?;
            }
        }

        let updated = self
            .store
            .compare_and_set_status(order_id, OrderStatus::Accepted, OrderStatus::Completed)
            .await?;

        self.append_event(
            "order.completed",
            order_id,
            Some(acting_party),
            Some(serde_json::json!({ "amount": updated.amount })),
        )
        .await?;
        self.publish_change(&updated).await;

        let payment = self
            .settle(
                order_id,
                SettlementInstruction::Release {
                    amount: updated.amount,
                },
            )
            .await?;

        info!(order_id = %order.id, ?payment, "completed order");

        Ok(TransitionOutcome {
            order: updated,
            payment,
        })
    }

    /// Cancel an order (either participant) and refund any escrow hold
    ///
    /// Re-cancelling a Cancelled order is an idempotent success.
    pub async fn cancel(
        &self,
        order_id: Uuid,
        acting_party: &str,
    ) -> OrderResult<TransitionOutcome> {
        let lock = self.entity_lock(order_id).await;
        let _guard = lock.lock().await;

        let order = self.store.get_order(order_id).await?;

        if !order.is_participant(acting_party) {
            return Err(OrderError::unauthorized(
                "only a participant can cancel an order",
            ));
        }

        if order.status == OrderStatus::Cancelled {
            info!(order_id = %order.id, "cancel replayed on cancelled order");
            let payment = if self.is_settlement_pending(order_id).await {
                PaymentOutcome::Pending
            } else {
                PaymentOutcome::Settled
            };
            return Ok(TransitionOutcome { order, payment });
        }

        order.validate_transition(OrderStatus::Cancelled)?;
        let updated = self
            .store
            .compare_and_set_status(order_id, order.status, OrderStatus::Cancelled)
            .await?;

        self.append_event("order.cancelled", order_id, Some(acting_party), None)
            .await?;
        self.publish_change(&updated).await;

        let payment = self.settle(order_id, SettlementInstruction::Refund).await?;

        info!(order_id = %order.id, ?payment, "cancelled order");

        Ok(TransitionOutcome {
            order: updated,
            payment,
        })
    }

    /// Retry queued escrow instructions, returning how many settled
    ///
    /// Instructions that fail again stay queued; the committed status is
    /// never rolled back on their account.
    pub async fn retry_pending_settlements(&self) -> OrderResult<usize> {
        let queued = {
            let mut pending = self.pending_settlements.lock().await;
            std::mem::take(&mut *pending)
        };

        let mut settled = 0;
        let mut still_pending = Vec::new();

        for entry in queued {
            let result = match entry.instruction {
                SettlementInstruction::Release { amount } => {
                    self.payments.release_escrow(entry.order_id, amount).await
                }
                SettlementInstruction::Refund => {
                    self.payments.refund_escrow(entry.order_id).await
                }
            };

            match result {
                Ok(()) => {
                    settled += 1;
                    self.append_event("escrow.settled", entry.order_id, None, None)
                        .await?;
                    info!(order_id = %entry.order_id, "queued escrow instruction settled");
                }
                Err(err) => {
                    warn!(order_id = %entry.order_id, %err, "queued escrow instruction still failing");
                    still_pending.push(entry);
                }
            }
        }

        self.pending_settlements.lock().await.extend(still_pending);

        Ok(settled)
    }

    /// Number of escrow instructions awaiting retry
    pub async fn pending_settlement_count(&self) -> usize {
        self.pending_settlements.lock().await.len()
    }

    /// Fetch current order state (read path, no entity lock)
    pub async fn get_order(&self, order_id: Uuid) -> OrderResult<Order> {
        self.store.get_order(order_id).await
    }

    /// Audit events recorded for an order
    pub async fn order_events(&self, order_id: Uuid) -> OrderResult<Vec<OrderEvent>> {
        self.store.events_for(order_id).await
    }

    /// Issue an escrow instruction with bounded retry and backoff
    ///
    /// Exhausting the attempts queues the instruction and reports
    /// degraded success: the transition already committed.
    async fn settle(
        &self,
        order_id: Uuid,
        instruction: SettlementInstruction,
    ) -> OrderResult<PaymentOutcome> {
        let mut last_err = None;

        for attempt in 1..=self.config.max_settlement_attempts {
            let result = match instruction {
                SettlementInstruction::Release { amount } => {
                    self.payments.release_escrow(order_id, amount).await
                }
                SettlementInstruction::Refund => self.payments.refund_escrow(order_id).await,
            };

            match result {
                Ok(()) => {
                    self.append_event("escrow.settled", order_id, None, None).await?;
                    return Ok(PaymentOutcome::Settled);
                }
                Err(err) => {
                    warn!(order_id = %order_id, attempt, %err, "escrow instruction failed");
                    last_err = Some(err);
                    if attempt < self.config.max_settlement_attempts {
                        tokio::time::sleep(Duration::from_millis(
                            self.config.settlement_backoff_ms * attempt as u64,
                        ))
                        .await;
                    }
                }
            }
        }

        warn!(
            order_id = %order_id,
            error = %last_err.as_ref().map(|e| e.to_string()).unwrap_or_default(),
            "escrow instruction queued for asynchronous retry"
        );
        self.append_event("escrow.queued", order_id, None, None).await?;
        self.pending_settlements
            .lock()
            .await
            .push(PendingSettlement {
                order_id,
                instruction,
            });

        Ok(PaymentOutcome::Pending)
    }

    async fn is_settlement_pending(&self, order_id: Uuid) -> bool {
        self.pending_settlements
            .lock()
            .await
            .iter()
            .any(|p| p.order_id == order_id)
    }

    async fn publish_change(&self, order: &Order) {
        self.notifier
            .publish(StatusChange {
                order_id: order.id,
                kind: order.kind,
                status: order.status,
                changed_at: order.updated_at,
            })
            .await;
    }

    async fn append_event(
        &self,
        event_type: &str,
        order_id: Uuid,
        actor: Option<&str>,
        metadata: Option<serde_json::Value>,
    ) -> OrderResult<()> {
        self.store
            .append_event(OrderEvent {
                event_type: event_type.to_string(),
                order_id,
                actor: actor.map(str::to_string),
                metadata,
                created_at: Utc::now(),
            })
            .await
    }

    async fn entity_lock(&self, order_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.order_locks.lock().await;
        locks
            .entry(order_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn validate_create_request(&self, request: &CreateOrderRequest) -> OrderResult<()> {
        if request.buyer_party_id.trim().is_empty() || request.seller_party_id.trim().is_empty() {
            return Err(OrderError::validation("party ids cannot be empty"));
        }

        if request.buyer_party_id == request.seller_party_id {
            return Err(OrderError::validation(
                "buyer and seller must be distinct parties",
            ));
        }

        if request.item_ref.trim().is_empty() {
            return Err(OrderError::validation("item reference cannot be empty"));
        }

        if request.amount <= 0 {
            return Err(OrderError::validation("amount must be greater than 0"));
        }

        if request.amount > self.config.max_order_amount {
            return Err(OrderError::validation(format!(
                "amount {} exceeds maximum {}",
                request.amount, self.config.max_order_amount
            )));
        }

        Ok(())
    }
}
