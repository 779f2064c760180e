//! Marketplace node - high-level API for the order pipeline
//!
//! Wires the lifecycle engine, review gate, bid ledger, and realtime
//! notifier over a shared store and payment collaborator, and exposes the
//! surface consumed by the UI/API layer. Callers never see partial state:
//! every call returns either the pre- or post-transition order.

use std::sync::Arc;

use uuid::Uuid;

use crate::OrderResult;
use crate::bids::BidLedger;
use crate::error::OrderError;
use crate::handover::{HandoverConfig, HandoverVerifier};
use crate::lifecycle::{CreateOrderRequest, LifecycleConfig, LifecycleEngine, TransitionOutcome};
use crate::models::{Bid, Order, OrderEvent, OrderKind, Review};
use crate::notifier::{NotifierConfig, OrderSubscription, RealtimeNotifier};
use crate::payments::PaymentGateway;
use crate::reviews::{ReviewGate, SubmitReviewRequest};
use crate::store::OrderStore;

/// Configuration for the marketplace node
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    /// Lifecycle engine configuration
    pub lifecycle: LifecycleConfig,
    /// Handover verifier configuration
    pub handover: HandoverConfig,
    /// Realtime notifier configuration
    pub notifier: NotifierConfig,
}

/// Main node coordinating all pipeline components
pub struct MarketplaceNode {
    engine: Arc<LifecycleEngine>,
    reviews: ReviewGate,
    bids: BidLedger,
    notifier: Arc<RealtimeNotifier>,
    store: Arc<dyn OrderStore>,
}

impl MarketplaceNode {
    /// Create a new node over a store and payment collaborator
    pub fn new(
        config: NodeConfig,
        store: Arc<dyn OrderStore>,
        payments: Arc<dyn PaymentGateway>,
    ) -> Self {
        let notifier = Arc::new(RealtimeNotifier::new(config.notifier));
        let engine = Arc::new(LifecycleEngine::new(
            config.lifecycle,
            store.clone(),
            payments,
            notifier.clone(),
            HandoverVerifier::new(config.handover),
        ));

        Self {
            engine,
            reviews: ReviewGate::new(store.clone()),
            bids: BidLedger::new(store.clone()),
            notifier,
            store,
        }
    }

    /// Create a new order
    pub async fn create_order(&self, request: CreateOrderRequest) -> OrderResult<Order> {
        self.engine.create_order(request).await
    }

    /// Accept an order as the seller-role party
    pub async fn accept_order(&self, order_id: Uuid, acting_party: &str) -> OrderResult<Order> {
        self.engine.accept(order_id, acting_party).await
    }

    /// Submit the buyer-presented handover code, completing the order
    pub async fn confirm_receipt(
        &self,
        order_id: Uuid,
        acting_party: &str,
        presented_token: &str,
    ) -> OrderResult<TransitionOutcome> {
        self.engine
            .confirm_receipt(order_id, acting_party, presented_token)
            .await
    }

    /// Cancel an order as either participant
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        acting_party: &str,
    ) -> OrderResult<TransitionOutcome> {
        self.engine.cancel(order_id, acting_party).await
    }

    /// Subscribe to an order's status changes
    ///
    /// Always pairs a fresh fetch with the live feed, so a subscriber
    /// reconnecting after missed changes starts from current state rather
    /// than a stale cached value. Dropping the subscription unsubscribes.
    pub async fn subscribe_order(
        &self,
        order_id: Uuid,
        kind: OrderKind,
    ) -> OrderResult<(Order, OrderSubscription)> {
        let order = self.store.get_order(order_id).await?;

        if order.kind != kind {
            return Err(OrderError::validation(format!(
                "order {} is a {:?}, not a {:?}",
                order_id, order.kind, kind
            )));
        }

        let subscription = self.notifier.subscribe(order_id).await;
        Ok((order, subscription))
    }

    /// Check review eligibility for a party
    pub async fn can_review(&self, order_id: Uuid, reviewer_id: &str) -> OrderResult<bool> {
        self.reviews.can_review(order_id, reviewer_id).await
    }

    /// Submit a review for a completed order
    pub async fn submit_review(&self, request: SubmitReviewRequest) -> OrderResult<Review> {
        self.reviews.submit(request).await
    }

    /// Place a bid on a listing
    pub async fn place_bid(
        &self,
        listing_id: Uuid,
        bidder_id: &str,
        amount: i64,
    ) -> OrderResult<Bid> {
        self.bids.place_bid(listing_id, bidder_id, amount).await
    }

    /// Fetch current order state
    pub async fn get_order(&self, order_id: Uuid) -> OrderResult<Order> {
        self.engine.get_order(order_id).await
    }

    /// Audit events recorded for an order
    pub async fn order_events(&self, order_id: Uuid) -> OrderResult<Vec<OrderEvent>> {
        self.engine.order_events(order_id).await
    }

    /// Retry escrow instructions queued after processor failures
    pub async fn retry_pending_settlements(&self) -> OrderResult<usize> {
        self.engine.retry_pending_settlements().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::PaymentOutcome;
    use crate::models::{OrderStatus, ReviewTag};
    use crate::payments::RecordingGateway;
    use crate::store::MemoryOrderStore;

    fn node_with(gateway: Arc<RecordingGateway>) -> MarketplaceNode {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        MarketplaceNode::new(
            NodeConfig {
                lifecycle: LifecycleConfig {
                    max_settlement_attempts: 2,
                    settlement_backoff_ms: 1,
                    ..LifecycleConfig::default()
                },
                ..NodeConfig::default()
            },
            Arc::new(MemoryOrderStore::new()),
            gateway,
        )
    }

    fn purchase(amount: i64) -> CreateOrderRequest {
        CreateOrderRequest {
            kind: OrderKind::Purchase,
            buyer_party_id: "buyer".to_string(),
            seller_party_id: "seller".to_string(),
            item_ref: "listing-1".to_string(),
            amount,
        }
    }

    #[tokio::test]
    async fn handover_scenario_end_to_end() {
        let gateway = RecordingGateway::new();
        let node = node_with(gateway.clone());

        let order = node.create_order(purchase(45)).await.unwrap();
        let (snapshot, mut feed) = node
            .subscribe_order(order.id, OrderKind::Purchase)
            .await
            .unwrap();
        assert_eq!(snapshot.status, OrderStatus::Pending);

        node.accept_order(order.id, "seller").await.unwrap();
        let outcome = node
            .confirm_receipt(order.id, "seller", &order.handover_token)
            .await
            .unwrap();
        assert_eq!(outcome.order.status, OrderStatus::Completed);
        assert_eq!(outcome.payment, PaymentOutcome::Settled);
        assert_eq!(gateway.recorded_releases().await, vec![(order.id, 45)]);

        // The feed saw both transitions, in commit order.
        assert_eq!(feed.next_change().await.unwrap().status, OrderStatus::Accepted);
        assert_eq!(feed.next_change().await.unwrap().status, OrderStatus::Completed);

        // Completion unlocks the review gate for both parties.
        assert!(node.can_review(order.id, "buyer").await.unwrap());
        let review = node
            .submit_review(SubmitReviewRequest {
                order_id: order.id,
                reviewer_id: "buyer".to_string(),
                rating: 5,
                tags: vec![ReviewTag::AsDescribed],
                comment: None,
            })
            .await
            .unwrap();
        assert_eq!(review.target_user_id, "seller");
        assert!(!node.can_review(order.id, "buyer").await.unwrap());
    }

    #[tokio::test]
    async fn resubscription_observes_current_status_not_a_stale_value() {
        let gateway = RecordingGateway::new();
        let node = node_with(gateway);

        let order = node.create_order(purchase(45)).await.unwrap();
        let (snapshot, feed) = node
            .subscribe_order(order.id, OrderKind::Purchase)
            .await
            .unwrap();
        assert_eq!(snapshot.status, OrderStatus::Pending);

        // Subscriber disconnects; the order moves on without it.
        drop(feed);
        node.accept_order(order.id, "seller").await.unwrap();

        // Reconnection reconciles through the fresh fetch before the live
        // feed attaches.
        let (snapshot, mut feed) = node
            .subscribe_order(order.id, OrderKind::Purchase)
            .await
            .unwrap();
        assert_eq!(snapshot.status, OrderStatus::Accepted);
        assert!(feed.try_next_change().is_none());

        node.cancel_order(order.id, "buyer").await.unwrap();
        assert_eq!(feed.next_change().await.unwrap().status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn subscription_kind_must_match_the_order() {
        let gateway = RecordingGateway::new();
        let node = node_with(gateway);

        let order = node.create_order(purchase(45)).await.unwrap();
        let err = node
            .subscribe_order(order.id, OrderKind::Booking)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Validation(_)));
    }

    #[tokio::test]
    async fn subscribing_to_an_unknown_order_fails() {
        let gateway = RecordingGateway::new();
        let node = node_with(gateway);

        let err = node
            .subscribe_order(Uuid::new_v4(), OrderKind::Purchase)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::NotFound(_)));
    }

    #[tokio::test]
    async fn bid_surface_delegates_to_the_ledger() {
        let gateway = RecordingGateway::new();
        let node = node_with(gateway);
        let listing = Uuid::new_v4();

        node.place_bid(listing, "alice", 44).await.unwrap();
        let err = node.place_bid(listing, "bob", 44).await.unwrap_err();
        assert!(matches!(err, OrderError::BidTooLow { minimum: 45, .. }));
        node.place_bid(listing, "bob", 45).await.unwrap();
    }

    #[tokio::test]
    async fn degraded_completion_settles_through_retry() {
        let gateway = RecordingGateway::new();
        let node = node_with(gateway.clone());

        let order = node.create_order(purchase(45)).await.unwrap();
        node.accept_order(order.id, "seller").await.unwrap();

        gateway.set_failing(true);
        let outcome = node
            .confirm_receipt(order.id, "seller", &order.handover_token)
            .await
            .unwrap();
        assert_eq!(outcome.payment, PaymentOutcome::Pending);
        assert_eq!(
            node.get_order(order.id).await.unwrap().status,
            OrderStatus::Completed
        );

        gateway.set_failing(false);
        assert_eq!(node.retry_pending_settlements().await.unwrap(), 1);
        assert_eq!(gateway.recorded_releases().await, vec![(order.id, 45)]);
    }
}
