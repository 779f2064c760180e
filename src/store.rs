//! Order Store - durable record of orders, reviews, and bids
//!
//! The store is the single source of truth. All status writes go through
//! `compare_and_set_status`, the primitive the lifecycle engine relies on
//! for safe concurrent transitions; no component writes status directly.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::OrderResult;
use crate::error::OrderError;
use crate::models::{Bid, Order, OrderEvent, OrderStatus, Review};

/// Persistence boundary for the order pipeline
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persist a newly created order
    async fn create_order(&self, order: Order) -> OrderResult<Order>;

    /// Fetch an order by id
    async fn get_order(&self, id: Uuid) -> OrderResult<Order>;

    /// Atomically set status iff the current status equals `expected`
    ///
    /// Returns the committed order. A mismatch is an `InvalidTransition`
    /// carrying the actual current status; nothing is mutated.
    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: OrderStatus,
        new: OrderStatus,
    ) -> OrderResult<Order>;

    /// Handover codes of a seller's non-terminal orders
    ///
    /// Used at creation time to keep codes unique among the orders a
    /// single seller is actively fulfilling.
    async fn active_handover_codes(&self, seller_party_id: &str) -> OrderResult<HashSet<String>>;

    /// Persist a review, enforcing uniqueness on (order, reviewer)
    ///
    /// The insert and the duplicate check happen under one critical
    /// section, so of two concurrent duplicates at most one succeeds.
    async fn create_review(&self, review: Review) -> OrderResult<Review>;

    /// Find an existing review for an (order, reviewer) pair
    async fn find_review(
        &self,
        order_id: Uuid,
        reviewer_id: &str,
    ) -> OrderResult<Option<Review>>;

    /// Current highest bid for a listing, if any
    async fn get_highest_bid(&self, listing_id: Uuid) -> OrderResult<Option<Bid>>;

    /// Persist an accepted bid
    async fn insert_bid(&self, bid: Bid) -> OrderResult<Bid>;

    /// Append a lifecycle event to the audit trail
    async fn append_event(&self, event: OrderEvent) -> OrderResult<()>;

    /// Audit events recorded for an order, in append order
    async fn events_for(&self, order_id: Uuid) -> OrderResult<Vec<OrderEvent>>;
}

/// In-memory store (in production, this would be a database)
#[derive(Default)]
pub struct MemoryOrderStore {
    orders: Arc<RwLock<HashMap<Uuid, Order>>>,
    reviews: Arc<RwLock<HashMap<(Uuid, String), Review>>>,
    bids: Arc<RwLock<HashMap<Uuid, Vec<Bid>>>>,
    events: Arc<RwLock<Vec<OrderEvent>>>,
}

impl MemoryOrderStore {
    /// Create an empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn create_order(&self, order: Order) -> OrderResult<Order> {
        self.orders.write().await.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: Uuid) -> OrderResult<Order> {
        self.orders
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| OrderError::not_found(format!("Order {} not found", id)))
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        expected: OrderStatus,
        new: OrderStatus,
    ) -> OrderResult<Order> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| OrderError::not_found(format!("Order {} not found", id)))?;

        if order.status != expected {
            return Err(OrderError::invalid_transition(
                order.status,
                format!("{:?}", new),
            ));
        }

        let now = Utc::now();
        order.status = new;
        order.updated_at = now;
        match new {
            OrderStatus::Accepted => order.accepted_at = Some(now),
            OrderStatus::Completed => order.completed_at = Some(now),
            OrderStatus::Cancelled => order.cancelled_at = Some(now),
            _ => {}
        }

        Ok(order.clone())
    }

    async fn active_handover_codes(&self, seller_party_id: &str) -> OrderResult<HashSet<String>> {
        let orders = self.orders.read().await;
        let codes = orders
            .values()
            .filter(|o| o.seller_party_id == seller_party_id && !o.status.is_terminal())
            .map(|o| o.handover_token.clone())
            .collect();

        Ok(codes)
    }

    async fn create_review(&self, review: Review) -> OrderResult<Review> {
        let mut reviews = self.reviews.write().await;
        let key = (review.order_id, review.reviewer_id.clone());

        if reviews.contains_key(&key) {
            return Err(OrderError::AlreadyReviewed);
        }

        reviews.insert(key, review.clone());
        Ok(review)
    }

    async fn find_review(
        &self,
        order_id: Uuid,
        reviewer_id: &str,
    ) -> OrderResult<Option<Review>> {
        let reviews = self.reviews.read().await;
        Ok(reviews.get(&(order_id, reviewer_id.to_string())).cloned())
    }

    async fn get_highest_bid(&self, listing_id: Uuid) -> OrderResult<Option<Bid>> {
        let bids = self.bids.read().await;
        let highest = bids
            .get(&listing_id)
            .and_then(|ledger| ledger.iter().max_by_key(|b| b.amount))
            .cloned();

        Ok(highest)
    }

    async fn insert_bid(&self, bid: Bid) -> OrderResult<Bid> {
        self.bids
            .write()
            .await
            .entry(bid.listing_id)
            .or_default()
            .push(bid.clone());

        Ok(bid)
    }

    async fn append_event(&self, event: OrderEvent) -> OrderResult<()> {
        self.events.write().await.push(event);
        Ok(())
    }

    async fn events_for(&self, order_id: Uuid) -> OrderResult<Vec<OrderEvent>> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|e| e.order_id == order_id)
            .cloned()
            .collect())
    }
}
