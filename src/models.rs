//! Core data models for the order pipeline
//!
//! This module contains the order record, its status state machine,
//! reviews, bids, and the realtime/audit event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::OrderResult;
use crate::error::OrderError;

/// Order kind discriminant
///
/// The kind determines which party holds the buyer role and which the
/// seller role, and which initial status a new order starts in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    /// Direct purchase of a listed item
    Purchase,
    /// Direct sale of a listed item
    Sale,
    /// Booking of a service slot
    Booking,
    /// Accepted offer on a listing
    Offer,
}

impl OrderKind {
    /// Initial status for a newly created order of this kind
    pub fn initial_status(&self) -> OrderStatus {
        match self {
            Self::Purchase | Self::Sale => OrderStatus::Pending,
            Self::Booking | Self::Offer => OrderStatus::Requested,
        }
    }
}

/// Order status state machine enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Funds committed, awaiting seller acceptance
    Pending,
    /// Booking/offer requested, awaiting provider acceptance
    Requested,
    /// Seller accepted, awaiting in-person handover
    Accepted,
    /// Handover verified, escrow released
    Completed,
    /// Cancelled by either party, escrow refunded
    Cancelled,
}

impl OrderStatus {
    /// Check if this is a terminal state (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Check if this state allows acceptance
    pub fn can_accept(&self) -> bool {
        matches!(self, Self::Pending | Self::Requested)
    }

    /// Check if this state allows handover confirmation
    pub fn can_confirm(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    /// Check if this state allows cancellation
    pub fn can_cancel(&self) -> bool {
        !self.is_terminal()
    }
}

/// Order model representing a transaction or booking between two parties
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub kind: OrderKind,

    // Parties (immutable after creation)
    pub buyer_party_id: String,
    pub seller_party_id: String,

    // Listing/service being transacted (immutable)
    pub item_ref: String,

    // Monetary value agreed at creation, in whole currency units (immutable)
    pub amount: i64,

    // The only mutable field driving business logic
    pub status: OrderStatus,

    // Single-use proof of handover, shown to the buyer as a scannable
    // encoding and a copyable literal, never sent to the seller
    pub handover_token: String,

    // Timestamps
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Create a new order in its kind's initial status
    pub fn new(
        kind: OrderKind,
        buyer_party_id: String,
        seller_party_id: String,
        item_ref: String,
        amount: i64,
        handover_token: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            buyer_party_id,
            seller_party_id,
            item_ref,
            amount,
            status: kind.initial_status(),
            handover_token,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            accepted_at: None,
            completed_at: None,
            cancelled_at: None,
        }
    }

    /// Check whether a party holds the buyer role in this order
    pub fn is_buyer_role(&self, party_id: &str) -> bool {
        self.buyer_party_id == party_id
    }

    /// Check whether a party holds the seller role in this order
    pub fn is_seller_role(&self, party_id: &str) -> bool {
        self.seller_party_id == party_id
    }

    /// Check whether a party participates in this order at all
    pub fn is_participant(&self, party_id: &str) -> bool {
        self.is_buyer_role(party_id) || self.is_seller_role(party_id)
    }

    /// Counterparty of the given participant
    pub fn counterparty(&self, party_id: &str) -> Option<&str> {
        if self.is_buyer_role(party_id) {
            Some(&self.seller_party_id)
        } else if self.is_seller_role(party_id) {
            Some(&self.buyer_party_id)
        } else {
            None
        }
    }

    /// Validate a state transition against the legal edge set
    ///
    /// Legal edges: Pending/Requested -> Accepted, Accepted -> Completed,
    /// any non-terminal -> Cancelled. Completed and Cancelled are terminal.
    pub fn validate_transition(&self, to: OrderStatus) -> OrderResult<()> {
        let valid = match (self.status, to) {
            (OrderStatus::Pending, OrderStatus::Accepted) => true,
            (OrderStatus::Requested, OrderStatus::Accepted) => true,
            (OrderStatus::Accepted, OrderStatus::Completed) => true,
            (OrderStatus::Pending, OrderStatus::Cancelled) => true,
            (OrderStatus::Requested, OrderStatus::Cancelled) => true,
            (OrderStatus::Accepted, OrderStatus::Cancelled) => true,
            _ => false,
        };

        if valid {
            Ok(())
        } else {
            Err(OrderError::invalid_transition(
                self.status,
                format!("{:?}", to),
            ))
        }
    }
}

/// Fixed review tag vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReviewTag {
    Friendly,
    Punctual,
    AsDescribed,
    GoodCommunication,
    FairPrice,
    WouldTradeAgain,
}

/// Review model, unique per (order, reviewer)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: Uuid,
    pub order_id: Uuid,
    pub reviewer_id: String,
    pub target_user_id: String,
    /// Integer rating from 1 to 5
    pub rating: u8,
    /// At most 3 distinct tags from the fixed vocabulary
    pub tags: Vec<ReviewTag>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Bid model for the per-listing bid ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bid {
    pub id: Uuid,
    pub listing_id: Uuid,
    pub bidder_id: String,
    pub amount: i64,
    pub placed_at: DateTime<Utc>,
}

/// Realtime status-change event pushed to order subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub order_id: Uuid,
    pub kind: OrderKind,
    pub status: OrderStatus,
    pub changed_at: DateTime<Utc>,
}

/// Append-only audit record of a lifecycle event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
    pub event_type: String,
    pub order_id: Uuid,
    pub actor: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
