//! Order pipeline for a peer-to-peer marketplace
//!
//! This crate governs a transaction from funds committed through verified
//! physical handover to escrow release and review eligibility:
//! - A state machine that is the sole authority over order status
//! - A one-time 6-digit handover code proving the parties met in person
//! - Realtime fan-out of status changes to subscribed parties
//! - At most one review per participant per completed order
//! - A strictly increasing bid ledger per listing

pub mod bids;
pub mod error;
pub mod handover;
pub mod lifecycle;
pub mod models;
pub mod node;
pub mod notifier;
pub mod payments;
pub mod reviews;
pub mod store;

use error::OrderError;

/// Result type alias for order pipeline operations
pub type OrderResult<T> = Result<T, OrderError>;
