//! Error types for the order pipeline
//!
//! Validation failures are deterministic and surfaced to the caller with
//! enough context to correct the request; dependency failures are the only
//! variant eligible for internal retry.

use thiserror::Error;

use crate::models::OrderStatus;

/// Main error type for order pipeline operations
#[derive(Error, Debug)]
pub enum OrderError {
    /// Attempted state change not legal from the current state
    #[error("Invalid transition: {attempted} not allowed from {current:?}")]
    InvalidTransition {
        current: OrderStatus,
        attempted: String,
    },

    /// Acting party is not a legitimate participant for the requested action
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Presented handover code does not match the order's code
    #[error("Handover code mismatch")]
    TokenMismatch,

    /// Handover verification attempted while the order is not awaiting it
    #[error("Order not ready for handover verification (status {status:?})")]
    OrderNotReady { status: OrderStatus },

    /// A review for this (order, reviewer) pair already exists
    #[error("Already reviewed")]
    AlreadyReviewed,

    /// Review submitted against an order that has not completed
    #[error("Order not completed (status {status:?})")]
    OrderNotCompleted { status: OrderStatus },

    /// Bid does not clear the current highest plus the minimum increment
    #[error("Bid too low: offered {offered}, minimum {minimum}")]
    BidTooLow { offered: i64, minimum: i64 },

    /// Request validation errors (malformed input, bad amounts, bad tags)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The payment collaborator or store is unreachable
    #[error("Dependency failure: {0}")]
    DependencyFailure(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OrderError {
    /// Create an invalid transition error
    pub fn invalid_transition<S: Into<String>>(current: OrderStatus, attempted: S) -> Self {
        Self::InvalidTransition {
            current,
            attempted: attempted.into(),
        }
    }

    /// Create an unauthorized error
    pub fn unauthorized<S: Into<String>>(msg: S) -> Self {
        Self::Unauthorized(msg.into())
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a dependency failure error
    pub fn dependency<S: Into<String>>(msg: S) -> Self {
        Self::DependencyFailure(msg.into())
    }
}
