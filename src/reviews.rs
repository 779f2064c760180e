//! Review Gate - exactly one review per participant per completed order
//!
//! Eligibility is revalidated at write time rather than trusting a prior
//! client-side check; the store's atomic insert decides races between
//! concurrent duplicate submissions.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::OrderResult;
use crate::error::OrderError;
use crate::models::{OrderStatus, Review, ReviewTag};
use crate::store::OrderStore;

/// Maximum number of tags per review
pub const MAX_REVIEW_TAGS: usize = 3;

/// Review submission request
#[derive(Debug, Clone)]
pub struct SubmitReviewRequest {
    pub order_id: Uuid,
    pub reviewer_id: String,
    pub rating: u8,
    pub tags: Vec<ReviewTag>,
    pub comment: Option<String>,
}

/// Gate enforcing review eligibility and uniqueness
pub struct ReviewGate {
    store: Arc<dyn OrderStore>,
}

impl ReviewGate {
    /// Create a new review gate
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    /// Check whether a party may review an order right now
    ///
    /// True iff the order is Completed, the party participated in it, and
    /// no review from that party exists yet. A true result is advisory:
    /// `submit` revalidates under the store's atomic insert.
    pub async fn can_review(&self, order_id: Uuid, reviewer_id: &str) -> OrderResult<bool> {
        let order = self.store.get_order(order_id).await?;

        if order.status != OrderStatus::Completed || !order.is_participant(reviewer_id) {
            return Ok(false);
        }

        let existing = self.store.find_review(order_id, reviewer_id).await?;
        Ok(existing.is_none())
    }

    /// Submit a review for a completed order
    pub async fn submit(&self, request: SubmitReviewRequest) -> OrderResult<Review> {
        self.validate_request(&request)?;

        let order = self.store.get_order(request.order_id).await?;

        let target = order
            .counterparty(&request.reviewer_id)
            .ok_or_else(|| {
                OrderError::unauthorized("reviewer is not a participant in the order")
            })?
            .to_string();

        if order.status != OrderStatus::Completed {
            return Err(OrderError::OrderNotCompleted {
                status: order.status,
            });
        }

        let review = Review {
            id: Uuid::new_v4(),
            order_id: request.order_id,
            reviewer_id: request.reviewer_id,
            target_user_id: target,
            rating: request.rating,
            tags: request.tags,
            comment: request.comment,
            created_at: Utc::now(),
        };

        // The store insert is the atomic uniqueness point; a concurrent
        // duplicate loses here with AlreadyReviewed.
        let review = self.store.create_review(review).await?;

        info!(order_id = %review.order_id, reviewer = %review.reviewer_id, "stored review");

        Ok(review)
    }

    fn validate_request(&self, request: &SubmitReviewRequest) -> OrderResult<()> {
        if !(1..=5).contains(&request.rating) {
            return Err(OrderError::validation(format!(
                "rating must be between 1 and 5, got {}",
                request.rating
            )));
        }

        if request.tags.len() > MAX_REVIEW_TAGS {
            return Err(OrderError::validation(format!(
                "at most {} tags allowed, got {}",
                MAX_REVIEW_TAGS,
                request.tags.len()
            )));
        }

        let distinct: HashSet<&ReviewTag> = request.tags.iter().collect();
        if distinct.len() != request.tags.len() {
            return Err(OrderError::validation("duplicate tags are not allowed"));
        }

        Ok(())
    }
}
