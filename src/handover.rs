//! Handover Verifier - proof of physical co-presence
//!
//! Each order carries a single-use 6-digit code. The buyer presents it in
//! person (scannable encoding or copyable literal); the seller submits it
//! for verification. The code is consumed implicitly when the order leaves
//! the Accepted state.

use std::collections::HashSet;

use uuid::Uuid;

use crate::OrderResult;
use crate::error::OrderError;
use crate::models::Order;

/// Configuration for the handover verifier
#[derive(Debug, Clone)]
pub struct HandoverConfig {
    /// Number of digits in the handover code
    pub code_digits: u32,
    /// Attempts to re-draw before giving up on a unique code
    pub max_generation_attempts: u32,
}

impl Default for HandoverConfig {
    fn default() -> Self {
        Self {
            code_digits: 6,
            max_generation_attempts: 32,
        }
    }
}

/// Generates and validates handover codes
#[derive(Debug, Clone, Default)]
pub struct HandoverVerifier {
    config: HandoverConfig,
}

impl HandoverVerifier {
    /// Create a new verifier
    pub fn new(config: HandoverConfig) -> Self {
        Self { config }
    }

    /// Generate a code unique among a seller's active orders
    ///
    /// `in_use` holds the codes of that seller's non-terminal orders; a
    /// collision there would confuse scans across concurrent handovers,
    /// so colliding draws are discarded.
    pub fn generate_code(&self, in_use: &HashSet<String>) -> OrderResult<String> {
        for _ in 0..self.config.max_generation_attempts {
            let code = self.draw_code();
            if !in_use.contains(&code) {
                return Ok(code);
            }
        }

        Err(OrderError::dependency(format!(
            "could not draw a unique handover code in {} attempts",
            self.config.max_generation_attempts
        )))
    }

    /// Verify a presented code against an order awaiting handover
    ///
    /// Succeeds iff the order is Accepted and the code matches. The
    /// idempotent re-presentation of a completed order's code is handled
    /// by the lifecycle engine before this check.
    pub fn verify(&self, order: &Order, presented: &str) -> OrderResult<()> {
        if !order.status.can_confirm() {
            return Err(OrderError::OrderNotReady {
                status: order.status,
            });
        }

        if presented != order.handover_token {
            return Err(OrderError::TokenMismatch);
        }

        Ok(())
    }

    /// Draw a uniform code from UUID v4 entropy
    fn draw_code(&self) -> String {
        let modulus = 10u32.pow(self.config.code_digits);
        let bytes = Uuid::new_v4().into_bytes();
        let raw = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);

        format!("{:0width$}", raw % modulus, width = self.config.code_digits as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderKind, OrderStatus};

    fn order_with(status: OrderStatus, token: &str) -> Order {
        let mut o = Order::new(
            OrderKind::Purchase,
            "buyer".to_string(),
            "seller".to_string(),
            "listing-1".to_string(),
            45,
            token.to_string(),
        );
        o.status = status;
        o
    }

    #[test]
    fn generated_codes_have_six_digits() {
        let verifier = HandoverVerifier::default();
        for _ in 0..100 {
            let code = verifier.generate_code(&HashSet::new()).unwrap();
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn generation_avoids_codes_in_use() {
        let verifier = HandoverVerifier::default();

        // Seed the in-use set with a batch of draws, then make sure a
        // fresh draw never lands on one of them.
        let mut in_use = HashSet::new();
        for _ in 0..50 {
            in_use.insert(verifier.generate_code(&in_use).unwrap());
        }
        assert_eq!(in_use.len(), 50);

        let fresh = verifier.generate_code(&in_use).unwrap();
        assert!(!in_use.contains(&fresh));
    }

    #[test]
    fn verify_requires_accepted_state() {
        let verifier = HandoverVerifier::default();

        let err = verifier
            .verify(&order_with(OrderStatus::Pending, "123456"), "123456")
            .unwrap_err();
        assert!(matches!(err, OrderError::OrderNotReady { status: OrderStatus::Pending }));

        let err = verifier
            .verify(&order_with(OrderStatus::Cancelled, "123456"), "123456")
            .unwrap_err();
        assert!(matches!(err, OrderError::OrderNotReady { .. }));
    }

    #[test]
    fn verify_rejects_wrong_code() {
        let verifier = HandoverVerifier::default();
        let order = order_with(OrderStatus::Accepted, "123456");

        assert!(matches!(
            verifier.verify(&order, "654321").unwrap_err(),
            OrderError::TokenMismatch
        ));
        assert!(verifier.verify(&order, "123456").is_ok());
    }
}
