//! Bid Ledger - strictly increasing bid sequence per listing
//!
//! Concurrent bids on one listing are serialized through a per-listing
//! lock, so two bids racing to exceed the same current highest cannot
//! both succeed; the loser is re-evaluated against the winner's committed
//! amount. Notifying the outbid party is left to the realtime layer.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::OrderResult;
use crate::error::OrderError;
use crate::models::Bid;
use crate::store::OrderStore;

/// Minimum increment over the current highest bid, in currency units
pub const MIN_BID_INCREMENT: i64 = 1;

/// Ledger enforcing the minimum-increment rule per listing
pub struct BidLedger {
    store: Arc<dyn OrderStore>,
    listing_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl BidLedger {
    /// Create a new bid ledger
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self {
            store,
            listing_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Place a bid on a listing
    ///
    /// Requires `amount >= current highest + MIN_BID_INCREMENT` (a first
    /// bid must clear the increment above zero). Rejection mutates
    /// nothing and carries the minimum the caller must meet.
    pub async fn place_bid(
        &self,
        listing_id: Uuid,
        bidder_id: &str,
        amount: i64,
    ) -> OrderResult<Bid> {
        if bidder_id.trim().is_empty() {
            return Err(OrderError::validation("bidder id cannot be empty"));
        }

        let lock = self.listing_lock(listing_id).await;
        let _guard = lock.lock().await;

        let highest = self.store.get_highest_bid(listing_id).await?;
        let minimum = highest.as_ref().map(|b| b.amount).unwrap_or(0) + MIN_BID_INCREMENT;

        if amount < minimum {
            return Err(OrderError::BidTooLow {
                offered: amount,
                minimum,
            });
        }

        let bid = Bid {
            id: Uuid::new_v4(),
            listing_id,
            bidder_id: bidder_id.to_string(),
            amount,
            placed_at: Utc::now(),
        };

        let bid = self.store.insert_bid(bid).await?;

        info!(listing_id = %listing_id, amount, "accepted bid");

        Ok(bid)
    }

    /// Current highest accepted bid for a listing
    pub async fn highest_bid(&self, listing_id: Uuid) -> OrderResult<Option<Bid>> {
        self.store.get_highest_bid(listing_id).await
    }

    async fn listing_lock(&self, listing_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.listing_locks.lock().await;
        locks
            .entry(listing_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryOrderStore;

    fn ledger() -> Arc<BidLedger> {
        Arc::new(BidLedger::new(Arc::new(MemoryOrderStore::new())))
    }

    #[tokio::test]
    async fn bids_must_clear_the_minimum_increment() {
        let ledger = ledger();
        let listing = Uuid::new_v4();

        // Seed the ledger up to a highest of 44.
        ledger.place_bid(listing, "alice", 44).await.unwrap();

        let err = ledger.place_bid(listing, "bob", 44).await.unwrap_err();
        assert!(matches!(err, OrderError::BidTooLow { offered: 44, minimum: 45 }));

        let bid = ledger.place_bid(listing, "bob", 45).await.unwrap();
        assert_eq!(bid.amount, 45);
        assert_eq!(ledger.highest_bid(listing).await.unwrap().unwrap().amount, 45);
    }

    #[tokio::test]
    async fn first_bid_must_be_at_least_one_unit() {
        let ledger = ledger();
        let listing = Uuid::new_v4();

        let err = ledger.place_bid(listing, "alice", 0).await.unwrap_err();
        assert!(matches!(err, OrderError::BidTooLow { offered: 0, minimum: 1 }));
        assert!(ledger.place_bid(listing, "alice", 1).await.is_ok());
    }

    #[tokio::test]
    async fn rejected_bid_mutates_nothing() {
        let ledger = ledger();
        let listing = Uuid::new_v4();
        ledger.place_bid(listing, "alice", 10).await.unwrap();

        let _ = ledger.place_bid(listing, "bob", 5).await;
        let highest = ledger.highest_bid(listing).await.unwrap().unwrap();
        assert_eq!(highest.amount, 10);
        assert_eq!(highest.bidder_id, "alice");
    }

    #[tokio::test]
    async fn listings_are_independent() {
        let ledger = ledger();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        ledger.place_bid(first, "alice", 100).await.unwrap();

        // A low bid on another listing is judged against that listing only.
        assert!(ledger.place_bid(second, "bob", 1).await.is_ok());
    }

    #[tokio::test]
    async fn racing_bids_serialize_and_the_higher_one_wins() {
        let ledger = ledger();
        let listing = Uuid::new_v4();
        ledger.place_bid(listing, "alice", 44).await.unwrap();

        let low = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.place_bid(listing, "bob", 45).await })
        };
        let high = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.place_bid(listing, "carol", 46).await })
        };

        let (low, high) = (low.await.unwrap(), high.await.unwrap());

        // The higher bid always stands; the lower one either landed first
        // (then was outbid) or lost the race and was rejected as too low.
        assert!(high.is_ok());
        if let Err(err) = low {
            assert!(matches!(err, OrderError::BidTooLow { offered: 45, minimum: 47 }));
        }
        assert_eq!(ledger.highest_bid(listing).await.unwrap().unwrap().amount, 46);
    }
}
