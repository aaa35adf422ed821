//! L2 delta stream to order book reconstruction with replay invariants.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use tracing::debug;

use crate::{BookDelta, EngineError, OrderbookSnapshot, PriceLevel, Price, Qty, Side, EPS};

/// Periodic top-of-book row for deterministic comparison against the
/// recorder's view.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BookcheckRow {
    pub ts_ms: i64,
    pub seq: i64,
    pub best_bid: Price,
    pub best_ask: Price,
    pub bid_size: Qty,
    pub ask_size: Qty,
}

/// Rebuilds the book from an ordered delta stream.
///
/// The reconstructor trusts the recorder: any inconsistency discovered during
/// replay (sequence gap or rollback, negative quantity, crossed or empty top
/// of book outside a snapshot load) is a bug elsewhere and is fatal rather
/// than absorbed.
pub struct BookReconstructor {
    bids: BTreeMap<Reverse<OrderedFloat<f64>>, Qty>,
    asks: BTreeMap<OrderedFloat<f64>, Qty>,
    snapshot: OrderbookSnapshot,
    last_seq: i64,
    last_ts: i64,
    snapshot_in_progress: bool,
    applied: u64,
    bookcheck_every: u64,
}

impl Default for BookReconstructor {
    fn default() -> Self {
        Self::new()
    }
}

impl BookReconstructor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            snapshot: OrderbookSnapshot::default(),
            last_seq: -1,
            last_ts: 0,
            snapshot_in_progress: true,
            applied: 0,
            bookcheck_every: 0,
        }
    }

    /// Emit a [`BookcheckRow`] from every `every`-th applied delta (0 disables).
    #[must_use]
    pub fn with_bookcheck_every(mut self, every: u64) -> Self {
        self.bookcheck_every = every;
        self
    }

    /// The book state after the most recently applied delta.
    #[must_use]
    pub fn snapshot(&self) -> &OrderbookSnapshot {
        &self.snapshot
    }

    #[must_use]
    pub fn last_seq(&self) -> i64 {
        self.last_seq
    }

    /// True until both sides of the book have been populated after a
    /// (re)snapshot; invariants are not enforced while loading.
    #[must_use]
    pub fn snapshot_in_progress(&self) -> bool {
        self.snapshot_in_progress
    }

    /// Apply one delta, enforce the replay invariants, and return the
    /// periodic bookcheck row when due.
    pub fn apply(&mut self, delta: &BookDelta) -> Result<Option<BookcheckRow>, EngineError> {
        let implicit_snapshot = !delta.is_snapshot && delta.prev_seq == 0;
        if delta.is_snapshot || implicit_snapshot {
            if implicit_snapshot {
                debug!(seq = delta.seq, "implicit snapshot: prev_seq=0 clears the book");
            }
            self.bids.clear();
            self.asks.clear();
            self.snapshot_in_progress = true;
        } else {
            if self.last_seq >= 0 && delta.prev_seq != self.last_seq {
                return Err(EngineError::SeqGap {
                    seq: delta.seq,
                    prev_seq: delta.prev_seq,
                    last_seq: self.last_seq,
                });
            }
            if delta.seq <= self.last_seq {
                return Err(EngineError::SeqRollback {
                    seq: delta.seq,
                    last_seq: self.last_seq,
                });
            }
        }

        self.last_seq = delta.seq;
        self.last_ts = (self.last_ts + 1).max(delta.ts_ms);

        if delta.qty < 0.0 {
            return Err(EngineError::NegativeQty {
                seq: delta.seq,
                qty: delta.qty,
            });
        }
        let delete = delta.qty.abs() < EPS;
        match delta.side {
            Side::Buy => {
                let key = Reverse(OrderedFloat(delta.price));
                if delete {
                    self.bids.remove(&key);
                } else {
                    self.bids.insert(key, delta.qty);
                }
            }
            Side::Sell => {
                let key = OrderedFloat(delta.price);
                if delete {
                    self.asks.remove(&key);
                } else {
                    self.asks.insert(key, delta.qty);
                }
            }
            Side::Hold => {}
        }

        self.rebuild_snapshot();

        if self.snapshot_in_progress && !self.bids.is_empty() && !self.asks.is_empty() {
            self.snapshot_in_progress = false;
        }
        if !self.snapshot_in_progress && !self.snapshot.is_valid() {
            return Err(EngineError::InvalidTopOfBook {
                seq: delta.seq,
                best_bid: self.snapshot.best_bid,
                best_ask: self.snapshot.best_ask,
                bid_size: self.snapshot.bid_size,
                ask_size: self.snapshot.ask_size,
            });
        }

        self.applied += 1;
        if self.bookcheck_every > 0 && self.applied % self.bookcheck_every == 0 {
            return Ok(Some(BookcheckRow {
                ts_ms: self.snapshot.ts_ms,
                seq: self.last_seq,
                best_bid: self.snapshot.best_bid,
                best_ask: self.snapshot.best_ask,
                bid_size: self.snapshot.bid_size,
                ask_size: self.snapshot.ask_size,
            }));
        }
        Ok(None)
    }

    fn rebuild_snapshot(&mut self) {
        self.snapshot.ts_ms = self.last_ts;
        self.snapshot.bids.clear();
        self.snapshot.asks.clear();
        self.snapshot.best_bid = 0.0;
        self.snapshot.best_ask = 0.0;
        self.snapshot.bid_size = 0.0;
        self.snapshot.ask_size = 0.0;

        for (price, qty) in &self.bids {
            if *qty <= 0.0 {
                continue;
            }
            self.snapshot.bids.push(PriceLevel {
                price: price.0.into_inner(),
                qty: *qty,
            });
        }
        for (price, qty) in &self.asks {
            if *qty <= 0.0 {
                continue;
            }
            self.snapshot.asks.push(PriceLevel {
                price: price.into_inner(),
                qty: *qty,
            });
        }
        if let Some(top) = self.snapshot.bids.first() {
            self.snapshot.best_bid = top.price;
            self.snapshot.bid_size = top.qty;
        }
        if let Some(top) = self.snapshot.asks.first() {
            self.snapshot.best_ask = top.price;
            self.snapshot.ask_size = top.qty;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(seq: i64, prev: i64, snap: bool, ts: i64, side: Side, price: f64, qty: f64) -> BookDelta {
        BookDelta {
            seq,
            prev_seq: prev,
            is_snapshot: snap,
            ts_ms: ts,
            side,
            price,
            qty,
        }
    }

    fn seeded() -> BookReconstructor {
        let mut book = BookReconstructor::new();
        book.apply(&delta(1, 0, true, 1000, Side::Buy, 100.0, 5.0)).unwrap();
        book.apply(&delta(2, 1, false, 1001, Side::Sell, 100.5, 4.0)).unwrap();
        book
    }

    #[test]
    fn snapshot_then_deltas_build_a_valid_book() {
        let book = seeded();
        let snap = book.snapshot();
        assert!(snap.is_valid());
        assert_eq!(snap.best_bid, 100.0);
        assert_eq!(snap.best_ask, 100.5);
        assert_eq!(snap.bid_size, 5.0);
        assert_eq!(snap.ask_size, 4.0);
        assert!(!book.snapshot_in_progress());
    }

    #[test]
    fn tops_track_the_extreme_levels() {
        let mut book = seeded();
        book.apply(&delta(3, 2, false, 1002, Side::Buy, 100.2, 1.0)).unwrap();
        book.apply(&delta(4, 3, false, 1003, Side::Sell, 100.4, 2.0)).unwrap();
        let snap = book.snapshot();
        assert_eq!(snap.best_bid, 100.2);
        assert_eq!(snap.best_ask, 100.4);
        assert_eq!(snap.bids.len(), 2);
        assert_eq!(snap.asks.len(), 2);
        // Bids descending, asks ascending.
        assert!(snap.bids[0].price > snap.bids[1].price);
        assert!(snap.asks[0].price < snap.asks[1].price);
    }

    #[test]
    fn zero_qty_deletes_the_level() {
        let mut book = seeded();
        book.apply(&delta(3, 2, false, 1002, Side::Buy, 99.9, 2.0)).unwrap();
        book.apply(&delta(4, 3, false, 1003, Side::Buy, 99.9, 0.0)).unwrap();
        assert_eq!(book.snapshot().bids.len(), 1);
        assert_eq!(book.snapshot().best_bid, 100.0);
    }

    #[test]
    fn seq_gap_is_fatal() {
        let mut book = seeded();
        let err = book
            .apply(&delta(9, 7, false, 1002, Side::Buy, 99.0, 1.0))
            .unwrap_err();
        assert!(matches!(err, EngineError::SeqGap { .. }));
    }

    #[test]
    fn seq_rollback_is_fatal() {
        let mut book = seeded();
        let err = book
            .apply(&delta(2, 2, false, 1002, Side::Buy, 99.0, 1.0))
            .unwrap_err();
        assert!(matches!(err, EngineError::SeqRollback { .. }));
    }

    #[test]
    fn negative_qty_is_fatal() {
        let mut book = seeded();
        let err = book
            .apply(&delta(3, 2, false, 1002, Side::Buy, 99.0, -1.0))
            .unwrap_err();
        assert!(matches!(err, EngineError::NegativeQty { .. }));
    }

    #[test]
    fn crossed_book_is_fatal_once_loaded() {
        let mut book = seeded();
        let err = book
            .apply(&delta(3, 2, false, 1002, Side::Buy, 101.0, 1.0))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTopOfBook { .. }));
    }

    #[test]
    fn emptying_one_side_is_fatal_after_load() {
        let mut book = seeded();
        let err = book
            .apply(&delta(3, 2, false, 1002, Side::Sell, 100.5, 0.0))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidTopOfBook { .. }));
    }

    #[test]
    fn implicit_snapshot_clears_the_book() {
        let mut book = seeded();
        book.apply(&delta(10, 0, false, 2000, Side::Buy, 50.0, 1.0)).unwrap();
        assert!(book.snapshot_in_progress());
        assert_eq!(book.snapshot().bids.len(), 1);
        assert_eq!(book.snapshot().best_bid, 50.0);
        book.apply(&delta(11, 10, false, 2001, Side::Sell, 50.5, 1.0)).unwrap();
        assert!(!book.snapshot_in_progress());
        assert!(book.snapshot().is_valid());
    }

    #[test]
    fn logical_time_is_strictly_monotonic() {
        let mut book = seeded();
        let before = book.snapshot().ts_ms;
        // A stale timestamp still advances logical time by one.
        book.apply(&delta(3, 2, false, 0, Side::Buy, 99.5, 1.0)).unwrap();
        assert_eq!(book.snapshot().ts_ms, before + 1);
        book.apply(&delta(4, 3, false, 5000, Side::Buy, 99.6, 1.0)).unwrap();
        assert_eq!(book.snapshot().ts_ms, 5000);
    }

    #[test]
    fn bookcheck_rows_are_emitted_on_schedule() {
        let mut book = BookReconstructor::new().with_bookcheck_every(2);
        assert!(book
            .apply(&delta(1, 0, true, 1000, Side::Buy, 100.0, 5.0))
            .unwrap()
            .is_none());
        let row = book
            .apply(&delta(2, 1, false, 1001, Side::Sell, 100.5, 4.0))
            .unwrap()
            .expect("second applied delta is due");
        assert_eq!(row.seq, 2);
        assert_eq!(row.best_bid, 100.0);
        assert_eq!(row.best_ask, 100.5);
        assert!(book
            .apply(&delta(3, 2, false, 1002, Side::Buy, 99.9, 1.0))
            .unwrap()
            .is_none());
    }
}
