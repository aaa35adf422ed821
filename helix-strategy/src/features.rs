//! Microstructure features computed from the top of book and the trade tape.

use helix_core::{OrderbookSnapshot, TradeTape};

/// Point-in-time features; all pure arithmetic on the snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BookFeatures {
    pub imbalance: f64,
    pub microprice: f64,
    pub pressure_bid: f64,
    pub pressure_ask: f64,
    pub sweep_signal: f64,
    pub trend_strength: f64,
}

impl BookFeatures {
    #[must_use]
    pub fn compute(book: &OrderbookSnapshot, tape: &TradeTape) -> Self {
        let spread = (book.best_ask - book.best_bid).max(0.0);
        let mid = if spread > 0.0 {
            book.best_bid + spread / 2.0
        } else {
            book.best_bid
        };
        let depth = book.bid_size + book.ask_size;

        Self {
            imbalance: if depth > 0.0 {
                (book.bid_size - book.ask_size) / depth
            } else {
                0.0
            },
            microprice: if depth > 0.0 {
                (book.best_ask * book.bid_size + book.best_bid * book.ask_size) / depth
            } else {
                mid
            },
            pressure_bid: book.bid_size,
            pressure_ask: book.ask_size,
            sweep_signal: if spread > 0.0 {
                tape.last_size / (depth + 1e-6)
            } else {
                0.0
            },
            trend_strength: if spread > 0.0 {
                (tape.last_price - mid) / (spread + 1e-6)
            } else {
                0.0
            },
        }
    }
}
