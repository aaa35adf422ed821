//! Releases trade prints no earlier than the book clock.

use helix_core::TradePrint;

/// Cursor over the loaded trade tape. Prints are released in input order and
/// never ahead of `now_ts`.
pub struct TradeDrainer {
    trades: Vec<TradePrint>,
    cursor: usize,
}

impl TradeDrainer {
    #[must_use]
    pub fn new(trades: Vec<TradePrint>) -> Self {
        Self { trades, cursor: 0 }
    }

    /// Ordered prefix of remaining trades with `ts_ms <= now_ts`.
    pub fn drain_up_to(&mut self, now_ts: i64) -> &[TradePrint] {
        let start = self.cursor;
        while self.cursor < self.trades.len() && self.trades[self.cursor].ts_ms <= now_ts {
            self.cursor += 1;
        }
        &self.trades[start..self.cursor]
    }

    /// Trades not yet released.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.trades.len() - self.cursor
    }
}
