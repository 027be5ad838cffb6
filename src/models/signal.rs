use serde::{Deserialize, Serialize};

/// Trade direction. Drives the sorting and price-filtering rules in §4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// The canonical structured order intent parsed from a `Message`.
///
/// Invariant (§8.1): directional monotonicity.
/// BUY:  `sl < min(entries) <= max(entries) < min(tps)`
/// SELL: `sl > max(entries) >= min(entries) > max(tps)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: i64,
    pub message_id: i64,
    pub symbol: String,
    pub side: Side,
    /// Ordered per §4.1: BUY descending, SELL ascending.
    pub entries: Vec<f64>,
    /// Ordered per §4.1: BUY ascending, SELL descending.
    pub tps: Vec<f64>,
    pub sl: f64,
}

impl Signal {
    /// Checks the directional-monotonicity invariant (§8.1). Does not check sort order;
    /// see [`Signal::has_correct_sort_order`] for that.
    pub fn is_directionally_monotonic(&self) -> bool {
        if self.entries.is_empty() || self.tps.is_empty() {
            return false;
        }
        let min_entry = self.entries.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_entry = self
            .entries
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        let min_tp = self.tps.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_tp = self.tps.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        match self.side {
            Side::Buy => self.sl < min_entry && max_entry < min_tp,
            Side::Sell => self.sl > max_entry && min_entry > max_tp,
        }
    }

    /// Checks the sort-order invariant (§8.2).
    pub fn has_correct_sort_order(&self) -> bool {
        match self.side {
            Side::Buy => {
                is_sorted_desc(&self.entries) && is_sorted_asc(&self.tps)
            }
            Side::Sell => {
                is_sorted_asc(&self.entries) && is_sorted_desc(&self.tps)
            }
        }
    }
}

fn is_sorted_asc(xs: &[f64]) -> bool {
    xs.windows(2).all(|w| w[0] <= w[1])
}

fn is_sorted_desc(xs: &[f64]) -> bool {
    xs.windows(2).all(|w| w[0] >= w[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buy_signal() -> Signal {
        Signal {
            id: 1,
            message_id: 1,
            symbol: "EURUSD".into(),
            side: Side::Buy,
            entries: vec![1.10],
            tps: vec![1.11, 1.12],
            sl: 1.095,
        }
    }

    #[test]
    fn buy_signal_is_monotonic_and_sorted() {
        let s = buy_signal();
        assert!(s.is_directionally_monotonic());
        assert!(s.has_correct_sort_order());
    }

    #[test]
    fn sell_signal_mirrors_buy() {
        let s = Signal {
            side: Side::Sell,
            entries: vec![2400.0],
            tps: vec![2380.0, 2360.0],
            sl: 2420.0,
            ..buy_signal()
        };
        assert!(s.is_directionally_monotonic());
        assert!(s.has_correct_sort_order());
    }

    #[test]
    fn detects_non_monotonic_buy() {
        let s = Signal {
            sl: 1.20, // above entries -> invalid for BUY
            ..buy_signal()
        };
        assert!(!s.is_directionally_monotonic());
    }
}
