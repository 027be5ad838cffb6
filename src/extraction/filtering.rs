//! Price sorting and filtering (§4.1, reapplied by the distribution engine per §4.3).
//!
//! This module codifies the single-sl variant of `filter_invalid_prices`: the source
//! repo carried a second, multi-sl/percentage-range variant that this codebase does not
//! implement (see the resolved Open Question in SPEC_FULL.md §9).

use crate::models::Side;

/// Raised when `ignore_invalid_prices` is false and price filtering would otherwise
/// discard every entry or every tp (§8.12).
#[derive(Debug, Clone, thiserror::Error)]
#[error("price filtering left no valid {0}")]
pub struct PriceFilterError(pub &'static str);

/// Sorts entries/tps/sl per §4.1: BUY entries descending (layer 1 = closest to market),
/// tps ascending, sl descending; SELL mirrored.
pub fn sort_prices(side: Side, entries: &mut Vec<f64>, tps: &mut Vec<f64>) {
    match side {
        Side::Buy => {
            entries.sort_by(|a, b| b.partial_cmp(a).unwrap());
            tps.sort_by(|a, b| a.partial_cmp(b).unwrap());
        }
        Side::Sell => {
            entries.sort_by(|a, b| a.partial_cmp(b).unwrap());
            tps.sort_by(|a, b| b.partial_cmp(a).unwrap());
        }
    }
}

/// Parameters governing price filtering, mirrored from `CopySetupConfig` so this function
/// has no dependency on the full config type (kept reusable from both the extraction
/// pipeline and the distribution engine, per §4.3's "re-apply filter_invalid_prices").
pub struct FilterParams {
    pub max_entries: usize,
    pub max_tps: usize,
    pub ignore_invalid_prices: bool,
}

/// Applies the price-filtering rule from §4.1, after sorting.
///
/// BUY: discard entries with `entry <= sl`; from the remainder compute `max_entry`;
/// discard tps with `tp <= max_entry`. SELL mirrored. Caps `max_entries`/`max_tps` are
/// applied afterward, truncating from the head (the layers closest to the market survive
/// a cap, per the sort order above).
pub fn filter_invalid_prices(
    side: Side,
    sl: f64,
    entries: &[f64],
    tps: &[f64],
    params: &FilterParams,
) -> Result<(Vec<f64>, Vec<f64>), PriceFilterError> {
    let mut entries: Vec<f64> = match side {
        Side::Buy => entries.iter().copied().filter(|&e| e > sl).collect(),
        Side::Sell => entries.iter().copied().filter(|&e| e < sl).collect(),
    };

    if entries.is_empty() {
        if params.ignore_invalid_prices {
            return Ok((Vec::new(), Vec::new()));
        }
        return Err(PriceFilterError("entries"));
    }

    let mut tps: Vec<f64> = match side {
        Side::Buy => {
            let max_entry = entries.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            tps.iter().copied().filter(|&t| t > max_entry).collect()
        }
        Side::Sell => {
            let min_entry = entries.iter().copied().fold(f64::INFINITY, f64::min);
            tps.iter().copied().filter(|&t| t < min_entry).collect()
        }
    };

    if tps.is_empty() {
        if params.ignore_invalid_prices {
            return Ok((Vec::new(), Vec::new()));
        }
        return Err(PriceFilterError("tps"));
    }

    entries.truncate(params.max_entries);
    tps.truncate(params.max_tps);

    Ok((entries, tps))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> FilterParams {
        FilterParams {
            max_entries: 5,
            max_tps: 5,
            ignore_invalid_prices: true,
        }
    }

    #[test]
    fn sorts_buy_descending_entries_ascending_tps() {
        let mut entries = vec![1.0, 1.2, 1.1];
        let mut tps = vec![1.4, 1.3, 1.5];
        sort_prices(Side::Buy, &mut entries, &mut tps);
        assert_eq!(entries, vec![1.2, 1.1, 1.0]);
        assert_eq!(tps, vec![1.3, 1.4, 1.5]);
    }

    #[test]
    fn sorts_sell_ascending_entries_descending_tps() {
        let mut entries = vec![2400.0, 2380.0, 2390.0];
        let mut tps = vec![2360.0, 2370.0, 2350.0];
        sort_prices(Side::Sell, &mut entries, &mut tps);
        assert_eq!(entries, vec![2380.0, 2390.0, 2400.0]);
        assert_eq!(tps, vec![2370.0, 2360.0, 2350.0]);
    }

    #[test]
    fn drops_buy_entries_below_sl_and_tps_below_max_entry() {
        let (entries, tps) =
            filter_invalid_prices(Side::Buy, 1.095, &[1.10, 1.05], &[1.11, 1.12], &params())
                .unwrap();
        assert_eq!(entries, vec![1.10]);
        assert_eq!(tps, vec![1.11, 1.12]);
    }

    #[test]
    fn raises_when_ignore_invalid_prices_is_false_and_all_entries_invalid() {
        let strict = FilterParams {
            ignore_invalid_prices: false,
            ..params()
        };
        let err = filter_invalid_prices(Side::Buy, 1.50, &[1.10], &[1.60], &strict).unwrap_err();
        assert_eq!(err.0, "entries");
    }

    #[test]
    fn silently_drops_when_ignore_invalid_prices_is_true() {
        let (entries, tps) =
            filter_invalid_prices(Side::Buy, 1.50, &[1.10], &[1.60], &params()).unwrap();
        assert!(entries.is_empty() && tps.is_empty());
    }

    #[test]
    fn truncates_to_max_caps_from_the_head() {
        let capped = FilterParams {
            max_entries: 1,
            max_tps: 1,
            ignore_invalid_prices: true,
        };
        let (entries, tps) = filter_invalid_prices(
            Side::Buy,
            1.0,
            &[1.3, 1.2, 1.1],
            &[1.4, 1.5, 1.6],
            &capped,
        )
        .unwrap();
        assert_eq!(entries, vec![1.3]);
        assert_eq!(tps, vec![1.4]);
    }
}
