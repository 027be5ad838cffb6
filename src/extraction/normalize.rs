//! Normalization and validation of a raw `SignalBase` into a canonical, validated form
//! (§4.1). Both the manual (Stage A) and model-assisted (Stage B) paths run through here.

use std::collections::HashMap;

use super::manual::SignalBase;
use crate::models::Side;

/// A normalized, but not yet sorted/filtered, candidate signal. One step short of a
/// persistable `Signal` — sorting and price-filtering (see `filtering`) still apply.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedSignal {
    pub symbol: String,
    pub side: Side,
    pub entries: Vec<f64>,
    pub tps: Vec<f64>,
    pub sl: f64,
}

/// Maps each observed symbol token to its canonical form, deduplicates all lists, coerces
/// direction tokens, and drops non-finite prices. Does not enforce singleton cardinality;
/// see [`validate`] for that.
fn normalize(raw: &SignalBase, synonym_to_canonical: &HashMap<String, String>) -> SignalBase {
    let mut symbols = Vec::new();
    for s in &raw.symbols {
        if let Some(canonical) = synonym_to_canonical.get(s) {
            if !symbols.contains(canonical) {
                symbols.push(canonical.clone());
            }
        }
    }

    let mut types = Vec::new();
    for t in &raw.types {
        if (t == "BUY" || t == "SELL") && !types.contains(t) {
            types.push(t.clone());
        }
    }

    let dedup_finite = |prices: &[f64]| -> Vec<f64> {
        let mut out = Vec::new();
        for &p in prices {
            if p.is_finite() && !out.contains(&p) {
                out.push(p);
            }
        }
        out
    };

    SignalBase {
        symbols,
        types,
        entry_prices: dedup_finite(&raw.entry_prices),
        tp_prices: dedup_finite(&raw.tp_prices),
        sl_prices: dedup_finite(&raw.sl_prices),
    }
}

/// Validates cardinality per §4.1: exactly 1 symbol, exactly 1 side, exactly 1 sl, >=1
/// entry, >=1 tp. Collects *all* failures rather than short-circuiting on the first.
pub fn normalize_and_validate(
    raw: &SignalBase,
    synonym_to_canonical: &HashMap<String, String>,
) -> Result<NormalizedSignal, Vec<String>> {
    let normalized = normalize(raw, synonym_to_canonical);
    let mut errors = Vec::new();

    if normalized.symbols.len() != 1 {
        errors.push(format!(
            "expected exactly 1 symbol, found {}",
            normalized.symbols.len()
        ));
    }
    if normalized.types.len() != 1 {
        errors.push(format!(
            "expected exactly 1 side, found {}",
            normalized.types.len()
        ));
    }
    if normalized.sl_prices.len() != 1 {
        errors.push(format!(
            "expected exactly 1 sl price, found {}",
            normalized.sl_prices.len()
        ));
    }
    if normalized.entry_prices.is_empty() {
        errors.push("expected at least 1 entry price".to_string());
    }
    if normalized.tp_prices.is_empty() {
        errors.push("expected at least 1 tp price".to_string());
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let side = if normalized.types[0] == "BUY" {
        Side::Buy
    } else {
        Side::Sell
    };

    Ok(NormalizedSignal {
        symbol: normalized.symbols.into_iter().next().unwrap(),
        side,
        entries: normalized.entry_prices,
        tps: normalized.tp_prices,
        sl: normalized.sl_prices[0],
    })
}
