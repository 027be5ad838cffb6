//! Stage A: deterministic, rule-based manual parse (§4.1).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Raw, unvalidated parse output. Field names mirror the wire-level `SignalBase` concept
/// from §4.1; canonicalization and validation happen downstream in `normalize`. Also the
/// JSON shape the external structured-output extractor (Stage B) is prompted to return.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalBase {
    pub symbols: Vec<String>,
    pub types: Vec<String>,
    pub entry_prices: Vec<f64>,
    pub tp_prices: Vec<f64>,
    pub sl_prices: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PriceContext {
    Entry,
    Tp,
    Sl,
}

/// Allowed character set per §4.1: `[A-Z0-9., @]` plus space. Anything else becomes space.
fn normalize_text(text: &str) -> String {
    text.to_uppercase()
        .chars()
        .map(|c| {
            if c == '\n' || c == '\r' {
                ' '
            } else if c.is_ascii_alphanumeric() || c == '.' || c == ',' || c == '@' || c == ' ' {
                c
            } else {
                ' '
            }
        })
        .collect()
}

/// Parses a token as a price, accepting comma as a decimal separator. Non-finite results
/// (not produced by this parser, but checked defensively) are treated as "not a price".
fn parse_price(token: &str) -> Option<f64> {
    if token.is_empty() {
        return None;
    }
    // A bare "@" or direction/context keyword must never be mistaken for a price; only
    // accept tokens that look numeric (digits plus at most one separator).
    let has_digit = token.chars().any(|c| c.is_ascii_digit());
    if !has_digit {
        return None;
    }
    let normalized = token.replace(',', ".");
    normalized
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

fn classify_context_keyword(token: &str) -> Option<PriceContext> {
    match token {
        "TP" | "TARGET" | "PROFIT" | "TAKEPROFIT" => Some(PriceContext::Tp),
        "SL" | "STOP" | "LOSS" | "STOPLOSS" => Some(PriceContext::Sl),
        "@" | "AT" | "ENTRY" | "LEVEL" => Some(PriceContext::Entry),
        _ => None,
    }
}

fn classify_direction_keyword(token: &str) -> Option<&'static str> {
    match token {
        "BUY" | "LONG" | "KOOP" => Some("BUY"),
        "SELL" | "SHORT" | "VERKOOP" => Some("SELL"),
        _ => None,
    }
}

/// Runs the deterministic Stage A tokenizer/classifier over normalized message text.
///
/// `allowed_symbols`: the flattened set of every synonym and canonical ticker the room
/// accepts (see `CopySetupConfig::flatten_synonyms`'s keys).
pub fn parse_manual(text: &str, allowed_symbols: &HashSet<String>) -> SignalBase {
    let normalized = normalize_text(text);
    let mut base = SignalBase::default();
    let mut context = PriceContext::Entry;

    for token in normalized.split_whitespace() {
        if let Some(price) = parse_price(token) {
            let bucket = match context {
                PriceContext::Entry => &mut base.entry_prices,
                PriceContext::Tp => &mut base.tp_prices,
                PriceContext::Sl => &mut base.sl_prices,
            };
            if !bucket.contains(&price) {
                bucket.push(price);
            }
            continue;
        }

        if let Some(new_context) = classify_context_keyword(token) {
            context = new_context;
            continue;
        }

        if let Some(direction) = classify_direction_keyword(token) {
            if !base.types.iter().any(|t| t == direction) {
                base.types.push(direction.to_string());
            }
            continue;
        }

        // Symbol candidate: remaining alphabetic token present in the allowed set.
        if token.chars().all(|c| c.is_ascii_alphabetic()) && allowed_symbols.contains(token) {
            if !base.symbols.iter().any(|s| s == token) {
                base.symbols.push(token.to_string());
            }
        }
    }

    base
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed(symbols: &[&str]) -> HashSet<String> {
        symbols.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_s1_buy_eurusd() {
        let base = parse_manual(
            "BUY EURUSD @ 1.1000 TP 1.1100 1.1200 SL 1.0950",
            &allowed(&["EURUSD"]),
        );
        assert_eq!(base.types, vec!["BUY"]);
        assert_eq!(base.symbols, vec!["EURUSD"]);
        assert_eq!(base.entry_prices, vec![1.10]);
        assert_eq!(base.tp_prices, vec![1.11, 1.12]);
        assert_eq!(base.sl_prices, vec![1.0950]);
    }

    #[test]
    fn parses_s2_sell_gold_synonym() {
        let base = parse_manual(
            "SELL GOLD 2400 TP 2380 2360 SL 2420",
            &allowed(&["XAUUSD", "GOLD"]),
        );
        assert_eq!(base.types, vec!["SELL"]);
        assert_eq!(base.symbols, vec!["GOLD"]);
        assert_eq!(base.entry_prices, vec![2400.0]);
        assert_eq!(base.tp_prices, vec![2380.0, 2360.0]);
        assert_eq!(base.sl_prices, vec![2420.0]);
    }

    #[test]
    fn accepts_comma_decimal_separator() {
        let base = parse_manual("BUY EURUSD @ 1,1000 SL 1,0950 TP 1,1100", &allowed(&["EURUSD"]));
        assert_eq!(base.entry_prices, vec![1.10]);
        assert_eq!(base.sl_prices, vec![1.0950]);
    }

    #[test]
    fn drops_duplicate_prices_within_a_context() {
        let base = parse_manual("BUY EURUSD @ 1.10 1.10 SL 1.09", &allowed(&["EURUSD"]));
        assert_eq!(base.entry_prices, vec![1.10]);
    }

    #[test]
    fn ignores_symbols_not_in_allowed_set() {
        let base = parse_manual("BUY NOTALLOWED @ 1.10 SL 1.09", &allowed(&["EURUSD"]));
        assert!(base.symbols.is_empty());
    }
}
