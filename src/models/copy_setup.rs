use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// Client-facing lot sizing mode, echoed back in `ClientInitResponse::lot_mode` (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LotMode {
    #[default]
    Fixed,
    MirrorSource,
}

/// The policy object governing trade expansion and price filtering for a `CopySetup`.
///
/// Mirrors the `#[serde(default = "fn")]` defaulting idiom used throughout this
/// codebase's settings structs so a partially-specified config (e.g. loaded from an
/// older DB row) still deserializes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopySetupConfig {
    #[serde(default = "default_max_entry_prices")]
    pub max_entry_prices: usize,
    #[serde(default = "default_max_tp_prices")]
    pub max_tp_prices: usize,
    /// When true (default), out-of-range prices are dropped silently (§4.1, §8.12);
    /// when false, price filtering raises a structured error instead.
    #[serde(default = "default_ignore_invalid_prices")]
    pub ignore_invalid_prices: bool,
    #[serde(default)]
    pub lot_mode: LotMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_lot: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakeven_on_tp_layer: Option<i32>,
    #[serde(default)]
    pub close_trades_before_everyday_swap: bool,
    #[serde(default)]
    pub close_trades_before_wednesday_swap: bool,
    #[serde(default)]
    pub close_trades_before_weekend: bool,
    #[serde(default)]
    pub trailingstop_on_tps: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tradeprofit_percent_from_balans_for_breakeven: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_minutes_pending_trade: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_minutes_active_trade: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_at_tp_hit_before_entry: Option<i32>,
    /// `canonical -> {synonyms}`, the allowed-symbols map consumed by extraction (§4.1).
    #[serde(default)]
    pub symbol_synonyms: HashMap<String, HashSet<String>>,
}

fn default_max_entry_prices() -> usize {
    5
}
fn default_max_tp_prices() -> usize {
    5
}
fn default_ignore_invalid_prices() -> bool {
    true
}

impl Default for CopySetupConfig {
    fn default() -> Self {
        Self {
            max_entry_prices: default_max_entry_prices(),
            max_tp_prices: default_max_tp_prices(),
            ignore_invalid_prices: default_ignore_invalid_prices(),
            lot_mode: LotMode::default(),
            fixed_lot: None,
            breakeven_on_tp_layer: None,
            close_trades_before_everyday_swap: false,
            close_trades_before_wednesday_swap: false,
            close_trades_before_weekend: false,
            trailingstop_on_tps: false,
            tradeprofit_percent_from_balans_for_breakeven: None,
            expire_minutes_pending_trade: None,
            expire_minutes_active_trade: None,
            expire_at_tp_hit_before_entry: None,
            symbol_synonyms: HashMap::new(),
        }
    }
}

impl CopySetupConfig {
    /// Flattens `symbol_synonyms` into a single `synonym -> canonical` lookup, as consumed
    /// by the manual-parse symbol-candidate classifier (§4.1).
    pub fn flatten_synonyms(&self) -> HashMap<String, String> {
        let mut flat = HashMap::new();
        for (canonical, synonyms) in &self.symbol_synonyms {
            flat.insert(canonical.clone(), canonical.clone());
            for syn in synonyms {
                flat.insert(syn.clone(), canonical.clone());
            }
        }
        flat
    }
}

/// A subscription unit owned by a user, identified externally by an opaque token.
/// The fan-out key for the distribution engine (§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopySetup {
    pub id: i64,
    pub token: String,
    pub active: bool,
    pub config: CopySetupConfig,
    pub chat_room_ids: Vec<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = CopySetupConfig::default();
        assert_eq!(cfg.max_entry_prices, 5);
        assert_eq!(cfg.max_tp_prices, 5);
        assert!(cfg.ignore_invalid_prices);
    }

    #[test]
    fn deserializes_partial_toml_with_defaults() {
        let cfg: CopySetupConfig = toml::from_str("max_entry_prices = 2").unwrap();
        assert_eq!(cfg.max_entry_prices, 2);
        assert_eq!(cfg.max_tp_prices, 5);
    }

    #[test]
    fn flattens_synonyms_including_canonical() {
        let mut cfg = CopySetupConfig::default();
        cfg.symbol_synonyms.insert(
            "XAUUSD".to_string(),
            ["GOLD".to_string()].into_iter().collect(),
        );
        let flat = cfg.flatten_synonyms();
        assert_eq!(flat.get("GOLD"), Some(&"XAUUSD".to_string()));
        assert_eq!(flat.get("XAUUSD"), Some(&"XAUUSD".to_string()));
    }
}
