//! Two-stage extraction pipeline (§4.1): deterministic manual parse with a
//! model-assisted fallback, feeding normalization, sorting, and price filtering.
//!
//! Extraction never raises to its callers (§4.1 "Failure semantics"): every public entry
//! point here returns an `ExtractionResult`, collapsing to `NoMatch` on any failure, with
//! details only reaching a structured log.

mod filtering;
mod manual;
mod model_fallback;
mod normalize;
mod reply;

pub use filtering::{filter_invalid_prices, sort_prices, FilterParams, PriceFilterError};
pub use model_fallback::{
    extract_with_fallback, ExtractorCallError, ExtractorClient, ExtractorFailureKind,
    HttpExtractorClient, RetryPolicy,
};
pub use reply::parse_reply_action;

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use crate::models::{ReplyAction, Side, Signal};

/// The sum-type result of running extraction over a single message (Design Notes §9):
/// at most one of a structured `Signal` or a `ReplyAction` comes out of any one message.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionResult {
    Signal(ExtractedSignal),
    Reply(ReplyAction),
    NoMatch,
}

/// A fully sorted and filtered signal, still missing the persistence-layer identity
/// (`id`, `message_id`) that `Signal` requires — those are assigned once the lifecycle
/// processor inserts it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedSignal {
    pub symbol: String,
    pub side: Side,
    pub entries: Vec<f64>,
    pub tps: Vec<f64>,
    pub sl: f64,
}

impl ExtractedSignal {
    /// Materializes a persistable `Signal` once the caller has an id and message_id.
    pub fn into_signal(self, id: i64, message_id: i64) -> Signal {
        Signal {
            id,
            message_id,
            symbol: self.symbol,
            side: self.side,
            entries: self.entries,
            tps: self.tps,
            sl: self.sl,
        }
    }
}

/// Everything the extraction pipeline needs from a `CopySetupConfig`, decoupled from the
/// full config type per the same reasoning as `FilterParams`.
pub struct ExtractionContext<'a> {
    pub allowed_symbols: &'a HashSet<String>,
    pub synonym_to_canonical: &'a HashMap<String, String>,
    pub filter_params: &'a FilterParams,
    pub max_exceptions_for_ai_extraction: u32,
}

/// Runs Stage A, and Stage B when eligible, over free-form message text and folds the
/// result through normalization, sorting, and price filtering.
///
/// `fallback` is `None` when no extractor is configured (or the caller chooses not to
/// attempt Stage B); Stage A's result is then final.
pub async fn extract_signal(
    text: &str,
    ctx: &ExtractionContext<'_>,
    fallback: Option<(&dyn ExtractorClient, &RetryPolicy)>,
) -> ExtractionResult {
    let stage_a = manual::parse_manual(text, ctx.allowed_symbols);

    match normalize::normalize_and_validate(&stage_a, ctx.synonym_to_canonical) {
        Ok(normalized) => return finish(normalized, ctx),
        Err(errors) => {
            debug!(count = errors.len(), "stage A validation errors");
            if errors.len() as u32 >= ctx.max_exceptions_for_ai_extraction {
                return ExtractionResult::NoMatch;
            }
        }
    }

    let Some((client, policy)) = fallback else {
        return ExtractionResult::NoMatch;
    };

    match extract_with_fallback(client, policy, text).await {
        Some(stage_b) => match normalize::normalize_and_validate(&stage_b, ctx.synonym_to_canonical)
        {
            Ok(normalized) => finish(normalized, ctx),
            Err(errors) => {
                warn!(count = errors.len(), "stage B validation failed, abandoning");
                ExtractionResult::NoMatch
            }
        },
        None => ExtractionResult::NoMatch,
    }
}

fn finish(normalized: normalize::NormalizedSignal, ctx: &ExtractionContext<'_>) -> ExtractionResult {
    let mut entries = normalized.entries;
    let mut tps = normalized.tps;
    sort_prices(normalized.side, &mut entries, &mut tps);

    match filter_invalid_prices(normalized.side, normalized.sl, &entries, &tps, ctx.filter_params)
    {
        Ok((entries, tps)) if entries.is_empty() || tps.is_empty() => {
            ExtractionResult::NoMatch
        }
        Ok((entries, tps)) => ExtractionResult::Signal(ExtractedSignal {
            symbol: normalized.symbol,
            side: normalized.side,
            entries,
            tps,
            sl: normalized.sl,
        }),
        Err(err) => {
            warn!(error = %err, "price filtering raised, abandoning signal");
            ExtractionResult::NoMatch
        }
    }
}

/// Runs the deterministic reply-action matcher (§4.1). The model-assisted path (which
/// additionally supports `MODIFY_SL`) is the lifecycle processor's responsibility, since
/// it requires the referenced `Signal` to build a `new_sl_price` prompt.
pub fn extract_reply_action(text: &str) -> ExtractionResult {
    match parse_reply_action(text) {
        Some(action) => ExtractionResult::Reply(action),
        None => ExtractionResult::NoMatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> (HashSet<String>, HashMap<String, String>, FilterParams) {
        let allowed: HashSet<String> = ["EURUSD".to_string()].into_iter().collect();
        let synonyms: HashMap<String, String> =
            [("EURUSD".to_string(), "EURUSD".to_string())].into_iter().collect();
        let params = FilterParams {
            max_entries: 5,
            max_tps: 5,
            ignore_invalid_prices: true,
        };
        (allowed, synonyms, params)
    }

    #[tokio::test]
    async fn stage_a_alone_extracts_a_complete_signal() {
        let (allowed, synonyms, params) = ctx();
        let extraction_ctx = ExtractionContext {
            allowed_symbols: &allowed,
            synonym_to_canonical: &synonyms,
            filter_params: &params,
            max_exceptions_for_ai_extraction: 3,
        };
        let result = extract_signal(
            "BUY EURUSD @ 1.1000 TP 1.1100 1.1200 SL 1.0950",
            &extraction_ctx,
            None,
        )
        .await;
        match result {
            ExtractionResult::Signal(s) => {
                assert_eq!(s.symbol, "EURUSD");
                assert_eq!(s.side, Side::Buy);
            }
            other => panic!("expected Signal, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unrelated_text_with_no_fallback_is_no_match() {
        let (allowed, synonyms, params) = ctx();
        let extraction_ctx = ExtractionContext {
            allowed_symbols: &allowed,
            synonym_to_canonical: &synonyms,
            filter_params: &params,
            max_exceptions_for_ai_extraction: 3,
        };
        let result = extract_signal("good morning everyone", &extraction_ctx, None).await;
        assert_eq!(result, ExtractionResult::NoMatch);
    }

    #[test]
    fn reply_action_matches_close() {
        assert_eq!(
            extract_reply_action("closing now"),
            ExtractionResult::Reply(ReplyAction::Close)
        );
    }

    #[test]
    fn reply_action_no_match_on_unrelated_text() {
        assert_eq!(extract_reply_action("thanks!"), ExtractionResult::NoMatch);
    }
}
