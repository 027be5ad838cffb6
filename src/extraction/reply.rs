//! Reply-action extraction (§4.1): classifies a message replying to a signal-bearing
//! message as CLOSE, BREAKEVEN, or (model-assisted only) MODIFY_SL.

use crate::models::ReplyAction;

const CLOSE_SINGLE_WORDS: &[&str] = &["CLOSE", "EXIT", "TERMINATE", "CANCEL", "CLOSING"];
const CLOSE_PHRASES: &[&str] = &["CLOSING POSITION"];

const BREAKEVEN_SINGLE_WORDS: &[&str] = &["BREAKEVEN", "PROFIT"];
const BREAKEVEN_PHRASES: &[&str] = &["SET BE", "LOCK IN", "MOVE SL", "SL TO ENTRY"];

/// English suffixes tolerated on single-word keyword matches (`close` / `closed` /
/// `closing`), per §4.1.
const TOLERATED_SUFFIXES: &[&str] = &["D", "ING", "S"];

fn normalize(text: &str) -> String {
    text.to_uppercase()
}

fn word_matches_with_suffix(word: &str, keyword: &str) -> bool {
    if word == keyword {
        return true;
    }
    TOLERATED_SUFFIXES
        .iter()
        .any(|suffix| word == format!("{}{}", keyword, suffix))
}

fn contains_whole_word(haystack: &str, keyword: &str) -> bool {
    haystack.split_whitespace().any(|w| word_matches_with_suffix(w, keyword))
}

/// Whole-word, flexible-whitespace phrase match: every word of `phrase` must appear
/// contiguously (in order) among `haystack`'s whitespace-split tokens.
fn contains_phrase(haystack_words: &[&str], phrase: &str) -> bool {
    let phrase_words: Vec<&str> = phrase.split_whitespace().collect();
    if phrase_words.is_empty() || haystack_words.len() < phrase_words.len() {
        return false;
    }
    haystack_words
        .windows(phrase_words.len())
        .any(|window| window == phrase_words.as_slice())
}

/// Runs the deterministic reply-action matcher. Case-insensitive; CLOSE takes priority
/// over BREAKEVEN when both would match. Returns `None` when nothing matches (the
/// model-assisted path, which also supports MODIFY_SL, is the caller's fallback).
pub fn parse_reply_action(text: &str) -> Option<ReplyAction> {
    let normalized = normalize(text);
    let words: Vec<&str> = normalized.split_whitespace().collect();

    let close_match = CLOSE_SINGLE_WORDS
        .iter()
        .any(|kw| contains_whole_word(&normalized, kw))
        || CLOSE_PHRASES.iter().any(|p| contains_phrase(&words, p));
    if close_match {
        return Some(ReplyAction::Close);
    }

    let breakeven_match = BREAKEVEN_SINGLE_WORDS
        .iter()
        .any(|kw| contains_whole_word(&normalized, kw))
        || BREAKEVEN_PHRASES.iter().any(|p| contains_phrase(&words, p));
    if breakeven_match {
        return Some(ReplyAction::Breakeven);
    }

    None
}
