//! Successful expansion results.

use serde::{Deserialize, Serialize};

use crate::ranges::RangeMap;

/// Identifier that replaces `$crate` in expansion text.
///
/// The text of an expansion must not depend on which crate it is expanded
/// in, so `$crate` is written as this marker and its offsets are recorded in
/// [`ExpansionOk::dollar_crate_occurrences`] for the consumer to resolve.
pub const MACRO_DOLLAR_CRATE_IDENTIFIER: &str = "__expanse_dollar_crate";

/// A successful expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpansionOk {
    /// The expanded source text.
    pub text: String,
    /// Which parts of `text` were copied from the call body.
    pub ranges: RangeMap,
    /// Byte offsets of every [`MACRO_DOLLAR_CRATE_IDENTIFIER`] in `text`.
    pub dollar_crate_occurrences: Vec<u32>,
}

impl ExpansionOk {
    /// Wraps expansion text, locating the `$crate` markers in it.
    pub fn new(text: String, ranges: RangeMap) -> Self {
        let dollar_crate_occurrences = find_dollar_crate_occurrences(&text);
        Self {
            text,
            ranges,
            dollar_crate_occurrences,
        }
    }
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

fn find_dollar_crate_occurrences(text: &str) -> Vec<u32> {
    text.match_indices(MACRO_DOLLAR_CRATE_IDENTIFIER)
        .filter(|(start, m)| {
            let before = text[..*start].chars().next_back();
            let after = text[start + m.len()..].chars().next();
            !before.is_some_and(is_ident_char) && !after.is_some_and(is_ident_char)
        })
        .filter_map(|(start, _)| u32::try_from(start).ok())
        .collect()
}
