//! Emote token grammar.
//!
//! A token is `:` + one or more word characters + `:` (`:PogChamp:`).
//! Matches are non-overlapping, left to right; there is no nesting or
//! escaping. Tokens in the bot's own naming scheme are skipped.

use emoterelay_core::naming::SlotNaming;
use regex::{Captures, Regex};
use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::LazyLock;

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":((?:\w|[0-9])+):").expect("token pattern is valid"));

/// One emote reference found in message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    /// Name between the colons
    pub name: &'a str,
    /// Byte range of the whole token, colons included
    pub span: Range<usize>,
}

/// Every substitution candidate in `text`, in order of appearance.
pub fn extract<'a>(text: &'a str, naming: &SlotNaming) -> Vec<Token<'a>> {
    TOKEN
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?.as_str();
            (!naming.is_reserved(name)).then(|| Token {
                name,
                span: whole.range(),
            })
        })
        .collect()
}

/// Distinct token names, first occurrence first.
pub fn distinct_names(tokens: &[Token<'_>]) -> Vec<String> {
    let mut seen = HashSet::new();
    tokens
        .iter()
        .filter(|t| seen.insert(t.name))
        .map(|t| t.name.to_string())
        .collect()
}

/// Replace every token whose name is in `resolved` with its slot reference.
///
/// Unresolved and reserved tokens stay literal. Returns the new text and
/// the number of occurrences replaced.
pub fn substitute(text: &str, resolved: &HashMap<String, String>) -> (String, usize) {
    let mut replaced = 0;
    let rewritten = TOKEN.replace_all(text, |caps: &Captures<'_>| {
        match resolved.get(&caps[1]) {
            Some(reference) => {
                replaced += 1;
                reference.clone()
            }
            None => caps[0].to_string(),
        }
    });
    (rewritten.into_owned(), replaced)
}
