//! Direct extraction of scalars from free text.

use crate::schema::EnumDef;
use once_cell::sync::Lazy;
use regex::Regex;

static NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[-+]?[0-9]+(?:\.[0-9]+)?(?:[eE][-+]?[0-9]+)?").expect("number pattern is valid")
});

/// First `true` / `false` in the text, case-insensitive.
pub(crate) fn find_bool(text: &str) -> Option<bool> {
    let lower = text.to_ascii_lowercase();
    match (lower.find("true"), lower.find("false")) {
        (Some(t), Some(f)) => Some(t < f),
        (Some(_), None) => Some(true),
        (None, Some(_)) => Some(false),
        (None, None) => None,
    }
}

/// First signed number in the text. Thousands separators end the match.
pub(crate) fn find_number(text: &str) -> Option<&str> {
    NUMBER.find(text).map(|m| m.as_str())
}

/// Parse a number that must span the whole (trimmed) string.
pub(crate) fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    NUMBER
        .find(text)
        .filter(|m| m.start() == 0 && m.end() == text.len())
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

/// Parse an integer, accepting floats with no fractional part.
pub(crate) fn parse_int(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(i) = text.trim_start_matches('+').parse::<i64>() {
        return Some(i);
    }
    parse_number(text).and_then(integral)
}

/// Lossless float to int conversion.
pub(crate) fn integral(f: f64) -> Option<i64> {
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then_some(f as i64)
}

/// Select the enum variant named by `text`.
///
/// An exact label match wins, first case-sensitive then case-insensitive.
/// Otherwise every label contained in the text is a candidate and the
/// longest one wins, ties going to the earliest occurrence.
pub(crate) fn match_enum<'a>(text: &str, def: &'a EnumDef) -> Option<&'a str> {
    let trimmed = text
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.');

    let labels = || {
        def.variants
            .iter()
            .flat_map(|v| v.labels().map(move |label| (v.name.as_str(), label)))
    };

    if let Some((variant, _)) = labels().find(|(_, label)| *label == trimmed) {
        return Some(variant);
    }
    if let Some((variant, _)) = labels().find(|(_, label)| label.eq_ignore_ascii_case(trimmed)) {
        return Some(variant);
    }

    let haystack = text.to_lowercase();
    let mut best: Option<(usize, usize, &'a str)> = None;
    for (variant, label) in labels() {
        if label.is_empty() {
            continue;
        }
        let Some(position) = haystack.find(&label.to_lowercase()) else {
            continue;
        };
        let len = label.chars().count();
        let better = match best {
            None => true,
            Some((best_len, best_pos, _)) => len > best_len || (len == best_len && position < best_pos),
        };
        if better {
            best = Some((len, position, variant));
        }
    }
    best.map(|(_, _, variant)| variant)
}
