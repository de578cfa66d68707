// src/classifier.rs

//! Decides which strings are worth sending to the model and derives the
//! cache fingerprints for them.
//!
//! Both functions are part of the public API so that tools building a cache
//! offline produce exactly the same keys as a live run.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Terms that are always passed through verbatim and listed in the prompt as
/// do-not-translate.
pub const EXCLUDED_TERMS: &[&str] = &["Dummy", "dummy"];

static ONLY_SYMBOLS: Lazy<Regex> = Lazy::new(|| {
    // No letter and no numeric character of any kind, so `½` and `Ⅻ` are not
    // symbols. Plain `\W` would treat them as such.
    Regex::new(r"^[^\p{L}\p{N}]+$").expect("static regex is valid")
});

static ONLY_DIGITS: Lazy<Regex> = Lazy::new(|| {
    // Decimal digits plus the Unicode `Numeric_Type=Digit` characters:
    // superscripts, subscripts, circled, parenthesized and dotted digits.
    // Vulgar fractions and roman numerals are not digits.
    Regex::new(
        r"^(?:\p{Nd}|[\x{00B2}\x{00B3}\x{00B9}\x{1369}-\x{1371}\x{19DA}\x{2070}\x{2074}-\x{2079}\x{2080}-\x{2089}\x{2460}-\x{2468}\x{2474}-\x{247C}\x{2488}-\x{2490}\x{24EA}\x{24F5}-\x{24FD}\x{24FF}\x{2776}-\x{277E}\x{2780}-\x{2788}\x{278A}-\x{2792}\x{10A40}-\x{10A43}\x{10E60}-\x{10E68}\x{11052}-\x{1105A}\x{1F100}-\x{1F10A}])+$",
    )
    .expect("static regex is valid")
});

/// Returns `true` when `text` looks like human-readable prose.
pub fn is_translatable(text: &str) -> bool {
    let stripped = text.trim();
    if stripped.is_empty()
        || ONLY_DIGITS.is_match(stripped)
        || ONLY_SYMBOLS.is_match(stripped)
        || stripped.contains("\\u")
    {
        return false;
    }
    // Identifier-looking tokens such as `item_id`.
    !(stripped.contains('_') && !stripped.contains(' '))
}

/// Same as [`is_translatable`] for loosely typed values; anything that is not
/// a string is never translatable.
pub fn is_translatable_value(value: &Value) -> bool {
    value.as_str().is_some_and(is_translatable)
}

/// `true` for strings on the do-not-translate list.
pub fn is_excluded(text: &str) -> bool {
    let stripped = text.trim();
    EXCLUDED_TERMS.iter().any(|term| *term == stripped)
}

/// Cache key of a unit translation.
///
/// Serialized as a JSON array with `", "` separators and non-ASCII characters
/// kept as-is, e.g. `["Hello", "en", "it", "Game", null]`. The layout is
/// order-sensitive and must stay byte-stable so existing cache files keep
/// hitting.
pub fn translation_fingerprint(
    text: &str,
    source_lang: &str,
    target_lang: &str,
    domain: &str,
    extra_context: Option<&str>,
) -> String {
    let parts = [
        Value::from(text),
        Value::from(source_lang),
        Value::from(target_lang),
        Value::from(domain),
        extra_context.map_or(Value::Null, Value::from),
    ];
    let encoded: Vec<String> = parts.iter().map(Value::to_string).collect();
    format!("[{}]", encoded.join(", "))
}

/// Cache key of a generated file context.
///
/// A missing extra context is rendered as `None` to stay compatible with
/// caches written by earlier releases.
pub fn context_fingerprint(
    file_id: &str,
    domain: &str,
    extra_context: Option<&str>,
    full_sample: bool,
) -> String {
    let mut key = format!(
        "CONTEXT_FILE::{}::{}::{}",
        file_id,
        domain,
        extra_context.unwrap_or("None")
    );
    if full_sample {
        key.push_str("::FULL_SAMPLE");
    }
    key
}
