//! Maps client-supplied model identifiers to canonical backend model names.
//!
//! Lookup order: provider prefix stripped, exact table hit, case-insensitive
//! table hit, ordered substring patterns, then the identifier itself.

/// Model used when the client does not name one.
pub const DEFAULT_MODEL: &str = "gpt-5.1-codex";

/// Known identifiers and their canonical backend names.
///
/// Effort-suffixed variants collapse onto their family; legacy names map to
/// the closest current model.
const MODEL_MAP: &[(&str, &str)] = &[
    // gpt-5.1-codex
    ("gpt-5.1-codex", "gpt-5.1-codex"),
    ("gpt-5.1-codex-low", "gpt-5.1-codex"),
    ("gpt-5.1-codex-medium", "gpt-5.1-codex"),
    ("gpt-5.1-codex-high", "gpt-5.1-codex"),
    // gpt-5.1-codex-max
    ("gpt-5.1-codex-max", "gpt-5.1-codex-max"),
    ("gpt-5.1-codex-max-low", "gpt-5.1-codex-max"),
    ("gpt-5.1-codex-max-medium", "gpt-5.1-codex-max"),
    ("gpt-5.1-codex-max-high", "gpt-5.1-codex-max"),
    ("gpt-5.1-codex-max-xhigh", "gpt-5.1-codex-max"),
    // gpt-5.1-codex-mini
    ("gpt-5.1-codex-mini", "gpt-5.1-codex-mini"),
    ("gpt-5.1-codex-mini-medium", "gpt-5.1-codex-mini"),
    ("gpt-5.1-codex-mini-high", "gpt-5.1-codex-mini"),
    // gpt-5.1
    ("gpt-5.1", "gpt-5.1"),
    ("gpt-5.1-none", "gpt-5.1"),
    ("gpt-5.1-low", "gpt-5.1"),
    ("gpt-5.1-medium", "gpt-5.1"),
    ("gpt-5.1-high", "gpt-5.1"),
    // gpt-5.2-codex
    ("gpt-5.2-codex", "gpt-5.2-codex"),
    ("gpt-5.2-codex-low", "gpt-5.2-codex"),
    ("gpt-5.2-codex-medium", "gpt-5.2-codex"),
    ("gpt-5.2-codex-high", "gpt-5.2-codex"),
    ("gpt-5.2-codex-xhigh", "gpt-5.2-codex"),
    // gpt-5.2
    ("gpt-5.2", "gpt-5.2"),
    ("gpt-5.2-none", "gpt-5.2"),
    ("gpt-5.2-low", "gpt-5.2"),
    ("gpt-5.2-medium", "gpt-5.2"),
    ("gpt-5.2-high", "gpt-5.2"),
    ("gpt-5.2-xhigh", "gpt-5.2"),
    // Legacy names
    ("gpt-5-codex", "gpt-5.1-codex"),
    ("gpt-5-codex-low", "gpt-5.1-codex"),
    ("gpt-5-codex-medium", "gpt-5.1-codex"),
    ("gpt-5-codex-high", "gpt-5.1-codex"),
    ("gpt-5-codex-mini", "gpt-5.1-codex-mini"),
    ("gpt-5-codex-mini-medium", "gpt-5.1-codex-mini"),
    ("gpt-5-codex-mini-high", "gpt-5.1-codex-mini"),
    ("codex-mini-latest", "gpt-5.1-codex-mini"),
    ("gpt-5", "gpt-5.1"),
    ("gpt-5-minimal", "gpt-5.1"),
    ("gpt-5-low", "gpt-5.1"),
    ("gpt-5-medium", "gpt-5.1"),
    ("gpt-5-high", "gpt-5.1"),
    ("gpt-5-mini", "gpt-5.1"),
    ("gpt-5-nano", "gpt-5.1"),
];

/// Substring fallbacks, most specific first: `gpt-5.1-codex-max` must be
/// tested before `gpt-5.1-codex`, which must be tested before `gpt-5.1`.
const PATTERNS: &[(&str, &str)] = &[
    ("gpt-5.2-codex", "gpt-5.2-codex"),
    ("gpt 5.2 codex", "gpt-5.2-codex"),
    ("gpt-5.2", "gpt-5.2"),
    ("gpt 5.2", "gpt-5.2"),
    ("gpt-5.1-codex-max", "gpt-5.1-codex-max"),
    ("gpt 5.1 codex max", "gpt-5.1-codex-max"),
    ("gpt-5.1-codex-mini", "gpt-5.1-codex-mini"),
    ("gpt-5-codex-mini", "gpt-5.1-codex-mini"),
    ("codex-mini", "gpt-5.1-codex-mini"),
    ("gpt-5.1-codex", "gpt-5.1-codex"),
    ("gpt 5.1 codex", "gpt-5.1-codex"),
    ("gpt-5.1", "gpt-5.1"),
    ("gpt 5.1", "gpt-5.1"),
    ("codex", "gpt-5.1-codex"),
    ("gpt-5", "gpt-5.1"),
    ("gpt 5", "gpt-5.1"),
];

/// Normalize a model identifier. Total: unknown names are returned unchanged
/// (minus any provider prefix) and left for the backend to judge.
#[must_use]
pub fn normalize_model(model: Option<&str>) -> String {
    let Some(model) = model.filter(|m| !m.is_empty()) else {
        return DEFAULT_MODEL.to_string();
    };

    let id = strip_provider_prefix(model);

    if let Some((_, canonical)) = MODEL_MAP.iter().find(|(k, _)| *k == id) {
        return (*canonical).to_string();
    }
    if let Some((_, canonical)) = MODEL_MAP.iter().find(|(k, _)| k.eq_ignore_ascii_case(id)) {
        return (*canonical).to_string();
    }

    let lower = id.to_ascii_lowercase();
    PATTERNS
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map_or_else(|| id.to_string(), |(_, canonical)| (*canonical).to_string())
}

/// `openai/gpt-5.1` → `gpt-5.1`; everything up to the last `/` is dropped.
fn strip_provider_prefix(model: &str) -> &str {
    model.rsplit_once('/').map_or(model, |(_, rest)| rest)
}
