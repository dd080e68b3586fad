//! File name normalization.
//!
//! Turns a file name into a diacritic-free, lowercase, whitespace-collapsed
//! form while keeping its extension. The transformation is pure and
//! idempotent: normalizing an already normalized name returns it unchanged.

use serde::{Deserialize, Serialize};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Stem used when nothing is left after cleaning
pub const DEFAULT_PLACEHOLDER: &str = "unnamed";

/// Longest file name (in bytes) accepted by common filesystems
pub const DEFAULT_MAX_NAME_LEN: usize = 255;

/// Letters that canonical decomposition leaves intact but that still carry
/// a diacritic in Vietnamese text
const TRANSLITERATIONS: &[(char, char)] = &[('đ', 'd'), ('Đ', 'D')];

/// Which normalization sub-rules are enabled.
///
/// Passed explicitly into every normalization call; the defaults give the
/// full rule set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct NormalizeRules {
    /// Decompose and drop combining marks ("Nguyễn" -> "Nguyen")
    pub remove_diacritics: bool,
    /// Lowercase the stem
    pub lowercase: bool,
    /// Replace characters other than letters, digits, space, `-` and `_` with a space
    pub clean_special_chars: bool,
    /// Collapse whitespace runs and trim the ends
    pub normalize_whitespace: bool,
    /// Keep the text after the final dot out of the transformation
    pub preserve_extension: bool,
    /// Lowercase the preserved extension
    pub lowercase_extension: bool,
    /// Stem used when the cleaned stem is empty
    pub placeholder: String,
    /// Names longer than this (in bytes) are rejected during planning
    pub max_name_len: usize,
}

impl Default for NormalizeRules {
    fn default() -> Self {
        Self {
            remove_diacritics: true,
            lowercase: true,
            clean_special_chars: true,
            normalize_whitespace: true,
            preserve_extension: true,
            lowercase_extension: true,
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            max_name_len: DEFAULT_MAX_NAME_LEN,
        }
    }
}

/// One rule's effect on the stem, for previews
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizeStep {
    pub rule: &'static str,
    pub before: String,
    pub after: String,
}

/// Split a name into stem and extension at the last dot.
///
/// A name without a dot, a dotfile without a further dot (`.bashrc`) and a
/// name ending in a dot have no extension.
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(0) | None => (name, None),
        Some(idx) if idx + 1 == name.len() => (name, None),
        Some(idx) => (&name[..idx], Some(&name[idx + 1..])),
    }
}

/// Normalize a file name with the default rules
pub fn normalize(name: &str) -> String {
    normalize_with(name, &NormalizeRules::default())
}

/// Normalize a file name with explicit rules
pub fn normalize_with(name: &str, rules: &NormalizeRules) -> String {
    let (stem, extension) = if rules.preserve_extension {
        split_extension(name)
    } else {
        (name, None)
    };

    let mut result = normalize_stem(stem, rules);

    if let Some(ext) = extension {
        result.push('.');
        if rules.lowercase_extension {
            result.push_str(&ext.to_lowercase());
        } else {
            result.push_str(ext);
        }
    }

    result
}

/// Per-rule trace of what normalization does to a name's stem
pub fn normalize_steps(name: &str, rules: &NormalizeRules) -> Vec<NormalizeStep> {
    let (stem, _) = if rules.preserve_extension {
        split_extension(name)
    } else {
        (name, None)
    };
    let (prefix, body) = split_leading_dot(stem);

    let mut steps = Vec::new();
    let mut current = body.to_string();

    let mut record = |rule: &'static str, current: &mut String, next: String| {
        steps.push(NormalizeStep {
            rule,
            before: format!("{prefix}{current}"),
            after: format!("{prefix}{next}"),
        });
        *current = next;
    };

    if rules.remove_diacritics {
        let next = remove_diacritics(&current);
        record("Remove diacritics", &mut current, next);
    }
    if rules.lowercase {
        let next = lowercase(&current, rules.remove_diacritics);
        record("Lowercase", &mut current, next);
    }
    if rules.clean_special_chars {
        let next = clean_special_chars(&current);
        record("Clean special characters", &mut current, next);
    }
    if rules.normalize_whitespace {
        let next = collapse_whitespace(&current);
        record("Normalize whitespace", &mut current, next);
    }

    steps
}

fn normalize_stem(stem: &str, rules: &NormalizeRules) -> String {
    let (prefix, body) = split_leading_dot(stem);

    let mut text = apply_rules(body, rules);
    if text.trim().is_empty() {
        // The placeholder goes through the same rules so the result stays a
        // fixed point of normalization
        text = apply_rules(&rules.placeholder, rules);
        if text.trim().is_empty() {
            text = DEFAULT_PLACEHOLDER.to_string();
        }
    }

    format!("{prefix}{text}")
}

fn apply_rules(body: &str, rules: &NormalizeRules) -> String {
    let mut text = body.to_string();
    if rules.remove_diacritics {
        text = remove_diacritics(&text);
    }
    if rules.lowercase {
        text = lowercase(&text, rules.remove_diacritics);
    }
    if rules.clean_special_chars {
        text = clean_special_chars(&text);
    }
    if rules.normalize_whitespace {
        text = collapse_whitespace(&text);
    }
    text
}

/// A dotfile keeps its leading dot; only the rest of the stem is transformed
fn split_leading_dot(stem: &str) -> (&str, &str) {
    if stem.starts_with('.') {
        stem.split_at(1)
    } else {
        ("", stem)
    }
}

fn remove_diacritics(text: &str) -> String {
    text.chars()
        .map(|c| {
            TRANSLITERATIONS
                .iter()
                .find(|(from, _)| *from == c)
                .map_or(c, |(_, to)| *to)
        })
        .collect::<String>()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .nfc()
        .collect()
}

/// Some characters gain a combining mark when lowercased (`İ` -> `i̇`), so
/// marks are stripped again when diacritic removal is on.
fn lowercase(text: &str, strip_marks: bool) -> String {
    let lowered = text.to_lowercase();
    if strip_marks {
        remove_diacritics(&lowered)
    } else {
        lowered
    }
}

fn is_allowed(c: char) -> bool {
    c.is_alphanumeric() || c == ' ' || c == '-' || c == '_'
}

fn clean_special_chars(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_run = false;

    for c in text.chars() {
        if is_allowed(c) {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push(' ');
            in_run = true;
        }
    }

    out
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
