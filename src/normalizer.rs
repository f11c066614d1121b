// 🔤 Name Normalizer - Canonical item keys
// "  apples  ", "APPLE", "Apples" → "Apple"
//
// Known limitation: after singularization any key still ending in "s" loses
// that "s" ("Glass" → "Glas"). Disable with `Normalizer::strict()` or
// STRIP_TRAILING_S=false.

use regex::Regex;
use std::sync::OnceLock;

// ============================================================================
// NORMALIZER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalizer {
    /// Strip a trailing "s" that survived singularization
    pub strip_trailing_s: bool,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self {
            strip_trailing_s: true,
        }
    }
}

impl Normalizer {
    pub fn new(strip_trailing_s: bool) -> Self {
        Self { strip_trailing_s }
    }

    /// Singularize only, never truncate words that are already singular
    pub fn strict() -> Self {
        Self {
            strip_trailing_s: false,
        }
    }

    /// Canonicalize a raw phrase into a catalog key
    ///
    /// 1. trim
    /// 2. capitalize (first char upper, everything else lower)
    /// 3. singularize the last word
    /// 4. optionally strip a leftover trailing "s"
    pub fn normalize(&self, raw: &str) -> String {
        let mut key = singularize(&capitalize(raw.trim()));

        if self.strip_trailing_s && key.ends_with('s') {
            key.pop();
        }

        key
    }
}

/// Normalize with the default (lossy) rules
pub fn normalize_item(raw: &str) -> String {
    Normalizer::default().normalize(raw)
}

// ============================================================================
// CASING
// ============================================================================

/// Upper-case the first character, lower-case the rest (including later words)
pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.as_str().to_lowercase().chars())
            .collect(),
        None => String::new(),
    }
}

// ============================================================================
// SINGULARIZATION
// ============================================================================

/// Words that have no distinct plural form
const UNCOUNTABLE: &[&str] = &[
    "equipment", "information", "rice", "money", "species", "series", "fish",
    "sheep", "deer", "moose", "bison", "news", "jeans", "police", "aircraft",
];

/// Irregular plural → singular (lowercase)
const IRREGULAR: &[(&str, &str)] = &[
    ("people", "person"),
    ("men", "man"),
    ("women", "woman"),
    ("children", "child"),
    ("teeth", "tooth"),
    ("feet", "foot"),
    ("geese", "goose"),
    ("mice", "mouse"),
    ("lice", "louse"),
    ("oxen", "ox"),
    ("dice", "die"),
    ("leaves", "leaf"),
    ("loaves", "loaf"),
    ("thieves", "thief"),
];

/// Suffix rules, most specific first. Every rule targets a plural ending so
/// words that are already singular pass through untouched.
const SUFFIX_RULES: &[(&str, &str)] = &[
    (r"(?i)(quiz)zes$", "${1}"),
    (r"(?i)(matr)ices$", "${1}ix"),
    (r"(?i)(vert|ind)ices$", "${1}ex"),
    (r"(?i)(alias|status)es$", "${1}"),
    (r"(?i)(octop|vir)i$", "${1}us"),
    (r"(?i)(cris|ax|test)es$", "${1}is"),
    (r"(?i)(shoe)s$", "${1}"),
    (r"(?i)(o)es$", "${1}"),
    (r"(?i)(bus)es$", "${1}"),
    (r"(?i)(x|ch|ss|sh|zz)es$", "${1}"),
    (r"(?i)(m)ovies$", "${1}ovie"),
    (r"(?i)([^aeiouy]|qu)ies$", "${1}y"),
    (r"(?i)([lr])ves$", "${1}f"),
    (r"(?i)(tive|hive)s$", "${1}"),
    (r"(?i)([^f])ves$", "${1}fe"),
    (r"(?i)((a)naly|(b)a|(d)iagno|(p)arenthe|(p)rogno|(s)ynop|(t)he)ses$", "${1}sis"),
    (r"(?i)(ss|us|is)$", "${1}"),
    (r"(?i)s$", ""),
];

fn suffix_rules() -> &'static [(Regex, &'static str)] {
    static RULES: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    RULES.get_or_init(|| {
        SUFFIX_RULES
            .iter()
            .filter_map(|(pattern, replacement)| {
                Regex::new(pattern).ok().map(|re| (re, *replacement))
            })
            .collect()
    })
}

/// Convert the last word of a phrase from plural to singular
///
/// Casing of the first letter of the last word is preserved.
pub fn singularize(phrase: &str) -> String {
    let split_at = phrase.rfind(' ').map(|i| i + 1).unwrap_or(0);
    let (head, word) = phrase.split_at(split_at);
    if word.is_empty() {
        return phrase.to_string();
    }

    let lower = word.to_lowercase();

    if UNCOUNTABLE.contains(&lower.as_str()) {
        return phrase.to_string();
    }

    if let Some((_, singular)) = IRREGULAR.iter().find(|(plural, _)| *plural == lower) {
        let starts_upper = word.chars().next().is_some_and(char::is_uppercase);
        let singular = if starts_upper {
            capitalize(singular)
        } else {
            singular.to_string()
        };
        return format!("{}{}", head, singular);
    }

    for (re, replacement) in suffix_rules() {
        if re.is_match(word) {
            return format!("{}{}", head, re.replace(word, *replacement));
        }
    }

    phrase.to_string()
}

// ============================================================================
// TESTS
// ============================================================================
