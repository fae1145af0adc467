//! Caption language policy and candidate filtering
//!
//! A candidate passes when the union of the must-set and the choice-set
//! intersects the caption languages it actually offers. Filtering is a pure
//! function of those three sets; a candidate that fails the policy is
//! *filtered*, never *failed*, and is never retried.

use std::collections::BTreeSet;

/// Regional variants each short language code expands to
const LANGUAGE_ALIASES: &[(&str, &[&str])] = &[
    ("en", &["en", "en-US", "en-UK", "en-GB"]),
    ("zh", &["zh", "zh-CN", "zh-Hans", "zh-TW", "zh-HK", "zh-Hant"]),
    ("fr", &["fr-FR", "fr", "fr-CA"]),
    ("de", &["de-DE", "de"]),
    ("ja", &["ja", "jp"]),
    ("pt", &["pt"]),
    ("ko", &["ko"]),
    ("it", &["it"]),
];

/// Expand a language code through the alias table
///
/// Unknown codes map to themselves.
pub fn expand_language(code: &str) -> Vec<String> {
    LANGUAGE_ALIASES
        .iter()
        .find(|(short, _)| *short == code)
        .map(|(_, variants)| variants.iter().map(|v| v.to_string()).collect())
        .unwrap_or_else(|| vec![code.to_string()])
}

fn expand_all(codes: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for code in codes {
        for variant in expand_language(code.trim()) {
            if !variant.is_empty() && !out.contains(&variant) {
                out.push(variant);
            }
        }
    }
    out
}

/// Required/optional caption language policy
///
/// Both lists keep configuration order after alias expansion, which makes
/// [`LanguagePolicy::choose_language`] deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LanguagePolicy {
    must: Vec<String>,
    choice: Vec<String>,
}

impl LanguagePolicy {
    /// Build a policy from short or full language codes
    pub fn new(must: &[String], choice: &[String]) -> Self {
        Self {
            must: expand_all(must),
            choice: expand_all(choice),
        }
    }

    /// True when neither list names a language
    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.choice.is_empty()
    }

    /// Expanded must-set
    pub fn must(&self) -> &[String] {
        &self.must
    }

    /// Expanded choice-set
    pub fn choice(&self) -> &[String] {
        &self.choice
    }

    /// Every expanded code, must-set first, without duplicates
    pub fn requested_languages(&self) -> Vec<String> {
        let mut all = self.must.clone();
        for code in &self.choice {
            if !all.contains(code) {
                all.push(code.clone());
            }
        }
        all
    }

    /// Does the candidate's caption language set satisfy the policy?
    pub fn accepts(&self, available: &BTreeSet<String>) -> bool {
        self.must
            .iter()
            .chain(self.choice.iter())
            .any(|code| available.contains(code))
    }

    /// Pick the caption language used for segmentation
    ///
    /// Returns `None` exactly when [`accepts`](Self::accepts) is false.
    pub fn choose_language(&self, available: &BTreeSet<String>) -> Option<String> {
        self.must
            .iter()
            .chain(self.choice.iter())
            .find(|code| available.contains(*code))
            .cloned()
    }
}

/// Does the text contain a CJK unified ideograph (U+4E00..=U+9FFF)?
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(|ch| ('\u{4e00}'..='\u{9fff}').contains(&ch))
}
