//! Built-in acceptance policies.
//!
//! A policy sees only the raw profile snapshot, so it can be re-run later
//! against stored rows without touching the network.

use serde::Deserialize;

use crate::traits::AcceptancePolicy;

/// Accepts every profile.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl AcceptancePolicy for AcceptAll {
    fn accept(&self, _raw: &[u8]) -> bool {
        true
    }
}

#[derive(Deserialize)]
struct SnapshotFields {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    lang: Option<String>,
    #[serde(default)]
    status: Option<StatusFields>,
}

#[derive(Deserialize)]
struct StatusFields {
    #[serde(default)]
    lang: Option<String>,
}

fn snapshot_fields(raw: &[u8]) -> Option<SnapshotFields> {
    match serde_json::from_slice(raw) {
        Ok(fields) => Some(fields),
        Err(e) => {
            tracing::debug!(error = %e, "Snapshot is not valid JSON, rejecting");
            None
        }
    }
}

/// Accepts profiles whose description mentions any of the keywords,
/// case-insensitively.
#[derive(Debug, Clone)]
pub struct DescriptionKeywords {
    keywords: Vec<String>,
}

impl DescriptionKeywords {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

impl AcceptancePolicy for DescriptionKeywords {
    fn accept(&self, raw: &[u8]) -> bool {
        let Some(fields) = snapshot_fields(raw) else {
            return false;
        };
        let description = fields.description.unwrap_or_default().to_lowercase();
        self.keywords.iter().any(|k| description.contains(k.as_str()))
    }
}

/// Accepts profiles whose declared language (or, failing that, the language
/// of their embedded latest message) matches.
#[derive(Debug, Clone)]
pub struct LanguageIs {
    lang: String,
}

impl LanguageIs {
    pub fn new(lang: impl Into<String>) -> Self {
        Self {
            lang: lang.into().to_lowercase(),
        }
    }
}

impl AcceptancePolicy for LanguageIs {
    fn accept(&self, raw: &[u8]) -> bool {
        let Some(fields) = snapshot_fields(raw) else {
            return false;
        };
        fields
            .lang
            .or_else(|| fields.status.and_then(|s| s.lang))
            .map(|lang| lang.to_lowercase() == self.lang)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_match_case_insensitively() {
        let policy = DescriptionKeywords::new(["Rust", " systems "]);
        assert!(policy.accept(br#"{"description":"I write rust for fun"}"#));
        assert!(policy.accept(br#"{"description":"Distributed SYSTEMS nerd"}"#));
        assert!(!policy.accept(br#"{"description":"gardening"}"#));
        assert!(!policy.accept(br#"{"id":1}"#));
    }

    #[test]
    fn blank_keywords_are_dropped() {
        assert!(DescriptionKeywords::new(["", "  "]).is_empty());
    }

    #[test]
    fn unparsable_snapshots_are_rejected() {
        assert!(!DescriptionKeywords::new(["rust"]).accept(b"not json"));
        assert!(!LanguageIs::new("en").accept(b"not json"));
    }

    #[test]
    fn language_falls_back_to_latest_status() {
        let policy = LanguageIs::new("EN");
        assert!(policy.accept(br#"{"lang":"en"}"#));
        assert!(policy.accept(br#"{"lang":null,"status":{"lang":"en"}}"#));
        assert!(!policy.accept(br#"{"lang":"de"}"#));
        assert!(!policy.accept(br#"{}"#));
    }

    #[test]
    fn closures_are_policies() {
        let policy = |raw: &[u8]| raw.starts_with(b"{");
        assert!(policy.accept(b"{}"));
        assert!(AcceptAll.accept(b"anything"));
    }
}
