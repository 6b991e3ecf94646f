//! Content policy: literal substring matching, first failing rule wins.

use std::fmt;

use crate::policy::SettingsView;

const LINK_MARKERS: [&str; 3] = ["http://", "https://", "www."];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    BannedWord,
    ExternalLink,
    Flood,
}

impl ViolationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ViolationKind::BannedWord => "banned_word",
            ViolationKind::ExternalLink => "external_link",
            ViolationKind::Flood => "flood",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub kind: ViolationKind,
    pub reason: String,
}

impl Violation {
    pub fn flood() -> Self {
        Self {
            kind: ViolationKind::Flood,
            reason: "sending messages too fast".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ContentPolicyEngine;

impl ContentPolicyEngine {
    pub fn new() -> Self {
        Self
    }

    /// Check `text` against the chat policy.
    ///
    /// Banned words are tried in configured order before link markers; matching
    /// is case-insensitive substring containment, so words inside longer words
    /// match too.
    pub fn evaluate(&self, text: &str, policy: &SettingsView) -> Option<Violation> {
        let text = text.to_lowercase();

        for word in &policy.banned_words {
            let word = word.to_lowercase();
            if !word.is_empty() && text.contains(&word) {
                return Some(Violation {
                    kind: ViolationKind::BannedWord,
                    reason: format!("banned word: {word}"),
                });
            }
        }

        if LINK_MARKERS.iter().any(|m| text.contains(m)) {
            return Some(Violation {
                kind: ViolationKind::ExternalLink,
                reason: "posting external links".to_string(),
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn policy(words: &[&str]) -> SettingsView {
        SettingsView {
            banned_words: words.iter().map(|w| w.to_string()).collect(),
            max_warnings: 3,
            ban_duration: Duration::from_secs(60),
        }
    }

    #[test]
    fn clean_text_has_no_violation() {
        let engine = ContentPolicyEngine::new();
        assert_eq!(engine.evaluate("hello there", &policy(&["spam"])), None);
        assert_eq!(engine.evaluate("", &policy(&["spam"])), None);
    }

    #[test]
    fn banned_word_is_case_insensitive_substring() {
        let engine = ContentPolicyEngine::new();
        let v = engine
            .evaluate("Buy cheap SPAMMERS now", &policy(&["spam"]))
            .unwrap();
        assert_eq!(v.kind, ViolationKind::BannedWord);
        assert!(v.reason.contains("spam"));
    }

    #[test]
    fn first_configured_word_wins() {
        let engine = ContentPolicyEngine::new();
        let v = engine
            .evaluate("scam and spam", &policy(&["spam", "scam"]))
            .unwrap();
        assert_eq!(v.reason, "banned word: spam");
    }

    #[test]
    fn banned_word_takes_priority_over_link() {
        let engine = ContentPolicyEngine::new();
        let v = engine
            .evaluate("spam at https://example.com", &policy(&["spam"]))
            .unwrap();
        assert_eq!(v.kind, ViolationKind::BannedWord);
    }

    #[test]
    fn link_markers_are_detected() {
        let engine = ContentPolicyEngine::new();
        for text in ["see http://a.b", "HTTPS://x.y", "visit WWW.site"] {
            let v = engine.evaluate(text, &policy(&[])).unwrap();
            assert_eq!(v.kind, ViolationKind::ExternalLink, "{text}");
        }
        assert_eq!(engine.evaluate("example.com", &policy(&[])), None);
    }

    #[test]
    fn empty_word_never_matches() {
        let engine = ContentPolicyEngine::new();
        assert_eq!(engine.evaluate("anything", &policy(&[""])), None);
    }
}
