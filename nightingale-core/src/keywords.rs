use crate::types::AlertType;

/// Phrases that signal a patient in distress, checked in order against each
/// transcribed utterance. Earlier entries take precedence, so `help` wins
/// over `help me` whenever both are present.
pub const DISTRESS_PHRASES: &[&str] = &[
    "help",
    "help me",
    "choking",
    "can't breathe",
    "cannot breathe",
    "pain",
    "emergency",
];

/// A phrase hit in an utterance. Every built-in phrase signals distress.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordMatch {
    pub phrase: String,
    pub alert_type: AlertType,
}

/// Case-insensitive substring matcher over a fixed ordered phrase list.
/// Stateless; sessions keep one instance each.
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    phrases: Vec<String>,
}

impl KeywordMatcher {
    /// Matcher over a custom phrase list, kept in the given order.
    pub fn new(phrases: Vec<String>) -> Self {
        KeywordMatcher {
            phrases: phrases.into_iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    /// Returns the first phrase in list order contained in `text`, or `None`
    /// when nothing matches or the text is blank. Plain substring search,
    /// not word-boundary aware.
    pub fn match_utterance(&self, text: &str) -> Option<KeywordMatch> {
        if text.trim().is_empty() {
            return None;
        }
        let lowered = text.to_lowercase();
        self.phrases
            .iter()
            .find(|phrase| lowered.contains(phrase.as_str()))
            .map(|phrase| KeywordMatch {
                phrase: phrase.clone(),
                alert_type: AlertType::Distress,
            })
    }
}

impl Default for KeywordMatcher {
    fn default() -> Self {
        KeywordMatcher::new(DISTRESS_PHRASES.iter().map(|p| p.to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_is_case_insensitive() {
        let matcher = KeywordMatcher::default();
        let matched = matcher.match_utterance("I NEED HELP now").unwrap();
        assert_eq!(matched.phrase, "help");
        assert_eq!(matched.alert_type, AlertType::Distress);
    }

    #[test]
    fn first_phrase_in_list_order_wins() {
        let matcher = KeywordMatcher::default();
        // "pain" also appears, but "choking" sits earlier in the list
        let matched = matcher.match_utterance("she is choking and in pain").unwrap();
        assert_eq!(matched.phrase, "choking");
    }

    #[test]
    fn contraction_phrases_match() {
        let matcher = KeywordMatcher::default();
        let matched = matcher.match_utterance("I can't breathe").unwrap();
        assert_eq!(matched.phrase, "can't breathe");
    }

    #[test]
    fn blank_utterances_never_match() {
        let matcher = KeywordMatcher::default();
        assert!(matcher.match_utterance("").is_none());
        assert!(matcher.match_utterance("   \t").is_none());
    }

    #[test]
    fn unrelated_text_does_not_match() {
        let matcher = KeywordMatcher::default();
        assert!(matcher.match_utterance("lovely weather today").is_none());
    }

    #[test]
    fn substrings_inside_words_still_match() {
        let matcher = KeywordMatcher::default();
        // plain substring search: "painting" contains "pain"
        let matched = matcher.match_utterance("she is painting").unwrap();
        assert_eq!(matched.phrase, "pain");
    }

    #[test]
    fn custom_phrase_lists_are_lowercased() {
        let matcher = KeywordMatcher::new(vec!["Nurse".to_string(), "water".to_string()]);
        assert_eq!(matcher.match_utterance("NURSE please").unwrap().phrase, "nurse");
    }
}
