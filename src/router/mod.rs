//! Routing logic for chatrelay
//!
//! A message is first classified into an [`Intent`]; the intent decides
//! whether the fine-tuned model answers it once or the general-purpose model
//! streams a reply.

pub mod classifier;
pub mod model_router;
pub mod prompts;

pub use classifier::{IntentClassifier, LlmIntentClassifier};
pub use model_router::{ModelEndpoints, ModelRouter, ReplyStream, RouteOutcome};

use serde::{Deserialize, Serialize};

/// Binary classification of a user message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Open-ended conversation, answered by the general-purpose model
    General,
    /// Domain-specific request, answered by the fine-tuned model
    NotGeneral,
}

impl Intent {
    /// Identifier used for logging and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::NotGeneral => "not_general",
        }
    }

    /// Label text the classifier model is asked to produce
    pub fn label(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::NotGeneral => "not general",
        }
    }

    /// Normalize a classifier reply into an intent
    ///
    /// Trims, lower-cases and strips surrounding quotes and a trailing period.
    /// Anything outside the label set falls back to `General`.
    pub fn from_label(raw: &str) -> Self {
        let lowered = raw.trim().to_lowercase();
        let normalized = lowered
            .trim_end_matches('.')
            .trim_matches(|c| c == '"' || c == '\'' || c == '`')
            .trim_end_matches('.')
            .trim();

        match normalized {
            "not general" => Self::NotGeneral,
            "general" => Self::General,
            _ => {
                tracing::warn!(
                    label = %raw,
                    "Classifier returned an unknown label, treating as general"
                );
                Self::General
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_as_str() {
        assert_eq!(Intent::General.as_str(), "general");
        assert_eq!(Intent::NotGeneral.as_str(), "not_general");
    }

    #[test]
    fn test_from_label_exact() {
        assert_eq!(Intent::from_label("general"), Intent::General);
        assert_eq!(Intent::from_label("not general"), Intent::NotGeneral);
    }

    #[test]
    fn test_from_label_is_case_and_whitespace_insensitive() {
        assert_eq!(Intent::from_label("  Not General\n"), Intent::NotGeneral);
        assert_eq!(Intent::from_label("GENERAL"), Intent::General);
    }

    #[test]
    fn test_from_label_strips_quotes_and_period() {
        assert_eq!(Intent::from_label("\"not general\""), Intent::NotGeneral);
        assert_eq!(Intent::from_label("'not general'."), Intent::NotGeneral);
        assert_eq!(Intent::from_label("not general."), Intent::NotGeneral);
        assert_eq!(Intent::from_label("\"general.\""), Intent::General);
    }

    #[test]
    fn test_from_label_unknown_falls_back_to_general() {
        assert_eq!(Intent::from_label("top up"), Intent::General);
        assert_eq!(Intent::from_label(""), Intent::General);
        assert_eq!(
            Intent::from_label("The message is not general"),
            Intent::General
        );
    }

    #[test]
    fn test_label_round_trips_through_from_label() {
        for intent in [Intent::General, Intent::NotGeneral] {
            assert_eq!(Intent::from_label(intent.label()), intent);
        }
    }
}
