//! Clarifying questions and the answers collected for them.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Answers keyed by `question_id`; serialized as the phase-2 request body.
pub type QuestionAnswers = BTreeMap<String, String>;

/// A question the strategist needs answered before writing starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClarifyingQuestion {
    /// Identifier used as the answer key.
    #[serde(alias = "id")]
    pub question_id: String,
    /// Question text.
    #[serde(alias = "text")]
    pub question: String,
    /// Why the question matters.
    #[serde(default)]
    pub rationale: String,
    /// Whether an answer is mandatory.
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl ClarifyingQuestion {
    /// Construct a required question.
    #[must_use]
    pub fn new(question_id: impl Into<String>, question: impl Into<String>) -> Self {
        Self {
            question_id: question_id.into(),
            question: question.into(),
            rationale: String::new(),
            required: true,
        }
    }
}

/// Parse a question list that may hold objects or bare strings.
///
/// Entries without an identifier get positional ones (`q1`, `q2`, …).
/// Entries with no question text are dropped.
#[must_use]
pub fn questions_from_value(value: &Value) -> Vec<ClarifyingQuestion> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };

    items
        .iter()
        .enumerate()
        .filter_map(|(idx, item)| {
            let positional = || format!("q{}", idx + 1);
            match item {
                Value::String(text) if !text.trim().is_empty() => {
                    Some(ClarifyingQuestion::new(positional(), text.clone()))
                }
                Value::Object(obj) => {
                    let text = ["question", "text"]
                        .iter()
                        .find_map(|key| obj.get(*key).and_then(Value::as_str))
                        .filter(|text| !text.trim().is_empty())?;
                    let question_id = ["question_id", "id"]
                        .iter()
                        .find_map(|key| obj.get(*key).and_then(Value::as_str))
                        .map_or_else(positional, str::to_owned);
                    Some(ClarifyingQuestion {
                        question_id,
                        question: text.to_owned(),
                        rationale: obj
                            .get("rationale")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_owned(),
                        required: obj
                            .get("required")
                            .and_then(Value::as_bool)
                            .unwrap_or(true),
                    })
                }
                _ => None,
            }
        })
        .collect()
}

/// Serde adapter applying [`questions_from_value`] to a field.
pub(crate) fn deserialize_questions<'de, D>(
    deserializer: D,
) -> std::result::Result<Vec<ClarifyingQuestion>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(questions_from_value(&value))
}

/// Questions used when the server asks for answers but supplies none.
#[must_use]
pub fn fallback_questions() -> Vec<ClarifyingQuestion> {
    vec![
        ClarifyingQuestion {
            question_id: "q_experience".into(),
            question: "What personal experience or example should the post draw on?".into(),
            rationale: "Concrete stories make posts credible.".into(),
            required: true,
        },
        ClarifyingQuestion {
            question_id: "q_takeaway".into(),
            question: "What is the one takeaway readers should remember?".into(),
            rationale: "A single clear takeaway keeps the post focused.".into(),
            required: false,
        },
    ]
}
