use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An answer value, tagged by the kind of question it answers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AnswerValue {
    SingleChoice(String),
    MultipleChoice(BTreeSet<String>),
    Numeric(#[serde(deserialize_with = "number_or_nan")] f64),
}

// NaN serializes as JSON null; read it back as NaN so drafts round-trip.
fn number_or_nan<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

impl AnswerValue {
    /// Whether the value carries content. A touched-but-empty answer still
    /// displays as unanswered.
    pub fn has_content(&self) -> bool {
        match self {
            AnswerValue::SingleChoice(id) => !id.trim().is_empty(),
            AnswerValue::MultipleChoice(ids) => !ids.is_empty(),
            AnswerValue::Numeric(v) => !v.is_nan(),
        }
    }

    pub fn kind(&self) -> crate::models::question::QuestionType {
        use crate::models::question::QuestionType;
        match self {
            AnswerValue::SingleChoice(_) => QuestionType::SingleChoice,
            AnswerValue::MultipleChoice(_) => QuestionType::MultipleChoice,
            AnswerValue::Numeric(_) => QuestionType::Numeric,
        }
    }
}
