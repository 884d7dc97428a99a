use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::models::answer::AnswerValue;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    #[serde(default = "default_marks")]
    pub marks: u32,
    pub correct_answer: CorrectAnswer,
    #[serde(default)]
    pub section: Option<String>,
}

fn default_marks() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
    Numeric,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionOption {
    pub id: String,
    pub text: String,
}

/// Reference answer used only by grading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum CorrectAnswer {
    Single(String),
    Multiple(BTreeSet<String>),
    Numeric(f64),
}

impl Question {
    pub fn has_option(&self, option_id: &str) -> bool {
        self.options.iter().any(|o| o.id == option_id)
    }

    /// Checks the structural rules a question must satisfy before a session
    /// can be built on top of it.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidTest("question id must not be empty".into()));
        }
        if self.marks == 0 {
            return Err(Error::InvalidTest(format!(
                "question {} must carry a positive mark weight",
                self.id
            )));
        }

        match self.question_type {
            QuestionType::SingleChoice | QuestionType::MultipleChoice => {
                if self.options.is_empty() {
                    return Err(Error::InvalidTest(format!(
                        "choice question {} has no options",
                        self.id
                    )));
                }
                let unique: BTreeSet<&str> = self.options.iter().map(|o| o.id.as_str()).collect();
                if unique.len() != self.options.len() {
                    return Err(Error::InvalidTest(format!(
                        "question {} has duplicate option ids",
                        self.id
                    )));
                }
            }
            QuestionType::Numeric => {
                if !self.options.is_empty() {
                    return Err(Error::InvalidTest(format!(
                        "numeric question {} must not define options",
                        self.id
                    )));
                }
            }
        }

        let key_matches = match (&self.question_type, &self.correct_answer) {
            (QuestionType::SingleChoice, CorrectAnswer::Single(id)) => self.has_option(id),
            (QuestionType::MultipleChoice, CorrectAnswer::Multiple(ids)) => {
                ids.iter().all(|id| self.has_option(id))
            }
            // A single-element key is indistinguishable from a plain string in JSON.
            (QuestionType::MultipleChoice, CorrectAnswer::Single(id)) => self.has_option(id),
            (QuestionType::Numeric, CorrectAnswer::Numeric(v)) => v.is_finite(),
            _ => false,
        };
        if !key_matches {
            return Err(Error::InvalidTest(format!(
                "question {} has a correct answer that does not fit its type",
                self.id
            )));
        }

        Ok(())
    }

    /// Validates a candidate answer against the declared type and options.
    pub fn check_answer(&self, value: &AnswerValue) -> Result<()> {
        match (self.question_type, value) {
            (QuestionType::SingleChoice, AnswerValue::SingleChoice(id)) => {
                if id.is_empty() || self.has_option(id) {
                    Ok(())
                } else {
                    Err(Error::InvalidAnswer(format!(
                        "option {} does not belong to question {}",
                        id, self.id
                    )))
                }
            }
            (QuestionType::MultipleChoice, AnswerValue::MultipleChoice(ids)) => {
                match ids.iter().find(|id| !self.has_option(id)) {
                    Some(id) => Err(Error::InvalidAnswer(format!(
                        "option {} does not belong to question {}",
                        id, self.id
                    ))),
                    None => Ok(()),
                }
            }
            (QuestionType::Numeric, AnswerValue::Numeric(_)) => Ok(()),
            (expected, given) => Err(Error::InvalidAnswer(format!(
                "question {} expects a {:?} answer, got {:?}",
                self.id,
                expected,
                given.kind()
            ))),
        }
    }
}

/// Question as shown to the person taking the test: no reference answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub id: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub text: String,
    pub options: Vec<QuestionOption>,
    pub marks: u32,
    pub section: Option<String>,
}

impl From<&Question> for PublicQuestion {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id.clone(),
            question_type: q.question_type,
            text: q.text.clone(),
            options: q.options.clone(),
            marks: q.marks,
            section: q.section.clone(),
        }
    }
}
