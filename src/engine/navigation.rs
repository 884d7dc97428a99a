use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::test::TestDefinition;

/// Answered and flagged are tracked independently; a question can be both.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionStatus {
    pub answered: bool,
    pub flagged: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DisplayStatus {
    Answered,
    Marked,
    Unanswered,
}

impl QuestionStatus {
    pub fn display(&self) -> DisplayStatus {
        if self.answered {
            DisplayStatus::Answered
        } else if self.flagged {
            DisplayStatus::Marked
        } else {
            DisplayStatus::Unanswered
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Overview {
    pub answered: usize,
    pub flagged: usize,
    pub unanswered: usize,
}

/// Position within the question sequence, plus the section layout derived
/// from the bank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigator {
    current: usize,
    len: usize,
    section_of: Vec<usize>,
    section_starts: Vec<usize>,
}

impl Navigator {
    pub fn new(test: &TestDefinition) -> Self {
        let sections = test.sections();
        let section_of: Vec<usize> = test
            .questions
            .iter()
            .map(|q| {
                sections
                    .iter()
                    .position(|s| *s == q.section.as_deref())
                    .unwrap_or(0)
            })
            .collect();
        let section_starts = (0..sections.len())
            .map(|s| section_of.iter().position(|&idx| idx == s).unwrap_or(0))
            .collect();

        Self {
            current: 0,
            len: test.questions.len(),
            section_of,
            section_starts,
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn question_count(&self) -> usize {
        self.len
    }

    pub fn section_count(&self) -> usize {
        self.section_starts.len()
    }

    pub fn current_section(&self) -> usize {
        self.section_of.get(self.current).copied().unwrap_or(0)
    }

    pub fn go_to(&mut self, index: usize) -> Result<usize> {
        if index >= self.len {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.len,
            });
        }
        self.current = index;
        Ok(self.current)
    }

    pub fn next(&mut self) -> usize {
        if self.current + 1 < self.len {
            self.current += 1;
        }
        self.current
    }

    pub fn previous(&mut self) -> usize {
        self.current = self.current.saturating_sub(1);
        self.current
    }

    pub fn go_to_section(&mut self, section: usize) -> Result<usize> {
        let start = *self
            .section_starts
            .get(section)
            .ok_or(Error::IndexOutOfRange {
                index: section,
                len: self.section_starts.len(),
            })?;
        self.current = start;
        Ok(self.current)
    }
}
