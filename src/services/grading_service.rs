use serde::{Deserialize, Serialize};

use crate::models::answer::AnswerValue;
use crate::models::question::{CorrectAnswer, Question};
use crate::models::test::TestDefinition;
use crate::models::test_attempt::AttemptRecord;

const NUMERIC_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GradedQuestion {
    pub question_id: String,
    pub answered: bool,
    pub correct: bool,
    pub earned: u32,
    pub max: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreReport {
    pub attempt_id: uuid::Uuid,
    pub earned: u32,
    pub max: u32,
    pub percentage: f64,
    pub passed: bool,
    pub questions: Vec<GradedQuestion>,
}

pub struct GradingService;

impl GradingService {
    /// Scores a submitted attempt. Pure: reads the record and the bank only.
    pub fn grade(test: &TestDefinition, record: &AttemptRecord) -> ScoreReport {
        let questions: Vec<GradedQuestion> = test
            .questions
            .iter()
            .map(|q| {
                let answer = record.answers.get(&q.id).filter(|a| a.has_content());
                let correct = answer.is_some_and(|a| Self::is_correct(q, a));
                GradedQuestion {
                    question_id: q.id.clone(),
                    answered: answer.is_some(),
                    correct,
                    earned: if correct { q.marks } else { 0 },
                    max: q.marks,
                }
            })
            .collect();

        let earned: u32 = questions.iter().map(|g| g.earned).sum();
        let max: u32 = questions.iter().map(|g| g.max).sum();
        let percentage = if max > 0 {
            f64::from(earned) / f64::from(max) * 100.0
        } else {
            0.0
        };

        ScoreReport {
            attempt_id: record.attempt_id,
            earned,
            max,
            percentage,
            passed: percentage >= test.passing_score,
            questions,
        }
    }

    fn is_correct(question: &Question, answer: &AnswerValue) -> bool {
        match (&question.correct_answer, answer) {
            (CorrectAnswer::Single(key), AnswerValue::SingleChoice(given)) => key == given,
            (CorrectAnswer::Multiple(keys), AnswerValue::MultipleChoice(given)) => keys == given,
            (CorrectAnswer::Single(key), AnswerValue::MultipleChoice(given)) => {
                given.len() == 1 && given.contains(key)
            }
            (CorrectAnswer::Numeric(key), AnswerValue::Numeric(given)) => {
                (key - given).abs() <= NUMERIC_TOLERANCE
            }
            _ => false,
        }
    }
}
