use std::collections::BTreeMap;

use crate::models::answer::AnswerValue;

/// Current answers keyed by question id. An entry exists only once the
/// question has been touched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnswerStore {
    answers: BTreeMap<String, AnswerValue>,
}

impl AnswerStore {
    pub fn from_map(answers: BTreeMap<String, AnswerValue>) -> Self {
        Self { answers }
    }

    /// Replaces whatever was stored for the question.
    pub fn set(&mut self, question_id: &str, value: AnswerValue) {
        self.answers.insert(question_id.to_string(), value);
    }

    pub fn get(&self, question_id: &str) -> Option<&AnswerValue> {
        self.answers.get(question_id)
    }

    pub fn clear(&mut self, question_id: &str) -> Option<AnswerValue> {
        self.answers.remove(question_id)
    }

    pub fn has_content(&self, question_id: &str) -> bool {
        self.get(question_id).is_some_and(AnswerValue::has_content)
    }

    pub fn snapshot(&self) -> BTreeMap<String, AnswerValue> {
        self.answers.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_previous_selection() {
        let mut store = AnswerStore::default();
        store.set(
            "q2",
            AnswerValue::MultipleChoice(["A".to_string(), "B".to_string()].into()),
        );
        store.set("q2", AnswerValue::MultipleChoice(["C".to_string()].into()));
        assert_eq!(
            store.get("q2"),
            Some(&AnswerValue::MultipleChoice(["C".to_string()].into()))
        );
    }

    #[test]
    fn clear_distinguishes_absent_from_zero() {
        let mut store = AnswerStore::default();
        store.set("q3", AnswerValue::Numeric(0.0));
        assert!(store.has_content("q3"));
        store.clear("q3");
        assert_eq!(store.get("q3"), None);
    }
}
