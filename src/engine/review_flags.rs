use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewFlags {
    flagged: BTreeSet<String>,
}

impl ReviewFlags {
    pub fn from_set(flagged: BTreeSet<String>) -> Self {
        Self { flagged }
    }

    /// Flips membership and returns whether the question is now flagged.
    pub fn toggle(&mut self, question_id: &str) -> bool {
        if self.flagged.remove(question_id) {
            false
        } else {
            self.flagged.insert(question_id.to_string());
            true
        }
    }

    pub fn is_flagged(&self, question_id: &str) -> bool {
        self.flagged.contains(question_id)
    }

    pub fn snapshot(&self) -> BTreeSet<String> {
        self.flagged.clone()
    }
}
