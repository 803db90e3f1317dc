// ❓ Question Flow - the five qualifying prompts
// Each question knows its input type, its validation, and (optionally) which
// bond record column it is matched against.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::validation::{self, ValidationResult};

// ============================================================================
// QUESTION DEFINITION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    /// State name or 2-letter abbreviation
    State,
    /// Free text
    Text,
    /// Dollar amount
    Currency,
    /// Calendar date within the effective-date window
    Date,
}

/// Bond record column a question is matched against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupKey {
    State,
    City,
    BondLimit,
    Name,
}

impl LookupKey {
    pub fn column(&self) -> &'static str {
        match self {
            LookupKey::State => "state",
            LookupKey::City => "city",
            LookupKey::BondLimit => "bond_limit",
            LookupKey::Name => "name",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Question {
    pub id: &'static str,
    pub prompt: &'static str,
    /// Short label for the summary screen
    pub label: &'static str,
    pub input: InputType,
    pub lookup_key: Option<LookupKey>,
}

impl Question {
    /// Validate raw input and return the normalized answer
    pub fn validate(&self, raw: &str, today: NaiveDate) -> ValidationResult<String> {
        match self.input {
            InputType::State => validation::validate_state(self.id, raw),
            InputType::Text => validation::require(self.id, raw),
            InputType::Currency => validation::validate_bond_limit(self.id, raw),
            InputType::Date => validation::validate_date(self.id, raw, today)
                .map(|date| date.format("%Y-%m-%d").to_string()),
        }
    }
}

pub static QUESTIONS: [Question; 5] = [
    Question {
        id: "state",
        prompt: "Which state is the bond required in?",
        label: "State",
        input: InputType::State,
        lookup_key: Some(LookupKey::State),
    },
    Question {
        id: "city",
        prompt: "Which city or county is requiring the bond?",
        label: "City",
        input: InputType::Text,
        lookup_key: Some(LookupKey::City),
    },
    Question {
        id: "bond_limit",
        prompt: "What is the bond amount required?",
        label: "Bond amount",
        input: InputType::Currency,
        lookup_key: Some(LookupKey::BondLimit),
    },
    Question {
        id: "name",
        prompt: "Who is requesting the bond (obligee name)?",
        label: "Requested by",
        input: InputType::Text,
        lookup_key: Some(LookupKey::Name),
    },
    Question {
        id: "effective_date",
        prompt: "When should the bond take effect? (YYYY-MM-DD)",
        label: "Effective date",
        input: InputType::Date,
        lookup_key: None,
    },
];

/// Question id mapped to a lookup column
pub fn question_for(key: LookupKey) -> Option<&'static Question> {
    QUESTIONS.iter().find(|q| q.lookup_key == Some(key))
}

// ============================================================================
// ANSWER SET
// ============================================================================

/// Question id → normalized answer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Answers(BTreeMap<String, String>);

impl Answers {
    pub fn new() -> Self {
        Answers(BTreeMap::new())
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.0.get(id).map(String::as_str)
    }

    pub fn set(&mut self, id: impl Into<String>, value: impl Into<String>) {
        self.0.insert(id.into(), value.into());
    }

    /// Answer for the question mapped to `key`
    pub fn for_key(&self, key: LookupKey) -> Option<&str> {
        question_for(key).and_then(|q| self.get(q.id))
    }

    pub fn is_complete(&self) -> bool {
        QUESTIONS.iter().all(|q| self.get(q.id).is_some())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    #[test]
    fn test_four_questions_map_to_lookup_columns() {
        let mapped: Vec<_> = QUESTIONS.iter().filter_map(|q| q.lookup_key).collect();
        assert_eq!(
            mapped,
            vec![LookupKey::State, LookupKey::City, LookupKey::BondLimit, LookupKey::Name]
        );
        assert_eq!(question_for(LookupKey::BondLimit).unwrap().id, "bond_limit");
    }

    #[test]
    fn test_question_normalizes_by_input_type() {
        assert_eq!(QUESTIONS[0].validate("ca", today()).unwrap(), "California");
        assert_eq!(QUESTIONS[1].validate(" Austin ", today()).unwrap(), "Austin");
        assert_eq!(QUESTIONS[2].validate("$10,000", today()).unwrap(), "10000");
        assert_eq!(QUESTIONS[4].validate("11/01/2026", today()).unwrap(), "2026-11-01");
        assert!(QUESTIONS[4].validate("2020-01-01", today()).is_err());
    }

    #[test]
    fn test_answers_for_key_and_completeness() {
        let mut answers = Answers::new();
        answers.set("state", "Texas");
        assert_eq!(answers.for_key(LookupKey::State), Some("Texas"));
        assert!(!answers.is_complete());

        for q in &QUESTIONS[1..] {
            answers.set(q.id, "x");
        }
        assert!(answers.is_complete());
        assert_eq!(answers.len(), 5);
    }
}
