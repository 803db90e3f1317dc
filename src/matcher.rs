// 🎯 Record Matcher - exact-match lookup
//
// Exact match = case-insensitive, whitespace-trimmed equality.
// State abbreviations are expanded on BOTH sides; bond limit compares numerically.
// No fuzzy matching, no ranking: first match wins.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ChatbotError, Result};
use crate::questions::{question_for, Answers, LookupKey};
use crate::records::{BondRecord, RecordSet};
use crate::remote::RemoteLookup;
use crate::states;
use crate::validation::parse_amount;

// ============================================================================
// LOOKUP QUERY
// ============================================================================

/// The four mapped answers, ready to match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupQuery {
    pub state: String,
    pub city: String,
    pub bond_limit: f64,
    pub name: String,
}

impl LookupQuery {
    pub fn new(
        state: impl Into<String>,
        city: impl Into<String>,
        bond_limit: f64,
        name: impl Into<String>,
    ) -> Self {
        LookupQuery {
            state: states::expand(&state.into()),
            city: city.into().trim().to_string(),
            bond_limit,
            name: name.into().trim().to_string(),
        }
    }

    pub fn from_answers(answers: &Answers) -> Result<Self> {
        let state = answer_for(answers, LookupKey::State)?;
        let city = answer_for(answers, LookupKey::City)?;
        let raw_limit = answer_for(answers, LookupKey::BondLimit)?;
        let name = answer_for(answers, LookupKey::Name)?;

        let bond_limit = parse_amount(raw_limit).ok_or_else(|| {
            ChatbotError::MissingAnswer(LookupKey::BondLimit.column().to_string())
        })?;

        Ok(LookupQuery::new(state, city, bond_limit, name))
    }

    /// All four fields equal under exact-match rules
    pub fn matches(&self, record: &BondRecord) -> bool {
        same_text(&states::expand(&record.state), &self.state)
            && same_text(&record.city, &self.city)
            && same_amount(record.bond_limit, self.bond_limit)
            && same_text(&record.name, &self.name)
    }
}

fn answer_for(answers: &Answers, key: LookupKey) -> Result<&str> {
    answers.for_key(key).ok_or_else(|| {
        let id = question_for(key).map(|q| q.id).unwrap_or(key.column());
        ChatbotError::MissingAnswer(id.to_string())
    })
}

/// Case-insensitive, trimmed equality
pub fn same_text(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

/// Numeric equality to the cent
pub fn same_amount(a: f64, b: f64) -> bool {
    (a * 100.0).round() == (b * 100.0).round()
}

// ============================================================================
// LOCAL MATCHING
// ============================================================================

impl RecordSet {
    /// Linear scan; first matching record wins
    pub fn find_match(&self, query: &LookupQuery) -> Option<&BondRecord> {
        self.records().iter().find(|record| query.matches(record))
    }
}

// ============================================================================
// RECORD SOURCE
// ============================================================================

/// Where lookups go: an uploaded CSV held in memory, or one remote call
#[derive(Debug, Clone)]
pub enum RecordSource {
    Local(RecordSet),
    Remote(RemoteLookup),
}

impl RecordSource {
    pub fn describe(&self) -> String {
        match self {
            RecordSource::Local(set) => format!("local records ({} rows)", set.len()),
            RecordSource::Remote(remote) => format!("remote lookup ({})", remote.describe()),
        }
    }

    pub async fn lookup(&self, query: &LookupQuery) -> Result<Option<BondRecord>> {
        let found = match self {
            RecordSource::Local(set) => set.find_match(query).cloned(),
            RecordSource::Remote(remote) => {
                let candidate = remote.fetch(query).await?;
                // Remote ilike/eq semantics may be looser than ours
                match candidate {
                    Some(record) if query.matches(&record) => Some(record),
                    Some(record) => {
                        warn!("Remote returned a non-exact match for {:?}: {:?}", query, record);
                        None
                    }
                    None => None,
                }
            }
        };

        match &found {
            Some(record) => info!("Matched bond record {} / {} / {}", record.state, record.city, record.name),
            None => debug!("No bond record matched {:?}", query),
        }

        Ok(found)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::test_server::one_shot_server;
    use crate::states::abbreviations;

    fn sample_set() -> RecordSet {
        RecordSet::new(vec![
            BondRecord::new("TX", "Austin", 25000.0, "City of Austin").with_premium(250.0),
            BondRecord::new("Texas", "Dallas", 10000.0, "Dallas County"),
            BondRecord::new("California", "Fresno", 5000.0, "Fresno County"),
        ])
    }

    fn answers(state: &str, city: &str, limit: &str, name: &str) -> Answers {
        let mut answers = Answers::new();
        answers.set("state", state);
        answers.set("city", city);
        answers.set("bond_limit", limit);
        answers.set("name", name);
        answers.set("effective_date", "2026-11-01");
        answers
    }

    #[test]
    fn test_exact_match_returns_record() {
        let set = sample_set();
        let query = LookupQuery::from_answers(&answers("Texas", "austin ", "$25,000", "CITY OF AUSTIN")).unwrap();

        let record = set.find_match(&query).unwrap();
        assert_eq!(record.city, "Austin");
        assert_eq!(record.premium, Some(250.0));
    }

    #[test]
    fn test_no_match_returns_none() {
        let set = sample_set();
        let query = LookupQuery::from_answers(&answers("Texas", "Austin", "25001", "City of Austin")).unwrap();
        assert!(set.find_match(&query).is_none());

        let query = LookupQuery::from_answers(&answers("Texas", "Austin", "25000", "City of Austi")).unwrap();
        assert!(set.find_match(&query).is_none());
    }

    #[test]
    fn test_abbreviation_expanded_on_both_sides() {
        let set = sample_set();

        let query = LookupQuery::new("ca", "Fresno", 5000.0, "Fresno County");
        assert_eq!(query.state, "California");
        assert!(set.find_match(&query).is_some());

        // record stores "TX", answer says "Texas"
        let query = LookupQuery::new("Texas", "Austin", 25000.0, "City of Austin");
        assert!(set.find_match(&query).is_some());
    }

    #[test]
    fn test_every_abbreviation_matches_full_name_record() {
        for abbr in abbreviations() {
            let full = states::full_name(abbr).unwrap();
            let set = RecordSet::new(vec![BondRecord::new(full, "Springfield", 1000.0, "Clerk")]);
            let query = LookupQuery::new(abbr, "Springfield", 1000.0, "Clerk");
            assert!(set.find_match(&query).is_some(), "{abbr} should match {full}");
        }
    }

    #[test]
    fn test_first_match_wins() {
        let set = RecordSet::new(vec![
            BondRecord::new("Ohio", "Akron", 100.0, "A").with_premium(1.0),
            BondRecord::new("OH", "akron", 100.0, "a").with_premium(2.0),
        ]);
        let query = LookupQuery::new("Ohio", "Akron", 100.0, "A");
        assert_eq!(set.find_match(&query).unwrap().premium, Some(1.0));
    }

    #[test]
    fn test_missing_answer_is_reported() {
        let mut partial = Answers::new();
        partial.set("state", "Texas");
        match LookupQuery::from_answers(&partial) {
            Err(ChatbotError::MissingAnswer(id)) => assert_eq!(id, "city"),
            other => panic!("expected MissingAnswer, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_local_source_lookup() {
        let source = RecordSource::Local(sample_set());
        let query = LookupQuery::new("TX", "Dallas", 10000.0, "Dallas County");
        let found = source.lookup(&query).await.unwrap();
        assert_eq!(found.unwrap().name, "Dallas County");

        let empty = RecordSource::Local(RecordSet::default());
        assert!(empty.lookup(&query).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remote_record_is_rechecked_locally() {
        let base = one_shot_server(
            "200 OK",
            r#"{"record":{"state":"Texas","city":"Round Rock","bond_limit":25000,"name":"City of Austin"}}"#,
        )
        .await;
        let source = RecordSource::Remote(RemoteLookup::endpoint(base));

        let query = LookupQuery::new("TX", "Austin", 25000.0, "City of Austin");
        assert!(source.lookup(&query).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_remote_exact_record_is_kept() {
        let base = one_shot_server(
            "200 OK",
            r#"{"record":{"state":"tx","city":"AUSTIN","bond_limit":"25,000.00","name":"city of austin"}}"#,
        )
        .await;
        let source = RecordSource::Remote(RemoteLookup::endpoint(base));

        let query = LookupQuery::new("Texas", "Austin", 25000.0, "City of Austin");
        let record = source.lookup(&query).await.unwrap().unwrap();
        assert_eq!(record.city, "AUSTIN");
    }
}
