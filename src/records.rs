// 📄 Bond Records - CSV loading
// Expected headers: state, city, bond_limit, name (+ optional premium)

use serde::{Deserialize, Deserializer, Serialize};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{ChatbotError, Result};
use crate::validation::parse_amount;

// ============================================================================
// BOND RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BondRecord {
    pub state: String,
    pub city: String,
    #[serde(deserialize_with = "amount")]
    pub bond_limit: f64,
    /// Requester (obligee) name
    pub name: String,
    #[serde(default, deserialize_with = "optional_amount")]
    pub premium: Option<f64>,
}

impl BondRecord {
    pub fn new(
        state: impl Into<String>,
        city: impl Into<String>,
        bond_limit: f64,
        name: impl Into<String>,
    ) -> Self {
        BondRecord {
            state: state.into(),
            city: city.into(),
            bond_limit,
            name: name.into(),
            premium: None,
        }
    }

    pub fn with_premium(mut self, premium: f64) -> Self {
        self.premium = Some(premium);
        self
    }
}

/// Remote services send numbers either as JSON numbers or strings ("$25,000")
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(f64),
    Text(String),
}

fn amount<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    match NumberOrText::deserialize(deserializer)? {
        NumberOrText::Number(n) => Ok(n),
        NumberOrText::Text(s) => parse_amount(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid amount: {s:?}"))),
    }
}

fn optional_amount<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<f64>, D::Error> {
    match Option::<NumberOrText>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrText::Number(n)) => Ok(Some(n)),
        Some(NumberOrText::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(NumberOrText::Text(s)) => parse_amount(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid amount: {s:?}"))),
    }
}

// ============================================================================
// CSV ROW
// ============================================================================

/// Raw CSV row; amounts stay text so a bad cell can be reported by line
#[derive(Debug, Deserialize)]
struct CsvRow {
    state: String,
    city: String,
    bond_limit: String,
    name: String,
    #[serde(default)]
    premium: Option<String>,
}

impl CsvRow {
    fn into_record(self, line: u64) -> Result<BondRecord> {
        let bond_limit = parse_amount(&self.bond_limit).ok_or_else(|| ChatbotError::InvalidRecord {
            line,
            reason: format!("bond_limit {:?} is not a number", self.bond_limit),
        })?;

        let premium = match self.premium.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(parse_amount(raw).ok_or_else(|| ChatbotError::InvalidRecord {
                line,
                reason: format!("premium {:?} is not a number", raw),
            })?),
        };

        Ok(BondRecord {
            state: self.state,
            city: self.city,
            bond_limit,
            name: self.name,
            premium,
        })
    }
}

// ============================================================================
// RECORD SET
// ============================================================================

/// In-memory table of bond records (at most a few thousand rows)
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    records: Vec<BondRecord>,
}

impl RecordSet {
    pub fn new(records: Vec<BondRecord>) -> Self {
        RecordSet { records }
    }

    pub fn load_csv(csv_path: &Path) -> Result<Self> {
        let file = std::fs::File::open(csv_path).map_err(csv::Error::from)?;
        let set = Self::from_reader(file)?;
        info!("Loaded {} bond records from {:?}", set.len(), csv_path);
        Ok(set)
    }

    /// Parse CSV from any reader. Headers are trimmed and case-insensitive.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let headers: csv::StringRecord = rdr
            .headers()?
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect();
        rdr.set_headers(headers.clone());

        let mut records = Vec::new();
        let mut raw = csv::StringRecord::new();
        while rdr.read_record(&mut raw)? {
            // Line the record starts on; quoted fields may span several
            let line = raw.position().map(|pos| pos.line()).unwrap_or(0);
            let row: CsvRow = raw.deserialize(Some(&headers))?;
            records.push(row.into_record(line)?);
        }

        debug!("Parsed {} CSV rows", records.len());
        Ok(RecordSet { records })
    }

    pub fn records(&self) -> &[BondRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = "\
State, City ,Bond_Limit,Name,Premium
TX,Austin,\"$25,000\",City of Austin,250
California,Los Angeles,10000,LA County,
";

    #[test]
    fn test_reads_headers_case_insensitively() {
        let set = RecordSet::from_reader(SAMPLE.as_bytes()).unwrap();
        assert_eq!(set.len(), 2);

        let first = &set.records()[0];
        assert_eq!(first.state, "TX");
        assert_eq!(first.city, "Austin");
        assert_eq!(first.bond_limit, 25000.0);
        assert_eq!(first.premium, Some(250.0));

        assert_eq!(set.records()[1].premium, None);
    }

    #[test]
    fn test_premium_column_is_optional() {
        let csv = "state,city,bond_limit,name\nOH,Columbus,5000,Franklin County\n";
        let set = RecordSet::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(set.records()[0].premium, None);
        assert_eq!(set.records()[0].name, "Franklin County");
    }

    #[test]
    fn test_bad_bond_limit_reports_line() {
        let csv = "state,city,bond_limit,name\nOH,Columbus,5000,A\nOH,Dayton,n/a,B\n";
        match RecordSet::from_reader(csv.as_bytes()) {
            Err(ChatbotError::InvalidRecord { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected InvalidRecord, got {:?}", other),
        }
    }

    #[test]
    fn test_line_counts_multiline_quoted_fields() {
        let csv = "state,city,bond_limit,name\nOH,Columbus,5000,\"Franklin\nCounty\"\nOH,Dayton,n/a,B\n";
        match RecordSet::from_reader(csv.as_bytes()) {
            Err(ChatbotError::InvalidRecord { line, .. }) => assert_eq!(line, 4),
            other => panic!("expected InvalidRecord, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_required_header_fails() {
        let csv = "state,city,name\nOH,Columbus,A\n";
        assert!(RecordSet::from_reader(csv.as_bytes()).is_err());
    }

    #[test]
    fn test_load_csv_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let set = RecordSet::load_csv(file.path()).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_record_json_accepts_text_amounts() {
        let json = r#"{"state":"Texas","city":"Austin","bond_limit":"25,000","name":"X","premium":null}"#;
        let record: BondRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.bond_limit, 25000.0);
        assert_eq!(record.premium, None);

        let json = r#"{"state":"Texas","city":"Austin","bond_limit":25000,"name":"X"}"#;
        let record: BondRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.bond_limit, 25000.0);
    }
}
