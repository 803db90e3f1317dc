// 🗺️ State Names - abbreviation → canonical full name
//
// "TX", "tx", "Texas", " texas " → all resolve to "Texas"

/// Postal abbreviations for the 50 states, DC and Puerto Rico
const STATES: &[(&str, &str)] = &[
    ("AL", "Alabama"),
    ("AK", "Alaska"),
    ("AZ", "Arizona"),
    ("AR", "Arkansas"),
    ("CA", "California"),
    ("CO", "Colorado"),
    ("CT", "Connecticut"),
    ("DE", "Delaware"),
    ("DC", "District of Columbia"),
    ("FL", "Florida"),
    ("GA", "Georgia"),
    ("HI", "Hawaii"),
    ("ID", "Idaho"),
    ("IL", "Illinois"),
    ("IN", "Indiana"),
    ("IA", "Iowa"),
    ("KS", "Kansas"),
    ("KY", "Kentucky"),
    ("LA", "Louisiana"),
    ("ME", "Maine"),
    ("MD", "Maryland"),
    ("MA", "Massachusetts"),
    ("MI", "Michigan"),
    ("MN", "Minnesota"),
    ("MS", "Mississippi"),
    ("MO", "Missouri"),
    ("MT", "Montana"),
    ("NE", "Nebraska"),
    ("NV", "Nevada"),
    ("NH", "New Hampshire"),
    ("NJ", "New Jersey"),
    ("NM", "New Mexico"),
    ("NY", "New York"),
    ("NC", "North Carolina"),
    ("ND", "North Dakota"),
    ("OH", "Ohio"),
    ("OK", "Oklahoma"),
    ("OR", "Oregon"),
    ("PA", "Pennsylvania"),
    ("PR", "Puerto Rico"),
    ("RI", "Rhode Island"),
    ("SC", "South Carolina"),
    ("SD", "South Dakota"),
    ("TN", "Tennessee"),
    ("TX", "Texas"),
    ("UT", "Utah"),
    ("VT", "Vermont"),
    ("VA", "Virginia"),
    ("WA", "Washington"),
    ("WV", "West Virginia"),
    ("WI", "Wisconsin"),
    ("WY", "Wyoming"),
];

/// Full name for a 2-letter abbreviation (case-insensitive)
pub fn full_name(abbreviation: &str) -> Option<&'static str> {
    let abbreviation = abbreviation.trim();
    STATES
        .iter()
        .find(|(abbr, _)| abbr.eq_ignore_ascii_case(abbreviation))
        .map(|(_, name)| *name)
}

/// Resolve either an abbreviation or a full name to the canonical full name
pub fn canonical(input: &str) -> Option<&'static str> {
    let input = input.trim();
    if input.len() == 2 {
        return full_name(input);
    }

    STATES
        .iter()
        .find(|(_, name)| name.eq_ignore_ascii_case(input))
        .map(|(_, name)| *name)
}

/// Expand an abbreviation if it is one; otherwise return the trimmed input.
///
/// Used on both sides of a match so that a CSV holding "TX" and an answer of
/// "Texas" compare equal.
pub fn expand(input: &str) -> String {
    canonical(input)
        .map(str::to_string)
        .unwrap_or_else(|| input.trim().to_string())
}

/// All known abbreviations
pub fn abbreviations() -> impl Iterator<Item = &'static str> {
    STATES.iter().map(|(abbr, _)| *abbr)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_abbreviation_expands() {
        for abbr in abbreviations() {
            let name = full_name(abbr).unwrap();
            assert!(name.len() > 2, "{abbr} should expand to a full name");
            assert_eq!(full_name(&abbr.to_lowercase()), Some(name));
            assert_eq!(expand(abbr), name);
        }
    }

    #[test]
    fn test_canonical_accepts_full_names() {
        assert_eq!(canonical("texas"), Some("Texas"));
        assert_eq!(canonical("  New York "), Some("New York"));
        assert_eq!(canonical("ny"), Some("New York"));
        assert_eq!(canonical("Atlantis"), None);
        assert_eq!(canonical("XX"), None);
    }

    #[test]
    fn test_expand_leaves_unknown_values_trimmed() {
        assert_eq!(expand("  Ontario "), "Ontario");
    }
}
