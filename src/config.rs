// ⚙️ Configuration - environment driven
//
// BOND_PORT, BOND_DB_PATH, BOND_CSV_PATH, BOND_LOOKUP_URL,
// BOND_TABLE_URL, BOND_TABLE_NAME, BOND_API_KEY, BOND_SESSION_TTL_SECS

use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use tracing::{info, warn};

use crate::error::{ChatbotError, Result};
use crate::matcher::RecordSource;
use crate::records::RecordSet;
use crate::remote::RemoteLookup;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub db_path: PathBuf,
    pub csv_path: Option<PathBuf>,
    /// POST endpoint; wins over the hosted table when both are set
    pub lookup_url: Option<String>,
    pub table_url: Option<String>,
    pub table_name: String,
    pub api_key: Option<String>,
    /// Idle API sessions older than this are evicted
    pub session_ttl_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build from any key → value source
    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            port: try_load(&var, "BOND_PORT", "3000")?,
            db_path: try_load(&var, "BOND_DB_PATH", "bond_chatbot.db")?,
            csv_path: optional(&var, "BOND_CSV_PATH").map(PathBuf::from),
            lookup_url: optional(&var, "BOND_LOOKUP_URL"),
            table_url: optional(&var, "BOND_TABLE_URL"),
            table_name: try_load(&var, "BOND_TABLE_NAME", "bonds")?,
            api_key: optional(&var, "BOND_API_KEY"),
            session_ttl_secs: try_load(&var, "BOND_SESSION_TTL_SECS", "1800")?,
        })
    }

    /// Remote lookup when configured
    pub fn remote(&self) -> Option<RemoteLookup> {
        if let Some(url) = &self.lookup_url {
            return Some(RemoteLookup::endpoint(url.clone()));
        }
        self.table_url
            .as_ref()
            .map(|url| RemoteLookup::table(url.clone(), self.table_name.clone(), self.api_key.clone()))
    }

    /// Remote first, then CSV file, then `fallback` (e.g. records from the database)
    pub fn record_source(&self, fallback: RecordSet) -> Result<RecordSource> {
        if let Some(remote) = self.remote() {
            return Ok(RecordSource::Remote(remote));
        }

        if let Some(path) = &self.csv_path {
            return Ok(RecordSource::Local(RecordSet::load_csv(path)?));
        }

        if fallback.is_empty() {
            warn!("No bond records configured; every lookup will fall back to an inquiry");
        }
        Ok(RecordSource::Local(fallback))
    }
}

fn optional<F>(var: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn try_load<F, T>(var: &F, key: &str, default: &str) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    optional(var, key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");
            ChatbotError::Config {
                key: key.to_string(),
                reason: e.to_string(),
            }
        })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteTarget;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_vars(vars(&[])).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_path, PathBuf::from("bond_chatbot.db"));
        assert_eq!(config.table_name, "bonds");
        assert_eq!(config.session_ttl_secs, 1800);
        assert!(config.remote().is_none());
    }

    #[test]
    fn test_invalid_port_is_rejected() {
        match Config::from_vars(vars(&[("BOND_PORT", "eighty")])) {
            Err(ChatbotError::Config { key, .. }) => assert_eq!(key, "BOND_PORT"),
            other => panic!("expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_endpoint_wins_over_table() {
        let config = Config::from_vars(vars(&[
            ("BOND_LOOKUP_URL", "https://lookup.example.com/match"),
            ("BOND_TABLE_URL", "https://db.example.com"),
        ]))
        .unwrap();

        let remote = config.remote().unwrap();
        assert!(matches!(remote.target(), RemoteTarget::Endpoint { .. }));
    }

    #[test]
    fn test_table_source_uses_api_key() {
        let config = Config::from_vars(vars(&[
            ("BOND_TABLE_URL", "https://db.example.com"),
            ("BOND_TABLE_NAME", "surety_bonds"),
            ("BOND_API_KEY", " anon "),
        ]))
        .unwrap();

        match config.remote().unwrap().target() {
            RemoteTarget::Table { table, api_key, .. } => {
                assert_eq!(table, "surety_bonds");
                assert_eq!(api_key.as_deref(), Some("anon"));
            }
            other => panic!("expected table target, got {:?}", other),
        }
    }

    #[test]
    fn test_blank_values_count_as_unset() {
        let config = Config::from_vars(vars(&[("BOND_CSV_PATH", "  ")])).unwrap();
        assert!(config.csv_path.is_none());
        let source = config.record_source(RecordSet::default()).unwrap();
        assert!(matches!(source, RecordSource::Local(set) if set.is_empty()));
    }
}
