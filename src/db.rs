// 🗄️ Storage - SQLite (WAL)
// Imported bond records, completed payment-link requests, no-match inquiries.

use rusqlite::{params, Connection};
use tracing::{debug, info};

use crate::error::Result;
use crate::records::{BondRecord, RecordSet};
use crate::wizard::{Inquiry, PaymentLinkRequest};

/// Summary row for a stored payment-link request
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct StoredRequest {
    pub reference: String,
    pub company_name: String,
    pub channel: String,
    pub destination: String,
    pub bond_limit: f64,
    pub created_at: String,
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Bond records (CSV imports)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS bond_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            state TEXT NOT NULL,
            city TEXT NOT NULL,
            bond_limit REAL NOT NULL,
            name TEXT NOT NULL,
            premium REAL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (state, city, bond_limit, name)
        )",
        [],
    )?;

    // ==========================================================================
    // Payment-link requests (done phase)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS payment_link_requests (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            idempotency_hash TEXT UNIQUE NOT NULL,
            reference TEXT UNIQUE NOT NULL,
            answers TEXT NOT NULL,
            record TEXT NOT NULL,
            contact TEXT NOT NULL,
            company_name TEXT NOT NULL,
            channel TEXT NOT NULL,
            destination TEXT NOT NULL,
            bond_limit REAL NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Inquiries (no match / lookup failure)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS inquiries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            reference TEXT UNIQUE NOT NULL,
            answers TEXT NOT NULL,
            reason TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

/// Insert records, skipping exact duplicates. Returns rows inserted.
pub fn insert_records(conn: &Connection, records: &[BondRecord]) -> Result<usize> {
    let mut inserted = 0;
    let mut duplicates = 0;

    for record in records {
        let changed = conn.execute(
            "INSERT OR IGNORE INTO bond_records (state, city, bond_limit, name, premium)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![record.state, record.city, record.bond_limit, record.name, record.premium],
        )?;

        if changed == 0 {
            duplicates += 1;
        } else {
            inserted += 1;
        }
    }

    info!("Inserted {} bond records, skipped {} duplicates", inserted, duplicates);
    Ok(inserted)
}

pub fn get_all_records(conn: &Connection) -> Result<RecordSet> {
    let mut stmt = conn.prepare(
        "SELECT state, city, bond_limit, name, premium FROM bond_records ORDER BY id",
    )?;

    let records = stmt
        .query_map([], |row| {
            Ok(BondRecord {
                state: row.get(0)?,
                city: row.get(1)?,
                bond_limit: row.get(2)?,
                name: row.get(3)?,
                premium: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(RecordSet::new(records))
}

pub fn count_records(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM bond_records", [], |row| row.get(0))?;
    Ok(count)
}

/// Store a completed request. Returns false when the same content was
/// already stored (idempotency hash collision).
pub fn insert_payment_link_request(conn: &Connection, request: &PaymentLinkRequest) -> Result<bool> {
    let hash = request.compute_idempotency_hash();

    let changed = conn.execute(
        "INSERT OR IGNORE INTO payment_link_requests (
            idempotency_hash, reference, answers, record, contact,
            company_name, channel, destination, bond_limit, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            hash,
            request.reference.to_string(),
            serde_json::to_string(&request.answers)?,
            serde_json::to_string(&request.record)?,
            serde_json::to_string(&request.contact)?,
            request.contact.company_name,
            request.channel.as_str(),
            request.destination,
            request.record.bond_limit,
            request.created_at.to_rfc3339(),
        ],
    )?;

    if changed == 0 {
        debug!("Payment link request {} already stored", request.reference);
    }
    Ok(changed > 0)
}

pub fn get_payment_link_requests(conn: &Connection) -> Result<Vec<StoredRequest>> {
    let mut stmt = conn.prepare(
        "SELECT reference, company_name, channel, destination, bond_limit, created_at
         FROM payment_link_requests ORDER BY id",
    )?;

    let rows = stmt
        .query_map([], |row| {
            Ok(StoredRequest {
                reference: row.get(0)?,
                company_name: row.get(1)?,
                channel: row.get(2)?,
                destination: row.get(3)?,
                bond_limit: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

pub fn insert_inquiry(conn: &Connection, inquiry: &Inquiry) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO inquiries (reference, answers, reason, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            inquiry.reference.to_string(),
            serde_json::to_string(&inquiry.answers)?,
            inquiry.reason,
            inquiry.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn count_inquiries(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM inquiries", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::purchase::ContactInfo;
    use crate::questions::Answers;
    use crate::wizard::DeliveryChannel;
    use chrono::Utc;
    use uuid::Uuid;

    fn memory_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn sample_request() -> PaymentLinkRequest {
        let mut answers = Answers::new();
        answers.set("state", "Texas");
        answers.set("city", "Austin");

        PaymentLinkRequest {
            reference: Uuid::new_v4(),
            answers,
            record: BondRecord::new("TX", "Austin", 25000.0, "City of Austin"),
            contact: ContactInfo {
                company_name: "Acme Paving".into(),
                contact_name: "Jo Rivera".into(),
                address: "1 Main St".into(),
                phone: "+15125550142".into(),
                email: "jo@acme.com".into(),
            },
            channel: DeliveryChannel::Email,
            destination: "jo@acme.com".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_import_records_twice_is_idempotent() {
        let conn = memory_db();
        let records = vec![
            BondRecord::new("TX", "Austin", 25000.0, "City of Austin").with_premium(250.0),
            BondRecord::new("OH", "Akron", 1000.0, "Summit County"),
        ];

        assert_eq!(insert_records(&conn, &records).unwrap(), 2);
        assert_eq!(insert_records(&conn, &records).unwrap(), 0);
        assert_eq!(count_records(&conn).unwrap(), 2);

        let set = get_all_records(&conn).unwrap();
        assert_eq!(set.records()[0].premium, Some(250.0));
        assert_eq!(set.records()[1].premium, None);
    }

    #[test]
    fn test_same_request_stored_once() {
        let conn = memory_db();
        let request = sample_request();

        assert!(insert_payment_link_request(&conn, &request).unwrap());

        let mut resubmitted = request.clone();
        resubmitted.reference = Uuid::new_v4();
        assert!(!insert_payment_link_request(&conn, &resubmitted).unwrap());

        let stored = get_payment_link_requests(&conn).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].reference, request.reference.to_string());
        assert_eq!(stored[0].channel, "email");
    }

    #[test]
    fn test_inquiries_are_counted() {
        let conn = memory_db();
        let inquiry = Inquiry {
            reference: Uuid::new_v4(),
            answers: Answers::new(),
            reason: Some("Remote lookup returned status 503".into()),
            created_at: Utc::now(),
        };

        insert_inquiry(&conn, &inquiry).unwrap();
        insert_inquiry(&conn, &inquiry).unwrap();
        assert_eq!(count_inquiries(&conn).unwrap(), 1);
    }
}
