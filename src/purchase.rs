// 🧾 Purchase Wizard - contact fields collected after a match

use serde::{Deserialize, Serialize};

use crate::validation::{self, ValidationResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Required,
    Email,
    Phone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContactField {
    pub id: &'static str,
    pub prompt: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
}

impl ContactField {
    pub fn validate(&self, raw: &str) -> ValidationResult<String> {
        match self.kind {
            FieldKind::Required => validation::require(self.id, raw),
            FieldKind::Email => validation::validate_email(self.id, raw),
            FieldKind::Phone => validation::validate_phone(self.id, raw),
        }
    }
}

pub static CONTACT_FIELDS: [ContactField; 5] = [
    ContactField {
        id: "company_name",
        prompt: "What is the name of the company purchasing the bond?",
        label: "Company",
        kind: FieldKind::Required,
    },
    ContactField {
        id: "contact_name",
        prompt: "Who is the best person to contact?",
        label: "Contact",
        kind: FieldKind::Required,
    },
    ContactField {
        id: "address",
        prompt: "What is the company's mailing address?",
        label: "Address",
        kind: FieldKind::Required,
    },
    ContactField {
        id: "phone",
        prompt: "What phone number can we reach you at?",
        label: "Phone",
        kind: FieldKind::Phone,
    },
    ContactField {
        id: "email",
        prompt: "What email address should we use?",
        label: "Email",
        kind: FieldKind::Email,
    },
];

/// Contact details; phone is stored E.164-normalized
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub company_name: String,
    pub contact_name: String,
    pub address: String,
    pub phone: String,
    pub email: String,
}

impl ContactInfo {
    pub fn get(&self, id: &str) -> Option<&str> {
        let value = match id {
            "company_name" => &self.company_name,
            "contact_name" => &self.contact_name,
            "address" => &self.address,
            "phone" => &self.phone,
            "email" => &self.email,
            _ => return None,
        };
        Some(value.as_str())
    }

    pub fn set(&mut self, id: &str, value: String) {
        match id {
            "company_name" => self.company_name = value,
            "contact_name" => self.contact_name = value,
            "address" => self.address = value,
            "phone" => self.phone = value,
            "email" => self.email = value,
            _ => {}
        }
    }

    /// Every field filled and passing its validator
    pub fn is_complete(&self) -> bool {
        CONTACT_FIELDS.iter().all(|field| {
            self.get(field.id)
                .map(|value| field.validate(value).is_ok())
                .unwrap_or(false)
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_validate_by_kind() {
        assert!(CONTACT_FIELDS[0].validate("").is_err());
        assert_eq!(CONTACT_FIELDS[3].validate("512 555 0142").unwrap(), "+15125550142");
        assert!(CONTACT_FIELDS[4].validate("not-an-email").is_err());
    }

    #[test]
    fn test_contact_completeness() {
        let mut contact = ContactInfo::default();
        assert!(!contact.is_complete());

        contact.set("company_name", "Acme Paving".into());
        contact.set("contact_name", "Jo Rivera".into());
        contact.set("address", "1 Main St, Austin, TX".into());
        contact.set("phone", "+15125550142".into());
        assert!(!contact.is_complete());

        contact.set("email", "jo@acme.com".into());
        assert!(contact.is_complete());
        assert_eq!(contact.get("email"), Some("jo@acme.com"));
        assert_eq!(contact.get("fax"), None);
    }
}
