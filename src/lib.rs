// Bond Chatbot - Core Library
// Question flow, exact-match lookup and the purchase wizard, shared by the
// terminal chat and the API server

pub mod config;
pub mod db;
pub mod error;
pub mod matcher;
pub mod purchase;
pub mod questions;
pub mod records;
pub mod remote;
pub mod states;
pub mod validation;
pub mod wizard;

// Only compile front ends when their features are enabled
#[cfg(feature = "server")]
pub mod server;
#[cfg(feature = "tui")]
pub mod ui;

// Re-export commonly used types
pub use config::Config;
pub use error::{ChatbotError, Result};
pub use matcher::{LookupQuery, RecordSource};
pub use purchase::{ContactField, ContactInfo, FieldKind, CONTACT_FIELDS};
pub use questions::{Answers, InputType, LookupKey, Question, QUESTIONS};
pub use records::{BondRecord, RecordSet};
pub use remote::{RemoteLookup, RemoteTarget};
pub use validation::{
    format_amount, normalize_phone, parse_amount, parse_date, validate_date, validate_email,
    validate_phone, ValidationError,
};
pub use wizard::{DeliveryChannel, Inquiry, Message, PaymentLinkRequest, Phase, Sender, Wizard};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
