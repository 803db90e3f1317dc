// 🧭 Wizard State Machine
//
// qa → summary → (lookup) → purchase → consent → delivery → done
//                    └──── no match / lookup error ────→ inquiry
//
// Navigation is strictly linear over fixed-length step arrays. The summary
// screen can jump back to any question (edit), pre-filling the stored answer.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ChatbotError, Result};
use crate::matcher::{LookupQuery, RecordSource};
use crate::purchase::{ContactInfo, CONTACT_FIELDS};
use crate::questions::{Answers, QUESTIONS};
use crate::records::BondRecord;
use crate::validation::{format_amount, ValidationError};

// ============================================================================
// PHASES & MESSAGES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Qa,
    Summary,
    Purchase,
    Consent,
    Delivery,
    Done,
    /// No-match fallback
    Inquiry,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Qa => "qa",
            Phase::Summary => "summary",
            Phase::Purchase => "purchase",
            Phase::Consent => "consent",
            Phase::Delivery => "delivery",
            Phase::Done => "done",
            Phase::Inquiry => "inquiry",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    Bot,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryChannel {
    Email,
    Sms,
}

impl DeliveryChannel {
    /// "email" / "e" / "text" / "sms" / "s"
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "email" | "e" | "e-mail" | "1" => Some(DeliveryChannel::Email),
            "sms" | "text" | "s" | "t" | "2" => Some(DeliveryChannel::Sms),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryChannel::Email => "email",
            DeliveryChannel::Sms => "sms",
        }
    }
}

// ============================================================================
// OUTCOMES
// ============================================================================

/// Produced when the user reaches the done phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentLinkRequest {
    pub reference: Uuid,
    pub answers: Answers,
    pub record: BondRecord,
    pub contact: ContactInfo,
    pub channel: DeliveryChannel,
    /// Email address or E.164 phone, depending on channel
    pub destination: String,
    pub created_at: DateTime<Utc>,
}

impl PaymentLinkRequest {
    /// Content hash for de-duplication (ignores reference and timestamp).
    /// Fields are JSON-encoded so separators inside values cannot collide.
    pub fn compute_idempotency_hash(&self) -> String {
        let content = serde_json::json!([
            self.answers,
            self.contact,
            self.channel,
            self.destination
        ]);

        let mut hasher = Sha256::new();
        hasher.update(content.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Recorded when no bond matched (or the lookup failed)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inquiry {
    pub reference: Uuid,
    pub answers: Answers,
    /// Lookup error text, when the lookup itself failed
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// WIZARD
// ============================================================================

const GREETING: &str = "Hi! I can help you find and purchase your bond. A few quick questions first.";
const SUMMARY_PROMPT: &str =
    "Here's what you told me. Confirm to look up your bond, or choose an answer to edit.";
const NO_MATCH: &str = "I couldn't find a bond matching those answers. Our team will follow up on your inquiry, or you can go back and edit your answers.";
const CONSENT_PROMPT: &str =
    "Do you consent to receive a payment link and be contacted about this bond? (yes/no)";
const CONSENT_REQUIRED: &str = "Consent is required before we can send a payment link.";

#[derive(Debug, Clone, Serialize)]
pub struct Wizard {
    phase: Phase,
    /// Index into QUESTIONS (qa) or CONTACT_FIELDS (purchase)
    step: usize,
    /// Pre-filled input for the current step
    input: String,
    /// Re-entered qa from the summary; submitting returns to summary
    editing: bool,
    answers: Answers,
    contact: ContactInfo,
    record: Option<BondRecord>,
    consent: bool,
    channel: Option<DeliveryChannel>,
    error: Option<ValidationError>,
    notice: Option<String>,
    transcript: Vec<Message>,
    request: Option<PaymentLinkRequest>,
    inquiry: Option<Inquiry>,
}

impl Default for Wizard {
    fn default() -> Self {
        Self::new()
    }
}

impl Wizard {
    pub fn new() -> Self {
        let mut wizard = Wizard {
            phase: Phase::Qa,
            step: 0,
            input: String::new(),
            editing: false,
            answers: Answers::new(),
            contact: ContactInfo::default(),
            record: None,
            consent: false,
            channel: None,
            error: None,
            notice: None,
            transcript: Vec::new(),
            request: None,
            inquiry: None,
        };
        wizard.say(GREETING);
        wizard.enter_question(0);
        wizard
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn is_editing(&self) -> bool {
        self.editing
    }

    pub fn answers(&self) -> &Answers {
        &self.answers
    }

    pub fn contact(&self) -> &ContactInfo {
        &self.contact
    }

    pub fn record(&self) -> Option<&BondRecord> {
        self.record.as_ref()
    }

    pub fn consent_given(&self) -> bool {
        self.consent
    }

    pub fn error(&self) -> Option<&ValidationError> {
        self.error.as_ref()
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn request(&self) -> Option<&PaymentLinkRequest> {
        self.request.as_ref()
    }

    pub fn inquiry(&self) -> Option<&Inquiry> {
        self.inquiry.as_ref()
    }

    /// What the bot is currently asking
    pub fn prompt(&self) -> String {
        match self.phase {
            Phase::Qa => QUESTIONS[self.step].prompt.to_string(),
            Phase::Summary => SUMMARY_PROMPT.to_string(),
            Phase::Purchase => CONTACT_FIELDS[self.step].prompt.to_string(),
            Phase::Consent => CONSENT_PROMPT.to_string(),
            Phase::Delivery => self.delivery_prompt(),
            Phase::Done => self.done_message(),
            Phase::Inquiry => NO_MATCH.to_string(),
        }
    }

    /// (label, answer) pairs for the summary screen, in question order
    pub fn summary(&self) -> Vec<(&'static str, String)> {
        QUESTIONS
            .iter()
            .map(|q| (q.label, self.answers.get(q.id).unwrap_or("").to_string()))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Forward
    // ------------------------------------------------------------------------

    /// Submit typed input for the current step.
    ///
    /// Valid in qa, purchase, consent (yes/no) and delivery (email/sms).
    /// A validation failure leaves the wizard on the same step with `error` set.
    pub fn submit(&mut self, raw: &str, today: NaiveDate) -> Result<Phase> {
        self.notice = None;

        let outcome = match self.phase {
            Phase::Qa => self.submit_answer(raw, today),
            Phase::Purchase => self.submit_contact(raw),
            Phase::Consent => match parse_yes_no(raw) {
                Some(accept) => {
                    self.hear(raw);
                    self.consent(accept)
                }
                None => Err(ValidationError::new("consent", "Please answer yes or no.").into()),
            },
            Phase::Delivery => match DeliveryChannel::parse(raw) {
                Some(channel) => {
                    self.hear(raw);
                    self.choose_delivery(channel).map(|_| ())
                }
                None => Err(ValidationError::new(
                    "delivery",
                    "Please choose email or text.",
                )
                .into()),
            },
            other => Err(ChatbotError::WrongPhase(other.name().to_string())),
        };

        match outcome {
            Ok(()) => Ok(self.phase),
            Err(ChatbotError::Validation(err)) => {
                debug!("Validation failed on {}: {}", err.field, err.message);
                self.input = raw.to_string();
                self.error = Some(err.clone());
                Err(ChatbotError::Validation(err))
            }
            Err(err) => Err(err),
        }
    }

    fn submit_answer(&mut self, raw: &str, today: NaiveDate) -> Result<()> {
        let question = &QUESTIONS[self.step];
        let value = question.validate(raw, today)?;

        self.hear(raw);
        self.answers.set(question.id, value);

        if self.editing || self.step + 1 == QUESTIONS.len() {
            self.enter_summary();
        } else {
            self.enter_question(self.step + 1);
        }
        Ok(())
    }

    fn submit_contact(&mut self, raw: &str) -> Result<()> {
        let field = &CONTACT_FIELDS[self.step];
        let value = field.validate(raw)?;

        self.hear(raw);
        self.contact.set(field.id, value);

        if self.step + 1 == CONTACT_FIELDS.len() {
            self.enter_consent();
        } else {
            self.enter_contact_field(self.step + 1);
        }
        Ok(())
    }

    /// Jump from the summary to question `step`, pre-filling its answer
    pub fn edit(&mut self, step: usize) -> Result<()> {
        self.require_phase(&[Phase::Summary])?;
        if step >= QUESTIONS.len() {
            let err = ValidationError::new("step", format!("There is no question {}.", step + 1));
            self.error = Some(err.clone());
            return Err(err.into());
        }

        self.editing = true;
        self.enter_question(step);
        Ok(())
    }

    /// Lookup query for the collected answers; only from the summary
    pub fn lookup_query(&self) -> Result<LookupQuery> {
        self.require_phase(&[Phase::Summary])?;
        LookupQuery::from_answers(&self.answers)
    }

    /// Feed the single lookup result for `query` back in.
    ///
    /// A match moves to purchase; no match or a failed query degrades to the
    /// inquiry screen. The result is dropped when the answers no longer
    /// produce `query`, and a record that does not match `query` counts as
    /// no match.
    pub fn resolve_lookup(&mut self, query: &LookupQuery, result: Result<Option<BondRecord>>) -> Phase {
        if self.phase != Phase::Summary {
            return self.phase;
        }

        match LookupQuery::from_answers(&self.answers) {
            Ok(current) if current == *query => {}
            _ => {
                warn!("Answers changed during lookup, discarding result for {:?}", query);
                return self.phase;
            }
        }

        match result {
            Ok(Some(record)) if !query.matches(&record) => {
                warn!("Lookup returned a record that does not match {:?}: {:?}", query, record);
                self.enter_inquiry(None);
            }
            Ok(Some(record)) => {
                info!("Bond matched, entering purchase");
                self.say(&found_message(&record));
                self.record = Some(record);
                self.enter_contact_field(0);
            }
            Ok(None) => self.enter_inquiry(None),
            Err(err) => {
                warn!("Lookup failed: {}", err);
                self.enter_inquiry(Some(err.to_string()));
            }
        }
        self.phase
    }

    /// Build the query, await the source once, resolve
    pub async fn confirm(&mut self, source: &RecordSource) -> Result<Phase> {
        let query = self.lookup_query()?;
        let result = source.lookup(&query).await;
        Ok(self.resolve_lookup(&query, result))
    }

    /// Binary consent choice. Declining stays on the consent screen.
    pub fn consent(&mut self, accept: bool) -> Result<()> {
        self.require_phase(&[Phase::Consent])?;

        if accept {
            self.consent = true;
            self.enter_delivery();
        } else {
            self.consent = false;
            self.notice = Some(CONSENT_REQUIRED.to_string());
            self.say(CONSENT_REQUIRED);
        }
        Ok(())
    }

    pub fn choose_delivery(&mut self, channel: DeliveryChannel) -> Result<&PaymentLinkRequest> {
        self.require_phase(&[Phase::Delivery])?;

        let record = self
            .record
            .clone()
            .ok_or_else(|| ChatbotError::WrongPhase("no bond has been matched".to_string()))?;
        if !self.consent || !self.contact.is_complete() {
            return Err(ChatbotError::WrongPhase(
                "contact details or consent are missing".to_string(),
            ));
        }

        let destination = match channel {
            DeliveryChannel::Email => self.contact.email.clone(),
            DeliveryChannel::Sms => self.contact.phone.clone(),
        };

        let request = PaymentLinkRequest {
            reference: Uuid::new_v4(),
            answers: self.answers.clone(),
            record,
            contact: self.contact.clone(),
            channel,
            destination,
            created_at: Utc::now(),
        };
        info!("Payment link request {} via {}", request.reference, channel.as_str());

        self.channel = Some(channel);
        self.request = Some(request);
        self.phase = Phase::Done;
        self.step = 0;
        self.input.clear();
        self.error = None;
        self.say(&self.done_message());

        self.request
            .as_ref()
            .ok_or_else(|| ChatbotError::WrongPhase("done".to_string()))
    }

    // ------------------------------------------------------------------------
    // Back / restart
    // ------------------------------------------------------------------------

    /// One step back, pre-filling the previous value
    pub fn back(&mut self) -> Phase {
        self.notice = None;

        match self.phase {
            Phase::Qa if self.editing => self.enter_summary(),
            Phase::Qa if self.step > 0 => self.enter_question(self.step - 1),
            Phase::Qa => {}
            Phase::Summary => self.enter_question(QUESTIONS.len() - 1),
            Phase::Purchase if self.step > 0 => self.enter_contact_field(self.step - 1),
            Phase::Purchase => {
                self.record = None;
                self.enter_summary();
            }
            Phase::Consent => self.enter_contact_field(CONTACT_FIELDS.len() - 1),
            Phase::Delivery => self.enter_consent(),
            Phase::Inquiry => {
                self.inquiry = None;
                self.enter_summary();
            }
            Phase::Done => {}
        }
        self.phase
    }

    pub fn restart(&mut self) {
        *self = Wizard::new();
    }

    // ------------------------------------------------------------------------
    // Phase entry
    // ------------------------------------------------------------------------

    fn enter_question(&mut self, step: usize) {
        self.phase = Phase::Qa;
        self.step = step;
        self.input = self.answers.get(QUESTIONS[step].id).unwrap_or("").to_string();
        self.error = None;
        self.say(QUESTIONS[step].prompt);
    }

    fn enter_summary(&mut self) {
        self.phase = Phase::Summary;
        self.step = 0;
        self.editing = false;
        self.input.clear();
        self.error = None;
        self.say(SUMMARY_PROMPT);
    }

    fn enter_contact_field(&mut self, step: usize) {
        self.phase = Phase::Purchase;
        self.step = step;
        self.input = self.contact.get(CONTACT_FIELDS[step].id).unwrap_or("").to_string();
        self.error = None;
        self.say(CONTACT_FIELDS[step].prompt);
    }

    fn enter_consent(&mut self) {
        self.phase = Phase::Consent;
        self.step = 0;
        self.input.clear();
        self.error = None;
        self.say(CONSENT_PROMPT);
    }

    fn enter_delivery(&mut self) {
        self.phase = Phase::Delivery;
        self.step = 0;
        self.input.clear();
        self.error = None;
        self.say(&self.delivery_prompt());
    }

    fn enter_inquiry(&mut self, reason: Option<String>) {
        info!("No bond matched, entering inquiry");
        if let Some(reason) = &reason {
            self.notice = Some(reason.clone());
        }
        self.inquiry = Some(Inquiry {
            reference: Uuid::new_v4(),
            answers: self.answers.clone(),
            reason,
            created_at: Utc::now(),
        });
        self.phase = Phase::Inquiry;
        self.step = 0;
        self.input.clear();
        self.error = None;
        self.say(NO_MATCH);
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    fn require_phase(&self, allowed: &[Phase]) -> Result<()> {
        if allowed.contains(&self.phase) {
            Ok(())
        } else {
            Err(ChatbotError::WrongPhase(self.phase.name().to_string()))
        }
    }

    fn say(&mut self, text: &str) {
        self.transcript.push(Message {
            sender: Sender::Bot,
            text: text.to_string(),
        });
    }

    fn hear(&mut self, text: &str) {
        self.transcript.push(Message {
            sender: Sender::User,
            text: text.trim().to_string(),
        });
    }

    fn delivery_prompt(&self) -> String {
        format!(
            "How should we send your payment link? Type 'email' for {} or 'text' for {}.",
            self.contact.email, self.contact.phone
        )
    }

    fn done_message(&self) -> String {
        match &self.request {
            Some(request) => format!(
                "All set! Your payment link is on its way to {}. Reference: {}",
                request.destination, request.reference
            ),
            None => "All set!".to_string(),
        }
    }
}

fn found_message(record: &BondRecord) -> String {
    let mut text = format!(
        "Good news! I found your bond: {}, {} for ${} requested by {}.",
        record.city,
        record.state,
        format_amount(record.bond_limit),
        record.name
    );
    if let Some(premium) = record.premium {
        text.push_str(&format!(" Premium: ${:.2}.", premium));
    }
    text.push_str(" Let's get your purchase details.");
    text
}

fn parse_yes_no(input: &str) -> Option<bool> {
    match input.trim().to_lowercase().as_str() {
        "yes" | "y" | "i agree" | "agree" => Some(true),
        "no" | "n" => Some(false),
        _ => None,
    }
}

// ============================================================================
// TESTS
// ============================================================================
