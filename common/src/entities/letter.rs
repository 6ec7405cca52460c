use std::{collections::HashMap, fmt, str::FromStr};

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    error::{self, AddCode},
    repository::Entity,
};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum LetterKind {
    Incoming,
    Outgoing,
}

impl LetterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LetterKind::Incoming => "incoming",
            LetterKind::Outgoing => "outgoing",
        }
    }
}

impl FromStr for LetterKind {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "incoming" => Ok(LetterKind::Incoming),
            "outgoing" => Ok(LetterKind::Outgoing),
            _ => Err(anyhow!(
                "Letter type invalid value. Accepted values are: incoming, outgoing"
            )),
        }
    }
}

impl TryFrom<String> for LetterKind {
    type Error = anyhow::Error;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for LetterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts `YYYY-MM-DD` or a full RFC 3339 timestamp, keeping only the date.
pub fn parse_date(raw: &str) -> anyhow::Result<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, DATE_FORMAT) {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|date| date.date_naive())
        .map_err(|_| anyhow!("Invalid date format: '{}', expected YYYY-MM-DD", raw))
}

pub fn parse_id(id: &str) -> error::Result<ObjectId> {
    ObjectId::parse_str(id).map_err(|_| anyhow!("Invalid ID format").code(400))
}

pub mod iso_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{parse_date, DATE_FORMAT};

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.format(DATE_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_date(&raw).map_err(serde::de::Error::custom)
    }
}

fn blank_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.trim().is_empty()))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutgoingLetter<Id> {
    pub id: Id,
    pub outgoing_number: String,
    #[serde(with = "iso_date")]
    pub registration_date: NaiveDate,
    pub recipient: String,
    pub subject: String,
    pub executor: String,
    #[serde(
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub file_path: Option<String>,
}

impl OutgoingLetter<ObjectId> {
    pub fn new(id: ObjectId, draft: OutgoingDraft, file_path: Option<String>) -> Self {
        Self {
            id,
            outgoing_number: draft.outgoing_number,
            registration_date: draft.registration_date,
            recipient: draft.recipient,
            subject: draft.subject,
            executor: draft.executor,
            file_path,
        }
    }

    pub fn stringify(self) -> OutgoingLetter<String> {
        OutgoingLetter {
            id: self.id.to_hex(),
            outgoing_number: self.outgoing_number,
            registration_date: self.registration_date,
            recipient: self.recipient,
            subject: self.subject,
            executor: self.executor,
            file_path: self.file_path,
        }
    }

    /// Overwrites the fields present and non-blank in `fields`; the rest stay as stored.
    pub fn apply_fields(&mut self, fields: &HashMap<String, String>) -> error::Result<()> {
        if let Some(date) = optional(fields, "registration_date") {
            self.registration_date = parse_date(&date).map_err(|e| e.code(400))?;
        }
        if let Some(value) = optional(fields, "outgoing_number") {
            self.outgoing_number = value;
        }
        if let Some(value) = optional(fields, "recipient") {
            self.recipient = value;
        }
        if let Some(value) = optional(fields, "subject") {
            self.subject = value;
        }
        if let Some(value) = optional(fields, "executor") {
            self.executor = value;
        }
        Ok(())
    }
}

impl OutgoingLetter<String> {
    pub fn parse(self) -> error::Result<OutgoingLetter<ObjectId>> {
        Ok(OutgoingLetter {
            id: parse_id(&self.id)?,
            outgoing_number: self.outgoing_number,
            registration_date: self.registration_date,
            recipient: self.recipient,
            subject: self.subject,
            executor: self.executor,
            file_path: self.file_path,
        })
    }
}

impl Entity for OutgoingLetter<ObjectId> {
    fn id(&self) -> ObjectId {
        self.id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncomingLetter<Id> {
    pub id: Id,
    #[serde(alias = "incoming_number")]
    pub internal_number: String,
    #[serde(
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub external_number: Option<String>,
    #[serde(with = "iso_date")]
    pub registration_date: NaiveDate,
    pub sender: String,
    pub addressee: String,
    pub registered_by: String,
    pub subject: String,
    #[serde(
        default,
        deserialize_with = "blank_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub file_path: Option<String>,
}

impl IncomingLetter<ObjectId> {
    pub fn new(id: ObjectId, draft: IncomingDraft, file_path: Option<String>) -> Self {
        Self {
            id,
            internal_number: draft.internal_number,
            external_number: draft.external_number,
            registration_date: draft.registration_date,
            sender: draft.sender,
            addressee: draft.addressee,
            registered_by: draft.registered_by,
            subject: draft.subject,
            file_path,
        }
    }

    pub fn stringify(self) -> IncomingLetter<String> {
        IncomingLetter {
            id: self.id.to_hex(),
            internal_number: self.internal_number,
            external_number: self.external_number,
            registration_date: self.registration_date,
            sender: self.sender,
            addressee: self.addressee,
            registered_by: self.registered_by,
            subject: self.subject,
            file_path: self.file_path,
        }
    }

    /// Overwrites the fields present and non-blank in `fields`; the rest stay as stored.
    pub fn apply_fields(&mut self, fields: &HashMap<String, String>) -> error::Result<()> {
        if let Some(date) = optional(fields, "registration_date") {
            self.registration_date = parse_date(&date).map_err(|e| e.code(400))?;
        }
        if let Some(value) = optional(fields, "internal_number") {
            self.internal_number = value;
        }
        if let Some(value) = optional(fields, "external_number") {
            self.external_number = Some(value);
        }
        if let Some(value) = optional(fields, "sender") {
            self.sender = value;
        }
        if let Some(value) = optional(fields, "addressee") {
            self.addressee = value;
        }
        if let Some(value) = optional(fields, "registered_by") {
            self.registered_by = value;
        }
        if let Some(value) = optional(fields, "subject") {
            self.subject = value;
        }
        Ok(())
    }
}

impl IncomingLetter<String> {
    pub fn parse(self) -> error::Result<IncomingLetter<ObjectId>> {
        Ok(IncomingLetter {
            id: parse_id(&self.id)?,
            internal_number: self.internal_number,
            external_number: self.external_number,
            registration_date: self.registration_date,
            sender: self.sender,
            addressee: self.addressee,
            registered_by: self.registered_by,
            subject: self.subject,
            file_path: self.file_path,
        })
    }
}

impl Entity for IncomingLetter<ObjectId> {
    fn id(&self) -> ObjectId {
        self.id
    }
}

/// A letter as seen by clients. The variant is fixed at creation.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Letter {
    Incoming(IncomingLetter<String>),
    Outgoing(OutgoingLetter<String>),
}

impl Letter {
    pub fn kind(&self) -> LetterKind {
        match self {
            Letter::Incoming(_) => LetterKind::Incoming,
            Letter::Outgoing(_) => LetterKind::Outgoing,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Letter::Incoming(letter) => &letter.id,
            Letter::Outgoing(letter) => &letter.id,
        }
    }

    pub fn number(&self) -> &str {
        match self {
            Letter::Incoming(letter) => &letter.internal_number,
            Letter::Outgoing(letter) => &letter.outgoing_number,
        }
    }

    pub fn subject(&self) -> &str {
        match self {
            Letter::Incoming(letter) => &letter.subject,
            Letter::Outgoing(letter) => &letter.subject,
        }
    }

    pub fn registration_date(&self) -> NaiveDate {
        match self {
            Letter::Incoming(letter) => letter.registration_date,
            Letter::Outgoing(letter) => letter.registration_date,
        }
    }

    pub fn file_path(&self) -> Option<&str> {
        match self {
            Letter::Incoming(letter) => letter.file_path.as_deref(),
            Letter::Outgoing(letter) => letter.file_path.as_deref(),
        }
    }

    pub fn has_file(&self) -> bool {
        self.file_path().is_some()
    }
}

impl From<OutgoingLetter<ObjectId>> for Letter {
    fn from(letter: OutgoingLetter<ObjectId>) -> Self {
        Letter::Outgoing(letter.stringify())
    }
}

impl From<IncomingLetter<ObjectId>> for Letter {
    fn from(letter: IncomingLetter<ObjectId>) -> Self {
        Letter::Incoming(letter.stringify())
    }
}

fn optional(fields: &HashMap<String, String>, name: &str) -> Option<String> {
    fields
        .get(name)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn required(fields: &HashMap<String, String>, name: &str) -> error::Result<String> {
    optional(fields, name).ok_or_else(|| anyhow!("Field '{}' is required", name).code(400))
}

fn required_date(fields: &HashMap<String, String>) -> error::Result<NaiveDate> {
    let raw = required(fields, "registration_date")?;
    parse_date(&raw).map_err(|e| e.code(400))
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingDraft {
    pub outgoing_number: String,
    pub registration_date: NaiveDate,
    pub recipient: String,
    pub subject: String,
    pub executor: String,
}

impl OutgoingDraft {
    pub fn from_fields(fields: &HashMap<String, String>) -> error::Result<Self> {
        Ok(Self {
            outgoing_number: required(fields, "outgoing_number")?,
            registration_date: required_date(fields)?,
            recipient: required(fields, "recipient")?,
            subject: required(fields, "subject")?,
            executor: required(fields, "executor")?,
        })
    }

    pub fn fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("outgoing_number", self.outgoing_number.clone()),
            (
                "registration_date",
                self.registration_date.format(DATE_FORMAT).to_string(),
            ),
            ("recipient", self.recipient.clone()),
            ("subject", self.subject.clone()),
            ("executor", self.executor.clone()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncomingDraft {
    pub internal_number: String,
    pub external_number: Option<String>,
    pub registration_date: NaiveDate,
    pub sender: String,
    pub addressee: String,
    pub registered_by: String,
    pub subject: String,
}

impl IncomingDraft {
    pub fn from_fields(fields: &HashMap<String, String>) -> error::Result<Self> {
        let internal_number = match optional(fields, "internal_number") {
            Some(number) => number,
            None => required(fields, "incoming_number")
                .map_err(|_| anyhow!("Field 'internal_number' is required").code(400))?,
        };
        Ok(Self {
            internal_number,
            external_number: optional(fields, "external_number"),
            registration_date: required_date(fields)?,
            sender: required(fields, "sender")?,
            addressee: required(fields, "addressee")?,
            registered_by: required(fields, "registered_by")?,
            subject: required(fields, "subject")?,
        })
    }

    pub fn fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![("internal_number", self.internal_number.clone())];
        if let Some(external_number) = &self.external_number {
            fields.push(("external_number", external_number.clone()));
        }
        fields.extend([
            (
                "registration_date",
                self.registration_date.format(DATE_FORMAT).to_string(),
            ),
            ("sender", self.sender.clone()),
            ("addressee", self.addressee.clone()),
            ("registered_by", self.registered_by.clone()),
            ("subject", self.subject.clone()),
        ]);
        fields
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LetterDraft {
    Incoming(IncomingDraft),
    Outgoing(OutgoingDraft),
}

impl LetterDraft {
    pub fn kind(&self) -> LetterKind {
        match self {
            LetterDraft::Incoming(_) => LetterKind::Incoming,
            LetterDraft::Outgoing(_) => LetterKind::Outgoing,
        }
    }

    pub fn fields(&self) -> Vec<(&'static str, String)> {
        match self {
            LetterDraft::Incoming(draft) => draft.fields(),
            LetterDraft::Outgoing(draft) => draft.fields(),
        }
    }
}
