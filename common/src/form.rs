//! Form input for new and edited letters.
//!
//! Forms hold raw user text. Nothing reaches the registry until
//! [`LetterForm::into_draft`] has checked every required field.

use std::fmt;

use chrono::{Local, NaiveDate};

use crate::entities::letter::{
    parse_date, IncomingDraft, LetterDraft, LetterKind, OutgoingDraft, DATE_FORMAT,
};

/// Select option that reveals the free-text field.
pub const OTHER: &str = "other";

/// Trimmed custom text when the custom field is shown and non-blank, otherwise the select value.
pub fn resolve_final_value(select_value: &str, custom_visible: bool, custom_value: &str) -> String {
    let custom = custom_value.trim();
    if custom_visible && !custom.is_empty() {
        custom.to_string()
    } else {
        select_value.to_string()
    }
}

/// A select with a fixed option list plus a free-text fallback.
///
/// `custom_text` is `Some` exactly while the free-text field is shown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectOrCustom {
    pub selected: Option<String>,
    pub custom_text: Option<String>,
}

impl SelectOrCustom {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(value: impl Into<String>) -> Self {
        let mut field = Self::new();
        field.select(value);
        field
    }

    pub fn custom(text: impl Into<String>) -> Self {
        let mut field = Self::new();
        field.select(OTHER);
        field.set_custom(text);
        field
    }

    pub fn select(&mut self, value: impl Into<String>) {
        let value = value.into();
        if value == OTHER {
            self.custom_text.get_or_insert_with(String::new);
        } else {
            self.custom_text = None;
        }
        self.selected = Some(value).filter(|v| !v.is_empty());
    }

    /// Ignored while the free-text field is hidden.
    pub fn set_custom(&mut self, text: impl Into<String>) {
        if let Some(custom) = self.custom_text.as_mut() {
            *custom = text.into();
        }
    }

    pub fn is_custom_visible(&self) -> bool {
        self.custom_text.is_some()
    }

    /// Nothing usable chosen: no selection, or "other" without any custom text.
    pub fn is_blank(&self) -> bool {
        let custom_blank = self
            .custom_text
            .as_deref()
            .map_or(true, |text| text.trim().is_empty());
        match self.selected.as_deref() {
            None | Some(OTHER) => custom_blank,
            Some(value) => value.trim().is_empty(),
        }
    }

    /// `"other"` itself when the custom field is shown but still blank.
    pub fn resolve(&self) -> String {
        resolve_final_value(
            self.selected.as_deref().unwrap_or_default(),
            self.is_custom_visible(),
            self.custom_text.as_deref().unwrap_or_default(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub field: &'static str,
    pub message: String,
}

impl ValidationFailure {
    fn new(field: &'static str, message: &str) -> Self {
        Self {
            field,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<ValidationFailure>);

impl ValidationErrors {
    pub fn failures(&self) -> &[ValidationFailure] {
        &self.0
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<&str> = self.0.iter().map(|x| x.message.as_str()).collect();
        f.write_str(&messages.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

fn today() -> String {
    Local::now().date_naive().format(DATE_FORMAT).to_string()
}

fn check_required(
    failures: &mut Vec<ValidationFailure>,
    field: &'static str,
    value: &str,
    message: &str,
) {
    if value.trim().is_empty() {
        failures.push(ValidationFailure::new(field, message));
    }
}

fn check_choice(
    failures: &mut Vec<ValidationFailure>,
    field: &'static str,
    value: &SelectOrCustom,
    message: &str,
) {
    if value.is_blank() {
        failures.push(ValidationFailure::new(field, message));
    }
}

fn check_date(failures: &mut Vec<ValidationFailure>, value: &str) -> Option<NaiveDate> {
    if value.trim().is_empty() {
        failures.push(ValidationFailure::new(
            "registration_date",
            "Enter the registration date",
        ));
        return None;
    }
    match parse_date(value) {
        Ok(date) => Some(date),
        Err(_) => {
            failures.push(ValidationFailure::new(
                "registration_date",
                "Registration date must be in YYYY-MM-DD format",
            ));
            None
        }
    }
}

fn finish<T>(failures: Vec<ValidationFailure>, draft: Option<T>) -> Result<T, ValidationErrors> {
    match draft {
        Some(draft) if failures.is_empty() => Ok(draft),
        _ => Err(ValidationErrors(failures)),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingForm {
    pub outgoing_number: String,
    pub registration_date: String,
    pub recipient: String,
    pub subject: String,
    pub executor: SelectOrCustom,
}

impl Default for OutgoingForm {
    fn default() -> Self {
        Self::new()
    }
}

impl OutgoingForm {
    pub fn new() -> Self {
        Self {
            outgoing_number: String::new(),
            registration_date: today(),
            recipient: String::new(),
            subject: String::new(),
            executor: SelectOrCustom::new(),
        }
    }

    fn check(&self) -> (Vec<ValidationFailure>, Option<NaiveDate>) {
        let mut failures = vec![];
        check_required(
            &mut failures,
            "outgoing_number",
            &self.outgoing_number,
            "Enter the letter number",
        );
        let date = check_date(&mut failures, &self.registration_date);
        check_required(&mut failures, "subject", &self.subject, "Enter the subject");
        check_required(
            &mut failures,
            "recipient",
            &self.recipient,
            "Enter the recipient of the outgoing letter",
        );
        check_choice(
            &mut failures,
            "executor",
            &self.executor,
            "Select or enter the executor",
        );
        (failures, date)
    }

    pub fn validate(&self) -> Vec<ValidationFailure> {
        self.check().0
    }

    pub fn into_draft(self) -> Result<OutgoingDraft, ValidationErrors> {
        let (failures, date) = self.check();
        let draft = date.map(|registration_date| OutgoingDraft {
            outgoing_number: self.outgoing_number.trim().to_string(),
            registration_date,
            recipient: self.recipient.trim().to_string(),
            subject: self.subject.trim().to_string(),
            executor: self.executor.resolve().trim().to_string(),
        });
        finish(failures, draft)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncomingForm {
    pub internal_number: String,
    pub external_number: String,
    pub registration_date: String,
    pub sender: String,
    pub addressee: SelectOrCustom,
    pub registered_by: SelectOrCustom,
    pub subject: String,
}

impl Default for IncomingForm {
    fn default() -> Self {
        Self::new()
    }
}

impl IncomingForm {
    pub fn new() -> Self {
        Self {
            internal_number: String::new(),
            external_number: String::new(),
            registration_date: today(),
            sender: String::new(),
            addressee: SelectOrCustom::new(),
            registered_by: SelectOrCustom::new(),
            subject: String::new(),
        }
    }

    fn check(&self) -> (Vec<ValidationFailure>, Option<NaiveDate>) {
        let mut failures = vec![];
        check_required(
            &mut failures,
            "internal_number",
            &self.internal_number,
            "Enter the letter number",
        );
        let date = check_date(&mut failures, &self.registration_date);
        check_required(&mut failures, "subject", &self.subject, "Enter the subject");
        check_required(&mut failures, "sender", &self.sender, "Enter the sender");
        check_choice(
            &mut failures,
            "addressee",
            &self.addressee,
            "Select or enter the addressee",
        );
        check_choice(
            &mut failures,
            "registered_by",
            &self.registered_by,
            "Select or enter who registered the letter",
        );
        (failures, date)
    }

    pub fn validate(&self) -> Vec<ValidationFailure> {
        self.check().0
    }

    pub fn into_draft(self) -> Result<IncomingDraft, ValidationErrors> {
        let (failures, date) = self.check();
        let external_number = Some(self.external_number.trim().to_string()).filter(|v| !v.is_empty());
        let draft = date.map(|registration_date| IncomingDraft {
            internal_number: self.internal_number.trim().to_string(),
            external_number,
            registration_date,
            sender: self.sender.trim().to_string(),
            addressee: self.addressee.resolve().trim().to_string(),
            registered_by: self.registered_by.resolve().trim().to_string(),
            subject: self.subject.trim().to_string(),
        });
        finish(failures, draft)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LetterForm {
    Incoming(IncomingForm),
    Outgoing(OutgoingForm),
}

impl LetterForm {
    pub fn new(kind: LetterKind) -> Self {
        match kind {
            LetterKind::Incoming => LetterForm::Incoming(IncomingForm::new()),
            LetterKind::Outgoing => LetterForm::Outgoing(OutgoingForm::new()),
        }
    }

    pub fn kind(&self) -> LetterKind {
        match self {
            LetterForm::Incoming(_) => LetterKind::Incoming,
            LetterForm::Outgoing(_) => LetterKind::Outgoing,
        }
    }

    pub fn validate(&self) -> Vec<ValidationFailure> {
        match self {
            LetterForm::Incoming(form) => form.validate(),
            LetterForm::Outgoing(form) => form.validate(),
        }
    }

    pub fn into_draft(self) -> Result<LetterDraft, ValidationErrors> {
        match self {
            LetterForm::Incoming(form) => form.into_draft().map(LetterDraft::Incoming),
            LetterForm::Outgoing(form) => form.into_draft().map(LetterDraft::Outgoing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outgoing() -> OutgoingForm {
        OutgoingForm {
            outgoing_number: "281-СКС".to_string(),
            registration_date: "2024-01-09".to_string(),
            recipient: "ACME".to_string(),
            subject: "Test".to_string(),
            executor: SelectOrCustom::selected("Ivanov"),
        }
    }

    fn incoming() -> IncomingForm {
        IncomingForm {
            internal_number: "50".to_string(),
            external_number: String::new(),
            registration_date: "2024-02-01".to_string(),
            sender: "Ministry".to_string(),
            addressee: SelectOrCustom::selected("Director"),
            registered_by: SelectOrCustom::custom("  Petrova "),
            subject: "Request".to_string(),
        }
    }

    #[test]
    fn resolve_final_value_grid() {
        for select in ["", OTHER, "Ivanov"] {
            for custom in ["", "   ", "Sidorov"] {
                for visible in [false, true] {
                    let resolved = resolve_final_value(select, visible, custom);
                    if visible && !custom.trim().is_empty() {
                        assert_eq!(resolved, custom.trim());
                    } else {
                        assert_eq!(resolved, select);
                    }
                }
            }
        }
        assert_eq!(resolve_final_value("Ivanov", true, "  Sidorov  "), "Sidorov");
    }

    #[test]
    fn choosing_other_reveals_and_switching_away_clears() {
        let mut field = SelectOrCustom::selected("Ivanov");
        assert!(!field.is_custom_visible());
        field.set_custom("ignored");
        assert_eq!(field.resolve(), "Ivanov");

        field.select(OTHER);
        assert!(field.is_custom_visible());
        assert!(field.is_blank());
        assert_eq!(field.resolve(), resolve_final_value(OTHER, true, ""));
        assert_eq!(field.resolve(), OTHER);
        field.set_custom("   ");
        assert!(field.is_blank());
        assert_eq!(field.resolve(), OTHER);
        field.set_custom("Sidorov");
        assert!(!field.is_blank());
        assert_eq!(field.resolve(), "Sidorov");

        field.select("Petrova");
        assert!(!field.is_custom_visible());
        assert_eq!(field.custom_text, None);
        assert_eq!(field.resolve(), "Petrova");

        field.select(OTHER);
        assert_eq!(field.custom_text.as_deref(), Some(""));
    }

    #[test]
    fn complete_forms_pass() {
        assert!(outgoing().validate().is_empty());
        assert!(incoming().validate().is_empty());

        let draft = incoming().into_draft().unwrap();
        assert_eq!(draft.registered_by, "Petrova");
        assert_eq!(draft.external_number, None);
    }

    #[test]
    fn each_blank_required_field_fails() {
        let blankers: [(&str, fn(&mut OutgoingForm)); 5] = [
            ("outgoing_number", |f| f.outgoing_number = " ".to_string()),
            ("registration_date", |f| f.registration_date.clear()),
            ("subject", |f| f.subject.clear()),
            ("recipient", |f| f.recipient = "\t".to_string()),
            ("executor", |f| f.executor.select(OTHER)),
        ];
        for (field, blank) in blankers {
            let mut form = outgoing();
            blank(&mut form);
            let failures = form.validate();
            assert_eq!(failures.len(), 1, "{}", field);
            assert_eq!(failures[0].field, field);
            assert!(form.into_draft().is_err());
        }
    }

    #[test]
    fn failures_follow_form_order() {
        let form = LetterForm::new(LetterKind::Incoming);
        let fields: Vec<&str> = form.validate().iter().map(|f| f.field).collect();
        assert_eq!(
            fields,
            vec!["internal_number", "subject", "sender", "addressee", "registered_by"]
        );
    }

    #[test]
    fn new_form_defaults_date_to_today() {
        let form = OutgoingForm::new();
        assert_eq!(form.registration_date, today());
        assert!(parse_date(&form.registration_date).is_ok());
    }

    #[test]
    fn malformed_date_blocks_draft() {
        let mut form = outgoing();
        form.registration_date = "09.01.2024".to_string();
        let err = LetterForm::Outgoing(form).into_draft().unwrap_err();
        assert_eq!(err.failures().len(), 1);
        assert_eq!(err.failures()[0].field, "registration_date");
        assert!(err.to_string().contains("YYYY-MM-DD"));
    }
}
