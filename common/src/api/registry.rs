use std::time::Duration;

use derive_more::Display;
use reqwest::{
    header::{HeaderMap, CONTENT_DISPOSITION},
    multipart::{Form, Part},
    Response, StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize};

use crate::{
    entities::letter::{IncomingLetter, Letter, LetterDraft, LetterKind, OutgoingLetter},
    form::{LetterForm, ValidationErrors, ValidationFailure},
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Root of the letter endpoints, e.g. `http://localhost:8080/mail`.
    pub base_url: String,
    pub timeout: Duration,
}

impl RegistryConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Display)]
pub enum RegistryError {
    #[display(fmt = "Validation failed: {}", _0)]
    Validation(ValidationErrors),
    #[display(fmt = "Network error: {}", _0)]
    Network(String),
    #[display(fmt = "Not found: {}", _0)]
    NotFound(String),
    #[display(fmt = "Rejected by server ({}): {}", status, message)]
    ServerRejection { status: u16, message: String },
}

impl std::error::Error for RegistryError {}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RegistryError::Network(format!("request timed out: {}", err))
        } else {
            RegistryError::Network(err.to_string())
        }
    }
}

impl From<ValidationErrors> for RegistryError {
    fn from(errors: ValidationErrors) -> Self {
        RegistryError::Validation(errors)
    }
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// A file to upload together with a letter.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    pub content: Vec<u8>,
    pub mime: Option<String>,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            content: content.into(),
            mime: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Download {
    pub file_name: Option<String>,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Health {
    pub status: String,
    pub service: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Envelope<L> {
    Wrapped { letter: L },
    Bare(L),
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    details: Option<String>,
}

fn malformed(err: serde_json::Error) -> RegistryError {
    RegistryError::Network(format!("malformed response: {}", err))
}

fn decode_one<L: DeserializeOwned>(body: &[u8]) -> Result<L> {
    match serde_json::from_slice::<Envelope<L>>(body).map_err(malformed)? {
        Envelope::Wrapped { letter } | Envelope::Bare(letter) => Ok(letter),
    }
}

fn decode_letter(kind: LetterKind, body: &[u8]) -> Result<Letter> {
    match kind {
        LetterKind::Incoming => decode_one::<IncomingLetter<String>>(body).map(Letter::Incoming),
        LetterKind::Outgoing => decode_one::<OutgoingLetter<String>>(body).map(Letter::Outgoing),
    }
}

fn decode_list(kind: LetterKind, body: &[u8]) -> Result<Vec<Letter>> {
    let letters = match kind {
        LetterKind::Incoming => serde_json::from_slice::<Vec<IncomingLetter<String>>>(body)
            .map_err(malformed)?
            .into_iter()
            .map(Letter::Incoming)
            .collect(),
        LetterKind::Outgoing => serde_json::from_slice::<Vec<OutgoingLetter<String>>>(body)
            .map_err(malformed)?
            .into_iter()
            .map(Letter::Outgoing)
            .collect(),
    };
    Ok(letters)
}

/// Reads the server's `{"error": ...}` body, falling back to plain text.
async fn rejection_message(response: Response) -> (StatusCode, String) {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(ErrorBody {
            error,
            details: Some(details),
        }) => format!("{}: {}", error, details),
        Ok(body) => body.error,
        Err(_) if !text.trim().is_empty() => text.trim().to_string(),
        Err(_) => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
    };
    (status, message)
}

async fn reject(response: Response) -> RegistryError {
    let (status, message) = rejection_message(response).await;
    if status == StatusCode::NOT_FOUND {
        RegistryError::NotFound(message)
    } else {
        RegistryError::ServerRejection {
            status: status.as_u16(),
            message,
        }
    }
}

fn disposition_param<'a>(params: &[(String, &'a str)], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(key, _)| key.as_str() == name)
        .map(|(_, value)| *value)
}

fn attachment_name(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(CONTENT_DISPOSITION)?;
    let value = String::from_utf8_lossy(raw.as_bytes());
    let params: Vec<(String, &str)> = value
        .split(';')
        .filter_map(|param| {
            let (name, value) = param.split_once('=')?;
            Some((name.trim().to_ascii_lowercase(), value.trim()))
        })
        .collect();
    let param = |name: &str| disposition_param(&params, name);

    // RFC 5987 `filename*=UTF-8''...` carries names that are not plain ASCII.
    let extended = param("filename*").and_then(|value| {
        let (charset, rest) = value.split_once('\'')?;
        let (_language, encoded) = rest.split_once('\'')?;
        if !charset.eq_ignore_ascii_case("utf-8") {
            return None;
        }
        urlencoding::decode(encoded.trim_matches('"'))
            .ok()
            .map(|name| name.into_owned())
    });

    extended
        .or_else(|| param("filename").map(|name| name.trim_matches('"').to_string()))
        .filter(|name| !name.is_empty())
}

fn multipart(draft: &LetterDraft, file: Option<Attachment>, remove_file: bool) -> Result<Form> {
    let mut form = Form::new();
    for (name, value) in draft.fields() {
        form = form.text(name, value);
    }
    if remove_file {
        form = form.text("remove_file", "true");
    }
    if let Some(file) = file {
        let mut part = Part::bytes(file.content).file_name(file.file_name);
        if let Some(mime) = &file.mime {
            part = part.mime_str(mime)?;
        }
        form = form.part("file", part);
    }
    Ok(form)
}

/// HTTP client for the letter registry endpoints.
///
/// Every call is a single request: no retries and no conflict detection,
/// so concurrent edits resolve as last write wins.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    client: reqwest::Client,
    base_url: String,
}

impl RegistryClient {
    pub fn new(config: RegistryConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, kind: LetterKind) -> String {
        format!("{}/{}", self.base_url, kind)
    }

    fn letter_url(&self, kind: LetterKind, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, kind, id)
    }

    pub async fn health(&self) -> Result<Health> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RegistryError::Network(format!(
                "HTTP error! status: {}",
                response.status()
            )));
        }
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(malformed)
    }

    pub async fn list(&self, kind: LetterKind) -> Result<Vec<Letter>> {
        let url = self.collection_url(kind);
        log::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            let (status, message) = rejection_message(response).await;
            return Err(RegistryError::Network(format!(
                "HTTP error! status: {}: {}",
                status, message
            )));
        }
        let body = response.bytes().await?;
        decode_list(kind, &body)
    }

    pub async fn get(&self, kind: LetterKind, id: &str) -> Result<Letter> {
        let url = self.letter_url(kind, id);
        log::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            let (_, message) = rejection_message(response).await;
            return Err(RegistryError::NotFound(message));
        }
        let body = response.bytes().await?;
        decode_letter(kind, &body)
    }

    pub async fn create(&self, draft: &LetterDraft, file: Option<Attachment>) -> Result<Letter> {
        let kind = draft.kind();
        let url = self.collection_url(kind);
        log::debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .multipart(multipart(draft, file, false)?)
            .send()
            .await?;
        if !response.status().is_success() {
            let (status, message) = rejection_message(response).await;
            return Err(RegistryError::ServerRejection {
                status: status.as_u16(),
                message,
            });
        }
        let body = response.bytes().await?;
        decode_letter(kind, &body)
    }

    /// `remove_file` asks the server to drop the stored attachment even when no new file is sent.
    pub async fn update(
        &self,
        kind: LetterKind,
        id: &str,
        draft: &LetterDraft,
        file: Option<Attachment>,
        remove_file: bool,
    ) -> Result<Letter> {
        if draft.kind() != kind {
            return Err(RegistryError::Validation(ValidationErrors(vec![
                ValidationFailure {
                    field: "type",
                    message: format!("A {} letter cannot become {}", kind, draft.kind()),
                },
            ])));
        }
        let url = self.letter_url(kind, id);
        log::debug!("PUT {}", url);
        let response = self
            .client
            .put(url)
            .multipart(multipart(draft, file, remove_file)?)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(reject(response).await);
        }
        let body = response.bytes().await?;
        decode_letter(kind, &body)
    }

    pub async fn delete(&self, kind: LetterKind, id: &str) -> Result<()> {
        let url = self.letter_url(kind, id);
        log::debug!("DELETE {}", url);
        let response = self.client.delete(url).send().await?;
        if !response.status().is_success() {
            return Err(reject(response).await);
        }
        Ok(())
    }

    pub async fn download(&self, kind: LetterKind, id: &str) -> Result<Download> {
        let url = format!("{}/download", self.letter_url(kind, id));
        log::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            let (_, message) = rejection_message(response).await;
            return Err(RegistryError::NotFound(message));
        }
        let file_name = attachment_name(response.headers());
        let content = response.bytes().await?.to_vec();
        Ok(Download { file_name, content })
    }

    /// The workbook of both registries, one sheet per kind.
    pub async fn export(&self) -> Result<Download> {
        let url = format!("{}/downloadExcel", self.base_url);
        log::debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            let (status, message) = rejection_message(response).await;
            return Err(RegistryError::ServerRejection {
                status: status.as_u16(),
                message,
            });
        }
        let file_name = attachment_name(response.headers());
        let content = response.bytes().await?.to_vec();
        Ok(Download { file_name, content })
    }

    /// Validates the form locally and creates the letter only when every required field is set.
    pub async fn submit(&self, form: LetterForm, file: Option<Attachment>) -> Result<Letter> {
        let draft = form.into_draft()?;
        self.create(&draft, file).await
    }

    pub async fn submit_update(
        &self,
        id: &str,
        form: LetterForm,
        file: Option<Attachment>,
        remove_file: bool,
    ) -> Result<Letter> {
        let kind = form.kind();
        let draft = form.into_draft()?;
        self.update(kind, id, &draft, file, remove_file).await
    }
}
