use std::collections::HashMap;

use actix_multipart::Multipart;
use anyhow::anyhow;
use common::{
    error::{self, AddCode},
    services::MAX_FILE_BYTES,
};
use futures_util::StreamExt;

pub const FILE_FIELD: &str = "file";
pub const REMOVE_FILE_FIELD: &str = "remove_file";

#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub file_name: String,
    pub content: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content,
        }
    }
}

/// Size caps applied while a multipart body is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    pub file_bytes: usize,
    pub field_bytes: usize,
}

impl UploadLimits {
    pub fn from_env() -> Self {
        Self {
            file_bytes: *MAX_FILE_BYTES,
            field_bytes: 64 * 1024,
        }
    }
}

/// The text fields and optional file of a letter form submission.
#[derive(Debug, Default)]
pub struct LetterPayload {
    pub fields: HashMap<String, String>,
    pub file: Option<Upload>,
}

impl LetterPayload {
    pub fn remove_file(&self) -> bool {
        self.fields
            .get(REMOVE_FILE_FIELD)
            .map_or(false, |value| value.trim().eq_ignore_ascii_case("true"))
    }
}

fn malformed(err: actix_multipart::MultipartError) -> error::ServiceError {
    anyhow!("Invalid multipart body: {}", err).code(400)
}

pub async fn read_payload(
    mut payload: Multipart,
    limits: UploadLimits,
) -> error::Result<LetterPayload> {
    let mut letter = LetterPayload::default();

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(malformed)?;
        let name = field.name().to_string();
        let disposition = field.content_disposition();
        let file_name = disposition.get_filename().map(str::to_string).or_else(|| {
            disposition
                .get_filename_ext()
                .and_then(|ext| String::from_utf8(ext.value.clone()).ok())
        });

        let limit = if name == FILE_FIELD {
            limits.file_bytes
        } else {
            limits.field_bytes
        };
        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(malformed)?;
            if data.len() + chunk.len() > limit {
                return Err(
                    anyhow!("Field '{}' exceeds the limit of {} bytes", name, limit).code(413),
                );
            }
            data.extend_from_slice(&chunk);
        }

        if name == FILE_FIELD {
            // Browsers send an empty, unnamed part when no file was picked.
            if let Some(file_name) = file_name.filter(|name| !name.is_empty()) {
                letter.file = Some(Upload::new(file_name, data));
            }
            continue;
        }

        let value = String::from_utf8(data)
            .map_err(|_| anyhow!("Field '{}' is not valid UTF-8", name).code(400))?;
        letter.fields.insert(name, value);
    }

    Ok(letter)
}

#[cfg(test)]
mod tests {
    use actix_web::{
        error::PayloadError,
        http::header::{self, HeaderMap, HeaderValue},
        web::Bytes,
    };

    use super::*;

    const LIMITS: UploadLimits = UploadLimits {
        file_bytes: 8,
        field_bytes: 16,
    };

    fn multipart(parts: &[(&str, Option<&str>, &str)]) -> Multipart {
        let mut body = String::new();
        for (name, file_name, value) in parts {
            body.push_str("--XB\r\nContent-Disposition: form-data; name=\"");
            body.push_str(name);
            body.push('"');
            if let Some(file_name) = file_name {
                body.push_str("; filename=\"");
                body.push_str(file_name);
                body.push('"');
            }
            body.push_str("\r\n\r\n");
            body.push_str(value);
            body.push_str("\r\n");
        }
        body.push_str("--XB--\r\n");

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("multipart/form-data; boundary=XB"),
        );
        let stream = futures_util::stream::iter(vec![Ok::<_, PayloadError>(Bytes::from(body))]);
        Multipart::new(&headers, stream)
    }

    #[actix_web::test]
    async fn fields_and_file_are_collected() {
        let payload = read_payload(
            multipart(&[
                ("subject", None, "Test"),
                ("remove_file", None, "TRUE"),
                ("file", Some("scan.pdf"), "%PDF"),
            ]),
            LIMITS,
        )
        .await
        .unwrap();
        assert_eq!(payload.fields["subject"], "Test");
        assert!(payload.remove_file());
        assert_eq!(payload.file, Some(Upload::new("scan.pdf", b"%PDF".to_vec())));
    }

    #[actix_web::test]
    async fn unnamed_file_part_is_ignored() {
        let payload = read_payload(multipart(&[("file", Some(""), "")]), LIMITS)
            .await
            .unwrap();
        assert_eq!(payload.file, None);
        assert!(!payload.remove_file());
    }

    #[actix_web::test]
    async fn oversized_parts_are_rejected() {
        let err = read_payload(multipart(&[("file", Some("big.bin"), "0123456789")]), LIMITS)
            .await
            .unwrap_err();
        assert_eq!(err.code, 413);

        let err = read_payload(
            multipart(&[("subject", None, "a subject longer than sixteen bytes")]),
            LIMITS,
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, 413);
        assert!(err.message().contains("subject"));
    }
}
