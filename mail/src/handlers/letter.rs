use actix_files::NamedFile;
use actix_multipart::Multipart;
use actix_web::{
    delete, get,
    http::header::{Charset, ContentDisposition, DispositionParam, DispositionType, ExtendedValue},
    post, put,
    web::{Json, Path},
    HttpResponse,
};
use common::{
    context::Context,
    entities::letter::{Letter, LetterKind},
    error,
};
use serde_json::json;

use crate::service::{
    export::{EXPORT_FILE_NAME, XLSX_CONTENT_TYPE},
    letter::LetterService,
    upload::{read_payload, UploadLimits},
};

/// `filename` with non-ASCII characters masked, plus the exact name as RFC 5987 `filename*`.
fn attachment_disposition(file_name: &str) -> ContentDisposition {
    let fallback: String = file_name
        .chars()
        .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '_' })
        .collect();
    let mut parameters = vec![DispositionParam::Filename(fallback)];
    if !file_name.is_ascii() {
        parameters.push(DispositionParam::FilenameExt(ExtendedValue {
            charset: Charset::Ext("UTF-8".to_string()),
            language_tag: None,
            value: file_name.as_bytes().to_vec(),
        }));
    }
    ContentDisposition {
        disposition: DispositionType::Attachment,
        parameters,
    }
}

#[get("/mail/downloadExcel")]
pub async fn download_excel(context: Context) -> error::Result<HttpResponse> {
    let workbook = LetterService::new(context).export().await?;
    Ok(HttpResponse::Ok()
        .content_type(XLSX_CONTENT_TYPE)
        .insert_header(attachment_disposition(EXPORT_FILE_NAME))
        .body(workbook))
}

#[get("/mail/{kind}")]
pub async fn get_letters(context: Context, kind: Path<LetterKind>) -> error::Result<Json<Vec<Letter>>> {
    Ok(Json(LetterService::new(context).list(kind.into_inner()).await?))
}

#[get("/mail/{kind}/{id}")]
pub async fn get_letter(
    context: Context,
    path: Path<(LetterKind, String)>,
) -> error::Result<Json<Letter>> {
    let (kind, id) = path.into_inner();
    Ok(Json(LetterService::new(context).get(kind, &id).await?))
}

#[post("/mail/{kind}")]
pub async fn post_letter(
    context: Context,
    kind: Path<LetterKind>,
    payload: Multipart,
) -> error::Result<HttpResponse> {
    let payload = read_payload(payload, UploadLimits::from_env()).await?;
    let letter = LetterService::new(context)
        .create(kind.into_inner(), payload)
        .await?;
    Ok(HttpResponse::Created().json(letter))
}

#[put("/mail/{kind}/{id}")]
pub async fn put_letter(
    context: Context,
    path: Path<(LetterKind, String)>,
    payload: Multipart,
) -> error::Result<Json<Letter>> {
    let (kind, id) = path.into_inner();
    let payload = read_payload(payload, UploadLimits::from_env()).await?;
    Ok(Json(
        LetterService::new(context).update(kind, &id, payload).await?,
    ))
}

#[delete("/mail/{kind}/{id}")]
pub async fn delete_letter(
    context: Context,
    path: Path<(LetterKind, String)>,
) -> error::Result<HttpResponse> {
    let (kind, id) = path.into_inner();
    LetterService::new(context).delete(kind, &id).await?;
    Ok(HttpResponse::Ok().json(json!({ "message": "Letter deleted successfully" })))
}

#[get("/mail/{kind}/{id}/download")]
pub async fn download_letter(
    context: Context,
    path: Path<(LetterKind, String)>,
) -> error::Result<NamedFile> {
    let (kind, id) = path.into_inner();
    let location = LetterService::new(context).attachment(kind, &id).await?;
    let file_name = location
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());

    let file = NamedFile::open_async(&location).await?;
    Ok(file.set_content_disposition(attachment_disposition(&file_name)))
}

#[cfg(test)]
mod tests {
    use actix_web::{
        http::StatusCode,
        test::{self, TestRequest},
    };
    use serde_json::Value;

    use super::attachment_disposition;
    use crate::{create_app, in_memory_state};

    #[test]
    fn non_ascii_names_get_an_extended_parameter() {
        let ascii = attachment_disposition("1700000000_scan.pdf");
        assert_eq!(ascii.get_filename(), Some("1700000000_scan.pdf"));
        assert!(ascii.get_filename_ext().is_none());

        let cyrillic = attachment_disposition("1700000000_Письмо.pdf");
        assert_eq!(cyrillic.get_filename(), Some("1700000000_______.pdf"));
        let extended = cyrillic.get_filename_ext().unwrap();
        assert_eq!(extended.value, "1700000000_Письмо.pdf".as_bytes());
        assert!(cyrillic.to_string().contains("filename*=UTF-8''"));
    }

    #[actix_web::test]
    async fn kind_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(create_app(in_memory_state(dir.path()))).await;

        let req = TestRequest::get().uri("/mail/Outgoing").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, Value::Array(vec![]));
    }

    #[actix_web::test]
    async fn excel_export_is_an_attachment() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(create_app(in_memory_state(dir.path()))).await;

        let req = TestRequest::get().uri("/mail/downloadExcel").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let disposition = resp
            .headers()
            .get("content-disposition")
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.starts_with("attachment"));
        assert!(disposition.contains("Mail_registry.xlsx"));

        let body = test::read_body(resp).await;
        assert!(body.starts_with(b"PK"));
    }

    #[actix_web::test]
    async fn empty_registry_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(create_app(in_memory_state(dir.path()))).await;

        for uri in ["/mail/outgoing", "/mail/incoming"] {
            let req = TestRequest::get().uri(uri).to_request();
            let body: Value = test::call_and_read_body_json(&app, req).await;
            assert_eq!(body, Value::Array(vec![]));
        }
    }

    #[actix_web::test]
    async fn health_reports_service() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(create_app(in_memory_state(dir.path()))).await;

        let req = TestRequest::get().uri("/mail/health").to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "OK");
        assert_eq!(body["service"], "mail");
    }

    #[actix_web::test]
    async fn unknown_kind_and_bad_ids() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(create_app(in_memory_state(dir.path()))).await;

        let req = TestRequest::get().uri("/mail/archive").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = TestRequest::get().uri("/mail/incoming/not-an-id").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Invalid ID format");

        let missing = mongodb::bson::oid::ObjectId::new().to_hex();
        for uri in [
            format!("/mail/outgoing/{}", missing),
            format!("/mail/outgoing/{}/download", missing),
        ] {
            let req = TestRequest::get().uri(&uri).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        }

        let req = TestRequest::delete()
            .uri(&format!("/mail/incoming/{}", missing))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn create_rejects_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let app = test::init_service(create_app(in_memory_state(dir.path()))).await;

        let boundary = "XBOUNDARY";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"outgoing_number\"\r\n\r\n281\r\n--{b}--\r\n",
            b = boundary
        );
        let req = TestRequest::post()
            .uri("/mail/outgoing")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={}", boundary),
            ))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Field 'registration_date' is required");
    }
}
