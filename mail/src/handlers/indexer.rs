use actix_web::{get, HttpResponse};
use common::context::Context;
use serde_json::json;

#[get("/mail/health")]
pub async fn health(context: Context) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "OK",
        "service": context.service_name(),
    }))
}
