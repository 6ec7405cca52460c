use std::io;

use actix_web::HttpServer;
use common::services::{APP_PORT, FILES_DIR, MAIL_DATABASE, MAIL_STORAGE, MONGOURI};
use mail::{create_app, in_memory_state, mongo_state};

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let state = match MAIL_STORAGE.as_str() {
        "memory" => {
            log::warn!("Using in-memory storage, letters will be lost on exit");
            in_memory_state(FILES_DIR.as_str())
        }
        _ => mongo_state(&MONGOURI, &MAIL_DATABASE, FILES_DIR.as_str())
            .await
            .map_err(|err| {
                log::error!("Failed to connect to MongoDB: {}", err);
                io::Error::new(io::ErrorKind::Other, err.to_string())
            })?,
    };

    let port: u16 = APP_PORT
        .parse()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "APP_PORT must be a port number"))?;
    log::info!("Mail registry listening on port {}", port);

    HttpServer::new(move || create_app(state.clone()))
        .bind(("0.0.0.0", port))?
        .run()
        .await
}
