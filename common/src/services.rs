use std::env::var;

use lazy_static::lazy_static;

fn var_or(key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|_| default.to_string())
}

lazy_static! {
    pub static ref APP_PORT: String = var_or("APP_PORT", "8080");
    pub static ref MONGOURI: String = var_or("MONGOURI", "mongodb://localhost:27017");
    pub static ref MAIL_DATABASE: String = var_or("MAIL_DATABASE", "mail_registry");
    pub static ref FILES_DIR: String = var_or("FILES_DIR", "./files");
    /// `mongo` or `memory`. The in-memory registry forgets everything on exit.
    pub static ref MAIL_STORAGE: String = var_or("MAIL_STORAGE", "mongo");
    /// Largest accepted attachment, in bytes.
    pub static ref MAX_FILE_BYTES: usize = var_or("MAX_FILE_BYTES", "26214400")
        .parse()
        .unwrap_or(26_214_400);
}
