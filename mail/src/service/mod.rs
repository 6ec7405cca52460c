pub mod attachments;
pub mod export;
pub mod letter;
pub mod upload;
