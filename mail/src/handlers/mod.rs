pub mod indexer;
pub mod letter;
