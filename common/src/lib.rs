pub mod api;
pub mod context;
pub mod entities;
pub mod error;
pub mod filter;
pub mod form;
pub mod repository;
pub mod services;
