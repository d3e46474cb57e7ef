//! Service Layer
//!
//! Business logic behind the routes. Handlers translate HTTP to calls on
//! these services and back, nothing more.

mod search_service;

pub use search_service::*;
