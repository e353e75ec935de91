//! Multi-step survey forms: definitions, conditional questions, response
//! aggregation, admin management, and best-effort CRM and spreadsheet sync.

pub mod auth;
pub mod config;
pub mod error;
pub mod forms;
pub mod memory;
pub mod sync;
pub mod telemetry;

pub use config::AppConfig;
pub use error::AppError;
pub use memory::InMemorySurveyStore;
