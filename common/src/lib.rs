//! Shared wire types for the SMS gateway: domain models and the JSON
//! request/response shapes exchanged with tenants, paired Android devices,
//! and webhook subscribers. Kept dependency-light and storage-agnostic so
//! both the server binary and its tests can share one definition of "what a
//! message looks like on the wire".

pub mod constants;
pub mod model;
pub mod validate;
pub mod web_api;

pub use constants::*;
pub use model::*;
pub use validate::*;
pub use web_api::*;
