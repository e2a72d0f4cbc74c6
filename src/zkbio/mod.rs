//! ZKBio Time HTTP API
//!
//! Token auth, employee/terminal/transaction lists, and forwarding of the
//! normalized records to the downstream ingestion endpoint.

pub mod client;
pub mod types;

pub use client::{should_renew_token, ZkBioClient, TOKEN_RENEWAL_DAYS};
pub use types::{AttendanceLog, Employee};
