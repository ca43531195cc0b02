//! Shared helpers for building the `{data, meta}` envelope (sec 6) and
//! validating request bodies consistently across route handlers.

use std::time::Instant;

use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::models::{Envelope, Meta};

pub fn validate<T: Validate>(payload: &T) -> AppResult<()> {
    payload
        .validate()
        .map_err(|e| AppError::InvalidRequest(e.to_string()))
}

/// Parses a path segment as a `Uuid`, mapping a malformed id to
/// `InvalidRequest` rather than a panic.
pub fn validate_uuid(raw: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::InvalidRequest(format!("'{raw}' is not a valid id")))
}

/// Builds the response envelope for a successful call, stamping elapsed
/// wall-clock time since `started`.
pub fn envelope<T: serde::Serialize>(
    data: T,
    started: Instant,
    query: Option<String>,
    model: Option<String>,
    transaction_id: Uuid,
    answered: Option<bool>,
) -> Envelope<T> {
    Envelope::new(
        data,
        Meta {
            query,
            model,
            processing_time_ms: started.elapsed().as_millis() as u64,
            transaction_id,
            answered,
        },
    )
}
