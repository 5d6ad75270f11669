//! Boundary adapters for the two external detectors.
//!
//! Each adapter normalizes its collaborator into found / not-found / error so
//! the capture controller never sees library or transport specifics.

pub mod barcode;
pub mod frame;
pub mod mark;

use thiserror::Error;

pub use barcode::{IdentifierDecoder, RxingDecoder};
pub use frame::Frame;
pub use mark::{HttpMarkRecognizer, MarkReading, MarkRecognizer};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DetectionError {
    #[error("invalid frame: {0}")]
    Frame(String),
    #[error("mark service endpoint is not configured")]
    NotConfigured,
    #[error("network error: {0}")]
    Network(String),
    #[error("mark service returned HTTP {status}: {body}")]
    Service { status: u16, body: String },
    #[error("unexpected response from mark service: {0}")]
    MalformedResponse(String),
    #[error("detection worker failed: {0}")]
    Worker(String),
}
