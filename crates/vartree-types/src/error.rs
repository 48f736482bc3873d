// vartree
// SPDX-License-Identifier: MPL-2.0

//! Error taxonomy (spec.md §7). Every variant maps to exactly one wire
//! surface: a response `error` string, a dropped connection, or (for
//! `Fatal`) session teardown.

use thiserror::Error;

/// Coarse classification used by callers that need to decide *how* to
/// surface an error rather than just display it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    Validation,
    Storage,
    TransactionMisuse,
    Transport,
    Fatal,
}

/// The error type threaded through `vartree-store`, `vartree-storage`, and
/// `vartree-server`.
#[derive(Error, Debug)]
pub enum VartreeError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("variable {0} not found")]
    NotFound(u64),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("transaction error: {0}")]
    TransactionMisuse(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("fatal error: {0}")]
    Fatal(String),
}

impl VartreeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VartreeError::BadRequest(_) => ErrorKind::BadRequest,
            VartreeError::NotFound(_) => ErrorKind::NotFound,
            VartreeError::Validation(_) => ErrorKind::Validation,
            VartreeError::Storage(_) => ErrorKind::Storage,
            VartreeError::TransactionMisuse(_) => ErrorKind::TransactionMisuse,
            VartreeError::Transport(_) => ErrorKind::Transport,
            VartreeError::Fatal(_) => ErrorKind::Fatal,
        }
    }

    /// Whether this error is reported in a response `error` field (as
    /// opposed to closing the connection or tearing down the session).
    pub fn is_response_error(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Transport | ErrorKind::Fatal)
    }

    pub fn not_found(id: u64) -> Self {
        VartreeError::NotFound(id)
    }
}
