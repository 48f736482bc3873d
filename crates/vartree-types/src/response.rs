// vartree
// SPDX-License-Identifier: MPL-2.0

//! Response envelope (spec.md §4.1, §6): `{result?, pending?, error?}`.

use serde::{Deserialize, Serialize};

use crate::{Properties, VarId, Value};

/// A single buffered update delivered alongside a reply, or drained by
/// `poll`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Update {
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    pub id: VarId,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Properties>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum UpdateKind {
    Update,
}

impl Update {
    pub fn new(id: VarId, value: Value) -> Self {
        Update {
            kind: UpdateKind::Update,
            id,
            value,
            properties: None,
        }
    }
}

/// The single response object sent for every request. At most one of
/// `result` and `error` is ever set; `pending` may accompany either.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending: Vec<Update>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(result: Value) -> Self {
        Response {
            result: Some(result),
            pending: Vec::new(),
            error: None,
        }
    }

    pub fn empty_ok() -> Self {
        Response::default()
    }

    pub fn err(message: impl Into<String>) -> Self {
        Response {
            result: None,
            pending: Vec::new(),
            error: Some(message.into()),
        }
    }

    pub fn with_pending(mut self, pending: Vec<Update>) -> Self {
        self.pending = pending;
        self
    }
}
