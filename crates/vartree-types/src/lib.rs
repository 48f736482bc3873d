// vartree
// SPDX-License-Identifier: MPL-2.0

//! Wire value types, request/response envelopes, and the error taxonomy
//! shared across the vartree workspace.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub mod error;
pub mod request;
pub mod response;

pub use error::{ErrorKind, VartreeError};
pub use request::Request;
pub use response::{Response, Update};

/// Identity of a variable: monotonically increasing per store, id 1 is the
/// session root.
pub type VarId = u64;

/// A variable's opaque value. Always legal JSON — callers must reject NaN
/// and +/-Infinity before storing (`serde_json` already refuses to encode
/// them, so this is enforced at the serialization boundary).
pub type Value = serde_json::Value;

/// String-keyed properties attached to a variable. Order is not significant;
/// `BTreeMap` gives deterministic iteration for diffing and tests.
pub type Properties = BTreeMap<String, String>;

/// Checks that a JSON value contains no non-finite numbers. `serde_json`'s
/// default feature set cannot represent NaN/Infinity at all, but callers may
/// construct a `Value` from an `f64` directly before serialization, so this
/// is still worth checking at the boundary.
pub fn is_finite_json(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.as_f64().map(f64::is_finite).unwrap_or(true),
        Value::Array(items) => items.iter().all(is_finite_json),
        Value::Object(map) => map.values().all(is_finite_json),
        _ => true,
    }
}

/// A stored variable (spec.md §3). The unit of persistence shared by
/// `vartree-storage`'s `Backend` trait and `vartree-store`'s in-memory
/// graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Variable {
    pub id: VarId,
    pub parent_id: VarId,
    pub value: Value,
    pub properties: Properties,
    pub unbound: bool,
}

impl Variable {
    /// The session root, id 1, parent 0, null value (spec.md §3, §4.8).
    pub fn root() -> Self {
        Variable {
            id: 1,
            parent_id: 0,
            value: Value::Null,
            properties: Properties::new(),
            unbound: false,
        }
    }
}

/// A full variable record as returned by `getObjects`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VariableRecord {
    pub id: VarId,
    #[serde(rename = "parentId")]
    pub parent_id: VarId,
    pub value: Value,
    pub properties: Properties,
    pub children: Vec<VarId>,
}
