// vartree
// SPDX-License-Identifier: MPL-2.0

//! Request taxonomy (spec.md §4.2, §6). Deserialized directly from the
//! frame payload; `type` is the serde-internal tag.

use serde::{Deserialize, Serialize};

use crate::{Properties, VarId, Value};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Request {
    Create {
        #[serde(rename = "parentId")]
        parent_id: VarId,
        value: Value,
        #[serde(default)]
        properties: Properties,
        #[serde(default)]
        unbound: bool,
        #[serde(default)]
        nowatch: bool,
    },
    Destroy {
        id: VarId,
    },
    Update {
        id: VarId,
        #[serde(default)]
        value: Option<Value>,
        #[serde(default)]
        properties: Option<Properties>,
        #[serde(default)]
        unbound: Option<bool>,
    },
    Watch {
        id: VarId,
        /// Optional binding path (spec.md §4.4) resolved against the
        /// variable's value; the baseline and every refresh compare at this
        /// path rather than the bare value when present.
        #[serde(default)]
        path: Option<String>,
    },
    Unwatch {
        id: VarId,
    },
    Get {
        #[serde(rename = "varIds")]
        var_ids: Vec<VarId>,
    },
    GetObjects {
        #[serde(rename = "objIds")]
        obj_ids: Vec<VarId>,
    },
    Poll {
        /// Duration string, e.g. `"30s"`. Absent or `"0s"` returns
        /// immediately.
        #[serde(default)]
        wait: Option<String>,
    },
}
