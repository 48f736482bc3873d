// vartree
// SPDX-License-Identifier: MPL-2.0

//! Maps a decoded `Request` onto a `Session`/`Connection` pair and produces
//! a `Response` (spec.md §4.2, §6, §7). Every write (create, destroy,
//! update) schedules a change-detection refresh afterward; every request
//! first touches the session so its idle clock resets (SPEC_FULL.md
//! "Supplemented from original_source": idle timeout is reset per request,
//! not just on session creation).

use std::sync::Arc;

use vartree_core::duration::parse_wait;
use vartree_types::{Request, Response, VariableRecord, VartreeError};

use crate::connection::Connection;
use crate::session_manager::SessionEntry;

/// Dispatches one request. Errors whose `kind()` is `Transport` or `Fatal`
/// are returned rather than folded into a `Response`, so the caller can
/// close the connection or tear the session down instead of replying
/// (spec.md §7).
pub async fn dispatch(
    entry: &SessionEntry,
    conn: &Arc<Connection>,
    request: Request,
) -> Result<Response, VartreeError> {
    entry.session.touch();
    let result = dispatch_inner(entry, conn, request).await;
    match result {
        Ok(response) => Ok(response),
        Err(e) if e.is_response_error() => Ok(Response::err(e.to_string())),
        Err(e) => Err(e),
    }
}

async fn dispatch_inner(
    entry: &SessionEntry,
    conn: &Arc<Connection>,
    request: Request,
) -> Result<Response, VartreeError> {
    let store = entry.session.store();
    match request {
        Request::Create {
            parent_id,
            value,
            properties,
            unbound,
            nowatch,
        } => {
            let id = store.create(parent_id, value, properties, unbound).await?;
            if !nowatch {
                entry.session.watch(conn.id, id, None).await?;
            }
            entry.detector.schedule_refresh(entry.session.clone());
            Ok(Response::ok(serde_json::json!({ "id": id })))
        }

        Request::Destroy { id } => {
            store.delete_recursive(id).await?;
            entry.detector.schedule_refresh(entry.session.clone());
            Ok(Response::empty_ok())
        }

        Request::Update {
            id,
            value,
            properties,
            unbound,
        } => {
            store.update(id, value, properties, unbound).await?;
            entry.detector.schedule_refresh(entry.session.clone());
            Ok(Response::empty_ok())
        }

        Request::Watch { id, path } => {
            entry.session.watch(conn.id, id, path).await?;
            Ok(Response::empty_ok())
        }

        Request::Unwatch { id } => {
            entry.session.unwatch(conn.id, id);
            Ok(Response::empty_ok())
        }

        Request::Get { var_ids } => {
            let mut values = Vec::with_capacity(var_ids.len());
            for id in var_ids {
                let value = store.load(id).await?.map(|v| v.value).unwrap_or(serde_json::Value::Null);
                values.push(value);
            }
            Ok(Response::ok(serde_json::Value::Array(values)))
        }

        Request::GetObjects { obj_ids } => {
            let mut records = Vec::with_capacity(obj_ids.len());
            for id in obj_ids {
                let Some(var) = store.load(id).await? else {
                    continue;
                };
                let children = store.load_children(id).await?;
                records.push(VariableRecord {
                    id: var.id,
                    parent_id: var.parent_id,
                    value: var.value,
                    properties: var.properties,
                    children,
                });
            }
            Ok(Response::ok(serde_json::to_value(records).map_err(|e| {
                VartreeError::Fatal(format!("failed to encode getObjects response: {e}"))
            })?))
        }

        Request::Poll { wait } => {
            let wait = match wait {
                Some(raw) => parse_wait(&raw)?,
                None => std::time::Duration::ZERO,
            };
            let pending = conn.poll(wait, entry.session.shutdown_signal()).await;
            Ok(Response::empty_ok().with_pending(pending))
        }
    }
}
