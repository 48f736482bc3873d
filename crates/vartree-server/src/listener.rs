// vartree
// SPDX-License-Identifier: MPL-2.0

//! Local-domain socket transport (spec.md §4.1, §6). Each accepted
//! connection is bound to exactly one session, determined by the
//! `sessionId` field carried on its first frame; the session is created on
//! demand if the id has not been seen before (spec.md §4.8).
//!
//! `poll`'s long-wait and socket I/O are the only suspension points in this
//! loop; the variable-store lock is never held across either (spec.md §5).

use std::sync::Arc;

use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWrite};
use vartree_types::{Request, Response, VartreeError};

use crate::connection::Connection;
use crate::dispatch::dispatch;
use crate::session_manager::{SessionEntry, SessionManager};

/// One frame's payload: the session it targets, flattened together with the
/// tagged request body.
#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "sessionId")]
    session_id: String,
    #[serde(flatten)]
    request: Request,
}

/// Binds `socket_path` (a POSIX UDS path, or a Windows named-pipe path under
/// `\\.\pipe\`) and serves connections until `shutdown` fires (spec.md §6).
pub async fn serve(
    socket_path: &str,
    manager: Arc<SessionManager>,
    max_frame_bytes: u32,
    shutdown: tokio::sync::oneshot::Receiver<()>,
) -> Result<(), VartreeError> {
    accept_loop(socket_path, manager, max_frame_bytes, shutdown).await
}

fn spawn_connection<S>(stream: S, manager: Arc<SessionManager>, max_frame_bytes: u32)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = handle_connection(stream, manager, max_frame_bytes).await {
            log::debug!("connection closed: {e}");
        }
    });
}

/// Removes a stale socket file left behind by a previous run before
/// binding, the way most Unix-socket servers do.
#[cfg(unix)]
async fn accept_loop(
    socket_path: &str,
    manager: Arc<SessionManager>,
    max_frame_bytes: u32,
    mut shutdown: tokio::sync::oneshot::Receiver<()>,
) -> Result<(), VartreeError> {
    use tokio::net::UnixListener;

    let _ = std::fs::remove_file(socket_path);
    let listener = UnixListener::bind(socket_path)
        .map_err(|e| VartreeError::Fatal(format!("failed to bind {socket_path}: {e}")))?;

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _addr) = accepted
                    .map_err(|e| VartreeError::Transport(e.to_string()))?;
                spawn_connection(stream, manager.clone(), max_frame_bytes);
            }
            _ = &mut shutdown => {
                log::info!("listener on {socket_path} shutting down");
                return Ok(());
            }
        }
    }
}

/// One named-pipe server instance handles one client for its lifetime
/// (unlike `UnixListener`, which keeps accepting on the same handle); each
/// accepted connection is replaced by a fresh instance before the old one is
/// handed off, so there is always exactly one pending `connect()`.
#[cfg(windows)]
async fn accept_loop(
    pipe_name: &str,
    manager: Arc<SessionManager>,
    max_frame_bytes: u32,
    mut shutdown: tokio::sync::oneshot::Receiver<()>,
) -> Result<(), VartreeError> {
    use tokio::net::windows::named_pipe::ServerOptions;

    let mut server = ServerOptions::new()
        .first_pipe_instance(true)
        .create(pipe_name)
        .map_err(|e| VartreeError::Fatal(format!("failed to create pipe {pipe_name}: {e}")))?;

    loop {
        tokio::select! {
            connected = server.connect() => {
                connected.map_err(|e| VartreeError::Transport(e.to_string()))?;
                let next = ServerOptions::new()
                    .create(pipe_name)
                    .map_err(|e| VartreeError::Fatal(format!("failed to create pipe {pipe_name}: {e}")))?;
                let stream = std::mem::replace(&mut server, next);
                spawn_connection(stream, manager.clone(), max_frame_bytes);
            }
            _ = &mut shutdown => {
                log::info!("listener on {pipe_name} shutting down");
                return Ok(());
            }
        }
    }
}

async fn handle_connection<S: AsyncRead + AsyncWrite + Unpin>(
    mut stream: S,
    manager: Arc<SessionManager>,
    max_frame_bytes: u32,
) -> Result<(), VartreeError> {
    let mut bound: Option<(Arc<SessionEntry>, Arc<Connection>)> = None;

    loop {
        let frame = vartree_core::codec::read_frame(&mut stream, max_frame_bytes).await?;
        let payload = match frame {
            vartree_core::codec::Frame::Eof => return Ok(()),
            vartree_core::codec::Frame::Payload(bytes) => bytes,
        };

        let envelope: Envelope = match serde_json::from_slice(&payload) {
            Ok(e) => e,
            Err(_) => {
                write_response(&mut stream, &Response::err("bad request")).await?;
                continue;
            }
        };

        let (entry, conn) = match &bound {
            Some(pair) => pair.clone(),
            None => {
                let entry = manager.get_or_create(&envelope.session_id).await?;
                let conn = entry.session.add_connection();
                bound = Some((entry.clone(), conn.clone()));
                (entry, conn)
            }
        };

        let response = match dispatch(&entry, &conn, envelope.request).await {
            Ok(response) => response,
            Err(e) => return Err(on_dispatch_error(&manager, &envelope.session_id, &entry, conn.id, e).await),
        };
        write_response(&mut stream, &response).await?;
    }
}

/// Transport errors are this connection's problem; `Fatal` means the
/// session's invariants can no longer be trusted and it is torn down for
/// every connection on it, not just this one (spec.md §7).
async fn on_dispatch_error(
    manager: &SessionManager,
    session_id: &str,
    entry: &SessionEntry,
    conn_id: u64,
    err: VartreeError,
) -> VartreeError {
    entry.session.remove_connection(conn_id);
    if err.kind() == vartree_types::ErrorKind::Fatal {
        manager.destroy(session_id).await;
    }
    err
}

async fn write_response<W: AsyncWrite + Unpin>(
    stream: &mut W,
    response: &Response,
) -> Result<(), VartreeError> {
    let bytes = serde_json::to_vec(response)
        .map_err(|e| VartreeError::Fatal(format!("failed to encode response: {e}")))?;
    vartree_core::codec::write_frame(stream, &bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend_factory::ConfiguredBackendFactory;
    use std::time::Duration;
    use vartree_core::config::StorageKind;

    fn manager() -> Arc<SessionManager> {
        SessionManager::new(
            Arc::new(ConfiguredBackendFactory::new(StorageKind::Memory, String::new())),
            Duration::from_millis(30),
            None,
        )
    }

    async fn roundtrip(client: &mut tokio::io::DuplexStream, request: &serde_json::Value) -> Response {
        let bytes = serde_json::to_vec(request).unwrap();
        vartree_core::codec::write_frame(client, &bytes).await.unwrap();
        let frame = vartree_core::codec::read_frame(client, vartree_core::codec::DEFAULT_MAX_FRAME_BYTES)
            .await
            .unwrap();
        match frame {
            vartree_core::codec::Frame::Payload(p) => serde_json::from_slice(&p).unwrap(),
            vartree_core::codec::Frame::Eof => panic!("server closed the connection"),
        }
    }

    #[tokio::test]
    async fn create_then_get_over_one_connection() {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let mgr = manager();
        let server_mgr = mgr.clone();
        tokio::spawn(async move {
            let _ = handle_connection(server, server_mgr, vartree_core::codec::DEFAULT_MAX_FRAME_BYTES).await;
        });

        let create = serde_json::json!({
            "sessionId": "s1",
            "type": "create",
            "parentId": 1,
            "value": 42,
            "nowatch": true,
        });
        let resp = roundtrip(&mut client, &create).await;
        let id = resp.result.unwrap()["id"].as_u64().unwrap();

        let get = serde_json::json!({ "sessionId": "s1", "type": "get", "varIds": [id] });
        let resp = roundtrip(&mut client, &get).await;
        assert_eq!(resp.result.unwrap()[0], serde_json::json!(42));
    }

    #[tokio::test]
    async fn fatal_dispatch_error_tears_down_the_whole_session() {
        let mgr = manager();
        let entry = mgr.get_or_create("s1").await.unwrap();
        let conn = entry.session.add_connection();
        on_dispatch_error(&mgr, "s1", &entry, conn.id, VartreeError::Fatal("boom".into())).await;
        assert_eq!(mgr.session_count(), 0);
    }

    #[tokio::test]
    async fn transport_dispatch_error_only_drops_the_connection() {
        let mgr = manager();
        let entry = mgr.get_or_create("s1").await.unwrap();
        let conn = entry.session.add_connection();
        on_dispatch_error(&mgr, "s1", &entry, conn.id, VartreeError::Transport("reset".into())).await;
        assert_eq!(mgr.session_count(), 1);
        assert!(entry.session.connection(conn.id).is_none());
    }

    #[tokio::test]
    async fn malformed_frame_gets_a_bad_request_response_and_stays_open() {
        let (mut client, server) = tokio::io::duplex(64 * 1024);
        let mgr = manager();
        tokio::spawn(async move {
            let _ = handle_connection(server, mgr, vartree_core::codec::DEFAULT_MAX_FRAME_BYTES).await;
        });

        vartree_core::codec::write_frame(&mut client, b"not json")
            .await
            .unwrap();
        let frame = vartree_core::codec::read_frame(&mut client, vartree_core::codec::DEFAULT_MAX_FRAME_BYTES)
            .await
            .unwrap();
        let resp: Response = match frame {
            vartree_core::codec::Frame::Payload(p) => serde_json::from_slice(&p).unwrap(),
            vartree_core::codec::Frame::Eof => panic!("expected a response"),
        };
        assert!(resp.error.is_some());
    }
}
