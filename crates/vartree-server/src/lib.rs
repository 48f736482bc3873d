// vartree
// SPDX-License-Identifier: MPL-2.0

//! Session lifecycle, watch/delivery, change detection, and request
//! dispatch for vartree (spec.md §4.2, §4.5, §4.6, §4.8). Ties the
//! `vartree-store`/`vartree-storage` layers to the wire transport.

pub mod backend_factory;
pub mod change_detector;
pub mod connection;
pub mod dispatch;
pub mod listener;
pub mod session;
pub mod session_manager;
mod watch;

use std::sync::Arc;

use vartree_core::config::Config;
use vartree_types::VartreeError;

use crate::backend_factory::ConfiguredBackendFactory;
use crate::session_manager::SessionManager;

/// Runs the server until `shutdown` resolves, then drains sessions with
/// `config.shutdown_grace` before returning (spec.md §4.8, §5). This is the
/// entry point the out-of-scope CLI collaborator calls after loading
/// `Config` (spec.md §6 "Environment / CLI surface").
pub async fn serve(config: Config, shutdown: tokio::sync::oneshot::Receiver<()>) -> Result<(), VartreeError> {
    let factory = Arc::new(ConfiguredBackendFactory::new(
        config.storage_kind.clone(),
        config.storage_url.clone(),
    ));
    let session_timeout = (!config.session_timeout.is_zero()).then_some(config.session_timeout);
    let manager = SessionManager::new(factory, config.refresh_interval, session_timeout);

    let cleanup_manager = manager.clone();
    let cleanup_interval = config.cleanup_interval;
    let cleanup_handle = tokio::spawn(async move {
        cleanup_manager.run_cleanup_loop(cleanup_interval).await;
    });

    let result = listener::serve(&config.socket_path, manager.clone(), config.max_frame_bytes, shutdown).await;
    cleanup_handle.abort();
    manager.shutdown(config.shutdown_grace).await;
    result
}

/// A convenience wrapper that shuts the server down on Ctrl-C, matching the
/// signal-handling shape of a standalone binary (left as a library function
/// rather than a `main.rs` since the CLI surface itself is out of scope,
/// spec.md §6).
pub async fn serve_until_ctrl_c(config: Config) -> Result<(), VartreeError> {
    let (tx, rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = tx.send(());
    });
    serve(config, rx).await
}
