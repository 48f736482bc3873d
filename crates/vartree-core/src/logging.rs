// vartree
// SPDX-License-Identifier: MPL-2.0

//! Logging initialization, gated the way `async-opcua`'s top crate gates
//! its `console-logging` feature: a thin wrapper around `env_logger` that
//! the embedding binary opts into, rather than something this library
//! forces on its caller.

/// Install an `env_logger` subscriber honoring `RUST_LOG`, falling back to
/// `level` (one of `Config::log_level`) when the environment variable is
/// unset. Safe to call more than once; subsequent calls are no-ops.
pub fn init(level: &str) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .is_test(false)
        .try_init();
}
