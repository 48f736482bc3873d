// vartree
// SPDX-License-Identifier: MPL-2.0

//! Ambient stack shared by the rest of the workspace: configuration,
//! logging initialization, lock type aliases, duration parsing, and the
//! framing codec used on the wire.

pub mod codec;
pub mod config;
pub mod duration;
pub mod logging;

/// Common synchronous locks. Re-exports locks from `parking_lot` used
/// internally, the way `async-opcua-core::sync` does for its own server
/// and client crates.
pub mod sync {
    pub type RwLock<T> = parking_lot::RwLock<T>;
    pub type Mutex<T> = parking_lot::Mutex<T>;
}

/// Obtain a read lock on a `RwLock`, logging at `trace` level first. Mirrors
/// `async-opcua-core`'s `trace_read_lock!`/`trace_write_lock!` macros, used
/// throughout the store and session code to make lock acquisition points
/// greppable when diagnosing the lock-ordering discipline in spec.md §5.
#[macro_export]
macro_rules! trace_read_lock {
    ( $x:expr ) => {{
        log::trace!("read locking {} at {}:{}", stringify!($x), file!(), line!());
        $x.read()
    }};
}

/// Obtain a write lock on a `RwLock`, logging at `trace` level first.
#[macro_export]
macro_rules! trace_write_lock {
    ( $x:expr ) => {{
        log::trace!(
            "write locking {} at {}:{}",
            stringify!($x),
            file!(),
            line!()
        );
        $x.write()
    }};
}
