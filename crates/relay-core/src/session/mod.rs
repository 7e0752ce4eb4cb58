//! Session store: bounded, in-memory, reclaimed by idle time.
//!
//! Sessions live only in process memory: nothing survives a restart and the
//! store is not shared across processes.

pub mod store;

pub use store::{lock_session, SessionHandle, SessionStore};
