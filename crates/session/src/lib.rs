#![warn(clippy::unwrap_used)]

pub mod backend;
pub mod store;

pub use backend::{FileBackend, MemoryBackend, SessionBackend};
pub use store::SessionStore;
