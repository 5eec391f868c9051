//! Domain core for edit locking.
//!
//! Zero I/O: the database and HTTP layers plug in through the store traits
//! in [`store`], and the client drives [`session`] with real timers.

pub mod clock;
pub mod conflict;
pub mod coordinator;
pub mod error;
pub mod lock;
pub mod memory;
pub mod protocol;
pub mod roles;
pub mod session;
pub mod settings;
pub mod store;
pub mod types;
