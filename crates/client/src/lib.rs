//! Client half of the edit-lock protocol.
//!
//! A [`driver::SessionDriver`] runs one editing session: it feeds events to the
//! pure [`editlock_core::session::Session`] state machine and executes the
//! effects it returns against a [`transport::LockTransport`] and an
//! [`form::EditForm`].

pub mod driver;
pub mod form;
pub mod http;
pub mod local;
pub mod transport;
