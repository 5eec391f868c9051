//! Request extractors: [`auth::AuthUser`] for every lock endpoint,
//! [`rbac::RequireAdmin`] for the admin ones.

pub mod auth;
pub mod rbac;
