//! Well-known role name constants carried in access tokens.

/// May list and force-unlock any lock.
pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_EDITOR: &str = "editor";
