pub mod edit_lock;
pub mod record_version;
