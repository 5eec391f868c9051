pub mod admin;
pub mod locks;
pub mod records;
