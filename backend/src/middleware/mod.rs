pub mod admin;

pub use admin::{require_admin_key, ADMIN_KEY_HEADER};
