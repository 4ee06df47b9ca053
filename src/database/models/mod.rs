pub mod user;

pub use user::{UserProfile, ADMIN_ROLE, DEFAULT_ROLE};
