pub mod auth;
pub mod response;

pub use auth::{identity_middleware, parse_trusted_proxies};
pub use response::{ApiResponse, ApiResult};
