//! Request-security middleware for registered functions.
//!
//! # Data Flow
//! ```text
//! Inbound call:
//!     → rate_limiter.rs (sliding window per caller and endpoint)
//!     → validator.rs (required fields, sanitization, email/identifier checks)
//!     → permissions.rs (profile lookup, admin / role / authenticated)
//!     → handler
//!     → logger.rs (access log entry)
//! ```
//!
//! Rate limiter store errors fail open; logger store errors are swallowed;
//! everything else fails closed.

pub mod context;
pub mod error;
pub mod logger;
pub mod permissions;
pub mod policy;
pub mod rate_limiter;
pub mod validator;
pub mod wrapper;

pub use context::{CallContext, Caller};
pub use error::{ErrorKind, SecurityError};
pub use logger::{SecurityEvent, SecurityEventType, SecurityLogEntry, SecurityLogger, Severity};
pub use permissions::PermissionChecker;
pub use policy::{Access, EndpointPolicy, FieldRule, PolicyError, RateLimit, ValidationRules};
pub use rate_limiter::{RateLimitDecision, RateLimiter, RateLimitWindow};
pub use wrapper::{build_secured_handler, FunctionHandler, PipelineStage, SecuredHandler, SecurityDeps};
