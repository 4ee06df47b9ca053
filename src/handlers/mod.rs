// handlers/mod.rs - HTTP entry points
//
// status: service info and store health (public)
// function_call: dispatch into the secured function registry

pub mod function_call;
pub mod status;

pub use function_call::function_call;
pub use status::{health, root};
