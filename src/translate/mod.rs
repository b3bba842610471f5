//! Translation between the OpenAI-compatible surface and the upstream API.
//!
//! Everything in here is pure (no I/O): request defaults and instruction
//! injection, response wrapping, reasoning-markup filtering and line-level
//! SSE relaying.

pub mod reasoning;
pub mod request;
pub mod response;
pub mod streaming;
pub mod types;
