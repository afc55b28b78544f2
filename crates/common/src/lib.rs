//! Shared types for the appshield runtime-protection agent.
//!
//! This crate carries the pieces every other subsystem needs: the endpoint
//! policy types delivered by the control plane, the request context slice the
//! interception layer hands to the core, the workspace error enum, and the
//! wall-clock helper used for all unix-millisecond timestamps.

pub mod context;
pub mod error;
pub mod policy;
pub mod time;

pub use context::{RequestContext, User};
pub use error::{ShieldError, ShieldResult};
pub use policy::{endpoint_key, EndpointPolicy, RateLimitPolicy};
pub use time::unix_ms;
