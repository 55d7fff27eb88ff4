//! # hetsched-id
//!
//! Typed identifiers for the scheduler core.
//!
//! Every registry in the coordinator is keyed by one of these types, so a
//! device id can never be handed to the allocator by mistake. Identifiers
//! are ULID-backed and render as `{prefix}_{ulid}`:
//!
//! - `dev_01HV4Z2WQXKJNM8GPQY6VBKC3D`
//! - `task_01HV4Z3MXNKPQR9HSTZ7WCLD4E`
//! - `res_01HV4Z4NYPLTRS0JTUA8XDME5F`
//!
//! Ids order by creation time. Registries that care about registration
//! order track it separately.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for callers that build ids from raw values.
pub use ulid::Ulid;
