//! # domo-domain
//!
//! Pure domain model for the domo home automation hub.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define the **item status** state machine (`Online`/`Offline`/`Stopped`)
//! - Define **state declarations** (`StateDef`: defaults, polling, schema)
//! - Define **schemas** for state values and item configuration
//! - Define **storage entries** (persisted item descriptors)
//! - Define **events** (lifecycle and state-change records)
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from the runtime, adapters, or IO crates.
//! All IO boundaries are expressed as traits in the `runtime` crate (ports).

pub mod entry;
pub mod error;
pub mod event;
pub mod id;
pub mod schema;
pub mod state;
pub mod status;
pub mod time;
