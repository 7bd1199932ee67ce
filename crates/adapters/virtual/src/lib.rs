//! # domo-adapter-virtual
//!
//! Virtual/demo module providing simulated item types for testing and
//! demonstration.
//!
//! ## Provided item types
//!
//! | Item type | Behaviour |
//! |-----------|-----------|
//! | `virtual.bridge` | Dependency target; `go_offline` / `go_online` actions flip its status |
//! | `virtual.switch` | Live-read `on` slot backed by a simulated relay, `toggle` action |
//! | `virtual.light` | Coupled `on` + `brightness` slots, multi-slot setter deltas |
//! | `virtual.sensor` | Poll-backed `value` slot, optional `bridge` reference |
//!
//! ## Dependency rule
//!
//! Depends on `domo-runtime` (type registration) and `domo-domain` only.

mod items;

pub use items::register;
