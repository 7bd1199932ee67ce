//! Virtual switch — a simulated relay with a live-read `on` slot.
//!
//! The relay state lives in an [`AtomicBool`] standing in for the real
//! hardware. The `on` slot binds both a getter and a setter and declares no
//! poll interval, so every read goes through the getter: `toggle` flips the
//! relay directly and the change surfaces on the next read, without a
//! `state_change` event, exactly like a wall button pressed behind the
//! hub's back on a device that does not push updates.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::json;

use domo_domain::error::DomoError;
use domo_domain::schema::{ConfigKind, ConfigSchema, StateSchema};
use domo_domain::state::{StateDef, StateDelta};
use domo_runtime::actions::action;
use domo_runtime::module::{ItemParts, ItemTypeDef};
use domo_runtime::state::{getter, setter};

/// Build the `virtual.switch` type definition.
///
/// # Errors
///
/// Returns a validation error if the builder fails (should not happen with
/// hardcoded inputs).
pub fn type_def() -> Result<ItemTypeDef, DomoError> {
    ItemTypeDef::builder()
        .name("virtual.switch")
        .config(ConfigSchema::new().optional("bridge", ConfigKind::ItemRef))
        .state(StateDef::new("on", json!(false)).schema(StateSchema::Bool))
        .constructor(|_ctx| async move {
            let relay = Arc::new(AtomicBool::new(false));
            let read_relay = Arc::clone(&relay);
            let write_relay = Arc::clone(&relay);
            let toggle_relay = Arc::clone(&relay);
            Ok(ItemParts::new()
                .getter(
                    "on",
                    getter(move || {
                        let relay = Arc::clone(&read_relay);
                        async move { Ok(json!(relay.load(Ordering::SeqCst))) }
                    }),
                )
                .setter(
                    "on",
                    setter(move |value| {
                        let relay = Arc::clone(&write_relay);
                        async move {
                            let on = value.as_bool().unwrap_or(false);
                            relay.store(on, Ordering::SeqCst);
                            let mut delta = StateDelta::new();
                            delta.insert("on".to_string(), json!(on));
                            Ok(delta)
                        }
                    }),
                )
                .action(
                    "toggle",
                    action(move |_args| {
                        let relay = Arc::clone(&toggle_relay);
                        async move {
                            let was = relay.fetch_xor(true, Ordering::SeqCst);
                            Ok(json!({ "on": !was }))
                        }
                    }),
                ))
        })
        .build()
}
