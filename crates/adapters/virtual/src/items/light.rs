//! Virtual dimmable light — multi-slot setter deltas.
//!
//! `on` and `brightness` are coupled the way most dimmable lights behave:
//! turning the light off zeroes the brightness, setting a non-zero
//! brightness turns it on. Each setter therefore returns a delta touching
//! both slots, which the state layer applies as one combined change event.

use serde_json::{Value, json};

use domo_domain::error::DomoError;
use domo_domain::schema::{ConfigSchema, StateSchema};
use domo_domain::state::{StateDef, StateDelta};
use domo_runtime::module::{ItemParts, ItemTypeDef};
use domo_runtime::state::setter;

fn on_delta(value: &Value) -> StateDelta {
    let on = value.as_bool().unwrap_or(false);
    let mut delta = StateDelta::new();
    delta.insert("on".to_string(), json!(on));
    if !on {
        delta.insert("brightness".to_string(), json!(0));
    }
    delta
}

fn brightness_delta(value: &Value) -> StateDelta {
    let level = value.as_i64().unwrap_or(0);
    let mut delta = StateDelta::new();
    delta.insert("brightness".to_string(), json!(level));
    delta.insert("on".to_string(), json!(level > 0));
    delta
}

/// Build the `virtual.light` type definition.
///
/// # Errors
///
/// Returns a validation error if the builder fails (should not happen with
/// hardcoded inputs).
pub fn type_def() -> Result<ItemTypeDef, DomoError> {
    ItemTypeDef::builder()
        .name("virtual.light")
        .config(ConfigSchema::new())
        .state(StateDef::new("on", json!(false)).schema(StateSchema::Bool))
        .state(StateDef::new("brightness", json!(0)).schema(StateSchema::Integer {
            min: Some(0),
            max: Some(255),
        }))
        .constructor(|_ctx| async move {
            Ok(ItemParts::new()
                .setter(
                    "on",
                    setter(|value| async move { Ok(on_delta(&value)) }),
                )
                .setter(
                    "brightness",
                    setter(|value| async move { Ok(brightness_delta(&value)) }),
                ))
        })
        .build()
}
