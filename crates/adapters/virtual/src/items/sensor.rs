//! Virtual temperature sensor — a poll-backed getter slot.
//!
//! The `value` slot declares a poll interval, so the runtime polls the
//! getter and publishes `state_change` whenever the reading moves. The
//! reading itself is a deterministic triangle-ish wave around a
//! configurable midpoint, advanced one step per poll.
//!
//! When a `bridge` reference is configured the getter refuses to read while
//! the bridge is not online, which is what a reading through a dropped
//! gateway connection would do. The poll loop logs those failures and keeps
//! the last good value in the cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde_json::{Value, json};

use domo_domain::error::DomoError;
use domo_domain::schema::{ConfigKind, ConfigSchema};
use domo_domain::state::StateDef;
use domo_runtime::module::{ItemParts, ItemTypeDef};
use domo_runtime::state::getter;

const POLL_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_MIDPOINT: f64 = 21.0;
const DEFAULT_AMPLITUDE: f64 = 1.5;

/// One full wave in eight polls.
const WAVE: [f64; 8] = [0.0, 0.7, 1.0, 0.7, 0.0, -0.7, -1.0, -0.7];

/// The reading for poll number `tick`, rounded to one decimal.
fn sample(tick: u64, midpoint: f64, amplitude: f64) -> f64 {
    let phase = WAVE[usize::try_from(tick % 8).unwrap_or(0)];
    ((midpoint + amplitude * phase) * 10.0).round() / 10.0
}

/// Build the `virtual.sensor` type definition.
///
/// # Errors
///
/// Returns a validation error if the builder fails (should not happen with
/// hardcoded inputs).
pub fn type_def() -> Result<ItemTypeDef, DomoError> {
    ItemTypeDef::builder()
        .name("virtual.sensor")
        .config(
            ConfigSchema::new()
                .optional("bridge", ConfigKind::ItemRef)
                .optional("midpoint", ConfigKind::Float)
                .optional("amplitude", ConfigKind::Float),
        )
        .state(StateDef::new("value", Value::Null).poll_every(POLL_INTERVAL))
        .state(StateDef::new("unit", json!("°C")))
        .constructor(|ctx| async move {
            let midpoint = ctx.cfg_f64("midpoint").unwrap_or(DEFAULT_MIDPOINT);
            let amplitude = ctx.cfg_f64("amplitude").unwrap_or(DEFAULT_AMPLITUDE);
            let bridge = ctx.dep("bridge").cloned();
            let tick = Arc::new(AtomicU64::new(0));
            Ok(ItemParts::new().getter(
                "value",
                getter(move || {
                    let bridge = bridge.clone();
                    let tick = Arc::clone(&tick);
                    async move {
                        if let Some(bridge) = &bridge {
                            let status = bridge.status();
                            if !status.is_online() {
                                return Err(DomoError::NotOnline {
                                    item: bridge.identifier().clone(),
                                    status,
                                });
                            }
                        }
                        let count = tick.fetch_add(1, Ordering::Relaxed);
                        Ok(json!(sample(count, midpoint, amplitude)))
                    }
                }),
            ))
        })
        .build()
}
