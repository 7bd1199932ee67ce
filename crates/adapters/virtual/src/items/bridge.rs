//! Virtual bridge — a dependency target other virtual items can reference.
//!
//! The bridge has no state slots of its own; its job is to be pointed at
//! through `ItemRef` config fields and to simulate connection loss. The
//! `go_offline` and `go_online` actions flip the item's status, which makes
//! the status watcher publish `item_not_working` exactly like a real
//! gateway dropping its link would.

use serde_json::json;

use domo_domain::error::DomoError;
use domo_domain::status::ItemStatus;
use domo_runtime::actions::action;
use domo_runtime::module::{ItemParts, ItemTypeDef};

/// Build the `virtual.bridge` type definition.
///
/// # Errors
///
/// Returns a validation error if the builder fails (should not happen with
/// hardcoded inputs).
pub fn type_def() -> Result<ItemTypeDef, DomoError> {
    ItemTypeDef::builder()
        .name("virtual.bridge")
        .constructor(|ctx| async move {
            let offline_status = ctx.status.clone();
            let online_status = ctx.status.clone();
            Ok(ItemParts::new()
                .action(
                    "go_offline",
                    action(move |_args| {
                        let status = offline_status.clone();
                        async move {
                            status.set(ItemStatus::Offline);
                            Ok(json!({ "status": "offline" }))
                        }
                    }),
                )
                .action(
                    "go_online",
                    action(move |_args| {
                        let status = online_status.clone();
                        async move {
                            status.set(ItemStatus::Online);
                            Ok(json!({ "status": "online" }))
                        }
                    }),
                ))
        })
        .build()
}
