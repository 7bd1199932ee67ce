//! Action layer — named operations of one item.
//!
//! Actions are arbitrary async operations beyond state reads and writes
//! (toggle, identify, reboot). The constructor supplies the table; dispatch
//! is by name with a JSON object of named arguments.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use domo_domain::error::DomoError;
use domo_domain::id::ItemId;

/// Async closure implementing one named action. The argument is a JSON
/// object of named parameters; the result is returned to the caller as-is.
pub type ActionFn = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, DomoError>> + Send + Sync>;

/// Wrap a plain async closure into an [`ActionFn`].
pub fn action<F, Fut>(f: F) -> ActionFn
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, DomoError>> + Send + 'static,
{
    Arc::new(move |args| Box::pin(f(args)))
}

/// The named operations of one item.
pub struct ActionRegistry {
    item: ItemId,
    actions: HashMap<String, ActionFn>,
}

impl ActionRegistry {
    #[must_use]
    pub fn new(item: ItemId, actions: HashMap<String, ActionFn>) -> Self {
        Self { item, actions }
    }

    /// Registered action names, sorted for stable output.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Invoke the named action and return its result.
    ///
    /// # Errors
    ///
    /// Returns [`DomoError::ActionNotFound`] for an unregistered name,
    /// otherwise whatever the action itself returns.
    pub async fn execute(&self, name: &str, args: Value) -> Result<Value, DomoError> {
        let Some(run) = self.actions.get(name) else {
            return Err(DomoError::ActionNotFound {
                item: self.item.clone(),
                action: name.to_string(),
            });
        };
        tracing::debug!(item = %self.item, action = name, "executing action");
        run(args).await
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("item", &self.item)
            .field("actions", &self.names())
            .finish()
    }
}
