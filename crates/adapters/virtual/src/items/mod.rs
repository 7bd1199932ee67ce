//! The simulated item types.

pub mod bridge;
pub mod light;
pub mod sensor;
pub mod switch;

use domo_domain::error::DomoError;
use domo_runtime::module::TypeRegistry;

/// Register every virtual item type definition.
///
/// # Errors
///
/// Returns a validation error if a type definition fails to build (should
/// not happen with hardcoded names).
pub fn register(types: &mut TypeRegistry) -> Result<(), DomoError> {
    types.register(bridge::type_def()?);
    types.register(switch::type_def()?);
    types.register(light::type_def()?);
    types.register(sensor::type_def()?);
    Ok(())
}
