//! Built-in scenario suites

use crate::error::RegistryError;
use crate::registry::ScenarioRegistry;

pub mod expression;

/// Register every built-in suite
///
/// # Errors
/// Fails if a built-in scenario is invalid or duplicated.
pub fn register_all(registry: &mut ScenarioRegistry) -> Result<(), RegistryError> {
    expression::register(registry)
}
