//! Scenario registry
//!
//! Holds validated scenarios by id and indexes them by the processes they
//! exercise, so a suite can be narrowed to one process.

use crate::error::RegistryError;
use crate::scenario::Scenario;
use std::collections::{BTreeMap, BTreeSet};

/// Registry of validated scenarios
#[derive(Debug, Default, Clone)]
pub struct ScenarioRegistry {
    scenarios: BTreeMap<String, Scenario>,
    by_process: BTreeMap<String, BTreeSet<String>>,
}

impl ScenarioRegistry {
    /// Create new empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create registry with the built-in suites
    ///
    /// # Errors
    /// Fails if a built-in scenario is invalid.
    pub fn with_defaults() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        crate::suites::register_all(&mut registry)?;
        Ok(registry)
    }

    /// Validate and register a scenario
    ///
    /// # Errors
    /// Returns [`RegistryError::Duplicate`] for a known id and
    /// [`RegistryError::Invalid`] when validation fails.
    pub fn register(&mut self, scenario: Scenario) -> Result<(), RegistryError> {
        if self.scenarios.contains_key(&scenario.id) {
            return Err(RegistryError::Duplicate(scenario.id));
        }
        scenario
            .validate()
            .map_err(|source| RegistryError::Invalid {
                id: scenario.id.clone(),
                source,
            })?;

        for tag in &scenario.tags {
            self.by_process
                .entry(tag.clone())
                .or_default()
                .insert(scenario.id.clone());
        }
        tracing::debug!(id = %scenario.id, tags = ?scenario.tags, "scenario registered");
        self.scenarios.insert(scenario.id.clone(), scenario);
        Ok(())
    }

    /// Look up a scenario
    #[inline]
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Scenario> {
        self.scenarios.get(id)
    }

    /// Scenarios exercising `process`, ordered by id
    #[must_use]
    pub fn tagged(&self, process: &str) -> Vec<&Scenario> {
        self.by_process
            .get(process)
            .into_iter()
            .flatten()
            .filter_map(|id| self.scenarios.get(id))
            .collect()
    }

    /// Scenarios exercising any of `processes`; all scenarios when empty
    #[must_use]
    pub fn select<S: AsRef<str>>(&self, processes: &[S]) -> Vec<&Scenario> {
        if processes.is_empty() {
            return self.iter().collect();
        }
        let ids: BTreeSet<&String> = processes
            .iter()
            .filter_map(|p| self.by_process.get(p.as_ref()))
            .flatten()
            .collect();
        ids.into_iter()
            .filter_map(|id| self.scenarios.get(id))
            .collect()
    }

    /// Processes with at least one scenario, sorted
    #[must_use]
    pub fn processes(&self) -> Vec<&str> {
        self.by_process.keys().map(String::as_str).collect()
    }

    /// Scenario ids, sorted
    #[must_use]
    pub fn ids(&self) -> Vec<&str> {
        self.scenarios.keys().map(String::as_str).collect()
    }

    /// Iterate scenarios ordered by id
    pub fn iter(&self) -> impl Iterator<Item = &Scenario> {
        self.scenarios.values()
    }

    /// Get number of registered scenarios
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}
