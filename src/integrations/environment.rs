//! Global active-environment state.
//!
//! The stream only reads the active environment and, when a query names a
//! different one, asks the store to switch.

use crate::data::Environment;

pub trait EnvironmentStore: Send {
    /// Currently active environment, `None` meaning "all environments"
    fn active(&self) -> Option<&Environment>;

    fn get_by_name(&self, name: &str) -> Option<Environment>;

    fn set_active(&mut self, environment: Option<Environment>);
}

/// In-memory store seeded from the environments endpoint
#[derive(Debug, Clone, Default)]
pub struct EnvironmentList {
    environments: Vec<Environment>,
    active: Option<Environment>,
}

impl EnvironmentList {
    pub fn new(environments: Vec<Environment>) -> Self {
        Self {
            environments,
            active: None,
        }
    }

    /// Start with `name` active if it is known
    pub fn with_active(mut self, name: Option<&str>) -> Self {
        self.active = name.and_then(|n| self.get_by_name(n));
        self
    }

    pub fn all(&self) -> &[Environment] {
        &self.environments
    }
}

impl EnvironmentStore for EnvironmentList {
    fn active(&self) -> Option<&Environment> {
        self.active.as_ref()
    }

    fn get_by_name(&self, name: &str) -> Option<Environment> {
        self.environments.iter().find(|e| e.name == name).cloned()
    }

    fn set_active(&mut self, environment: Option<Environment>) {
        tracing::debug!(
            "Active environment set to {}",
            environment.as_ref().map(|e| e.name.as_str()).unwrap_or("<all>")
        );
        self.active = environment;
    }
}
