//! Task registry: named task types, each bound to a service and a
//! handler.

use std::collections::HashMap;

use crate::error::CoordinatorError;
use crate::handler::Handler;
use crate::service::ServiceTable;

/// A registered task type: name, owning service, optional retry ceiling,
/// and the handler to invoke on dispatch. Immutable once registered.
#[derive(Clone)]
pub struct TaskType {
    pub name: String,
    pub service: String,
    pub max_attempts: u32,
    pub(crate) handler: Handler,
}

impl std::fmt::Debug for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskType")
            .field("name", &self.name)
            .field("service", &self.service)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

/// Holds every registered task type, keyed by name.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, TaskType>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task type. `CONFIG_ERROR` if `service_name` is not a
    /// registered service, or if `name` is already registered.
    pub fn register(
        &mut self,
        services: &ServiceTable,
        name: &str,
        service_name: &str,
        max_attempts: Option<u32>,
        handler: Handler,
    ) -> Result<(), CoordinatorError> {
        if self.tasks.contains_key(name) {
            return Err(CoordinatorError::ConfigError(format!(
                "task {name:?} is already registered"
            )));
        }
        if !services.is_registered(service_name) {
            return Err(CoordinatorError::ConfigError(format!(
                "task {name:?} references unknown service {service_name:?}"
            )));
        }
        self.tasks.insert(
            name.to_string(),
            TaskType {
                name: name.to_string(),
                service: service_name.to_string(),
                max_attempts: max_attempts.unwrap_or(1),
                handler,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&TaskType> {
        self.tasks.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop_handler() -> Handler {
        Handler::sync(|_| Ok(json!(null)))
    }

    #[test]
    fn register_requires_known_service() {
        let services = ServiceTable::new();
        let mut tasks = TaskRegistry::new();
        let err = tasks
            .register(&services, "build", "ci", None, noop_handler())
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::ConfigError(_)));
    }

    #[test]
    fn register_rejects_duplicate_name() {
        let mut services = ServiceTable::new();
        services.register("ci", None, None).unwrap();
        let mut tasks = TaskRegistry::new();
        tasks.register(&services, "build", "ci", None, noop_handler()).unwrap();
        let err = tasks
            .register(&services, "build", "ci", None, noop_handler())
            .unwrap_err();
        assert!(matches!(err, CoordinatorError::ConfigError(_)));
    }

    #[test]
    fn max_attempts_defaults_to_one() {
        let mut services = ServiceTable::new();
        services.register("ci", None, None).unwrap();
        let mut tasks = TaskRegistry::new();
        tasks.register(&services, "build", "ci", None, noop_handler()).unwrap();
        assert_eq!(tasks.get("build").unwrap().max_attempts, 1);
    }
}
