//! Component health tracking for the producer and consumer processes.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Pipeline components that report health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Component {
    /// State-vector API reachability
    OpenSky,
    /// Token endpoint
    Auth,
    /// Event log
    Kafka,
    /// Consumer batch buffer
    Buffer,
    /// Analytical store
    Store,
}

impl Component {
    pub fn as_str(&self) -> &'static str {
        match self {
            Component::OpenSky => "opensky",
            Component::Auth => "auth",
            Component::Kafka => "kafka",
            Component::Buffer => "buffer",
            Component::Store => "store",
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health status of a component.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Operational but impaired
    Degraded(String),
    Unhealthy(String),
    /// Registered but not yet exercised
    Unknown,
}

/// Overall process health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Registry of component health, shared with the HTTP server.
pub struct HealthCheck {
    components: RwLock<BTreeMap<Component, ComponentStatus>>,
    running: RwLock<bool>,
}

impl HealthCheck {
    pub fn new() -> Self {
        Self {
            components: RwLock::new(BTreeMap::new()),
            running: RwLock::new(false),
        }
    }

    /// Start tracking a component as [`ComponentStatus::Unknown`].
    pub fn register_component(&self, component: Component) {
        self.components
            .write()
            .insert(component, ComponentStatus::Unknown);
    }

    pub fn mark_healthy(&self, component: Component) {
        self.components
            .write()
            .insert(component, ComponentStatus::Healthy);
    }

    pub fn mark_degraded(&self, component: Component, reason: &str) {
        self.components
            .write()
            .insert(component, ComponentStatus::Degraded(reason.to_string()));
    }

    pub fn mark_unhealthy(&self, component: Component, reason: &str) {
        self.components
            .write()
            .insert(component, ComponentStatus::Unhealthy(reason.to_string()));
    }

    pub fn get_component_status(&self, component: Component) -> Option<ComponentStatus> {
        self.components.read().get(&component).cloned()
    }

    pub fn get_all_statuses(&self) -> BTreeMap<Component, ComponentStatus> {
        self.components.read().clone()
    }

    /// Worst status across components.
    pub fn overall_status(&self) -> HealthStatus {
        let components = self.components.read();

        let mut has_degraded = false;
        for status in components.values() {
            match status {
                ComponentStatus::Unhealthy(_) => return HealthStatus::Unhealthy,
                ComponentStatus::Degraded(_) => has_degraded = true,
                _ => {}
            }
        }

        if has_degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    /// Healthy or degraded.
    pub fn is_operational(&self) -> bool {
        matches!(
            self.overall_status(),
            HealthStatus::Healthy | HealthStatus::Degraded
        )
    }

    /// Running and every registered component has reported at least once.
    pub fn is_ready(&self) -> bool {
        self.is_running()
            && self.is_operational()
            && !self
                .components
                .read()
                .values()
                .any(|s| *s == ComponentStatus::Unknown)
    }

    pub fn pipeline_started(&self) {
        *self.running.write() = true;
    }

    pub fn pipeline_stopped(&self) {
        *self.running.write() = false;
    }

    pub fn is_running(&self) -> bool {
        *self.running.read()
    }
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self::new()
    }
}
