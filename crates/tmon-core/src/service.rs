use std::fmt;

use crate::config::ServiceEntry;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ServiceStatus {
    #[default]
    Unknown,
    /// Check exited 0; carries the raw command output.
    Ok(String),
    /// Check exited non-zero or could not be started.
    Error(String),
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Unknown => "unknown",
            ServiceStatus::Ok(_) => "ok",
            ServiceStatus::Error(_) => "error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ServiceStatus::Error(_))
    }

    /// One-line description shown under the service name.
    pub fn summary(&self) -> String {
        let text = match self {
            ServiceStatus::Unknown => return "unknown".to_string(),
            ServiceStatus::Ok(output) => output,
            ServiceStatus::Error(detail) => detail,
        };
        let first = text.lines().map(str::trim).find(|line| !line.is_empty());
        match (self, first) {
            (_, Some(line)) => line.to_string(),
            (ServiceStatus::Error(_), None) => "error".to_string(),
            (_, None) => "ok".to_string(),
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub name: String,
    pub unit: String,
    pub status: ServiceStatus,
}

impl Service {
    pub fn new(name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            status: ServiceStatus::Unknown,
        }
    }

    pub fn with_status(&self, status: ServiceStatus) -> Self {
        Self {
            name: self.name.clone(),
            unit: self.unit.clone(),
            status,
        }
    }
}

impl From<&ServiceEntry> for Service {
    fn from(entry: &ServiceEntry) -> Self {
        Service::new(entry.name.clone(), entry.unit.clone())
    }
}

/// Result of one complete poll cycle, in configured order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StatusSnapshot {
    pub services: Vec<Service>,
}

impl StatusSnapshot {
    pub fn new(services: Vec<Service>) -> Self {
        Self { services }
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|service| service.name == name)
    }
}
