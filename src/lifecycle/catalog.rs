use crate::config::{LifecycleConfig, RoleDefinition, SeverityDefinition, StatusDefinition};
use crate::error::{AppError, Result};

/// Validated view over the configured status/severity/role sets.
///
/// The sets are data-driven: deployments define their own vocabulary, with
/// the single constraint that exactly one status is flagged initial and
/// exactly one final.
#[derive(Debug, Clone)]
pub struct LifecycleCatalog {
    statuses: Vec<StatusDefinition>,
    severities: Vec<SeverityDefinition>,
    roles: Vec<RoleDefinition>,
    initial: String,
    terminal: String,
}

impl LifecycleCatalog {
    pub fn from_config(config: &LifecycleConfig) -> Result<Self> {
        if config.statuses.is_empty() {
            return Err(AppError::Configuration(
                "lifecycle.statuses must not be empty".to_string(),
            ));
        }
        if config.severities.is_empty() {
            return Err(AppError::Configuration(
                "lifecycle.severities must not be empty".to_string(),
            ));
        }

        let initial: Vec<&StatusDefinition> =
            config.statuses.iter().filter(|s| s.initial).collect();
        if initial.len() != 1 {
            return Err(AppError::Configuration(format!(
                "exactly one status must be flagged initial, found {}",
                initial.len()
            )));
        }

        let terminal: Vec<&StatusDefinition> =
            config.statuses.iter().filter(|s| s.is_final).collect();
        if terminal.len() != 1 {
            return Err(AppError::Configuration(format!(
                "exactly one status must be flagged final, found {}",
                terminal.len()
            )));
        }

        for set in [
            config.statuses.iter().map(|s| &s.name).collect::<Vec<_>>(),
            config.severities.iter().map(|s| &s.name).collect(),
            config.roles.iter().map(|r| &r.name).collect(),
        ] {
            let mut seen = std::collections::HashSet::new();
            for name in set {
                if !seen.insert(name) {
                    return Err(AppError::Configuration(format!(
                        "duplicate lifecycle entry: {}",
                        name
                    )));
                }
            }
        }

        Ok(Self {
            initial: initial[0].name.clone(),
            terminal: terminal[0].name.clone(),
            statuses: config.statuses.clone(),
            severities: config.severities.clone(),
            roles: config.roles.clone(),
        })
    }

    /// The status every new incident starts in
    pub fn initial_status(&self) -> &str {
        &self.initial
    }

    /// The status marking an incident resolved
    pub fn final_status(&self) -> &str {
        &self.terminal
    }

    pub fn is_final(&self, status: &str) -> bool {
        status == self.terminal
    }

    pub fn statuses(&self) -> impl Iterator<Item = &str> {
        self.statuses.iter().map(|s| s.name.as_str())
    }

    pub fn severities(&self) -> impl Iterator<Item = &SeverityDefinition> {
        self.severities.iter()
    }

    pub fn roles(&self) -> impl Iterator<Item = &RoleDefinition> {
        self.roles.iter()
    }

    /// The least severe entry, used as the default for new incidents
    pub fn default_severity(&self) -> &str {
        &self.severities.last().expect("validated non-empty").name
    }

    pub fn role(&self, name: &str) -> Option<&RoleDefinition> {
        self.roles.iter().find(|r| r.name == name)
    }

    /// Membership check; transitions between members are unconstrained
    pub fn validate_status(&self, status: &str) -> Result<()> {
        if self.statuses.iter().any(|s| s.name == status) {
            Ok(())
        } else {
            Err(AppError::Validation(format!(
                "{} is not a configured status",
                status
            )))
        }
    }

    pub fn validate_severity(&self, severity: &str) -> Result<()> {
        if self.severities.iter().any(|s| s.name == severity) {
            Ok(())
        } else {
            Err(AppError::Validation(format!(
                "{} is not a configured severity",
                severity
            )))
        }
    }

    pub fn validate_role(&self, role: &str) -> Result<&RoleDefinition> {
        self.role(role)
            .ok_or_else(|| AppError::Validation(format!("{} is not a configured role", role)))
    }
}
