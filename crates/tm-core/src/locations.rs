use crate::config::Settings;
use crate::errors::LocationError;
use crate::model::{LocationType, StepDefinition, TestDefinitionSpec, TestLocation};
use crate::testdefinition::TestDefinition;
use crate::workflow::{Volume, VolumeSource};
use sha2::{Digest, Sha256};

/// Supplies the concrete test definitions a step selects.
pub trait LocationResolver {
    /// Returns fresh instances. Callers mutate them freely.
    fn get_test_definitions(
        &self,
        step: &StepDefinition,
    ) -> Result<Vec<TestDefinition>, LocationError>;
}

impl TestLocation {
    /// Stable, template-safe identifier of the location.
    pub fn name(&self) -> String {
        match self.location_type {
            LocationType::Git => {
                let repo = self.repo.as_deref().unwrap_or_default();
                let trimmed = repo.trim_end_matches('/').trim_end_matches(".git");
                let path: Vec<&str> = trimmed.rsplit('/').take(2).collect();
                let mut parts: Vec<&str> = path.into_iter().rev().collect();
                if let Some(revision) = self.revision.as_deref() {
                    parts.push(revision);
                }
                sanitize(&parts.join("-"))
            }
            LocationType::Local => {
                let host_path = self.host_path.as_deref().unwrap_or_default();
                let digest = format!("{:x}", Sha256::digest(host_path.as_bytes()));
                format!("local-{}", &digest[..8])
            }
        }
    }

    /// Host path volume for local locations. `~` and env vars in the path are expanded.
    pub fn volume(&self) -> Option<Volume> {
        if self.location_type != LocationType::Local {
            return None;
        }
        let host_path = self.host_path.as_deref()?;
        let path = match shellexpand::full(host_path) {
            Ok(expanded) => expanded.into_owned(),
            Err(e) => {
                tracing::warn!("Could not expand host path '{}': {}", host_path, e);
                host_path.to_string()
            }
        };
        Some(Volume {
            name: self.name(),
            source: VolumeSource::HostPath { path },
        })
    }
}

fn sanitize(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}

/// Resolver over a fixed set of definitions held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticLocations {
    settings: Settings,
    definitions: Vec<(TestDefinitionSpec, Option<TestLocation>)>,
}

impl StaticLocations {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            definitions: Vec::new(),
        }
    }

    pub fn add(&mut self, spec: TestDefinitionSpec, location: Option<TestLocation>) {
        self.definitions.push((spec, location));
        self.definitions.sort_by(|a, b| a.0.name.cmp(&b.0.name));
    }

    pub fn with(mut self, spec: TestDefinitionSpec, location: Option<TestLocation>) -> Self {
        self.add(spec, location);
        self
    }

    fn instantiate<'a>(
        &self,
        matches: impl Iterator<Item = &'a (TestDefinitionSpec, Option<TestLocation>)>,
    ) -> Vec<TestDefinition> {
        matches
            .map(|(spec, location)| {
                TestDefinition::new(spec.clone(), location.clone(), None, &self.settings)
            })
            .collect()
    }
}

impl LocationResolver for StaticLocations {
    fn get_test_definitions(
        &self,
        step: &StepDefinition,
    ) -> Result<Vec<TestDefinition>, LocationError> {
        if let Some(name) = step.name.as_deref() {
            let found: Vec<TestDefinition> = if step.substring {
                self.instantiate(self.definitions.iter().filter(|(s, _)| s.name.contains(name)))
            } else {
                self.instantiate(self.definitions.iter().filter(|(s, _)| s.name == name))
            };
            if found.is_empty() {
                return Err(LocationError::TestDefinitionNotFound(name.to_string()));
            }
            return Ok(found);
        }
        if let Some(label) = step.label.as_deref() {
            let found: Vec<TestDefinition> = self
                .instantiate(self.definitions.iter())
                .into_iter()
                .filter(|td| td.has_label(label))
                .collect();
            tracing::debug!("Label '{}' matched {} test definitions", label, found.len());
            return Ok(found);
        }
        Err(LocationError::UnknownSelector(format!("{:?}", step)))
    }
}
