use super::TestDefinition;
use crate::config::Settings;
use crate::constants::{artifacts, paths};
use crate::errors::DefinitionError;
use crate::model::{LocationType, TestDefinitionSpec, TestLocation};
use crate::workflow::Artifact;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const PREPARE_COMMAND: &str = "/tm/bin/prepare";
const REPOS_DIR: &str = "/tm/repos";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareRepository {
    pub name: String,
    pub url: String,
    pub revision: String,
}

/// The synthetic root of every flow. Clones the git locations used by the flow.
#[derive(Debug, Clone)]
pub struct PrepareDefinition {
    pub test_definition: TestDefinition,
    repositories: BTreeMap<String, PrepareRepository>,
}

impl PrepareDefinition {
    pub fn new(name: &str, settings: &Settings) -> Self {
        let spec = TestDefinitionSpec {
            name: name.to_string(),
            image: Some(settings.prepare_image.clone()),
            command: vec![PREPARE_COMMAND.to_string()],
            args: vec![paths::PREPARE_REPOS.to_string()],
            ..Default::default()
        };
        let mut test_definition = TestDefinition::new(spec, None, None, settings);
        test_definition.set_name(name);
        Self {
            test_definition,
            repositories: BTreeMap::new(),
        }
    }

    /// Registers a git location. Local locations are mounted directly and need no preparation.
    pub fn add_location(&mut self, location: &TestLocation) {
        if location.location_type != LocationType::Git {
            return;
        }
        let (Some(url), Some(revision)) = (&location.repo, &location.revision) else {
            tracing::warn!("Skipping git location without repo or revision: {:?}", location);
            return;
        };
        let name = location.name();
        if self.repositories.contains_key(&name) {
            return;
        }
        self.test_definition.add_output_artifacts([Artifact {
            global_name: Some(name.clone()),
            ..Artifact::output(&name, &format!("{}/{}", REPOS_DIR, name))
        }]);
        self.repositories.insert(
            name.clone(),
            PrepareRepository {
                name,
                url: url.clone(),
                revision: revision.clone(),
            },
        );
    }

    pub fn repositories(&self) -> impl Iterator<Item = &PrepareRepository> {
        self.repositories.values()
    }

    /// Attaches the repository list as a raw input artifact. Call once all locations are added.
    pub fn finish(&mut self) -> Result<(), DefinitionError> {
        let repos: Vec<&PrepareRepository> = self.repositories.values().collect();
        let raw = serde_json::to_string(&repos)?;
        self.test_definition.add_input_artifacts([Artifact {
            name: artifacts::REPOS.to_string(),
            path: Some(paths::PREPARE_REPOS.to_string()),
            raw: Some(raw),
            ..Default::default()
        }]);
        Ok(())
    }
}
