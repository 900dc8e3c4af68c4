pub mod prepare;

use crate::config::Settings;
use crate::constants::{annotations, artifacts, env, paths, phases};
use crate::elements::{new_elements, ConfigSet, Element, Level};
use crate::errors::DefinitionError;
use crate::model::{Behavior, ConfigType, LocationType, TestDefinitionSpec, TestLocation};
use crate::workflow::{
    Artifact, Container, EnvSource, EnvVar, Inputs, Outputs, Parameter, Template, Volume,
    VolumeMount,
};
use std::collections::BTreeMap;
use std::path::Path;

/// A test definition instance bound to one place in a flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestDefinition {
    pub info: TestDefinitionSpec,
    pub location: Option<TestLocation>,
    pub file_name: Option<String>,
    template: Template,
    config: ConfigSet,
}

impl TestDefinition {
    pub fn new(
        info: TestDefinitionSpec,
        location: Option<TestLocation>,
        file_name: Option<String>,
        settings: &Settings,
    ) -> Self {
        let image = info
            .image
            .clone()
            .unwrap_or_else(|| settings.base_image.clone());
        let active_deadline_seconds = info
            .active_deadline_seconds
            .unwrap_or(settings.default_active_deadline_seconds);

        let mut env_vars = vec![
            EnvVar::value(env::REPO_PATH, paths::REPO),
            EnvVar::value(env::KUBECONFIG_PATH, paths::KUBECONFIG),
            EnvVar::value(env::SHARED_PATH, paths::SHARED),
            EnvVar::value(env::EXPORT_PATH, paths::EXPORT),
            EnvVar::value(env::PHASE, phases::PARAMETER_REF),
        ];
        if let Some(revision) = location.as_ref().and_then(|l| l.revision.as_deref()) {
            let is_sha = revision.len() == 40 && revision.chars().all(|c| c.is_ascii_hexdigit());
            let key = if is_sha { env::GIT_SHA } else { env::GIT_REF };
            env_vars.push(EnvVar::value(key, revision));
        }

        let template = Template {
            name: info.name.clone(),
            annotations: BTreeMap::from([(
                annotations::TEST_DEFINITION_NAME.to_string(),
                info.name.clone(),
            )]),
            container: Some(Container {
                image,
                command: info.command.clone(),
                args: info.args.clone(),
                working_dir: Some(paths::REPO.to_string()),
                env: env_vars,
                volume_mounts: Vec::new(),
            }),
            inputs: Inputs {
                parameters: vec![Parameter {
                    name: phases::PARAMETER.to_string(),
                    value: None,
                }],
                artifacts: Vec::new(),
            },
            outputs: Outputs::default(),
            active_deadline_seconds: Some(active_deadline_seconds),
            ..Default::default()
        };

        let config = new_elements(&info.config, Level::TestDefinition)
            .into_iter()
            .collect();

        let mut td = Self {
            info,
            location,
            file_name,
            template,
            config,
        };
        td.add_output_artifacts([Artifact {
            optional: true,
            ..Artifact::output(artifacts::EXPORT, paths::EXPORT)
        }]);

        if let Some(location) = td.location.clone() {
            if location.location_type == LocationType::Local {
                td.add_volume_mount(&location.name(), paths::REPO, None, true);
            }
        }
        td
    }

    /// Bare definition without location, used for synthetic nodes.
    pub fn empty(name: &str, settings: &Settings) -> Self {
        Self::new(
            TestDefinitionSpec {
                name: name.to_string(),
                ..Default::default()
            },
            None,
            None,
            settings,
        )
    }

    pub fn set_name(&mut self, name: &str) {
        self.add_annotation(annotations::TEST_DEFINITION_ID, name);
        self.template.name = name.to_string();
    }

    pub fn name(&self) -> &str {
        &self.template.name
    }

    pub fn has_behavior(&self, behavior: Behavior) -> bool {
        self.info.behavior.contains(&behavior)
    }

    /// Checks a comma separated label selector. All labels are required, `!label` excludes.
    pub fn has_label(&self, selector: &str) -> bool {
        selector
            .split(',')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .all(|wanted| match wanted.strip_prefix('!') {
                Some(excluded) => !self.info.labels.iter().any(|l| l == excluded),
                None => self.info.labels.iter().any(|l| l == wanted),
            })
    }

    pub fn add_annotation(&mut self, key: &str, value: &str) {
        self.template
            .annotations
            .insert(key.to_string(), value.to_string());
    }

    pub fn add_env_vars(&mut self, vars: impl IntoIterator<Item = EnvVar>) {
        if let Some(container) = self.template.container.as_mut() {
            container.env.extend(vars);
        }
    }

    pub fn add_volume_mount(
        &mut self,
        name: &str,
        path: &str,
        sub_path: Option<&str>,
        read_only: bool,
    ) {
        if let Some(container) = self.template.container.as_mut() {
            container.volume_mounts.push(VolumeMount {
                name: name.to_string(),
                mount_path: path.to_string(),
                sub_path: sub_path.map(str::to_string),
                read_only,
            });
        }
    }

    pub fn add_input_parameter(&mut self, name: &str, value: &str) {
        self.template.inputs.parameters.push(Parameter {
            name: name.to_string(),
            value: Some(value.to_string()),
        });
    }

    pub fn add_input_artifacts(&mut self, artifacts: impl IntoIterator<Item = Artifact>) {
        for artifact in artifacts {
            if !self
                .template
                .inputs
                .artifacts
                .iter()
                .any(|a| a.name == artifact.name)
            {
                self.template.inputs.artifacts.push(artifact);
            }
        }
    }

    pub fn add_output_artifacts(&mut self, artifacts: impl IntoIterator<Item = Artifact>) {
        for artifact in artifacts {
            if !self
                .template
                .outputs
                .artifacts
                .iter()
                .any(|a| a.name == artifact.name)
            {
                self.template.outputs.artifacts.push(artifact);
            }
        }
    }

    pub fn output_artifacts(&self) -> &[Artifact] {
        &self.template.outputs.artifacts
    }

    /// Exposes kubeconfigs and the shared folder to later nodes.
    /// With `global` the outputs are also published on the workflow.
    pub fn add_std_output(&mut self, global: bool) {
        for artifact in std_output_artifacts(global) {
            match self
                .template
                .outputs
                .artifacts
                .iter_mut()
                .find(|a| a.name == artifact.name)
            {
                Some(existing) => {
                    if global && existing.global_name.is_none() {
                        existing.global_name = artifact.global_name;
                    }
                }
                None => self.template.outputs.artifacts.push(artifact),
            }
        }
    }

    pub fn set_suspend(&mut self) {
        self.template.suspend = Some(Default::default());
    }

    pub fn add_config(&mut self, elements: impl IntoIterator<Item = Element>) {
        self.config.add(elements);
    }

    pub fn config(&self) -> &ConfigSet {
        &self.config
    }

    /// Returns the template with all config elements applied.
    pub fn template(&self) -> Result<Template, DefinitionError> {
        let mut td = self.clone();
        for element in self.config.list() {
            match element.info.config_type {
                ConfigType::Env => td.add_config_as_env(element)?,
                ConfigType::File => td.add_config_as_file(element)?,
            }
        }
        Ok(td.template)
    }

    /// Volumes backing file configs that come from secrets or config maps.
    pub fn volumes(&self) -> Result<Vec<Volume>, DefinitionError> {
        self.config
            .list()
            .into_iter()
            .filter(|e| {
                e.info.config_type == ConfigType::File
                    && e.info.value.is_none()
                    && e.info.value_from.is_some()
            })
            .map(Element::volume)
            .collect()
    }

    fn add_config_as_env(&mut self, element: &Element) -> Result<(), DefinitionError> {
        let info = &element.info;
        if let Some(value) = &info.value {
            self.add_input_parameter(element.name(), &format!("{}: {}", info.name, value));
            self.add_env_vars([EnvVar::value(&info.name, value)]);
            return Ok(());
        }
        let value_from = info
            .value_from
            .as_ref()
            .ok_or_else(|| DefinitionError::MissingValue(info.name.clone()))?;

        let mut sources = Vec::new();
        if let Some(secret) = &value_from.secret_key_ref {
            sources.push(EnvSource::SecretKeyRef {
                name: secret.name.clone(),
                key: secret.key.clone(),
            });
        }
        if let Some(config_map) = &value_from.config_map_key_ref {
            sources.push(EnvSource::ConfigMapKeyRef {
                name: config_map.name.clone(),
                key: config_map.key.clone(),
            });
        }
        self.add_input_parameter(
            element.name(),
            &format!("{}: from secret or configmap", info.name),
        );
        self.add_env_vars([EnvVar {
            name: info.name.clone(),
            value: None,
            value_from: sources,
        }]);
        Ok(())
    }

    fn add_config_as_file(&mut self, element: &Element) -> Result<(), DefinitionError> {
        let info = &element.info;
        let path = info
            .path
            .as_deref()
            .ok_or_else(|| DefinitionError::MissingPath(info.name.clone()))?;

        if let Some(value) = &info.value {
            let data = base64::decode(value).map_err(|source| DefinitionError::Decode {
                name: info.name.clone(),
                source,
            })?;
            self.add_input_parameter(element.name(), &format!("{}: {}", info.name, path));
            self.add_env_vars([EnvVar::value(&info.name, path)]);
            self.add_input_artifacts([Artifact {
                name: element.name().to_string(),
                path: Some(path.to_string()),
                raw: Some(String::from_utf8_lossy(&data).to_string()),
                ..Default::default()
            }]);
            return Ok(());
        }
        if info.value_from.is_some() {
            let sub_path = Path::new(path)
                .file_name()
                .map(|f| f.to_string_lossy().to_string());
            self.add_input_parameter(element.name(), &format!("{}: {}", info.name, path));
            self.add_env_vars([EnvVar::value(&info.name, path)]);
            self.add_volume_mount(element.name(), path, sub_path.as_deref(), true);
            return Ok(());
        }
        Err(DefinitionError::MissingValue(info.name.clone()))
    }
}

pub fn std_output_artifacts(global: bool) -> Vec<Artifact> {
    [
        (artifacts::KUBECONFIGS, paths::KUBECONFIG),
        (artifacts::UNTRUSTED_KUBECONFIGS, paths::UNTRUSTED_KUBECONFIG),
        (artifacts::SHARED_FOLDER, paths::SHARED),
    ]
    .into_iter()
    .map(|(name, path)| Artifact {
        global_name: global.then(|| name.to_string()),
        optional: true,
        ..Artifact::output(name, path)
    })
    .collect()
}
