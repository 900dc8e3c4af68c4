use crate::errors::DefinitionError;
use crate::model::{ConfigElement, ConfigType};
use crate::workflow::{KeyToPath, Volume, VolumeSource};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;

/// Precedence of a config element. Higher levels win on name collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    TestDefinition = 0,
    Global = 1,
    Shared = 2,
    Step = 3,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub info: ConfigElement,
    pub level: Level,
    name: String,
}

impl Element {
    pub fn new(info: ConfigElement, level: Level) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(info.config_type.to_string().as_bytes());
        hasher.update(b"/");
        hasher.update(info.name.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        let name = format!("{}-{}", info.config_type, &digest[..6]);
        Self { info, level, name }
    }

    /// Parameter and volume name that is safe to use in templates.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn volume(&self) -> Result<Volume, DefinitionError> {
        if self.info.config_type != ConfigType::File || self.info.value.is_some() {
            return Err(DefinitionError::NoVolume(self.info.name.clone()));
        }
        let value_from = self
            .info
            .value_from
            .as_ref()
            .ok_or_else(|| DefinitionError::NoVolume(self.info.name.clone()))?;
        let path = self
            .info
            .path
            .as_deref()
            .ok_or_else(|| DefinitionError::MissingPath(self.info.name.clone()))?;
        let file_name = Path::new(path)
            .file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string());

        let source = if let Some(secret) = &value_from.secret_key_ref {
            VolumeSource::Secret {
                secret_name: secret.name.clone(),
                items: vec![KeyToPath {
                    key: secret.key.clone(),
                    path: file_name,
                }],
            }
        } else if let Some(config_map) = &value_from.config_map_key_ref {
            VolumeSource::ConfigMap {
                name: config_map.name.clone(),
                items: vec![KeyToPath {
                    key: config_map.key.clone(),
                    path: file_name,
                }],
            }
        } else {
            return Err(DefinitionError::NoVolume(self.info.name.clone()));
        };

        Ok(Volume {
            name: self.name.clone(),
            source,
        })
    }
}

pub fn new_elements(configs: &[ConfigElement], level: Level) -> Vec<Element> {
    configs
        .iter()
        .map(|c| Element::new(c.clone(), level))
        .collect()
}

/// Config elements keyed by their user-facing name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSet {
    elements: BTreeMap<String, Element>,
}

impl ConfigSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites an existing element of the same name.
    pub fn set(&mut self, element: Element) {
        self.elements.insert(element.info.name.clone(), element);
    }

    /// Inserts elements that are missing or whose level is higher than the present one.
    pub fn add(&mut self, elements: impl IntoIterator<Item = Element>) {
        for element in elements {
            match self.elements.get(&element.info.name) {
                Some(existing) if existing.level >= element.level => {}
                _ => self.set(element),
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Element> {
        self.elements.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.elements.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn list(&self) -> Vec<&Element> {
        self.elements.values().collect()
    }

    pub fn raw_list(&self) -> Vec<ConfigElement> {
        self.elements.values().map(|e| e.info.clone()).collect()
    }
}

impl FromIterator<Element> for ConfigSet {
    fn from_iter<T: IntoIterator<Item = Element>>(iter: T) -> Self {
        let mut set = ConfigSet::new();
        set.add(iter);
        set
    }
}
