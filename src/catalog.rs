use crate::{error::PatchError, log::LogBuffer};
use serde::{Deserialize, Deserializer, Serialize};
use std::{collections::BTreeMap, fmt, fs, path::Path};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchDescriptor {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub compatible_packages: Vec<CompatiblePackage>,
    #[serde(rename = "use", default)]
    pub default_enabled: bool,
    #[serde(rename = "requiresIntegrations", default)]
    pub requires_dependencies: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub options: Vec<OptionDescriptor>,
}

impl PatchDescriptor {
    /// The entry compatibility filtering looks at. Later entries are only
    /// used for app discovery.
    pub fn primary_package(&self) -> Option<&CompatiblePackage> {
        self.compatible_packages.first()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompatiblePackage {
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub versions: Vec<String>,
}

#[cfg(test)]
impl CompatiblePackage {
    pub fn new(name: &str, versions: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            versions: versions.iter().map(|version| version.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionDescriptor {
    pub key: String,
    #[serde(default)]
    pub default: OptionValue,
    #[serde(default, deserialize_with = "null_as_default")]
    pub values: BTreeMap<String, OptionValue>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

/// Loosely typed option value as published by the patch catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    #[default]
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<OptionValue>),
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        OptionValue::String(value.to_string())
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionValue::Null => f.write_str("null"),
            OptionValue::Bool(value) => write!(f, "{value}"),
            OptionValue::Number(value) => write!(f, "{value}"),
            OptionValue::String(value) => f.write_str(value),
            OptionValue::List(values) => {
                let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    patches: Vec<PatchDescriptor>,
}

impl Catalog {
    pub fn from_patches(patches: Vec<PatchDescriptor>) -> Self {
        Self { patches }
    }

    /// Loads the catalog, logging and returning an empty one when the file
    /// is missing or malformed.
    pub fn load(path: &Path, log: &LogBuffer) -> Self {
        match Self::try_load(path) {
            Ok(catalog) => {
                log.info(format!("Catalog loaded: {} patch(es)", catalog.len()));
                catalog
            }
            Err(err) => {
                log.error(err.to_string());
                Self::default()
            }
        }
    }

    pub fn try_load(path: &Path) -> Result<Self, PatchError> {
        let raw = fs::read_to_string(path).map_err(|err| PatchError::load(path, err))?;
        let patches: Vec<PatchDescriptor> =
            serde_json::from_str(&raw).map_err(|err| PatchError::load(path, err))?;
        Ok(Self { patches })
    }

    pub fn patches(&self) -> &[PatchDescriptor] {
        &self.patches
    }

    pub fn get(&self, name: &str) -> Option<&PatchDescriptor> {
        self.patches.iter().find(|patch| patch.name == name)
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    const UPSTREAM_SAMPLE: &str = r#"[
        {
            "name": "Custom branding",
            "description": "Changes the app name and icon.",
            "compatiblePackages": [
                {"name": "com.google.android.youtube", "versions": null}
            ],
            "use": false,
            "requiresIntegrations": false,
            "options": [
                {
                    "key": "appName",
                    "default": "YouTube ReVanced",
                    "values": {"Default": "YouTube ReVanced", "Original": "YouTube"},
                    "title": "App name",
                    "description": "The name of the app.",
                    "required": true
                }
            ]
        },
        {
            "name": "Spoof client",
            "description": null,
            "compatiblePackages": null,
            "use": true,
            "requiresIntegrations": true,
            "options": [
                {"key": "clients", "default": ["ios", "android_vr"], "values": null,
                 "title": "Clients", "description": "", "required": false},
                {"key": "retries", "default": 3, "title": "Retries", "required": false},
                {"key": "enabled", "default": true, "title": "Enabled"},
                {"key": "path", "default": null, "title": "Path"}
            ]
        }
    ]"#;

    #[test]
    fn parses_upstream_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patches.json");
        fs::write(&path, UPSTREAM_SAMPLE).unwrap();

        let catalog = Catalog::try_load(&path).unwrap();
        assert_eq!(catalog.len(), 2);

        let branding = catalog.get("Custom branding").unwrap();
        assert!(!branding.default_enabled);
        assert_eq!(branding.primary_package().unwrap().versions, Vec::<String>::new());
        assert_eq!(branding.options[0].default, OptionValue::from("YouTube ReVanced"));
        assert_eq!(
            branding.options[0].values.get("Original"),
            Some(&OptionValue::from("YouTube"))
        );

        let spoof = catalog.get("Spoof client").unwrap();
        assert!(spoof.default_enabled);
        assert!(spoof.requires_dependencies);
        assert!(spoof.compatible_packages.is_empty());
        assert_eq!(spoof.description, "");
        assert_eq!(
            spoof.options[0].default,
            OptionValue::List(vec!["ios".into(), "android_vr".into()])
        );
        assert_eq!(spoof.options[1].default, OptionValue::Number(3.into()));
        assert_eq!(spoof.options[2].default, OptionValue::Bool(true));
        assert_eq!(spoof.options[3].default, OptionValue::Null);
    }

    #[test]
    fn missing_file_loads_empty_without_error() {
        let dir = tempfile::tempdir().unwrap();
        let log = LogBuffer::new();
        let catalog = Catalog::load(&dir.path().join("patches.json"), &log);
        assert!(catalog.is_empty());
        assert_eq!(log.entries().len(), 1);
    }

    #[test]
    fn malformed_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patches.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(Catalog::try_load(&path), Err(PatchError::Load { .. })));
        let log = LogBuffer::new();
        assert!(Catalog::load(&path, &log).is_empty());
    }

    #[test]
    fn option_values_render_for_listing() {
        let value = OptionValue::List(vec!["a".into(), OptionValue::Bool(false)]);
        assert_eq!(value.to_string(), "[a, false]");
        assert_eq!(OptionValue::Null.to_string(), "null");
    }
}
