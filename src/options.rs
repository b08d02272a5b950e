use crate::{catalog::OptionValue, error::PatchError, log::LogBuffer};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Patch names the upstream catalogs have used for the app-name branding
/// patch over time.
const APP_NAME_PATCHES: [&str; 4] = [
    "Custom branding",
    "Custom branding name for YouTube",
    "Custom branding YouTube name",
    "patch-options",
];

/// Key names the branding patch has used for its app-name option.
const APP_NAME_KEYS: [&str; 4] = ["appName", "YouTube_AppName", "YouTubeAppName", "AppName"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionOverride {
    pub patch_name: String,
    #[serde(default)]
    pub options: Vec<OptionEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionEntry {
    pub key: String,
    #[serde(default)]
    pub value: OptionValue,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionsDocument {
    pub overrides: Vec<OptionOverride>,
}

impl OptionsDocument {
    pub fn load(path: &Path, log: &LogBuffer) -> Self {
        match Self::try_load(path) {
            Ok(document) => document,
            Err(err) => {
                log.error(err.to_string());
                Self::default()
            }
        }
    }

    pub fn try_load(path: &Path) -> Result<Self, PatchError> {
        let raw = fs::read_to_string(path).map_err(|err| PatchError::load(path, err))?;
        serde_json::from_str(&raw).map_err(|err| PatchError::load(path, err))
    }

    pub fn get(&self, patch_name: &str) -> Option<&OptionOverride> {
        self.overrides
            .iter()
            .find(|entry| entry.patch_name == patch_name)
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}

/// Writes `app_name` into the branding patch's first option when both the
/// patch name and that option's key match a known alias.
pub fn project(mut document: OptionsDocument, app_name: &str) -> OptionsDocument {
    for entry in &mut document.overrides {
        if !APP_NAME_PATCHES.contains(&entry.patch_name.as_str()) {
            continue;
        }
        let Some(first) = entry.options.first_mut() else {
            continue;
        };
        if APP_NAME_KEYS.contains(&first.key.as_str()) {
            first.value = OptionValue::from(app_name);
        }
    }
    document
}
