use crate::{error::PatchError, log::LogBuffer};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub sources: SourceOrgs,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceOrgs {
    #[serde(default)]
    pub cli: OrgRef,
    #[serde(default)]
    pub patches: OrgRef,
    #[serde(default)]
    pub integrations: OrgRef,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrgRef {
    #[serde(default)]
    pub org: String,
}

/// Configured patch sources keyed by their entry name in `sources.json`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sources {
    entries: BTreeMap<String, Source>,
}

impl Sources {
    pub fn load(path: &Path, log: &LogBuffer) -> Self {
        match Self::try_load(path) {
            Ok(sources) => sources,
            Err(err) => {
                log.error(err.to_string());
                Self::default()
            }
        }
    }

    pub fn try_load(path: &Path) -> Result<Self, PatchError> {
        let raw = fs::read_to_string(path).map_err(|err| PatchError::load(path, err))?;
        let entries = serde_json::from_str(&raw).map_err(|err| PatchError::load(path, err))?;
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &BTreeMap<String, Source> {
        &self.entries
    }

    /// Orgs publishing patch bundles; these double as source directory names.
    pub fn patch_orgs(&self) -> Vec<String> {
        let mut orgs: Vec<String> = self
            .entries
            .values()
            .map(|source| source.sources.patches.org.clone())
            .filter(|org| !org.is_empty())
            .collect();
        orgs.sort();
        orgs.dedup();
        orgs
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_patch_orgs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.json");
        fs::write(
            &path,
            r#"{
                "revanced": {"projectName": "ReVanced", "sources": {
                    "cli": {"org": "revanced"}, "patches": {"org": "revanced"},
                    "integrations": {"org": "revanced"}}},
                "anddea": {"projectName": "RVX", "sources": {"patches": {"org": "anddea"}}},
                "broken": {"projectName": "Empty"}
            }"#,
        )
        .unwrap();

        let sources = Sources::try_load(&path).unwrap();
        assert_eq!(sources.entries().len(), 3);
        assert_eq!(sources.patch_orgs(), vec!["anddea", "revanced"]);
        assert_eq!(sources.entries()["revanced"].project_name, "ReVanced");
    }

    #[test]
    fn missing_sources_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = LogBuffer::new();
        assert!(Sources::load(&dir.path().join("sources.json"), &log).is_empty());
        assert_eq!(log.entries().len(), 1);
    }
}
