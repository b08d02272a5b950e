use crate::{catalog::Catalog, log::LogBuffer, options::OptionsDocument};
use anyhow::{Context, Result};
use std::{fs, path::Path};

/// Result of a best-effort write. Failures are already logged; callers that
/// ignore this still see them in the console log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub written: bool,
    pub error: Option<String>,
}

impl WriteOutcome {
    fn ok() -> Self {
        Self {
            written: true,
            error: None,
        }
    }

    fn failed(log: &LogBuffer, message: String) -> Self {
        log.error(message.clone());
        Self {
            written: false,
            error: Some(message),
        }
    }

    pub fn and(self, other: WriteOutcome) -> WriteOutcome {
        WriteOutcome {
            written: self.written && other.written,
            error: self.error.or(other.error),
        }
    }
}

/// `"A" "B" ` with a space after every name, as the patcher expects.
pub fn selection_text(names: &[String]) -> String {
    let mut out = String::new();
    for name in names {
        out.push('"');
        out.push_str(name);
        out.push_str("\" ");
    }
    out
}

/// Reads names back out of a selection file.
pub fn parse_selection(raw: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = raw;
    while let Some(start) = rest.find('"') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('"') else {
            break;
        };
        names.push(after[..end].to_string());
        rest = &after[end + 1..];
    }
    names
}

pub fn options_json(document: &OptionsDocument) -> Result<String> {
    serde_json::to_string(document).context("serialize patch options")
}

pub fn write_selection(path: &Path, names: &[String], log: &LogBuffer) -> WriteOutcome {
    match write_atomic(path, &selection_text(names)) {
        Ok(()) => WriteOutcome::ok(),
        Err(err) => WriteOutcome::failed(log, format!("Selection write failed: {err:#}")),
    }
}

pub fn write_options(path: &Path, document: &OptionsDocument, log: &LogBuffer) -> WriteOutcome {
    let result = options_json(document).and_then(|raw| write_atomic(path, &raw));
    match result {
        Ok(()) => WriteOutcome::ok(),
        Err(err) => WriteOutcome::failed(log, format!("Options write failed: {err:#}")),
    }
}

/// Records which packages already had their default patches applied.
pub fn write_seeded(path: &Path, packages: &[String], log: &LogBuffer) -> WriteOutcome {
    let result = serde_json::to_string(packages)
        .context("serialize seeded apps")
        .and_then(|raw| write_atomic(path, &raw));
    match result {
        Ok(()) => WriteOutcome::ok(),
        Err(err) => WriteOutcome::failed(log, format!("Seeded apps write failed: {err:#}")),
    }
}

/// Writes both artifacts the patcher reads. Nothing is written while the
/// catalog is empty.
pub fn write_artifacts(
    selection_path: &Path,
    options_path: &Path,
    catalog: &Catalog,
    names: &[String],
    document: &OptionsDocument,
    log: &LogBuffer,
) -> WriteOutcome {
    if catalog.is_empty() {
        log.warn("No patches to write".to_string());
        return WriteOutcome {
            written: false,
            error: Some("no patches to write".to_string()),
        };
    }
    write_selection(selection_path, names, log).and(write_options(options_path, document, log))
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path.parent().context("artifact parent dir")?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent).context("create artifact dir")?;
    }
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    fs::write(&temp, contents).with_context(|| format!("write {}", path.display()))?;
    fs::rename(&temp, path).with_context(|| format!("finalize {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::{OptionValue, PatchDescriptor},
        options::{OptionEntry, OptionOverride},
    };

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn selection_text_keeps_trailing_space() {
        assert_eq!(selection_text(&names(&["A", "B"])), "\"A\" \"B\" ");
        assert_eq!(selection_text(&[]), "");
    }

    #[test]
    fn selection_text_parses_back() {
        let original = names(&["Hide ads", "Custom branding", "Spoof client"]);
        assert_eq!(parse_selection(&selection_text(&original)), original);
        assert!(parse_selection("").is_empty());
        assert_eq!(parse_selection("\"A\" \"unterminated"), names(&["A"]));
    }

    #[test]
    fn options_json_is_compact_with_fixed_keys() {
        let document = OptionsDocument {
            overrides: vec![OptionOverride {
                patch_name: "Custom branding".to_string(),
                options: vec![OptionEntry {
                    key: "appName".to_string(),
                    value: OptionValue::from("Tube"),
                }],
            }],
        };
        assert_eq!(
            options_json(&document).unwrap(),
            r#"[{"patchName":"Custom branding","options":[{"key":"appName","value":"Tube"}]}]"#
        );
    }

    #[test]
    fn writes_both_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let selection_path = dir.path().join("patches").join("patches-to-use.txt");
        let options_path = dir.path().join("patches").join("options-out.json");
        let catalog = Catalog::from_patches(vec![PatchDescriptor::default()]);
        let log = LogBuffer::new();

        let outcome = write_artifacts(
            &selection_path,
            &options_path,
            &catalog,
            &names(&["A", "B"]),
            &OptionsDocument::default(),
            &log,
        );
        assert_eq!(outcome, WriteOutcome::ok());
        assert_eq!(fs::read_to_string(selection_path).unwrap(), "\"A\" \"B\" ");
        assert_eq!(fs::read_to_string(options_path).unwrap(), "[]");
    }

    #[test]
    fn empty_catalog_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let selection_path = dir.path().join("patches-to-use.txt");
        let log = LogBuffer::new();
        let outcome = write_artifacts(
            &selection_path,
            &dir.path().join("options-out.json"),
            &Catalog::default(),
            &names(&["A"]),
            &OptionsDocument::default(),
            &log,
        );
        assert!(!outcome.written);
        assert!(!selection_path.exists());
    }

    #[test]
    fn write_failure_is_logged_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "file, not a dir").unwrap();
        let log = LogBuffer::new();

        let outcome = write_selection(&blocker.join("patches-to-use.txt"), &names(&["A"]), &log);
        assert!(!outcome.written);
        assert!(outcome.error.is_some());
        assert_eq!(log.entries().len(), 1);
    }
}
