use crate::catalog::{Catalog, PatchDescriptor};

/// The rows shown for one target app, in catalog order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilteredView {
    pub package_id: String,
    pub patches: Vec<PatchDescriptor>,
    pub supported_versions: Vec<String>,
}

impl FilteredView {
    pub fn names(&self) -> Vec<&str> {
        self.patches.iter().map(|patch| patch.name.as_str()).collect()
    }

    pub fn name_at(&self, row: usize) -> Option<&str> {
        self.patches.get(row).map(|patch| patch.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.patches.iter().any(|patch| patch.name == name)
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}

/// Matches on the first compatible-package entry only.
pub fn filter(catalog: &Catalog, package_id: &str) -> FilteredView {
    let mut view = FilteredView {
        package_id: package_id.to_string(),
        ..FilteredView::default()
    };

    for patch in catalog.patches() {
        let Some(primary) = patch.primary_package() else {
            continue;
        };
        if primary.name != package_id {
            continue;
        }
        for version in &primary.versions {
            if !view.supported_versions.contains(version) {
                view.supported_versions.push(version.clone());
            }
        }
        view.patches.push(patch.clone());
    }

    view
}
