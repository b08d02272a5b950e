use crate::filter::FilteredView;

/// Enabled patch names plus the checkbox state of the rows currently shown.
///
/// Names outlive view changes: switching the target app rebinds the row
/// flags but leaves earlier picks in place until `reconcile` or
/// `unselect_all` runs. Default-enabled patches are added once per package;
/// `seeded` remembers which packages already had them applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    enabled: Vec<String>,
    include: Vec<bool>,
    seeded: Vec<String>,
}

impl SelectionState {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = Self::default();
        for name in names {
            state.toggle(&name.into(), true);
        }
        state
    }

    pub fn with_seeded<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for package in packages {
            let package = package.into();
            if !self.seeded.contains(&package) {
                self.seeded.push(package);
            }
        }
        self
    }

    /// Resets row flags for a freshly filtered view. The first bind of a
    /// package adds its default-enabled patches; later binds leave the
    /// selection alone. Returns true when defaults were applied.
    pub fn bind(&mut self, view: &FilteredView) -> bool {
        let first_bind = !view.package_id.is_empty() && !self.is_seeded(&view.package_id);
        if first_bind {
            for patch in view.patches.iter().filter(|patch| patch.default_enabled) {
                self.toggle(&patch.name, true);
            }
            self.seeded.push(view.package_id.clone());
        }
        self.include = view
            .patches
            .iter()
            .map(|patch| self.is_enabled(&patch.name))
            .collect();
        first_bind
    }

    pub fn toggle(&mut self, name: &str, enabled: bool) {
        let position = self.enabled.iter().position(|existing| existing == name);
        match (enabled, position) {
            (true, None) => self.enabled.push(name.to_string()),
            (false, Some(index)) => {
                self.enabled.remove(index);
            }
            _ => {}
        }
    }

    pub fn toggle_row(&mut self, view: &FilteredView, row: usize, enabled: bool) {
        let Some(name) = view.name_at(row) else {
            return;
        };
        if let Some(flag) = self.include.get_mut(row) {
            *flag = enabled;
        }
        self.toggle(name, enabled);
    }

    pub fn select_all(&mut self, view: &FilteredView) {
        self.include = vec![true; view.len()];
        for name in view.names() {
            self.toggle(name, true);
        }
    }

    /// Clears every enabled name, including ones picked under another app.
    pub fn unselect_all(&mut self, view: &FilteredView) {
        self.include = vec![false; view.len()];
        self.enabled.clear();
    }

    /// Drops enabled names the view does not show. Returns what was dropped.
    pub fn reconcile(&mut self, view: &FilteredView) -> Vec<String> {
        let (kept, dropped): (Vec<String>, Vec<String>) = self
            .enabled
            .drain(..)
            .partition(|name| view.contains(name));
        self.enabled = kept;
        dropped
    }

    pub fn current_selection(&self) -> &[String] {
        &self.enabled
    }

    pub fn include_flags(&self) -> &[bool] {
        &self.include
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.iter().any(|existing| existing == name)
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty()
    }

    pub fn is_seeded(&self, package_id: &str) -> bool {
        self.seeded.iter().any(|existing| existing == package_id)
    }

    pub fn seeded_packages(&self) -> &[String] {
        &self.seeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        catalog::{Catalog, CompatiblePackage, PatchDescriptor},
        filter::filter,
    };

    fn view_for(package: &str, names: &[(&str, bool)]) -> FilteredView {
        let patches = names
            .iter()
            .map(|(name, default_enabled)| PatchDescriptor {
                name: name.to_string(),
                default_enabled: *default_enabled,
                compatible_packages: vec![CompatiblePackage::new(package, &["1.0"])],
                ..PatchDescriptor::default()
            })
            .collect();
        filter(&Catalog::from_patches(patches), package)
    }

    #[test]
    fn toggle_on_then_off_restores_selection() {
        let mut state = SelectionState::from_names(["A", "B"]);
        let before = state.clone();

        state.toggle("C", true);
        assert_eq!(state.current_selection(), ["A", "B", "C"]);
        state.toggle("C", false);
        assert_eq!(state, before);

        state.toggle("missing", false);
        assert_eq!(state, before);
    }

    #[test]
    fn toggle_on_is_idempotent() {
        let mut state = SelectionState::default();
        state.toggle("A", true);
        state.toggle("A", true);
        assert_eq!(state.current_selection(), ["A"]);
    }

    #[test]
    fn select_all_suppresses_duplicates() {
        let view = view_for("app", &[("A", false), ("B", false)]);
        let mut state = SelectionState::from_names(["B"]);
        state.bind(&view);

        state.select_all(&view);
        state.select_all(&view);
        assert_eq!(state.current_selection(), ["B", "A"]);
        assert_eq!(state.include_flags(), [true, true]);
    }

    #[test]
    fn unselect_all_clears_global_selection() {
        let youtube = view_for("youtube", &[("A", false)]);
        let reddit = view_for("reddit", &[("B", false), ("C", false)]);
        let mut state = SelectionState::default();
        state.bind(&youtube);
        state.select_all(&youtube);
        state.bind(&reddit);
        state.toggle_row(&reddit, 1, true);
        assert_eq!(state.current_selection(), ["A", "C"]);

        state.unselect_all(&reddit);
        assert!(state.is_empty());
        assert_eq!(state.include_flags(), [false, false]);
    }

    #[test]
    fn rows_follow_toggles_and_ignore_out_of_range() {
        let view = view_for("app", &[("A", true), ("B", false)]);
        let mut state = SelectionState::default();
        state.bind(&view);
        assert_eq!(state.include_flags(), [true, false]);
        assert_eq!(state.current_selection(), ["A"]);

        state.toggle_row(&view, 1, true);
        state.toggle_row(&view, 0, false);
        state.toggle_row(&view, 7, true);
        assert_eq!(state.include_flags(), [false, true]);
        assert_eq!(state.current_selection(), ["B"]);
    }

    #[test]
    fn defaults_apply_once_per_package() {
        let view = view_for("app", &[("A", true), ("B", false)]);
        let mut state = SelectionState::default();
        assert!(state.bind(&view));
        state.toggle_row(&view, 0, false);

        assert!(!state.bind(&view));
        assert!(state.is_empty());
        assert_eq!(state.include_flags(), [false, false]);

        let mut restored = SelectionState::from_names(["B"]).with_seeded(["app"]);
        assert!(!restored.bind(&view));
        assert_eq!(restored.current_selection(), ["B"]);
        assert_eq!(restored.seeded_packages(), ["app"]);
    }

    #[test]
    fn stale_names_survive_until_reconciled() {
        let youtube = view_for("youtube", &[("A", false)]);
        let reddit = view_for("reddit", &[("B", false)]);
        let mut state = SelectionState::default();
        state.bind(&youtube);
        state.toggle_row(&youtube, 0, true);

        state.bind(&reddit);
        state.toggle_row(&reddit, 0, true);
        assert_eq!(state.current_selection(), ["A", "B"]);

        let dropped = state.reconcile(&reddit);
        assert_eq!(dropped, vec!["A".to_string()]);
        assert_eq!(state.current_selection(), ["B"]);
    }
}
