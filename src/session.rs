use crate::{
    apps::AppDirectory,
    bundle::{self, BundleUpdate},
    catalog::Catalog,
    config::{AppConfig, Settings, Workspace},
    error::PatchError,
    filter::{self, FilteredView},
    log::{ErrorLog, LogBuffer},
    options::{self, OptionsDocument},
    patcher::{PatchGuard, PatchJob, PatchRequest, Patcher},
    selection::SelectionState,
    sources::Sources,
    writer::{self, WriteOutcome},
};
use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

const APK_SEARCH_URL: &str = "https://www.apkmirror.com/?post_type=app_release&searchtype=apk&bundles%5B%5D=apkm_bundles&bundles%5B%5D=apk_files&s=";

/// Everything one user session mutates: the loaded catalog, the current
/// target app and its filtered rows, and the patch selection.
#[derive(Debug)]
pub struct Session {
    pub config: AppConfig,
    pub workspace: Workspace,
    pub settings: Settings,
    pub log: LogBuffer,
    pub errors: ErrorLog,
    pub apps: AppDirectory,
    pub sources: Sources,
    pub catalog: Catalog,
    pub options: OptionsDocument,
    pub view: FilteredView,
    pub selection: SelectionState,
    target_app: Option<String>,
    guard: PatchGuard,
}

impl Session {
    pub fn open(config: AppConfig, workspace: Workspace, log: LogBuffer) -> Self {
        let settings = Settings::load(&workspace.settings_file());
        let errors = ErrorLog::new(workspace.error_log_file());
        let sources = Sources::load(&workspace.sources_file(), &log);
        let catalog = Catalog::load(&workspace.catalog_file(), &log);
        let options = OptionsDocument::load(&workspace.options_export_file(), &log);
        let selection = load_selection(&workspace, &log);

        Self {
            config,
            workspace,
            settings,
            log,
            errors,
            apps: AppDirectory::default(),
            sources,
            catalog,
            options,
            view: FilteredView::default(),
            selection,
            target_app: None,
            guard: PatchGuard::default(),
        }
    }

    pub fn patcher(&self) -> Patcher {
        let jar = PathBuf::from(&self.config.cli_jar);
        let jar = if jar.is_absolute() {
            jar
        } else {
            self.workspace.resolve(&self.config.cli_jar)
        };
        Patcher::new(self.config.java.clone(), jar, self.workspace.clone())
    }

    pub fn update_bundles(&self) -> Vec<BundleUpdate> {
        let orgs = self.sources.patch_orgs();
        if orgs.is_empty() {
            self.log.warn("No patch sources configured".to_string());
        }
        bundle::update_bundles(&self.workspace, &orgs, &self.log)
    }

    pub fn update_on_start(&self) -> Option<Vec<BundleUpdate>> {
        self.settings
            .update_on_start
            .then(|| self.update_bundles())
    }

    pub fn set_update_on_start(&mut self, enabled: bool) -> Result<()> {
        self.settings.update_on_start = enabled;
        self.settings.save(&self.workspace.settings_file())
    }

    /// Regenerates the catalog and options export from the newest bundle of
    /// `source`, then reloads both. The target app is cleared.
    pub fn select_source(&mut self, source: &str) -> Result<()> {
        let bundle = bundle::latest_local_bundle(&self.workspace.source_dir(source))?;
        self.log.info(format!("Patch source selected: {source}"));
        self.patcher()
            .export_catalog(&bundle, &self.log)
            .with_context(|| format!("export catalog from {}", bundle.display()))?;

        self.target_app = None;
        self.view = FilteredView::default();
        self.reload_catalog();
        Ok(())
    }

    pub fn reload_catalog(&mut self) {
        self.catalog = Catalog::load(&self.workspace.catalog_file(), &self.log);
        self.options = OptionsDocument::load(&self.workspace.options_export_file(), &self.log);
    }

    pub fn supported_apps(&self) -> Vec<&'static str> {
        self.apps.supported_apps(&self.catalog)
    }

    /// Switches the target app. Earlier picks carry over; the bound selection
    /// is persisted so listings and the artifacts agree.
    pub fn select_app(&mut self, display_name: &str) -> Result<&FilteredView, PatchError> {
        let package = self
            .apps
            .package_for(display_name)
            .ok_or_else(|| PatchError::validation(format!("Unknown app: {display_name}")))?;

        self.view = filter::filter(&self.catalog, package);
        if self.selection.bind(&self.view) {
            self.log.info(format!("Default patches enabled for {display_name}"));
        }
        if !self.catalog.is_empty() {
            self.write_artifacts();
        }
        self.target_app = Some(display_name.to_string());
        self.log.info(format!(
            "App selected: {display_name} ({package}), {} patch(es), {} version(s)",
            self.view.len(),
            self.view.supported_versions.len()
        ));
        Ok(&self.view)
    }

    pub fn toggle(&mut self, name: &str, enabled: bool) {
        match self.view.patches.iter().position(|patch| patch.name == name) {
            Some(row) => self.selection.toggle_row(&self.view, row, enabled),
            None => self.selection.toggle(name, enabled),
        }
    }

    pub fn select_all(&mut self) {
        self.selection.select_all(&self.view);
    }

    pub fn unselect_all(&mut self) {
        self.selection.unselect_all(&self.view);
    }

    pub fn reconcile(&mut self) -> Vec<String> {
        let dropped = self.selection.reconcile(&self.view);
        for name in &dropped {
            self.log.info(format!("Dropped stale selection: {name}"));
        }
        dropped
    }

    /// Applies edited option fields and writes both patcher artifacts.
    pub fn save_changes(
        &mut self,
        app_name: Option<&str>,
        package_name: Option<&str>,
    ) -> Result<WriteOutcome> {
        if let Some(name) = app_name.filter(|name| !name.trim().is_empty()) {
            self.config.app_name = name.to_string();
        }
        if let Some(package) = package_name.filter(|package| !package.trim().is_empty()) {
            self.config.custom_package_name = package.to_string();
        }
        self.config.save()?;
        Ok(self.write_artifacts())
    }

    pub fn projected_options(&self) -> OptionsDocument {
        options::project(self.options.clone(), &self.config.app_name)
    }

    pub fn write_artifacts(&self) -> WriteOutcome {
        let outcome = writer::write_artifacts(
            &self.workspace.selection_file(),
            &self.workspace.options_file(),
            &self.catalog,
            self.selection.current_selection(),
            &self.projected_options(),
            &self.log,
        );
        if !outcome.written {
            return outcome;
        }
        outcome.and(writer::write_seeded(
            &self.workspace.seeded_file(),
            self.selection.seeded_packages(),
            &self.log,
        ))
    }

    /// Validates, writes the artifacts, and starts the patcher on a worker
    /// thread.
    pub fn start_patch(
        &self,
        source: &str,
        apk: PathBuf,
        output_name: &str,
    ) -> Result<PatchJob, PatchError> {
        let request = PatchRequest {
            apk,
            source: source.to_string(),
            output_name: output_name.to_string(),
            patches: self.selection.current_selection().to_vec(),
        };
        request.validate()?;
        if !request.apk.exists() {
            return Err(PatchError::validation(format!(
                "APK not found: {}",
                request.apk.display()
            )));
        }
        let lease = self
            .guard
            .try_acquire()
            .ok_or_else(|| PatchError::validation("Already patching"))?;

        self.write_artifacts();
        Ok(PatchJob::spawn(
            self.patcher(),
            request,
            lease,
            self.log.clone(),
            self.errors.clone(),
        ))
    }

    /// Search link for the target app, optionally narrowed to a version.
    pub fn apk_search_url(&self, version: Option<&str>) -> Result<String, PatchError> {
        let app = self
            .target_app
            .as_deref()
            .ok_or_else(|| PatchError::validation("App not chosen"))?;
        let query = match version {
            Some(version) => format!("{app} {version}"),
            None => app.to_string(),
        };
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        Ok(format!("{APK_SEARCH_URL}{encoded}"))
    }
}

fn load_selection(workspace: &Workspace, log: &LogBuffer) -> SelectionState {
    let path = workspace.selection_file();
    let selection = match fs::read_to_string(&path) {
        Ok(raw) => SelectionState::from_names(writer::parse_selection(&raw)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => SelectionState::default(),
        Err(err) => {
            log.warn(format!("Selection read failed: {err}"));
            SelectionState::default()
        }
    };
    selection.with_seeded(load_seeded(&workspace.seeded_file(), log))
}

fn load_seeded(path: &Path, log: &LogBuffer) -> Vec<String> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
        Err(err) => {
            log.warn(format!("Seeded apps read failed: {err}"));
            return Vec::new();
        }
    };
    serde_json::from_str(&raw).unwrap_or_else(|err| {
        log.warn(format!("Seeded apps parse failed: {err}"));
        Vec::new()
    })
}
