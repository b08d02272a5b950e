use crate::{
    bundle::BundleUpdate,
    config::{self, AppConfig, Workspace},
    log::{log_level_label, LogBuffer, LogLevel},
    patcher,
    session::Session,
};
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "json" => Some(OutputFormat::Json),
            "text" => Some(OutputFormat::Text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct GlobalOptions {
    format: OutputFormat,
    root: Option<PathBuf>,
    verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CliCommand {
    Sources,
    Update,
    Refresh(String),
    Apps,
    Patches(String),
    Versions(String),
    Select {
        app: String,
        names: Vec<String>,
        all: bool,
        reconcile: bool,
    },
    Unselect {
        app: String,
        names: Vec<String>,
        all: bool,
    },
    Selection,
    Options {
        app_name: Option<String>,
        package_name: Option<String>,
    },
    Patch {
        source: String,
        apk: String,
        name: String,
    },
    Settings {
        update_on_start: Option<bool>,
    },
    DownloadUrl {
        app: String,
        version: Option<String>,
    },
    Help,
    Version,
}

impl CliCommand {
    fn reads_catalog(&self) -> bool {
        matches!(
            self,
            CliCommand::Refresh(_)
                | CliCommand::Apps
                | CliCommand::Patches(_)
                | CliCommand::Versions(_)
                | CliCommand::Select { .. }
                | CliCommand::Unselect { .. }
                | CliCommand::Patch { .. }
        )
    }
}

pub fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (global, command) = parse_args(&args)?;
    match command {
        CliCommand::Help => {
            print_help();
            Ok(())
        }
        CliCommand::Version => {
            println!("PatchSmith v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        command => {
            let mut session = open_session(&global)?;
            if command.reads_catalog() {
                if let Some(updates) = session.update_on_start() {
                    report_updates(&updates);
                    session.reload_catalog();
                }
            }
            let result = run_command(&mut session, command, global.format);
            if result.is_err() && !global.verbose {
                print_problems(&session.log);
            }
            result
        }
    }
}

fn open_session(global: &GlobalOptions) -> Result<Session> {
    let config = AppConfig::load_or_create()?;
    let workspace = match &global.root {
        Some(root) => Workspace::new(root.clone()),
        None => Workspace::from_config(&config)?,
    };
    let log = LogBuffer::with_file(config::base_data_dir()?.join("patchsmith.log"));
    log.set_echo(global.verbose);
    Ok(Session::open(config, workspace, log))
}

fn parse_args(args: &[String]) -> Result<(GlobalOptions, CliCommand)> {
    let (global, tokens) = parse_global_options(args);
    let command = parse_command(&tokens)?;
    Ok((global, command))
}

fn parse_global_options(args: &[String]) -> (GlobalOptions, Vec<String>) {
    let mut format = OutputFormat::Text;
    let mut root = None;
    let mut verbose = false;
    let mut tokens = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if let Some(value) = arg.strip_prefix("--format=") {
            if let Some(parsed) = OutputFormat::parse(value) {
                format = parsed;
            }
            continue;
        }
        if arg == "--format" {
            if let Some(value) = iter.next() {
                if let Some(parsed) = OutputFormat::parse(value) {
                    format = parsed;
                }
            }
            continue;
        }
        if let Some(value) = arg.strip_prefix("--root=") {
            root = Some(PathBuf::from(value));
            continue;
        }
        if arg == "--root" {
            if let Some(value) = iter.next() {
                root = Some(PathBuf::from(value));
            }
            continue;
        }
        if arg == "-v" || arg == "--verbose" {
            verbose = true;
            continue;
        }
        tokens.push(arg.to_string());
    }

    (
        GlobalOptions {
            format,
            root,
            verbose,
        },
        tokens,
    )
}

fn parse_command(tokens: &[String]) -> Result<CliCommand> {
    let Some(head) = tokens.first() else {
        return Ok(CliCommand::Help);
    };
    let rest = tokens.get(1..).unwrap_or(&[]);
    match head.as_str() {
        "--help" | "-h" | "help" => Ok(CliCommand::Help),
        "--version" | "-V" | "version" => Ok(CliCommand::Version),
        "sources" => Ok(CliCommand::Sources),
        "update" => Ok(CliCommand::Update),
        "refresh" => Ok(CliCommand::Refresh(required(rest, 0, "refresh requires a source")?)),
        "apps" => Ok(CliCommand::Apps),
        "patches" => Ok(CliCommand::Patches(required(rest, 0, "patches requires an app")?)),
        "versions" => Ok(CliCommand::Versions(required(rest, 0, "versions requires an app")?)),
        "select" => {
            let app = required(rest, 0, "select requires an app")?;
            let mut names = Vec::new();
            let mut all = false;
            let mut reconcile = false;
            for arg in &rest[1..] {
                match arg.as_str() {
                    "--all" => all = true,
                    "--reconcile" => reconcile = true,
                    _ => names.push(arg.to_string()),
                }
            }
            Ok(CliCommand::Select {
                app,
                names,
                all,
                reconcile,
            })
        }
        "unselect" => {
            let app = required(rest, 0, "unselect requires an app")?;
            let mut names = Vec::new();
            let mut all = false;
            for arg in &rest[1..] {
                match arg.as_str() {
                    "--all" => all = true,
                    _ => names.push(arg.to_string()),
                }
            }
            Ok(CliCommand::Unselect { app, names, all })
        }
        "selection" => Ok(CliCommand::Selection),
        "options" => {
            let mut app_name = None;
            let mut package_name = None;
            let mut iter = rest.iter();
            while let Some(arg) = iter.next() {
                match arg.as_str() {
                    "--app-name" => app_name = Some(flag_value(iter.next(), "--app-name")?),
                    "--package-name" => {
                        package_name = Some(flag_value(iter.next(), "--package-name")?)
                    }
                    other => bail!("Unknown options flag: {other}"),
                }
            }
            Ok(CliCommand::Options {
                app_name,
                package_name,
            })
        }
        "patch" => {
            let source = required(rest, 0, "patch requires a source")?;
            let mut apk = None;
            let mut name = None;
            let mut iter = rest[1..].iter();
            while let Some(arg) = iter.next() {
                match arg.as_str() {
                    "--apk" => apk = Some(flag_value(iter.next(), "--apk")?),
                    "--name" => name = Some(flag_value(iter.next(), "--name")?),
                    other => bail!("Unknown patch flag: {other}"),
                }
            }
            Ok(CliCommand::Patch {
                source,
                apk: apk.unwrap_or_default(),
                name: name.unwrap_or_default(),
            })
        }
        "settings" => {
            let mut update_on_start = None;
            let mut iter = rest.iter();
            while let Some(arg) = iter.next() {
                match arg.as_str() {
                    "--update-on-start" => {
                        let value = flag_value(iter.next(), "--update-on-start")?;
                        update_on_start = Some(parse_bool(&value)?);
                    }
                    other => bail!("Unknown settings flag: {other}"),
                }
            }
            Ok(CliCommand::Settings { update_on_start })
        }
        "download-url" => Ok(CliCommand::DownloadUrl {
            app: required(rest, 0, "download-url requires an app")?,
            version: rest.get(1).cloned(),
        }),
        other => bail!("Unknown command: {other} (see 'patchsmith help')"),
    }
}

fn required(args: &[String], index: usize, message: &str) -> Result<String> {
    args.get(index)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("{message}"))
}

fn flag_value(value: Option<&String>, flag: &str) -> Result<String> {
    value
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("{flag} requires a value"))
}

fn parse_bool(value: &str) -> Result<bool> {
    match value {
        "true" | "on" | "yes" => Ok(true),
        "false" | "off" | "no" => Ok(false),
        _ => bail!("Expected true or false, got {value}"),
    }
}

fn run_command(session: &mut Session, command: CliCommand, format: OutputFormat) -> Result<()> {
    match command {
        CliCommand::Sources => list_sources(session, format),
        CliCommand::Update => {
            let updates = session.update_bundles();
            report_updates(&updates);
            Ok(())
        }
        CliCommand::Refresh(source) => {
            session.select_source(&source)?;
            println!(
                "Catalog refreshed from {source}: {} patch(es)",
                session.catalog.len()
            );
            list_apps(session, format)
        }
        CliCommand::Apps => list_apps(session, format),
        CliCommand::Patches(app) => {
            session.select_app(&app)?;
            list_patches(session, format)
        }
        CliCommand::Versions(app) => {
            let view = session.select_app(&app)?;
            print_strings(&view.supported_versions, format)
        }
        CliCommand::Select {
            app,
            names,
            all,
            reconcile,
        } => {
            session.select_app(&app)?;
            if all {
                session.select_all();
            }
            for name in &names {
                warn_unknown(session, name);
                session.toggle(name, true);
            }
            if reconcile {
                session.reconcile();
            }
            finish_selection(session, format)
        }
        CliCommand::Unselect { app, names, all } => {
            session.select_app(&app)?;
            if all {
                session.unselect_all();
            }
            for name in &names {
                session.toggle(name, false);
            }
            finish_selection(session, format)
        }
        CliCommand::Selection => print_strings(session.selection.current_selection(), format),
        CliCommand::Options {
            app_name,
            package_name,
        } => {
            let outcome = session.save_changes(app_name.as_deref(), package_name.as_deref())?;
            if !outcome.written {
                eprintln!("Changes not written: {}", outcome.error.unwrap_or_default());
            }
            let projected = session.projected_options();
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&projected)?),
                OutputFormat::Text => {
                    println!("App name: {}", session.config.app_name);
                    println!("Package name: {}", session.config.custom_package_name);
                    if projected.is_empty() {
                        println!("No patch options exported; run 'patchsmith refresh <source>'");
                    }
                    for entry in &projected.overrides {
                        for option in &entry.options {
                            println!("{} / {} = {}", entry.patch_name, option.key, option.value);
                        }
                    }
                }
            }
            Ok(())
        }
        CliCommand::Patch { source, apk, name } => run_patch(session, &source, &apk, &name),
        CliCommand::Settings { update_on_start } => {
            if let Some(enabled) = update_on_start {
                session.set_update_on_start(enabled)?;
            }
            println!("Update patches on start: {}", session.settings.update_on_start);
            Ok(())
        }
        CliCommand::DownloadUrl { app, version } => {
            session.select_app(&app)?;
            println!("{}", session.apk_search_url(version.as_deref())?);
            Ok(())
        }
        CliCommand::Help | CliCommand::Version => Ok(()),
    }
}

fn run_patch(session: &mut Session, source: &str, apk: &str, name: &str) -> Result<()> {
    session.log.set_echo(true);
    let apk = if apk.is_empty() {
        PathBuf::new()
    } else {
        patcher::apk_path_from_input(apk)
    };
    let job = session.start_patch(source, apk, name)?;
    let output = job.join().context("patch run")?;
    println!("APK patched successfully!");
    println!("{}", output.display());
    Ok(())
}

fn warn_unknown(session: &Session, name: &str) {
    if session.catalog.get(name).is_none() {
        session.log.warn(format!("Patch not in catalog: {name}"));
    }
}

fn finish_selection(session: &Session, format: OutputFormat) -> Result<()> {
    let outcome = session.write_artifacts();
    if !outcome.written {
        eprintln!("Selection not written: {}", outcome.error.unwrap_or_default());
    }
    print_strings(session.selection.current_selection(), format)
}

/// Echoes logged warnings and errors that were not already shown.
fn print_problems(log: &LogBuffer) {
    for entry in log.entries() {
        if entry.level != LogLevel::Info {
            eprintln!("[{}] {}", log_level_label(entry.level), entry.message);
        }
    }
}

fn print_strings(values: &[String], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(values)?),
        OutputFormat::Text => {
            for value in values {
                println!("{value}");
            }
        }
    }
    Ok(())
}

fn report_updates(updates: &[BundleUpdate]) {
    for update in updates {
        match update {
            BundleUpdate::Downloaded { org, path } => {
                println!("{org}: downloaded {}", path.display())
            }
            BundleUpdate::AlreadyPresent { org, path } => {
                println!("{org}: up to date ({})", path.display())
            }
            BundleUpdate::Failed { org, error } => eprintln!("{org}: {error}"),
        }
    }
}

#[derive(Serialize)]
struct SourceItem {
    key: String,
    project_name: String,
    patches_org: String,
}

fn list_sources(session: &Session, format: OutputFormat) -> Result<()> {
    let items: Vec<SourceItem> = session
        .sources
        .entries()
        .iter()
        .map(|(key, source)| SourceItem {
            key: key.clone(),
            project_name: source.project_name.clone(),
            patches_org: source.sources.patches.org.clone(),
        })
        .collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&items)?),
        OutputFormat::Text => {
            if session.sources.is_empty() {
                println!(
                    "No patch sources configured in {}",
                    session.workspace.sources_file().display()
                );
            }
            for item in items {
                println!("{:<20} {:<20} {}", item.patches_org, item.key, item.project_name);
            }
        }
    }
    Ok(())
}

fn list_apps(session: &Session, format: OutputFormat) -> Result<()> {
    let apps: Vec<String> = session
        .supported_apps()
        .into_iter()
        .map(str::to_string)
        .collect();
    print_strings(&apps, format)
}

#[derive(Serialize)]
struct PatchItem<'a> {
    name: &'a str,
    description: &'a str,
    enabled: bool,
    requires_integrations: bool,
    options: Vec<OptionItem<'a>>,
}

#[derive(Serialize)]
struct OptionItem<'a> {
    key: &'a str,
    title: &'a str,
    required: bool,
    value: String,
}

fn list_patches(session: &Session, format: OutputFormat) -> Result<()> {
    let flags = session.selection.include_flags();
    let projected = session.projected_options();
    let items: Vec<PatchItem> = session
        .view
        .patches
        .iter()
        .enumerate()
        .map(|(row, patch)| {
            let current = projected.get(&patch.name);
            let options = patch
                .options
                .iter()
                .map(|option| {
                    let value = current
                        .and_then(|entry| entry.options.iter().find(|set| set.key == option.key))
                        .map(|set| &set.value)
                        .unwrap_or(&option.default);
                    OptionItem {
                        key: &option.key,
                        title: &option.title,
                        required: option.required,
                        value: value.to_string(),
                    }
                })
                .collect();
            PatchItem {
                name: &patch.name,
                description: &patch.description,
                enabled: flags.get(row).copied().unwrap_or(false),
                requires_integrations: patch.requires_dependencies,
                options,
            }
        })
        .collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&items)?),
        OutputFormat::Text => {
            let package = session.view.package_id.as_str();
            let app = session.apps.display_name_for(package).unwrap_or(package);
            if session.view.is_empty() {
                println!("No patches for {app} ({package})");
                return Ok(());
            }
            println!("{app} ({package})");
            if !session.view.supported_versions.is_empty() {
                println!("Versions: {}", session.view.supported_versions.join(", "));
            }
            for item in items {
                let enabled = if item.enabled { "x" } else { " " };
                println!("[{enabled}] {:<40} {}", item.name, item.description);
                for option in item.options {
                    let marker = if option.required { "*" } else { "" };
                    println!("      {}{marker} = {}", option.key, option.value);
                }
            }
        }
    }
    Ok(())
}

fn print_help() {
    println!("PatchSmith v{}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  patchsmith sources                        List configured patch sources");
    println!("  patchsmith update                         Download the newest patch bundles");
    println!("  patchsmith refresh <source>               Rebuild the catalog from a source bundle");
    println!("  patchsmith apps                           List apps the catalog supports");
    println!("  patchsmith patches <app>                  List patches for an app");
    println!("  patchsmith versions <app>                 List supported app versions");
    println!("  patchsmith select <app> [names..]         Enable patches (--all, --reconcile)");
    println!("  patchsmith unselect <app> [names..]       Disable patches (--all clears everything)");
    println!("  patchsmith selection                      Show enabled patches");
    println!("  patchsmith options                        Save option changes and show overrides");
    println!("      --app-name <name>  --package-name <id>");
    println!("  patchsmith patch <source> --apk <path> --name <output>");
    println!("  patchsmith settings [--update-on-start <true|false>]");
    println!("  patchsmith download-url <app> [version]   Print an APK search link");
    println!();
    println!("Global options:");
    println!("  --format <json|text>            Output format for list commands");
    println!("  --root <dir>                    Workspace root (default: current dir)");
    println!("  -v, --verbose                   Echo the log to stderr");
    println!("  -h, --help                      Show help");
    println!("  -V, --version                   Show version");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn global_options_anywhere() {
        let (global, command) =
            parse_args(&args(&["patches", "--format=json", "Youtube", "--root", "/w"])).unwrap();
        assert_eq!(global.format, OutputFormat::Json);
        assert_eq!(global.root, Some(PathBuf::from("/w")));
        assert_eq!(command, CliCommand::Patches("Youtube".to_string()));
    }

    #[test]
    fn select_collects_names_and_flags() {
        let (_, command) =
            parse_args(&args(&["select", "Youtube", "Hide ads", "--all", "Custom branding"]))
                .unwrap();
        assert_eq!(
            command,
            CliCommand::Select {
                app: "Youtube".to_string(),
                names: args(&["Hide ads", "Custom branding"]),
                all: true,
                reconcile: false,
            }
        );
    }

    #[test]
    fn patch_flags_are_optional_until_validation() {
        let (_, command) = parse_args(&args(&["patch", "revanced", "--apk", "yt.apk"])).unwrap();
        assert_eq!(
            command,
            CliCommand::Patch {
                source: "revanced".to_string(),
                apk: "yt.apk".to_string(),
                name: String::new(),
            }
        );
        assert!(parse_args(&args(&["patch", "revanced", "--name"])).is_err());
    }

    const CATALOG: &str = r#"[
        {"name": "Hide ads", "use": true,
         "compatiblePackages": [{"name": "com.google.android.youtube", "versions": ["19.25.37"]}]},
        {"name": "Custom branding", "use": false,
         "compatiblePackages": [{"name": "com.google.android.youtube", "versions": ["19.25.37"]}]}
    ]"#;

    fn open(root: &std::path::Path) -> Session {
        Session::open(AppConfig::default(), Workspace::new(root), LogBuffer::new())
    }

    #[test]
    fn commands_persist_selection_between_invocations() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("patches.json"), CATALOG).unwrap();
        let selection_file = Workspace::new(dir.path()).selection_file();

        let mut session = open(dir.path());
        run_command(
            &mut session,
            CliCommand::Patches("Youtube".to_string()),
            OutputFormat::Json,
        )
        .unwrap();
        assert_eq!(
            std::fs::read_to_string(&selection_file).unwrap(),
            "\"Hide ads\" "
        );

        let mut session = open(dir.path());
        run_command(
            &mut session,
            CliCommand::Unselect {
                app: "Youtube".to_string(),
                names: args(&["Hide ads"]),
                all: false,
            },
            OutputFormat::Text,
        )
        .unwrap();

        let mut session = open(dir.path());
        run_command(
            &mut session,
            CliCommand::Select {
                app: "Youtube".to_string(),
                names: args(&["Custom branding"]),
                all: false,
                reconcile: false,
            },
            OutputFormat::Text,
        )
        .unwrap();
        assert_eq!(
            std::fs::read_to_string(&selection_file).unwrap(),
            "\"Custom branding\" "
        );

        let mut session = open(dir.path());
        assert!(run_command(
            &mut session,
            CliCommand::Versions("Nope".to_string()),
            OutputFormat::Text,
        )
        .is_err());
    }

    #[test]
    fn empty_and_unknown_commands() {
        assert_eq!(parse_args(&[]).unwrap().1, CliCommand::Help);
        assert!(parse_args(&args(&["frobnicate"])).is_err());
        assert!(parse_args(&args(&["settings", "--update-on-start", "maybe"])).is_err());
        let (_, command) =
            parse_args(&args(&["settings", "--update-on-start", "true"])).unwrap();
        assert_eq!(
            command,
            CliCommand::Settings {
                update_on_start: Some(true)
            }
        );
    }
}
