use crate::{config::Workspace, log::LogBuffer};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};
use walkdir::WalkDir;

const RELEASES_API: &str = "https://api.github.com/repos";
const PATCHES_REPO: &str = "revanced-patches";
const USER_AGENT: &str = "PatchSmith";
pub const BUNDLE_EXTENSION: &str = "rvp";
const BUNDLE_PREFIX: &str = "patches-";

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    assets: Vec<Asset>,
}

#[derive(Debug, Clone, Deserialize)]
struct Asset {
    name: String,
    browser_download_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleRelease {
    pub tag: String,
    pub download_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleUpdate {
    Downloaded { org: String, path: PathBuf },
    AlreadyPresent { org: String, path: PathBuf },
    Failed { org: String, error: String },
}

/// Fetches the newest bundle of every org that is not already on disk.
/// A failing org is logged and skipped.
pub fn update_bundles(workspace: &Workspace, orgs: &[String], log: &LogBuffer) -> Vec<BundleUpdate> {
    let mut results = Vec::new();
    for org in orgs {
        let result = update_org(workspace, org, log).unwrap_or_else(|err| {
            let error = format!("{err:#}");
            log.error(format!("Bundle update failed for {org}: {error}"));
            BundleUpdate::Failed {
                org: org.clone(),
                error,
            }
        });
        results.push(result);
    }
    results
}

fn update_org(workspace: &Workspace, org: &str, log: &LogBuffer) -> Result<BundleUpdate> {
    let dir = workspace.source_dir(org);
    fs::create_dir_all(&dir).context("create source dir")?;

    let release = fetch_latest_bundle(org)?;
    let dest = dir.join(bundle_file_name(&release.tag));
    if dest.exists() {
        log.info(format!("Latest bundle already present: {}", dest.display()));
        return Ok(BundleUpdate::AlreadyPresent {
            org: org.to_string(),
            path: dest,
        });
    }

    log.info(format!("Downloading bundle: {}", release.download_url));
    download_asset(&release.download_url, &dest)?;
    log.info(format!("Downloaded: {}", dest.display()));
    Ok(BundleUpdate::Downloaded {
        org: org.to_string(),
        path: dest,
    })
}

pub fn fetch_latest_bundle(org: &str) -> Result<BundleRelease> {
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(5))
        .timeout_read(Duration::from_secs(10))
        .timeout_write(Duration::from_secs(10))
        .build();
    let url = format!("{RELEASES_API}/{org}/{PATCHES_REPO}/releases/latest");
    let response = agent
        .get(&url)
        .set("User-Agent", USER_AGENT)
        .call()
        .with_context(|| format!("fetch latest release for {org}"))?;
    let release: Release = response.into_json().context("decode release")?;
    select_bundle(release)
}

fn select_bundle(release: Release) -> Result<BundleRelease> {
    let asset = release
        .assets
        .into_iter()
        .find(|asset| asset.name.ends_with(&format!(".{BUNDLE_EXTENSION}")))
        .with_context(|| format!("no .{BUNDLE_EXTENSION} asset found in latest release"))?;
    Ok(BundleRelease {
        tag: release.tag_name,
        download_url: asset.browser_download_url,
    })
}

pub fn bundle_file_name(tag: &str) -> String {
    format!("{BUNDLE_PREFIX}{tag}.{BUNDLE_EXTENSION}")
}

/// Glob handed to the patcher for a source's bundles.
pub fn bundle_glob(source: &str) -> String {
    format!("patches/{source}/{BUNDLE_PREFIX}*.{BUNDLE_EXTENSION}")
}

/// The most recently modified bundle in `dir`.
pub fn latest_local_bundle(dir: &Path) -> Result<PathBuf> {
    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() || !is_bundle_name(&entry.file_name().to_string_lossy()) {
            continue;
        }
        let Some(modified) = entry.metadata().ok().and_then(|meta| meta.modified().ok()) else {
            continue;
        };
        if newest.as_ref().map_or(true, |(time, _)| modified > *time) {
            newest = Some((modified, entry.into_path()));
        }
    }
    newest
        .map(|(_, path)| path)
        .with_context(|| format!("no patch files found in {}", dir.display()))
}

fn is_bundle_name(name: &str) -> bool {
    name.starts_with(BUNDLE_PREFIX) && name.ends_with(&format!(".{BUNDLE_EXTENSION}"))
}

fn download_asset(url: &str, path: &Path) -> Result<()> {
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(Duration::from_secs(5))
        .timeout_read(Duration::from_secs(60))
        .timeout_write(Duration::from_secs(60))
        .build();
    let response = agent
        .get(url)
        .set("User-Agent", USER_AGENT)
        .call()
        .context("download bundle")?;
    write_part(response.into_reader(), path)
}

/// Streams `reader` into a `.part` sibling and renames it over `path`. The
/// partial file is removed when anything fails.
fn write_part(mut reader: impl io::Read, path: &Path) -> Result<()> {
    let temp = path.with_extension("part");
    let result = File::create(&temp)
        .context("create bundle file")
        .and_then(|mut file| io::copy(&mut reader, &mut file).context("write bundle file"))
        .and_then(|_| fs::rename(&temp, path).context("finalize bundle file"));
    if result.is_err() {
        let _ = fs::remove_file(&temp);
    }
    result
}
