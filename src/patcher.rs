use crate::{
    bundle,
    config::Workspace,
    error::PatchError,
    log::{ErrorLog, LogBuffer, LogLevel},
};
use anyhow::{Context, Result};
use std::{
    fs,
    io::{BufRead, BufReader, ErrorKind, Read},
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Stdio},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
};

/// Keystores older patcher versions leave in the working directory.
const STRAY_KEYSTORES: [&str; 2] = ["revancify.keystore", "revx.keystore"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRequest {
    pub apk: PathBuf,
    pub source: String,
    pub output_name: String,
    pub patches: Vec<String>,
}

impl PatchRequest {
    pub fn validate(&self) -> Result<(), PatchError> {
        if self.source.trim().is_empty() {
            return Err(PatchError::validation("Patch source not selected"));
        }
        if self.apk.as_os_str().is_empty() {
            return Err(PatchError::validation("No APK selected!"));
        }
        if self.output_name.trim().is_empty() {
            return Err(PatchError::validation("Name not valid"));
        }
        if self.patches.is_empty() {
            return Err(PatchError::validation("No patch chosen"));
        }
        Ok(())
    }
}

/// Accepts plain paths as well as `file://` URIs from file pickers.
pub fn apk_path_from_input(raw: &str) -> PathBuf {
    PathBuf::from(raw.strip_prefix("file://").unwrap_or(raw))
}

/// Rejects a second patch run while one is in flight.
#[derive(Debug, Clone, Default)]
pub struct PatchGuard {
    active: Arc<AtomicBool>,
}

impl PatchGuard {
    pub fn try_acquire(&self) -> Option<PatchLease> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PatchLease {
                active: Arc::clone(&self.active),
            })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct PatchLease {
    active: Arc<AtomicBool>,
}

impl Drop for PatchLease {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone)]
pub struct Patcher {
    java: String,
    cli_jar: PathBuf,
    workspace: Workspace,
    build_tag: String,
}

impl Patcher {
    pub fn new(java: impl Into<String>, cli_jar: PathBuf, workspace: Workspace) -> Self {
        Self {
            java: java.into(),
            cli_jar,
            workspace,
            build_tag: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn output_stem(&self, request: &PatchRequest) -> String {
        format!(
            "{}-patched-{}-{}",
            request.output_name, request.source, self.build_tag
        )
    }

    /// Where the patcher is told to write; its existence afterwards is the
    /// success signal.
    pub fn output_path(&self, request: &PatchRequest) -> PathBuf {
        self.workspace
            .output_dir()
            .join(format!("{}.apk", self.output_stem(request)))
    }

    pub fn patch_args(&self, request: &PatchRequest) -> Vec<String> {
        let mut args = vec![
            "-jar".to_string(),
            self.cli_jar.display().to_string(),
            "patch".to_string(),
            request.apk.display().to_string(),
            "--patches".to_string(),
            bundle::bundle_glob(&request.source),
            "--out".to_string(),
            self.output_path(request).display().to_string(),
            "-O".to_string(),
            self.workspace.options_file().display().to_string(),
            "--exclusive".to_string(),
        ];
        for name in &request.patches {
            args.push("-e".to_string());
            args.push(name.clone());
        }
        args
    }

    fn command<I, S>(&self, args: I) -> Command
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let mut command = Command::new(&self.java);
        command.args(args).current_dir(self.workspace.root());
        command
    }

    /// Asks the patcher to dump the option and patch lists of `bundle` into
    /// the workspace root.
    pub fn export_catalog(&self, bundle: &Path, log: &LogBuffer) -> Result<()> {
        let options_export = self.workspace.options_export_file();
        if options_export.exists() {
            fs::remove_file(&options_export).context("remove stale options export")?;
        }

        for subcommand in ["options", "patches"] {
            let jar = self.cli_jar.display().to_string();
            let target = bundle.display().to_string();
            let command = self.command(["-jar", jar.as_str(), subcommand, target.as_str()]);
            let status = run_streaming(command, log)
                .with_context(|| format!("run patcher {subcommand}"))?;
            if !status.success() {
                log.warn(format!("Patcher {subcommand} exited with {status}"));
            }
        }
        Ok(())
    }

    /// Runs one patch invocation to completion on the calling thread.
    pub fn run(
        &self,
        request: &PatchRequest,
        log: &LogBuffer,
        errors: &ErrorLog,
    ) -> Result<PathBuf, PatchError> {
        let output = self.output_path(request);
        fs::create_dir_all(self.workspace.output_dir())?;
        log.info(format!("Patching {} -> {}", request.apk.display(), output.display()));

        let command = self.command(self.patch_args(request));
        match run_streaming(command, log) {
            Ok(status) if status.success() => {}
            Ok(status) => {
                let error = PatchError::Subprocess(format!("patcher exited with {status}"));
                log.error(error.to_string());
                record(errors, &error, log);
            }
            Err(err) => {
                let error = PatchError::Subprocess(format!("failed to start patcher: {err}"));
                log.error(error.to_string());
                record(errors, &error, log);
            }
        }

        self.remove_temp_files(request, log);

        if output.exists() {
            log.info(format!("APK patched successfully: {}", output.display()));
            Ok(output)
        } else {
            let error = PatchError::Subprocess(format!("{} was not produced", output.display()));
            record(errors, &error, log);
            Err(error)
        }
    }

    fn remove_temp_files(&self, request: &PatchRequest, log: &LogBuffer) {
        let stem = self.output_stem(request);
        let output_dir = self.workspace.output_dir();
        let mut targets = vec![
            output_dir.join(format!("{stem}-temporary-files")),
            output_dir.join(format!("{stem}.keystore")),
        ];
        targets.extend(STRAY_KEYSTORES.iter().map(|name| self.workspace.resolve(name)));

        for target in targets {
            if !target.exists() {
                continue;
            }
            log.info(format!("Removing: {}", target.display()));
            let result = if target.is_dir() {
                fs::remove_dir_all(&target)
            } else {
                fs::remove_file(&target)
            };
            if let Err(err) = result {
                log.warn(format!("Error removing {}: {err}", target.display()));
            }
        }
    }
}

fn record(errors: &ErrorLog, error: &PatchError, log: &LogBuffer) {
    if let Err(err) = errors.record(error) {
        log.warn(format!("Error log write failed: {err:#}"));
    }
}

/// A patch run on its own thread. The lease is released when the run ends.
#[derive(Debug)]
pub struct PatchJob {
    handle: JoinHandle<Result<PathBuf, PatchError>>,
}

impl PatchJob {
    pub fn spawn(
        patcher: Patcher,
        request: PatchRequest,
        lease: PatchLease,
        log: LogBuffer,
        errors: ErrorLog,
    ) -> Self {
        let handle = thread::spawn(move || {
            let _lease = lease;
            patcher.run(&request, &log, &errors)
        });
        Self { handle }
    }

    pub fn join(self) -> Result<PathBuf, PatchError> {
        self.handle
            .join()
            .unwrap_or_else(|_| Err(PatchError::Subprocess("patch worker panicked".to_string())))
    }
}

/// Spawns `command` with one reader thread per output stream feeding `log`,
/// and waits for the process and both readers.
pub fn run_streaming(mut command: Command, log: &LogBuffer) -> std::io::Result<ExitStatus> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = command.spawn()?;
    let readers = capture_output(&mut child, log);
    let status = child.wait();
    for reader in readers {
        let _ = reader.join();
    }
    status
}

fn capture_output(child: &mut Child, log: &LogBuffer) -> Vec<JoinHandle<()>> {
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(spawn_reader(stdout, log.clone(), LogLevel::Info));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(spawn_reader(stderr, log.clone(), LogLevel::Info));
    }
    readers
}

fn spawn_reader<R>(stream: R, log: LogBuffer, level: LogLevel) -> JoinHandle<()>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => log.push(level, decode_line(&buf)),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
    })
}

/// Lines are decoded lossily; the patcher's console encoding is not always
/// UTF-8.
fn decode_line(raw: &[u8]) -> String {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}
