//! External Tool Runner (C2): resolves helper binaries on PATH, and fans
//! out batches of child processes, joining them before the caller observes
//! results.

use std::collections::HashMap;
use std::process::{Command, Stdio};
use std::sync::{Mutex, OnceLock};

use crate::error::{ExtractError, Result};

/// Helper binaries named in the external interface contract.
pub const OTA_EXTRACTOR: &str = "ota_extractor";
pub const LPUNPACK: &str = "lpunpack";
pub const SIMG2IMG: &str = "simg2img";
pub const BROTLI: &str = "brotli";
pub const SDAT2IMG: &str = "sdat2img";
pub const FSCK_EROFS: &str = "fsck.erofs";
pub const DEBUGFS: &str = "debugfs";

/// One submission to a parallel batch: a human-readable label (usually a
/// partition name) and the argv to run for it.
pub struct Invocation {
    pub label: String,
    pub argv: Vec<String>,
}

impl Invocation {
    pub fn new(label: impl Into<String>, argv: Vec<String>) -> Self {
        Self { label: label.into(), argv }
    }
}

/// Result of a best-effort batch: which labels succeeded, and which failed
/// with their exit code and captured stderr.
pub struct BatchOutcome {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, i32, String)>,
}

fn tool_path_cache() -> &'static Mutex<HashMap<String, String>> {
    static CACHE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Resolves `name` via PATH plus `/usr/sbin`, caching the result for the
/// lifetime of the process. Absence is a fatal configuration error raised
/// here, at first use, not eagerly at start-up.
pub fn executable_path(name: &str) -> Result<String> {
    if let Some(cached) = tool_path_cache().lock().unwrap().get(name) {
        return Ok(cached.clone());
    }

    let path_var = std::env::var_os("PATH").unwrap_or_default();
    let mut dirs: Vec<std::path::PathBuf> = std::env::split_paths(&path_var).collect();
    dirs.push("/usr/sbin".into());

    for dir in dirs {
        let candidate = dir.join(name);
        if candidate.is_file() {
            let resolved = candidate.to_string_lossy().into_owned();
            tool_path_cache()
                .lock()
                .unwrap()
                .insert(name.to_string(), resolved.clone());
            return Ok(resolved);
        }
    }

    Err(ExtractError::ToolNotFound(name.to_string()))
}

/// Spawns every invocation in `batch` concurrently via one thread per child,
/// waits for all of them, then partitions by exit status.
///
/// When `fatal` is true, the first non-zero exit aborts with a diagnostic
/// `ExtractError::HelperFailed` (or `HelperSignaled` on platforms/processes
/// that died to a signal) as soon as all threads have joined — never mid-join,
/// so every spawned child is always waited on regardless of outcome.
pub fn run_parallel(batch: Vec<Invocation>, fatal: bool) -> Result<BatchOutcome> {
    let results: Vec<(String, std::io::Result<std::process::Output>, Vec<String>)> =
        std::thread::scope(|scope| {
            let handles: Vec<_> = batch
                .into_iter()
                .map(|inv| {
                    scope.spawn(move || {
                        log::debug!("spawning {}: {:?}", inv.label, inv.argv);
                        let output = spawn_and_wait(&inv.argv);
                        (inv.label, output, inv.argv)
                    })
                })
                .collect();

            handles.into_iter().map(|h| h.join().expect("worker thread panicked")).collect()
        });

    let mut succeeded = Vec::new();
    let mut failed = Vec::new();

    for (label, output, argv) in results {
        let output = output?;

        match output.status.code() {
            Some(0) => succeeded.push(label),
            Some(code) => {
                let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
                if fatal {
                    log::error!("{label} failed ({code}): {stderr}");
                    return Err(ExtractError::HelperFailed { label, argv, code, stderr });
                }
                log::debug!("{label} probe miss ({code}): {stderr}");
                failed.push((label, code, stderr));
            }
            None => {
                if fatal {
                    return Err(ExtractError::HelperSignaled { label });
                }
                failed.push((label, -1, "terminated by signal".to_string()));
            }
        }
    }

    Ok(BatchOutcome { succeeded, failed })
}

fn spawn_and_wait(argv: &[String]) -> std::io::Result<std::process::Output> {
    let resolved = executable_path(&argv[0]).map_err(|e| {
        std::io::Error::new(std::io::ErrorKind::NotFound, e.to_string())
    })?;

    Command::new(resolved)
        .args(&argv[1..])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
}

/// Blocking single-command run, fatal on non-zero exit. Returns stdout on
/// success.
pub fn run_cmd(argv: &[String]) -> Result<String> {
    let resolved = executable_path(&argv[0])?;

    log::debug!("running {:?}", argv);

    let output = Command::new(resolved)
        .args(&argv[1..])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let code = output.status.code().unwrap_or(-1);
        return Err(ExtractError::HelperFailed {
            label: argv[0].clone(),
            argv: argv.to_vec(),
            code,
            stderr,
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_true_on_path() {
        // `true` is present on every POSIX system CI runs on.
        assert!(executable_path("true").is_ok());
    }

    #[test]
    fn missing_tool_is_fatal() {
        let err = executable_path("definitely-not-a-real-helper-xyz").unwrap_err();
        assert!(matches!(err, ExtractError::ToolNotFound(_)));
    }

    #[test]
    fn run_parallel_reports_success_and_failure_non_fatal() {
        let batch = vec![
            Invocation::new("ok", vec!["true".to_string()]),
            Invocation::new("bad", vec!["false".to_string()]),
        ];

        let outcome = run_parallel(batch, false).unwrap();
        assert_eq!(outcome.succeeded, vec!["ok".to_string()]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, "bad");
    }

    #[test]
    fn run_parallel_fatal_aborts_on_failure() {
        let batch = vec![Invocation::new("bad", vec!["false".to_string()])];
        let err = run_parallel(batch, true).unwrap_err();
        assert!(matches!(err, ExtractError::HelperFailed { .. }));
    }

    #[test]
    fn run_cmd_returns_stdout() {
        let out = run_cmd(&["echo".to_string(), "hi".to_string()]).unwrap();
        assert_eq!(out.trim(), "hi");
    }
}
