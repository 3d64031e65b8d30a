//! External-solver invocation.
//!
//! Configurations are JSON files in a directory, tried in lexicographic
//! filename order by the retry loop upstream. Each run is a subprocess
//! with a bounded wall-clock wait: on expiry the process is killed and the
//! attempt reports [`SolveStatus::Timeout`], which the caller treats like
//! any other non-`sat` answer.

use indexmap::IndexMap;
use num::rational::Rational64;
use serde::Deserialize;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

use crate::model::{parse_define_funs, ModelError};

fn default_timeout_secs() -> u64 {
    10
}

/// A named solver configuration: backend command plus strategy arguments.
///
/// `{query}` in `args` is replaced by the query path; if no argument
/// mentions it, the path is appended.
#[derive(Debug, Clone, Deserialize)]
pub struct SolverConfig {
    #[serde(skip)]
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl SolverConfig {
    fn command_line(&self, query_path: &Path) -> (String, Vec<String>) {
        let query = query_path.display().to_string();
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|a| a.replace("{query}", &query))
            .collect();
        if !self.args.iter().any(|a| a.contains("{query}")) {
            args.push(query);
        }
        (self.command.clone(), args)
    }
}

/// Load a single configuration file; its name is the file stem.
pub fn load_config(path: &Path) -> Result<SolverConfig, SolverError> {
    let text = std::fs::read_to_string(path)?;
    let mut config: SolverConfig =
        serde_json::from_str(&text).map_err(|source| SolverError::Config {
            path: path.to_path_buf(),
            source,
        })?;
    config.name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    Ok(config)
}

/// Enumerate `*.json` configurations of a directory in lexicographic
/// filename order.
pub fn load_config_dir(dir: &Path) -> Result<Vec<SolverConfig>, SolverError> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();
    if paths.is_empty() {
        return Err(SolverError::NoConfigurations(dir.to_path_buf()));
    }
    paths.iter().map(|p| load_config(p)).collect()
}

/// Outcome classification of one solver attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Sat,
    Unsat,
    Unknown,
    Timeout,
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveStatus::Sat => write!(f, "sat"),
            SolveStatus::Unsat => write!(f, "unsat"),
            SolveStatus::Unknown => write!(f, "unknown"),
            SolveStatus::Timeout => write!(f, "timeout"),
        }
    }
}

/// Result of one solver attempt. The model is populated only on `sat`.
#[derive(Debug, Clone)]
pub struct SolverRun {
    pub status: SolveStatus,
    pub model: IndexMap<String, Rational64>,
    pub elapsed: Duration,
}

#[derive(Debug, Error)]
pub enum SolverError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed configuration {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no solver configurations found in {0}")]
    NoConfigurations(PathBuf),
    #[error("failed to launch solver `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("solver `{config}` produced no sat/unsat/unknown verdict: {detail}")]
    NoStatus { config: String, detail: String },
    #[error("model decode error: {0}")]
    Model(#[from] ModelError),
}

impl SolverError {
    /// Whether the retry loop may skip to the next configuration. A model
    /// that fails to decode is fatal for the run; a solver that cannot be
    /// launched or answers gibberish is just a failed attempt.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SolverError::Spawn { .. } | SolverError::NoStatus { .. }
        )
    }
}

fn drain(reader: Option<impl Read + Send + 'static>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut text = String::new();
        if let Some(mut r) = reader {
            let _ = r.read_to_string(&mut text);
        }
        text
    })
}

/// Run one configuration on a query file, waiting at most its timeout.
pub fn run_solver(query_path: &Path, config: &SolverConfig) -> Result<SolverRun, SolverError> {
    let (command, args) = config.command_line(query_path);
    debug!(config = %config.name, %command, ?args, "invoking solver");

    let start = Instant::now();
    let mut child = Command::new(&command)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| SolverError::Spawn {
            command: command.clone(),
            source,
        })?;

    let stdout_handle = drain(child.stdout.take());
    let stderr_handle = drain(child.stderr.take());

    let deadline = start + Duration::from_secs(config.timeout_secs);
    loop {
        if child.try_wait()?.is_some() {
            break;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            let _ = stdout_handle.join();
            let _ = stderr_handle.join();
            return Ok(SolverRun {
                status: SolveStatus::Timeout,
                model: IndexMap::new(),
                elapsed: start.elapsed(),
            });
        }
        thread::sleep(Duration::from_millis(20));
    }
    let elapsed = start.elapsed();

    let stdout = stdout_handle.join().unwrap_or_default();
    let stderr = stderr_handle.join().unwrap_or_default();

    let status = stdout
        .lines()
        .find_map(|line| match line.trim() {
            "sat" => Some(SolveStatus::Sat),
            "unsat" => Some(SolveStatus::Unsat),
            "unknown" => Some(SolveStatus::Unknown),
            _ => None,
        })
        .ok_or_else(|| SolverError::NoStatus {
            config: config.name.clone(),
            detail: if stderr.trim().is_empty() {
                stdout.trim().chars().take(120).collect()
            } else {
                stderr.trim().chars().take(120).collect()
            },
        })?;

    let model = if status == SolveStatus::Sat {
        parse_define_funs(&stdout)?
    } else {
        IndexMap::new()
    };

    Ok(SolverRun {
        status,
        model,
        elapsed,
    })
}
