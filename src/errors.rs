//! Module K [AMBIENT] — structured error taxonomy for the plan/spawn/builtin
//! failure paths spec.md §7 describes. None of these cross into a panic; the
//! Runner converts every variant to the integer exit code spec.md mandates
//! (spec.md §7: "the Runner never propagates errors out as exceptions").

use thiserror::Error;

/// A redirection or pipe could not be set up (spec §4.C / §7 "Plan failure").
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("failed to create pipe: {source}")]
    Pipe {
        #[source]
        source: std::io::Error,
    },
    #[error("{path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported redirection: fd {fd} -> {target}")]
    UnsupportedRedirection { fd: i32, target: String },
    #[error("cannot redirect stdout of non-terminal pipeline command '{program}'")]
    StdoutRedirectedMidPipeline { program: String },
}

/// A child process could not be started or exec'd (spec §4.D / §7 "Spawn
/// failure" and "Exec failure in child").
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("fork failed: {source}")]
    Fork {
        #[source]
        source: std::io::Error,
    },
    #[error("{program}: {diagnosis}")]
    Exec { program: String, diagnosis: ExecDiagnosis },
}

/// The refined exec-failure diagnostic spec §4.D describes: distinguish
/// "command not found", "is a directory", and "missing interpreter" rather
/// than reporting a single generic I/O error.
#[derive(Debug, Error)]
pub enum ExecDiagnosis {
    #[error("command not found")]
    NotFound,
    #[error("Is a directory")]
    IsADirectory,
    #[error("bad interpreter: {0}: no such file or directory")]
    MissingInterpreter(String),
    #[error("{0}")]
    Other(String),
}

impl ExecDiagnosis {
    /// Exit code spec §4.D mandates for every exec failure: 126, except
    /// "command not found" which is conventionally 127.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExecDiagnosis::NotFound => 127,
            _ => 126,
        }
    }
}

/// Argument errors from the job-control builtins (spec §4.H / §7 "Built-in
/// argument errors").
#[derive(Debug, Error)]
pub enum BuiltinError {
    #[error("jsh: {builtin}: {job_id}: no such job")]
    NoSuchJob { builtin: &'static str, job_id: String },
    #[error("jsh: {0}: numeric argument required")]
    NotANumber(String),
    #[error("jsh: {0}")]
    Usage(String),
}
