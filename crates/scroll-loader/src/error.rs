use std::io;
use std::path::PathBuf;
use std::time::Duration;

use crate::compiler::CompileError;

/// Conditions reported while discovering, loading or toggling scripts.
///
/// None of these abort a batch operation. The orchestrator hands them to the
/// diagnostics sink and returns an empty or partial result instead.
#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error("{} is not a directory", .path.display())]
    NotADirectory { path: PathBuf },

    #[error("{} is a directory, expected a single script file", .path.display())]
    IsDirectory { path: PathBuf },

    #[error("the script name {file_name} is reserved and cannot be loaded")]
    ReservedName { file_name: String },

    #[error("failed to read directory {}: {source}", .path.display())]
    ReadDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("loading of {file_name} timed out after {}s", .after.as_secs())]
    LoadTimeout { file_name: String, after: Duration },

    #[error("loading of {file_name} was interrupted")]
    LoadInterrupted { file_name: String },

    #[error("could not start a compile worker for {file_name}: {source}")]
    WorkerSpawn {
        file_name: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {file_name}: {source}")]
    Compile {
        file_name: String,
        #[source]
        source: CompileError,
    },

    #[error("cannot enable {file_name}: {} is already loaded", .target.display())]
    EnableConflict { file_name: String, target: PathBuf },

    #[error("failed to enable {file_name}: {source}")]
    EnableFailed {
        file_name: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to disable {file_name}: {source}")]
    DisableFailed {
        file_name: String,
        #[source]
        source: io::Error,
    },

    #[error("state index {}: {source}", .path.display())]
    StateIndexIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("state index {} is malformed: {message}", .path.display())]
    StateIndexParse { path: PathBuf, message: String },
}
