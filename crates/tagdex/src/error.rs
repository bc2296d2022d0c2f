use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;

use bstr::BString;
use thiserror::Error;

use crate::update::MIN_WORKER_BUDGET;

#[derive(Error, Debug)]
pub enum Error {
    #[error("internal: {0}.")]
    InternalError(#[from] InternalError),
    #[error(transparent)]
    IoError(#[from] io::Error),
    #[error(transparent)]
    UserError(#[from] UserError),
}

#[derive(Error, Debug)]
pub enum InternalError {
    #[error(transparent)]
    Store(#[from] heed::Error),
    #[error("missing {key} in the {db_name} database")]
    DatabaseMissingEntry { db_name: &'static str, key: BString },
    #[error("cannot decode an entry of the {db_name} database")]
    InvalidRecord { db_name: &'static str },
    #[error("the `{helper_op}` helper invocation exited with {status}")]
    HelperFailed { helper_op: &'static str, status: ExitStatus },
    #[error("malformed `{helper_op}` helper output: {line}")]
    MalformedHelperOutput { helper_op: &'static str, line: BString },
    #[error("the {db_name} database is only available with device-tree support enabled")]
    DtsSupportDisabled { db_name: &'static str },
    #[error("an indexing run was aborted because another stage failed")]
    AbortedIndexation,
    #[error("a {stage} worker panicked")]
    WorkerPanicked { stage: &'static str },
}

#[derive(Error, Debug)]
pub enum UserError {
    #[error("index directory {} does not exist; create it before indexing", .0.display())]
    IndexDirectoryNotFound(PathBuf),
    #[error("revision-control helper {} does not exist", .0.display())]
    HelperNotFound(PathBuf),
    #[error("the worker budget must be at least {MIN_WORKER_BUDGET}, got {0}")]
    WorkerBudgetTooSmall(usize),
}

impl From<heed::Error> for Error {
    fn from(error: heed::Error) -> Error {
        Error::InternalError(InternalError::Store(error))
    }
}
