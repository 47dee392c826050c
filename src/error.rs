//! Input errors that reject a batch before any evaluation starts.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("requirement batch is empty")]
    EmptyBatch,
    #[error("no corpus ids given")]
    NoCorpus,
    #[error("requirement at position {0} has an empty id")]
    BlankId(usize),
    #[error("duplicate requirement id '{0}'")]
    DuplicateId(String),
    #[error("requirement '{0}' has neither a title nor a description")]
    MissingText(String),
}
