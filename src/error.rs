use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("missing mandatory input `{0}`")]
    MissingInput(&'static str),

    #[error("{}: no such file", .0.display())]
    NotFound(PathBuf),

    #[error("{}: failed to parse DICOM file ({message})", path.display())]
    DicomParse { path: PathBuf, message: String },

    #[error("{}: failed to read NIfTI file ({message})", path.display())]
    NiftiRead { path: PathBuf, message: String },

    #[error("{}: failed to write output ({message})", path.display())]
    Write { path: PathBuf, message: String },

    #[error("no DICOM files to stack")]
    EmptyStack,

    #[error("unable to format `{template}`: {reason}")]
    Format { template: String, reason: String },

    #[error("meta data key `{0}` not found")]
    MissingMeta(String),

    #[error("{}: no meta data extension", .0.display())]
    MissingExtension(PathBuf),

    #[error("invalid meta data extension: {0}")]
    InvalidMeta(String),

    #[error("incongruent image: {0}")]
    IncongruentImage(String),

    #[error("invalid dimension {dim} for image with {ndim} dimension(s)")]
    InvalidDimension { dim: usize, ndim: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("`{cmdline}` failed ({status})")]
    CommandFailed { cmdline: String, status: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Regex(#[from] regex::Error),

    #[error(transparent)]
    Pattern(#[from] glob::PatternError),
}

impl Error {
    pub(crate) fn format(template: &str, reason: impl Into<String>) -> Self {
        Self::Format {
            template: template.to_string(),
            reason: reason.into(),
        }
    }
}
