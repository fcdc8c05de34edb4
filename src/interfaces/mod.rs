//! Interfaces wrapping the stacking and meta data operations. Each has
//! its inputs as public fields and a `run` method returning a serializable
//! output record.

pub mod command_line;
pub mod copy_meta;
pub mod dcmstack;
pub mod lookup_meta;
pub mod merge_nifti;
pub mod split_nifti;

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::model::MetaMap;
use crate::utils::formatting::{format_named, sanitize_path_comp};

pub use copy_meta::{CopyMeta, CopyMetaOutput};
pub use dcmstack::{DcmStack, DcmStackOutput, GroupAndStack, GroupAndStackOutput};
pub use lookup_meta::{LookupMeta, LookupMetaOutput};
pub use merge_nifti::{MergeNifti, MergeNiftiOutput, SortOrder};
pub use split_nifti::{SplitNifti, SplitNiftiOutput};

pub const DEFAULT_OUT_EXT: &str = ".nii.gz";

/// Builds output file names from image meta data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NiftiGenerator {
    /// Named format filled from the `global.const` meta data.
    pub out_format: Option<String>,
    pub out_ext: String,
    /// Defaults to the working directory.
    pub out_dir: Option<PathBuf>,
}

impl Default for NiftiGenerator {
    fn default() -> Self {
        Self {
            out_format: None,
            out_ext: DEFAULT_OUT_EXT.to_string(),
            out_dir: None,
        }
    }
}

impl NiftiGenerator {
    /// Sanitized absolute output path for an image with meta data `meta`.
    pub fn out_path(&self, meta: &MetaMap) -> Result<PathBuf> {
        let format = match &self.out_format {
            Some(format) => format.clone(),
            None => default_format(meta),
        };
        let file_name = format_named(&format, meta)? + &self.out_ext;
        Ok(output_dir(self.out_dir.as_deref())?.join(sanitize_path_comp(&file_name)))
    }
}

/// `%(SeriesNumber)03d` when present, then the protocol name or series
/// description (or `sequence`), joined with `-`.
pub fn default_format(meta: &MetaMap) -> String {
    let mut parts = Vec::new();
    if meta.contains_key("SeriesNumber") {
        parts.push("%(SeriesNumber)03d");
    }
    if meta.contains_key("ProtocolName") {
        parts.push("%(ProtocolName)s");
    } else if meta.contains_key("SeriesDescription") {
        parts.push("%(SeriesDescription)s");
    } else {
        parts.push("sequence");
    }
    parts.join("-")
}

/// Absolute output directory, the working directory by default.
pub fn output_dir(dir: Option<&Path>) -> Result<PathBuf> {
    match dir {
        Some(dir) if dir.is_absolute() => Ok(dir.to_path_buf()),
        Some(dir) => Ok(std::env::current_dir()?.join(dir)),
        None => Ok(std::env::current_dir()?),
    }
}

/// Where to find the DICOM files of a stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DicomFiles {
    List(Vec<PathBuf>),
    /// All `*.dcm` files in a directory.
    Directory(PathBuf),
    /// A glob pattern.
    Pattern(String),
}

impl DicomFiles {
    /// A path naming a directory is a `Directory`, anything else a glob.
    pub fn from_arg(arg: &str) -> Self {
        if Path::new(arg).is_dir() {
            Self::Directory(PathBuf::from(arg))
        } else {
            Self::Pattern(arg.to_string())
        }
    }

    /// Files in a deterministic order; patterns are sorted.
    pub fn resolve(&self) -> Result<Vec<PathBuf>> {
        let files = match self {
            Self::List(files) => files.clone(),
            Self::Directory(dir) => {
                if !dir.is_dir() {
                    return Err(Error::NotFound(dir.clone()));
                }
                glob_sorted(&dir.join("*.dcm").to_string_lossy())?
            }
            Self::Pattern(pattern) => glob_sorted(pattern)?,
        };
        if files.is_empty() {
            return Err(Error::EmptyStack);
        }
        Ok(files)
    }
}

fn glob_sorted(pattern: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in glob::glob(pattern)? {
        let path = entry.map_err(std::io::Error::from)?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    log::debug!("{pattern}: {} file(s)", files.len());
    Ok(files)
}
