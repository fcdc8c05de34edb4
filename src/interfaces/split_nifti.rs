use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::Serialize;

use super::NiftiGenerator;
use crate::error::{Error, Result};
use crate::io::ImageStore;

/// Split one NIfTI file into many along a dimension, splitting the meta
/// data as well.
#[derive(Debug, Clone, Default)]
pub struct SplitNifti {
    pub in_file: Option<PathBuf>,
    /// Defaults to the last dimension.
    pub split_dim: Option<usize>,
    pub generator: NiftiGenerator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SplitNiftiOutput {
    pub out_list: Vec<PathBuf>,
}

impl SplitNifti {
    pub fn run<S: ImageStore>(&self, store: &S) -> Result<SplitNiftiOutput> {
        let in_file = self.in_file.as_ref().ok_or(Error::MissingInput("in_file"))?;
        let mut image = store.load(in_file)?;
        image.ensure_meta();

        let pieces = image.split(self.split_dim)?;
        log::debug!("{}: split into {} piece(s)", in_file.display(), pieces.len());

        let mut seen = BTreeSet::new();
        let mut out_list = Vec::with_capacity(pieces.len());
        for (index, piece) in pieces.iter().enumerate() {
            let mut out_file = self.generator.out_path(&piece.const_meta())?;
            if !seen.insert(out_file.clone()) {
                out_file = indexed(&out_file, &self.generator.out_ext, index);
                seen.insert(out_file.clone());
            }
            store.save(piece, &out_file)?;
            out_list.push(out_file);
        }
        Ok(SplitNiftiOutput { out_list })
    }
}

/// `dir/name.ext` to `dir/name-003.ext`.
fn indexed(path: &std::path::Path, ext: &str, index: usize) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = file_name.strip_suffix(ext).unwrap_or(&file_name);
    path.with_file_name(format!("{stem}-{index:03}{ext}"))
}
