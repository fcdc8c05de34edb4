use std::path::PathBuf;

use serde::Serialize;

use super::output_dir;
use crate::error::{Error, Result};
use crate::io::ImageStore;
use crate::model::Classification;

/// Copy meta data from one NIfTI file into another.
#[derive(Debug, Clone, Default)]
pub struct CopyMeta {
    pub src_file: Option<PathBuf>,
    pub dest_file: Option<PathBuf>,
    /// Only copy these classifications, all when empty.
    pub include_classes: Vec<Classification>,
    pub exclude_classes: Vec<Classification>,
    /// Defaults to the working directory.
    pub out_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CopyMetaOutput {
    pub dest_file: PathBuf,
}

impl CopyMeta {
    pub fn run<S: ImageStore>(&self, store: &S) -> Result<CopyMetaOutput> {
        let src_file = self.src_file.as_ref().ok_or(Error::MissingInput("src_file"))?;
        let dest_file = self.dest_file.as_ref().ok_or(Error::MissingInput("dest_file"))?;
        let src = store.load(src_file)?;
        let mut dest = store.load(dest_file)?;
        let src_meta = src
            .meta
            .as_ref()
            .ok_or_else(|| Error::MissingExtension(src_file.clone()))?;

        let mut classes = src_meta.valid_classes();
        if !self.include_classes.is_empty() {
            classes.retain(|cls| self.include_classes.contains(cls));
        }
        classes.retain(|cls| !self.exclude_classes.contains(cls));

        let dest_meta = dest.ensure_meta();
        if !classes.is_empty() {
            dest_meta.slice_dim = src_meta.slice_dim;
        }
        for cls in classes {
            log::debug!("copying {cls} ({} key(s))", src_meta.class_dict(cls).len());
            for (key, value) in src_meta.class_dict(cls) {
                dest_meta.insert(cls, key.clone(), value.clone());
            }
        }
        dest.sync_meta();

        let file_name = dest_file
            .file_name()
            .ok_or_else(|| Error::InvalidInput(format!("{} has no file name", dest_file.display())))?;
        let out_file = output_dir(self.out_dir.as_deref())?.join(file_name);
        store.save(&dest, &out_file)?;
        Ok(CopyMetaOutput { dest_file: out_file })
    }
}
