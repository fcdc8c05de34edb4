use std::path::PathBuf;

use serde::Serialize;

use super::{DicomFiles, NiftiGenerator};
use crate::error::{Error, Result};
use crate::io::{DicomReader, ImageStore};
use crate::model::{DicomSlice, KeyFilter, MetaImage};
use crate::stack::{group_slices, DicomStack};

/// Create one NIfTI file from a set of DICOM files.
#[derive(Debug, Clone, Default)]
pub struct DcmStack {
    pub dicom_files: Option<DicomFiles>,
    /// Embed the DICOM meta data into the result.
    pub embed_meta: bool,
    /// Meta data to exclude, in addition to the default exclude filters.
    pub exclude_regexes: Vec<String>,
    /// Meta data to include, overriding any exclude filters.
    pub include_regexes: Vec<String>,
    pub generator: NiftiGenerator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DcmStackOutput {
    pub out_file: PathBuf,
}

impl DcmStack {
    pub fn run<R: DicomReader, S: ImageStore>(
        &self,
        reader: &R,
        store: &S,
    ) -> Result<DcmStackOutput> {
        let files = self
            .dicom_files
            .as_ref()
            .ok_or(Error::MissingInput("dicom_files"))?
            .resolve()?;

        let mut stack = DicomStack::new(self.key_filter()?);
        for path in files {
            stack.add_slice(reader.read_slice(&path)?);
        }

        let (image, out_file) = named_image(&stack, &self.generator, self.embed_meta)?;
        store.save(&image, &out_file)?;
        Ok(DcmStackOutput { out_file })
    }

    fn key_filter(&self) -> Result<KeyFilter> {
        KeyFilter::with_defaults(&self.exclude_regexes, &self.include_regexes)
    }
}

/// Create (potentially) multiple NIfTI files from a set of DICOM files,
/// one per series.
#[derive(Debug, Clone, Default)]
pub struct GroupAndStack {
    pub stack: DcmStack,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupAndStackOutput {
    pub out_list: Vec<PathBuf>,
}

impl GroupAndStack {
    pub fn run<R: DicomReader, S: ImageStore>(
        &self,
        reader: &R,
        store: &S,
    ) -> Result<GroupAndStackOutput> {
        let files = self
            .stack
            .dicom_files
            .as_ref()
            .ok_or(Error::MissingInput("dicom_files"))?
            .resolve()?;
        let slices = files
            .iter()
            .map(|path| reader.read_slice(path))
            .collect::<Result<Vec<DicomSlice>>>()?;

        let filter = self.stack.key_filter()?;
        let generator = &self.stack.generator;
        let groups = group_slices(slices, generator.out_format.as_deref(), &filter)?;

        // Every group is stacked and named before anything is written.
        let mut named = Vec::with_capacity(groups.len());
        for (key, stack) in groups {
            log::debug!("stacking group {:?} ({} slice(s))", key.0, stack.len());
            named.push(named_image(&stack, generator, self.stack.embed_meta)?);
        }

        let mut out_list = Vec::with_capacity(named.len());
        for (image, out_file) in named {
            store.save(&image, &out_file)?;
            out_list.push(out_file);
        }
        Ok(GroupAndStackOutput { out_list })
    }
}

/// The stacked image and its output path, named from the `global.const`
/// meta data left after filtering.
fn named_image(
    stack: &DicomStack,
    generator: &NiftiGenerator,
    embed_meta: bool,
) -> Result<(MetaImage, PathBuf)> {
    let mut image = stack.to_image()?;
    let out_file = generator.out_path(&image.const_meta())?;
    if !embed_meta {
        image.remove_extension();
    }
    Ok((image, out_file))
}
