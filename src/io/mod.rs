//! Backends reading DICOM slices and reading/writing NIfTI images.

pub mod dicom_reader;
pub mod nifti_store;

use std::path::Path;

use crate::error::Result;
use crate::model::{DicomSlice, MetaImage};

pub use dicom_reader::DicomFileReader;
pub use nifti_store::NiftiStore;

pub trait DicomReader {
    fn read_slice(&self, path: &Path) -> Result<DicomSlice>;
}

/// Persistence of images together with their meta data extension.
pub trait ImageStore {
    fn load(&self, path: &Path) -> Result<MetaImage>;

    /// Write `image`, embedding its extension when it has one.
    fn save(&self, image: &MetaImage, path: &Path) -> Result<()>;
}
