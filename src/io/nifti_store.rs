use std::path::Path;

use nifti::writer::WriterOptions;
use nifti::{
    Extender, Extension, ExtensionSequence, IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions,
};

use super::ImageStore;
use crate::error::{Error, Result};
use crate::model::image::IDENTITY;
use crate::model::meta::{Affine, META_ECODE};
use crate::model::{MetaExtension, MetaImage};

/// NIfTI-1 files on disk, `.nii` or `.nii.gz`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NiftiStore;

impl ImageStore for NiftiStore {
    fn load(&self, path: &Path) -> Result<MetaImage> {
        if !path.exists() {
            return Err(Error::NotFound(path.to_path_buf()));
        }
        log::info!("Loading NIfTI file: {}", path.display());

        let object = ReaderOptions::new()
            .read_file(path)
            .map_err(|err| read_error(path, err))?;
        let affine = header_affine(object.header());
        let meta = object
            .extensions()
            .iter()
            .find(|extension| extension.code() == META_ECODE)
            .map(|extension| MetaExtension::from_bytes(extension.data()))
            .transpose()?;
        let data = object
            .into_volume()
            .into_ndarray::<f64>()
            .map_err(|err| read_error(path, err))?;

        let mut image = MetaImage::new(data, affine);
        image.meta = meta;
        Ok(image)
    }

    fn save(&self, image: &MetaImage, path: &Path) -> Result<()> {
        log::info!("Writing NIfTI file: {}", path.display());
        let header = affine_header(&image.affine);

        let mut writer = WriterOptions::new(path).reference_header(&header);
        if let Some(meta) = &image.meta {
            let mut meta = meta.clone();
            meta.shape = image.shape().to_vec();
            meta.affine = Some(image.affine);
            writer = writer.with_extensions(extension_sequence(&meta));
        }
        writer.write_nifti(&image.data).map_err(|err| Error::Write {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }
}

/// The meta data as a single JSON extension, NUL padded by `from_str`.
fn extension_sequence(meta: &MetaExtension) -> ExtensionSequence {
    let extension = Extension::from_str(META_ECODE, &meta.to_json().to_string());
    ExtensionSequence::new(
        Extender::from([1u8, 0, 0, 0]),
        vec![extension],
    )
}

/// Affine from the sform rows, or from the voxel sizes without an sform.
fn header_affine(header: &NiftiHeader) -> Affine {
    if header.sform_code > 0 {
        let mut affine = IDENTITY;
        for (row, srow) in [header.srow_x, header.srow_y, header.srow_z]
            .iter()
            .enumerate()
        {
            for (col, value) in srow.iter().enumerate() {
                affine[row][col] = f64::from(*value);
            }
        }
        return affine;
    }

    let mut affine = IDENTITY;
    for axis in 0..3 {
        let size = f64::from(header.pixdim[axis + 1]);
        affine[axis][axis] = if size > 0.0 { size } else { 1.0 };
    }
    affine
}

fn affine_header(affine: &Affine) -> NiftiHeader {
    let row = |r: usize| affine[r].map(|value| value as f32);
    let mut pixdim = [1.0f32; 8];
    for axis in 0..3 {
        let norm = (0..3)
            .map(|r| affine[r][axis] * affine[r][axis])
            .sum::<f64>()
            .sqrt();
        pixdim[axis + 1] = norm as f32;
    }

    NiftiHeader {
        pixdim,
        srow_x: row(0),
        srow_y: row(1),
        srow_z: row(2),
        sform_code: 1,
        ..NiftiHeader::default()
    }
}

fn read_error(path: &Path, err: impl std::fmt::Display) -> Error {
    Error::NiftiRead {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
