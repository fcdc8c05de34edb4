use ndarray::{concatenate, ArrayD, Axis};

use crate::error::{Error, Result};
use crate::model::meta::{Affine, MetaExtension, MetaMap, MetaValue};

/// NIfTI-1 supports at most seven dimensions.
pub const MAX_NDIM: usize = 7;

pub const IDENTITY: Affine = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

/// A voxel array with its RAS+ affine and optional embedded meta data.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaImage {
    pub data: ArrayD<f64>,
    pub affine: Affine,
    pub meta: Option<MetaExtension>,
}

impl MetaImage {
    pub fn new(data: ArrayD<f64>, affine: Affine) -> Self {
        Self {
            data,
            affine,
            meta: None,
        }
    }

    pub fn with_meta(mut self, meta: MetaExtension) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Meta data extension, created empty if the image has none.
    pub fn ensure_meta(&mut self) -> &mut MetaExtension {
        let shape = self.data.shape().to_vec();
        let affine = self.affine;
        self.meta.get_or_insert_with(|| {
            let mut meta = MetaExtension::new(&shape);
            meta.affine = Some(affine);
            meta
        })
    }

    pub fn remove_extension(&mut self) {
        self.meta = None;
    }

    /// The `global.const` dictionary, empty without an extension.
    pub fn const_meta(&self) -> MetaMap {
        self.meta
            .as_ref()
            .map(|meta| meta.const_dict().clone())
            .unwrap_or_default()
    }

    /// Constant value of `key`.
    pub fn get_meta(&self, key: &str) -> Option<&MetaValue> {
        self.meta.as_ref()?.const_dict().get(key)
    }

    /// Record the current shape and affine in the extension before saving.
    pub fn sync_meta(&mut self) {
        let shape = self.data.shape().to_vec();
        let affine = self.affine;
        if let Some(meta) = self.meta.as_mut() {
            meta.shape = shape;
            meta.affine = Some(affine);
        }
    }

    /// Concatenate images along `dim`. Without a dim the last singular
    /// axis is used, or a new trailing axis when there is none.
    pub fn from_sequence(images: Vec<MetaImage>, dim: Option<usize>) -> Result<MetaImage> {
        let Some(first) = images.first() else {
            return Err(Error::InvalidInput("nothing to merge".to_string()));
        };

        let shape = padded_shape(first.shape());
        let ndim = shape.len();
        for image in &images[1..] {
            if padded_shape(image.shape()) != shape {
                return Err(Error::IncongruentImage(format!(
                    "shape {:?} does not match {:?}",
                    image.shape(),
                    first.shape()
                )));
            }
        }

        let dim = match dim {
            Some(dim) => dim,
            None => shape.iter().rposition(|&len| len == 1).unwrap_or(ndim),
        };
        if dim > ndim || (dim == ndim && ndim == MAX_NDIM) {
            return Err(Error::InvalidDimension { dim, ndim });
        }
        if dim < ndim && shape[dim] != 1 {
            return Err(Error::IncongruentImage(format!(
                "cannot merge along dimension {dim} of size {}",
                shape[dim]
            )));
        }

        let affine = first.affine;
        if dim > 2 && images.iter().any(|image| !affines_close(&image.affine, &affine)) {
            log::warn!("merging images with differing affines, keeping the first");
        }

        let per_slice: usize = shape.iter().skip(3).product();
        let metas: Vec<MetaExtension> = images
            .iter()
            .map(|image| image.meta.clone().unwrap_or_default())
            .collect();
        let meta_refs: Vec<&MetaExtension> = metas.iter().collect();
        let mut meta = MetaExtension::from_sequence(&meta_refs, dim, per_slice);
        meta.slice_dim = metas.iter().find_map(|meta| meta.slice_dim);

        let arrays: Vec<ArrayD<f64>> = images
            .into_iter()
            .map(|image| {
                let mut data = pad_dims(image.data);
                if dim == ndim {
                    data = data.insert_axis(Axis(dim));
                }
                data
            })
            .collect();
        let views: Vec<_> = arrays.iter().map(|array| array.view()).collect();
        let data = concatenate(Axis(dim), &views)
            .map_err(|err| Error::IncongruentImage(err.to_string()))?;

        let mut merged = MetaImage::new(data, affine).with_meta(meta);
        merged.sync_meta();
        Ok(merged)
    }

    /// Split into one image per index along `dim` (default: last axis).
    /// The last axis of a >3D image is dropped, other axes are kept with
    /// size one.
    pub fn split(&self, dim: Option<usize>) -> Result<Vec<MetaImage>> {
        let ndim = self.data.ndim();
        let dim = dim.unwrap_or(ndim.saturating_sub(1));
        if dim >= ndim {
            return Err(Error::InvalidDimension { dim, ndim });
        }

        let count = self.data.shape()[dim];
        let drop_axis = dim == ndim - 1 && ndim > 3;
        let piece_ndim = if drop_axis { ndim - 1 } else { ndim };
        let metas = self
            .meta
            .as_ref()
            .map(|meta| meta.split(dim, count, piece_ndim));

        let pieces = (0..count)
            .map(|index| {
                let mut data = self.data.index_axis(Axis(dim), index).to_owned();
                if !drop_axis {
                    data = data.insert_axis(Axis(dim));
                }

                let mut affine = self.affine;
                if dim < 3 {
                    for row in 0..3 {
                        affine[row][3] += affine[row][dim] * index as f64;
                    }
                }

                let mut piece = MetaImage::new(data, affine);
                if let Some(metas) = &metas {
                    piece.meta = Some(metas[index].clone());
                    piece.sync_meta();
                }
                piece
            })
            .collect();
        Ok(pieces)
    }
}

fn padded_shape(shape: &[usize]) -> Vec<usize> {
    let mut shape = shape.to_vec();
    while shape.len() < 3 {
        shape.push(1);
    }
    shape
}

fn pad_dims(mut data: ArrayD<f64>) -> ArrayD<f64> {
    while data.ndim() < 3 {
        let ndim = data.ndim();
        data = data.insert_axis(Axis(ndim));
    }
    data
}

fn affines_close(a: &Affine, b: &Affine) -> bool {
    a.iter()
        .flatten()
        .zip(b.iter().flatten())
        .all(|(a, b)| (a - b).abs() < 1e-4)
}
