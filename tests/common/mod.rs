//! In-memory stand-ins for the DICOM and NIfTI backends.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use dcmnifti::io::{DicomReader, ImageStore};
use dcmnifti::model::{DicomSlice, MetaImage, MetaMap};
use dcmnifti::{Error, Result};
use ndarray::Array2;
use serde_json::{json, Value};

#[derive(Default)]
pub struct FakeDicomReader {
    slices: BTreeMap<PathBuf, DicomSlice>,
}

impl FakeDicomReader {
    pub fn add(&mut self, slice: DicomSlice) -> PathBuf {
        let path = slice.file_path.clone();
        self.slices.insert(path.clone(), slice);
        path
    }
}

impl DicomReader for FakeDicomReader {
    fn read_slice(&self, path: &Path) -> Result<DicomSlice> {
        self.slices.get(path).cloned().ok_or_else(|| Error::DicomParse {
            path: path.to_path_buf(),
            message: "not a DICOM file".to_string(),
        })
    }
}

#[derive(Default)]
pub struct FakeStore {
    images: RefCell<BTreeMap<PathBuf, MetaImage>>,
}

impl FakeStore {
    pub fn insert(&self, path: impl Into<PathBuf>, image: MetaImage) {
        self.images.borrow_mut().insert(path.into(), image);
    }

    pub fn get(&self, path: &Path) -> Option<MetaImage> {
        self.images.borrow().get(path).cloned()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.images.borrow().keys().cloned().collect()
    }
}

impl ImageStore for FakeStore {
    fn load(&self, path: &Path) -> Result<MetaImage> {
        self.get(path).ok_or_else(|| Error::NotFound(path.to_path_buf()))
    }

    fn save(&self, image: &MetaImage, path: &Path) -> Result<()> {
        let mut image = image.clone();
        image.sync_meta();
        self.insert(path, image);
        Ok(())
    }
}

pub fn meta(value: Value) -> MetaMap {
    serde_json::from_value(value).unwrap()
}

/// An axial 2x2 slice at height `z` of the given series.
pub fn axial_slice(name: &str, series_uid: &str, extra: Value, z: f64) -> DicomSlice {
    let mut values = meta(json!({
        "SeriesInstanceUID": series_uid,
        "ImageOrientationPatient": [1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        "ImagePositionPatient": [0.0, 0.0, z],
        "PixelSpacing": [1.0, 1.0],
        "PatientName": "Doe^Jane",
    }));
    values.extend(meta(extra));
    DicomSlice::new(name, values, Array2::from_elem((2, 2), z))
}
