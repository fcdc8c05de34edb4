use std::path::PathBuf;

use ndarray::Array2;

use super::meta::{MetaMap, MetaValue};

const DEFAULT_ORIENTATION: [f64; 6] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];

/// One decoded DICOM image: its meta data keyed by keyword and the first
/// frame of pixel data as `(rows, columns)`.
#[derive(Debug, Clone, PartialEq)]
pub struct DicomSlice {
    pub file_path: PathBuf,
    pub meta: MetaMap,
    pub pixels: Array2<f64>,
}

impl DicomSlice {
    pub fn new(file_path: impl Into<PathBuf>, meta: MetaMap, pixels: Array2<f64>) -> Self {
        Self {
            file_path: file_path.into(),
            meta,
            pixels,
        }
    }

    pub fn rows(&self) -> usize {
        self.pixels.nrows()
    }

    pub fn columns(&self) -> usize {
        self.pixels.ncols()
    }

    /// Row and column direction cosines.
    pub fn orientation(&self) -> [f64; 6] {
        self.numbers("ImageOrientationPatient")
            .and_then(|values| values.try_into().ok())
            .unwrap_or(DEFAULT_ORIENTATION)
    }

    pub fn position(&self) -> Option<[f64; 3]> {
        self.numbers("ImagePositionPatient")
            .and_then(|values| values.try_into().ok())
    }

    /// Spacing between rows and between columns.
    pub fn pixel_spacing(&self) -> [f64; 2] {
        self.numbers("PixelSpacing")
            .and_then(|values| values.try_into().ok())
            .unwrap_or([1.0, 1.0])
    }

    pub fn slice_normal(&self) -> [f64; 3] {
        let o = self.orientation();
        [
            o[1] * o[5] - o[2] * o[4],
            o[2] * o[3] - o[0] * o[5],
            o[0] * o[4] - o[1] * o[3],
        ]
    }

    /// Distance of the slice along its normal, if it has a position.
    pub fn slice_location(&self) -> Option<f64> {
        let position = self.position()?;
        let normal = self.slice_normal();
        Some(position.iter().zip(normal).map(|(p, n)| p * n).sum())
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        match self.meta.get(key)? {
            MetaValue::Number(number) => number.as_f64(),
            MetaValue::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    fn numbers(&self, key: &str) -> Option<Vec<f64>> {
        match self.meta.get(key)? {
            MetaValue::Array(values) => values.iter().map(MetaValue::as_f64).collect(),
            MetaValue::Number(number) => number.as_f64().map(|value| vec![value]),
            _ => None,
        }
    }
}
