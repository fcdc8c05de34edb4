use std::cmp::Ordering;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::NiftiGenerator;
use crate::error::{Error, Result};
use crate::io::ImageStore;
use crate::model::meta::compare_optional;
use crate::model::MetaImage;

/// Meta data key(s) to sort the inputs by before merging.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SortOrder {
    Key(String),
    Keys(Vec<String>),
}

impl SortOrder {
    pub fn keys(&self) -> &[String] {
        match self {
            Self::Key(key) => std::slice::from_ref(key),
            Self::Keys(keys) => keys,
        }
    }

    fn compare(&self, a: &MetaImage, b: &MetaImage) -> Ordering {
        self.keys()
            .iter()
            .map(|key| compare_optional(a.get_meta(key), b.get_meta(key)))
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl From<&str> for SortOrder {
    fn from(key: &str) -> Self {
        Self::Key(key.to_string())
    }
}

impl From<Vec<String>> for SortOrder {
    fn from(keys: Vec<String>) -> Self {
        match <[String; 1]>::try_from(keys) {
            Ok([key]) => Self::Key(key),
            Err(keys) => Self::Keys(keys),
        }
    }
}

/// Merge multiple NIfTI files along a dimension, merging their meta data.
#[derive(Debug, Clone, Default)]
pub struct MergeNifti {
    pub in_files: Vec<PathBuf>,
    pub sort_order: Option<SortOrder>,
    /// Defaults to the last singular dimension, or a new one.
    pub merge_dim: Option<usize>,
    pub generator: NiftiGenerator,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeNiftiOutput {
    pub out_file: PathBuf,
}

impl MergeNifti {
    pub fn run<S: ImageStore>(&self, store: &S) -> Result<MergeNiftiOutput> {
        if self.in_files.is_empty() {
            return Err(Error::MissingInput("in_files"));
        }

        let mut images = Vec::with_capacity(self.in_files.len());
        for path in &self.in_files {
            let mut image = store.load(path)?;
            image.ensure_meta();
            images.push(image);
        }
        if let Some(order) = &self.sort_order {
            images.sort_by(|a, b| order.compare(a, b));
        }

        let merged = MetaImage::from_sequence(images, self.merge_dim)?;
        let out_file = self.generator.out_path(&merged.const_meta())?;
        store.save(&merged, &out_file)?;
        Ok(MergeNiftiOutput { out_file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_order_from() {
        assert_eq!(SortOrder::from("EchoTime").keys(), ["EchoTime"]);
        assert_eq!(
            SortOrder::from(vec!["EchoTime".to_string()]),
            SortOrder::Key("EchoTime".to_string())
        );
        let keys = vec!["SeriesNumber".to_string(), "EchoTime".to_string()];
        assert_eq!(SortOrder::from(keys.clone()).keys(), keys.as_slice());

        let parsed: SortOrder = serde_json::from_str(r#"["A", "B"]"#).unwrap();
        assert_eq!(parsed.keys().len(), 2);
        let parsed: SortOrder = serde_json::from_str(r#""A""#).unwrap();
        assert_eq!(parsed, SortOrder::Key("A".to_string()));
    }
}
