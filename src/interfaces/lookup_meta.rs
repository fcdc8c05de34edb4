use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::io::ImageStore;
use crate::model::MetaValue;

/// Lookup meta data values from a NIfTI file with an embedded extension.
#[derive(Debug, Clone, Default)]
pub struct LookupMeta {
    pub in_file: Option<PathBuf>,
    pub meta_keys: Vec<String>,
}

/// Value per requested key, `None` when the key is absent. Keys of varying
/// classifications map to the whole list of values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct LookupMetaOutput(pub BTreeMap<String, Option<MetaValue>>);

impl LookupMeta {
    pub fn run<S: ImageStore>(&self, store: &S) -> Result<LookupMetaOutput> {
        let in_file = self.in_file.as_ref().ok_or(Error::MissingInput("in_file"))?;
        if self.meta_keys.is_empty() {
            return Err(Error::MissingInput("meta_keys"));
        }

        let image = store.load(in_file)?;
        if image.meta.is_none() {
            log::warn!("{}: no meta data extension", in_file.display());
        }
        let values = self
            .meta_keys
            .iter()
            .map(|key| {
                let value = image
                    .meta
                    .as_ref()
                    .and_then(|meta| meta.get_values(key))
                    .cloned();
                (key.clone(), value)
            })
            .collect();
        Ok(LookupMetaOutput(values))
    }
}
