//! Classification-keyed meta data embedded in a NIfTI extension.
//!
//! Every key lives in exactly one classification. Keys that are the same
//! for the whole image are `global.const`; keys that vary are stored as
//! lists under the classification describing what they vary over.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde_json::{json, Map};

use crate::error::{Error, Result};

pub type MetaValue = serde_json::Value;
pub type MetaMap = BTreeMap<String, MetaValue>;
pub type Affine = [[f64; 4]; 4];

/// NIfTI extension code the meta data is stored under.
pub const META_ECODE: i32 = 0;
pub const META_VERSION: f64 = 0.6;

static EMPTY: MetaMap = BTreeMap::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Classification {
    GlobalConst,
    GlobalSlices,
    TimeSamples,
    TimeSlices,
    VectorSamples,
    VectorSlices,
}

impl Classification {
    pub const ALL: [Classification; 6] = [
        Classification::GlobalConst,
        Classification::GlobalSlices,
        Classification::TimeSamples,
        Classification::TimeSlices,
        Classification::VectorSamples,
        Classification::VectorSlices,
    ];

    pub fn base(self) -> &'static str {
        match self {
            Self::GlobalConst | Self::GlobalSlices => "global",
            Self::TimeSamples | Self::TimeSlices => "time",
            Self::VectorSamples | Self::VectorSlices => "vector",
        }
    }

    pub fn sub(self) -> &'static str {
        match self {
            Self::GlobalConst => "const",
            Self::GlobalSlices | Self::TimeSlices | Self::VectorSlices => "slices",
            Self::TimeSamples | Self::VectorSamples => "samples",
        }
    }

    pub fn is_const(self) -> bool {
        self == Self::GlobalConst
    }

    /// Minimum number of image dimensions for which this class is valid.
    pub fn min_ndim(self) -> usize {
        match self.base() {
            "time" => 4,
            "vector" => 5,
            _ => 0,
        }
    }

    /// Class holding values that vary along image axis `dim`.
    pub fn varying_along(dim: usize) -> Option<Self> {
        match dim {
            2 => Some(Self::GlobalSlices),
            3 => Some(Self::TimeSamples),
            4 => Some(Self::VectorSamples),
            _ => None,
        }
    }

    fn from_parts(base: &str, sub: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|cls| cls.base() == base && cls.sub() == sub)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.base(), self.sub())
    }
}

impl FromStr for Classification {
    type Err = Error;

    /// Accepts `global.const` as well as `global,const`.
    fn from_str(s: &str) -> Result<Self> {
        let (base, sub) = s
            .split_once(['.', ','])
            .ok_or_else(|| Error::InvalidInput(format!("invalid classification `{s}`")))?;
        Self::from_parts(base.trim(), sub.trim())
            .ok_or_else(|| Error::InvalidInput(format!("unknown classification `{s}`")))
    }
}

/// Order meta data values for sorting. Values of different kinds order by
/// kind (null, bool, number, string, list, dict).
pub fn compare_values(a: &MetaValue, b: &MetaValue) -> Ordering {
    fn rank(value: &MetaValue) -> u8 {
        match value {
            MetaValue::Null => 0,
            MetaValue::Bool(_) => 1,
            MetaValue::Number(_) => 2,
            MetaValue::String(_) => 3,
            MetaValue::Array(_) => 4,
            MetaValue::Object(_) => 5,
        }
    }

    match (a, b) {
        (MetaValue::Bool(a), MetaValue::Bool(b)) => a.cmp(b),
        (MetaValue::Number(a), MetaValue::Number(b)) => {
            let a = a.as_f64().unwrap_or(f64::NAN);
            let b = b.as_f64().unwrap_or(f64::NAN);
            a.total_cmp(&b)
        }
        (MetaValue::String(a), MetaValue::String(b)) => a.cmp(b),
        (MetaValue::Array(a), MetaValue::Array(b)) => a
            .iter()
            .zip(b)
            .map(|(a, b)| compare_values(a, b))
            .find(|ord| ord.is_ne())
            .unwrap_or_else(|| a.len().cmp(&b.len())),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Order two optional values, absent values first.
pub fn compare_optional(a: Option<&MetaValue>, b: Option<&MetaValue>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => compare_values(a, b),
        (a, b) => a.is_some().cmp(&b.is_some()),
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetaExtension {
    classes: BTreeMap<Classification, MetaMap>,
    pub shape: Vec<usize>,
    pub affine: Option<Affine>,
    pub slice_dim: Option<usize>,
}

impl MetaExtension {
    pub fn new(shape: &[usize]) -> Self {
        Self {
            shape: shape.to_vec(),
            ..Self::default()
        }
    }

    pub fn with_class(mut self, cls: Classification, dict: MetaMap) -> Self {
        self.classes.insert(cls, dict);
        self
    }

    /// Classes valid for the recorded shape.
    pub fn valid_classes(&self) -> Vec<Classification> {
        let ndim = self.shape.len();
        Classification::ALL
            .into_iter()
            .filter(|cls| cls.min_ndim() <= ndim)
            .collect()
    }

    pub fn class_dict(&self, cls: Classification) -> &MetaMap {
        self.classes.get(&cls).unwrap_or(&EMPTY)
    }

    pub fn class_dict_mut(&mut self, cls: Classification) -> &mut MetaMap {
        self.classes.entry(cls).or_default()
    }

    /// Set `key` under `cls`, removing it from every other classification.
    pub fn insert(&mut self, cls: Classification, key: String, value: MetaValue) {
        for (other, dict) in self.classes.iter_mut() {
            if *other != cls {
                dict.remove(&key);
            }
        }
        self.class_dict_mut(cls).insert(key, value);
    }

    pub fn const_dict(&self) -> &MetaMap {
        self.class_dict(Classification::GlobalConst)
    }

    pub fn is_empty(&self) -> bool {
        self.classes.values().all(BTreeMap::is_empty)
    }

    /// Value(s) and class of `key`; varying classes return the whole list.
    pub fn get_values_and_class(&self, key: &str) -> Option<(&MetaValue, Classification)> {
        Classification::ALL.into_iter().find_map(|cls| {
            self.classes
                .get(&cls)
                .and_then(|dict| dict.get(key))
                .map(|value| (value, cls))
        })
    }

    pub fn get_values(&self, key: &str) -> Option<&MetaValue> {
        self.get_values_and_class(key).map(|(value, _)| value)
    }

    /// Like [`get_values`](Self::get_values) but a missing key is an error.
    pub fn require_values(&self, key: &str) -> Result<&MetaValue> {
        self.get_values(key)
            .ok_or_else(|| Error::MissingMeta(key.to_string()))
    }

    pub fn to_json(&self) -> MetaValue {
        let mut root = Map::new();
        for (cls, dict) in &self.classes {
            let base = root
                .entry(cls.base())
                .or_insert_with(|| MetaValue::Object(Map::new()));
            if let MetaValue::Object(base) = base {
                let dict = dict.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                base.insert(cls.sub().to_string(), MetaValue::Object(dict));
            }
        }
        root.insert("dcmmeta_shape".to_string(), json!(self.shape));
        if let Some(affine) = &self.affine {
            root.insert("dcmmeta_affine".to_string(), json!(affine));
        }
        if let Some(slice_dim) = self.slice_dim {
            root.insert("dcmmeta_slice_dim".to_string(), json!(slice_dim));
        }
        root.insert("dcmmeta_version".to_string(), json!(META_VERSION));
        MetaValue::Object(root)
    }

    pub fn from_json(value: &MetaValue) -> Result<Self> {
        let root = value
            .as_object()
            .ok_or_else(|| Error::InvalidMeta("top level is not an object".to_string()))?;

        let mut ext = Self::default();
        for (name, entry) in root {
            match name.as_str() {
                "dcmmeta_shape" => {
                    ext.shape = serde_json::from_value(entry.clone())
                        .map_err(|err| Error::InvalidMeta(format!("dcmmeta_shape: {err}")))?;
                }
                "dcmmeta_affine" => {
                    ext.affine = serde_json::from_value(entry.clone())
                        .map_err(|err| Error::InvalidMeta(format!("dcmmeta_affine: {err}")))?;
                }
                "dcmmeta_slice_dim" => ext.slice_dim = entry.as_u64().map(|dim| dim as usize),
                name if name.starts_with("dcmmeta_") => {}
                base => {
                    let subs = entry.as_object().ok_or_else(|| {
                        Error::InvalidMeta(format!("`{base}` is not an object"))
                    })?;
                    for (sub, dict) in subs {
                        let cls = Classification::from_parts(base, sub).ok_or_else(|| {
                            Error::InvalidMeta(format!("unknown classification {base}.{sub}"))
                        })?;
                        let dict = dict.as_object().ok_or_else(|| {
                            Error::InvalidMeta(format!("{cls} is not an object"))
                        })?;
                        ext.classes.insert(
                            cls,
                            dict.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
                        );
                    }
                }
            }
        }
        Ok(ext)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        // Extension records are padded to 16 bytes with NULs.
        let end = bytes
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |pos| pos + 1);
        let value: MetaValue = serde_json::from_slice(&bytes[..end])
            .map_err(|err| Error::InvalidMeta(err.to_string()))?;
        Self::from_json(&value)
    }

    /// Merge the extensions of images concatenated along `dim`. Every input
    /// contributes one index along `dim`; `per_slice` is the number of
    /// entries each slice has in `global.slices` (product of the dims
    /// above the slice dim).
    pub fn from_sequence(inputs: &[&MetaExtension], dim: usize, per_slice: usize) -> Self {
        let mut merged = MetaExtension::default();
        let target = Classification::varying_along(dim);

        let mut keys: Vec<&String> = inputs
            .iter()
            .flat_map(|ext| {
                let varying = target.map(|cls| ext.class_dict(cls)).unwrap_or(&EMPTY);
                ext.const_dict().keys().chain(varying.keys())
            })
            .collect();
        keys.sort();
        keys.dedup();

        for key in keys {
            let all_const = inputs.iter().all(|ext| ext.const_dict().contains_key(key));
            if all_const {
                let first = &inputs[0].const_dict()[key];
                if inputs.iter().all(|ext| &ext.const_dict()[key] == first) {
                    merged
                        .class_dict_mut(Classification::GlobalConst)
                        .insert(key.clone(), first.clone());
                    continue;
                }
            }

            let Some(target) = target else {
                log::warn!("dropping varying meta data key `{key}` merged along dim {dim}");
                continue;
            };

            let width = if target == Classification::GlobalSlices {
                per_slice
            } else {
                1
            };
            let samples: Vec<Vec<MetaValue>> = inputs
                .iter()
                .map(|ext| {
                    if let Some(value) = ext.const_dict().get(key) {
                        vec![value.clone(); width]
                    } else if let Some(MetaValue::Array(values)) = ext.class_dict(target).get(key) {
                        values.clone()
                    } else {
                        vec![MetaValue::Null; width]
                    }
                })
                .collect();

            let values = if target == Classification::GlobalSlices {
                interleave(&samples)
            } else {
                samples.into_iter().flatten().collect()
            };
            merged
                .class_dict_mut(target)
                .insert(key.clone(), MetaValue::Array(values));
        }

        for cls in Classification::ALL {
            if cls.is_const() || Some(cls) == target {
                continue;
            }
            let mut keys: Vec<&String> = inputs
                .iter()
                .flat_map(|ext| ext.class_dict(cls).keys())
                .collect();
            keys.sort();
            keys.dedup();

            for key in keys {
                let values: Option<Vec<&MetaValue>> = inputs
                    .iter()
                    .map(|ext| ext.class_dict(cls).get(key))
                    .collect();
                let Some(values) = values else {
                    log::warn!("dropping meta data key `{key}` missing from some {cls} inputs");
                    continue;
                };

                if values.iter().all(|value| *value == values[0]) {
                    merged
                        .class_dict_mut(cls)
                        .insert(key.clone(), values[0].clone());
                } else if cls == Classification::GlobalSlices
                    || (cls == Classification::TimeSlices && dim == 3)
                {
                    // Slice lists are indexed with the outer dims varying
                    // slowest, so merging along an outer dim concatenates.
                    let concatenated = values
                        .iter()
                        .flat_map(|value| match value {
                            MetaValue::Array(items) => items.clone(),
                            other => vec![(*other).clone()],
                        })
                        .collect();
                    merged
                        .class_dict_mut(Classification::GlobalSlices)
                        .insert(key.clone(), MetaValue::Array(concatenated));
                } else {
                    log::warn!("dropping {cls} meta data key `{key}` that differs between inputs");
                }
            }
        }

        merged
    }

    /// Split into `count` pieces along `dim`. `piece_ndim` is the number of
    /// dims each piece keeps, used to drop classes that no longer apply.
    pub fn split(&self, dim: usize, count: usize, piece_ndim: usize) -> Vec<MetaExtension> {
        let target = Classification::varying_along(dim);

        (0..count)
            .map(|index| {
                let mut piece = MetaExtension {
                    slice_dim: self.slice_dim,
                    ..MetaExtension::default()
                };
                piece
                    .classes
                    .insert(Classification::GlobalConst, self.const_dict().clone());

                for (cls, dict) in &self.classes {
                    if cls.is_const() {
                        continue;
                    }
                    for (key, value) in dict {
                        let MetaValue::Array(values) = value else {
                            piece.class_dict_mut(*cls).insert(key.clone(), value.clone());
                            continue;
                        };

                        let is_target = Some(*cls) == target;
                        let (dest, picked) = if is_target && *cls != Classification::GlobalSlices {
                            if values.len() != count {
                                log::warn!(
                                    "dropping {cls} meta data key `{key}`: {} values for {count} pieces",
                                    values.len()
                                );
                                continue;
                            }
                            (Classification::GlobalConst, vec![values[index].clone()])
                        } else if *cls == Classification::GlobalSlices {
                            if values.len() % count != 0 {
                                log::warn!(
                                    "dropping {cls} meta data key `{key}`: {} values for {count} pieces",
                                    values.len()
                                );
                                continue;
                            }
                            let picked = if dim == 2 {
                                values.iter().skip(index).step_by(count).cloned().collect()
                            } else {
                                let chunk = values.len() / count;
                                values[index * chunk..(index + 1) * chunk].to_vec()
                            };
                            (Classification::GlobalSlices, picked)
                        } else if *cls == Classification::TimeSlices && dim == 3 {
                            (Classification::GlobalSlices, values.clone())
                        } else {
                            (*cls, values.clone())
                        };

                        if dest.min_ndim() > piece_ndim {
                            continue;
                        }
                        let collapsed = !picked.is_empty()
                            && picked.iter().all(|value| *value == picked[0]);
                        if dest.is_const() || collapsed {
                            piece
                                .class_dict_mut(Classification::GlobalConst)
                                .insert(key.clone(), picked[0].clone());
                        } else {
                            piece
                                .class_dict_mut(dest)
                                .insert(key.clone(), MetaValue::Array(picked));
                        }
                    }
                }
                piece
            })
            .collect()
    }
}

/// `global.slices` lists are indexed `t * n_slices + z`; merging slices
/// interleaves the per-slice lists accordingly.
fn interleave(per_slice: &[Vec<MetaValue>]) -> Vec<MetaValue> {
    let len = per_slice.iter().map(Vec::len).min().unwrap_or(0);
    (0..len)
        .flat_map(|t| per_slice.iter().map(move |values| values[t].clone()))
        .collect()
}
