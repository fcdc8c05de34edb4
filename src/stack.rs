//! Stacking of DICOM slices into volumes.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use ndarray::{ArrayD, IxDyn};

use crate::error::{Error, Result};
use crate::model::image::IDENTITY;
use crate::model::meta::{compare_optional, Affine};
use crate::model::{Classification, DicomSlice, KeyFilter, MetaExtension, MetaImage, MetaMap, MetaValue};
use crate::utils::formatting::format_named;

/// Meta data keys identifying the series a slice belongs to.
pub const DEFAULT_GROUP_KEYS: &[&str] = &[
    "SeriesInstanceUID",
    "SeriesNumber",
    "ProtocolName",
    "ImageOrientationPatient",
];

const POSITION_TOLERANCE: f64 = 1e-4;

/// Accumulates slices of one series and turns them into a volume.
#[derive(Debug, Clone, Default)]
pub struct DicomStack {
    filter: KeyFilter,
    slices: Vec<DicomSlice>,
}

impl DicomStack {
    pub fn new(filter: KeyFilter) -> Self {
        Self {
            filter,
            slices: Vec::new(),
        }
    }

    pub fn add_slice(&mut self, slice: DicomSlice) {
        log::debug!("adding {} to stack", slice.file_path.display());
        self.slices.push(slice);
    }

    pub fn len(&self) -> usize {
        self.slices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }

    /// Build the volume with its meta data extension. Slices are ordered
    /// by position along the slice normal; slices sharing a position form a
    /// time series.
    pub fn to_image(&self) -> Result<MetaImage> {
        let first = self.slices.first().ok_or(Error::EmptyStack)?;
        let (rows, columns) = (first.rows(), first.columns());
        let orientation = first.orientation();

        for slice in &self.slices[1..] {
            if slice.rows() != rows || slice.columns() != columns {
                return Err(Error::IncongruentImage(format!(
                    "{}: {}x{} pixels, expected {rows}x{columns}",
                    slice.file_path.display(),
                    slice.rows(),
                    slice.columns()
                )));
            }
            let same_orientation = slice
                .orientation()
                .iter()
                .zip(orientation)
                .all(|(a, b)| (a - b).abs() < POSITION_TOLERANCE);
            if !same_orientation {
                return Err(Error::IncongruentImage(format!(
                    "{}: orientation differs from the first slice",
                    slice.file_path.display()
                )));
            }
        }

        let positions = self.position_groups()?;
        let n_slices = positions.len();
        let n_times = positions[0].len();
        if positions.iter().any(|group| group.len() != n_times) {
            return Err(Error::IncongruentImage(
                "incomplete time series: positions have differing slice counts".to_string(),
            ));
        }

        let mut shape = vec![columns, rows, n_slices];
        if n_times > 1 {
            shape.push(n_times);
        }
        let mut data = ArrayD::<f64>::zeros(IxDyn(&shape));
        for (z, group) in positions.iter().enumerate() {
            for (t, &index) in group.iter().enumerate() {
                for ((r, c), &value) in self.slices[index].pixels.indexed_iter() {
                    if n_times > 1 {
                        data[[c, r, z, t]] = value;
                    } else {
                        data[[c, r, z]] = value;
                    }
                }
            }
        }

        let affine = self.affine(&positions);
        let mut meta = self.meta_extension(&positions);
        meta.shape = shape;
        meta.affine = Some(affine);
        meta.slice_dim = Some(2);

        log::debug!(
            "stacked {} slice(s) into {:?}",
            self.slices.len(),
            data.shape()
        );
        Ok(MetaImage::new(data, affine).with_meta(meta))
    }

    /// Slice indices grouped by position (ascending), each group in time
    /// order.
    fn position_groups(&self) -> Result<Vec<Vec<usize>>> {
        let locations: Vec<Option<f64>> = self.slices.iter().map(DicomSlice::slice_location).collect();

        let mut groups: Vec<(f64, Vec<usize>)> = Vec::new();
        if locations.iter().all(Option::is_none) {
            // Without positions every slice is its own location, in input order.
            groups = (0..self.slices.len()).map(|i| (i as f64, vec![i])).collect();
        } else {
            let mut located = Vec::with_capacity(locations.len());
            for (index, location) in locations.iter().enumerate() {
                let location = location.ok_or_else(|| {
                    Error::IncongruentImage(format!(
                        "{}: missing ImagePositionPatient",
                        self.slices[index].file_path.display()
                    ))
                })?;
                located.push((location, index));
            }
            located.sort_by(|a, b| a.0.total_cmp(&b.0));

            for (location, index) in located {
                match groups.last_mut() {
                    Some((last, members)) if (location - *last).abs() < POSITION_TOLERANCE => {
                        members.push(index)
                    }
                    _ => groups.push((location, vec![index])),
                }
            }
        }

        Ok(groups
            .into_iter()
            .map(|(_, mut members)| {
                members.sort_by(|&a, &b| self.compare_time(a, b));
                members
            })
            .collect())
    }

    fn compare_time(&self, a: usize, b: usize) -> Ordering {
        let (a, b) = (&self.slices[a], &self.slices[b]);
        ["AcquisitionTime", "InstanceNumber"]
            .iter()
            .map(|key| {
                let a = a.number(key).map(MetaValue::from);
                let b = b.number(key).map(MetaValue::from);
                compare_optional(a.as_ref(), b.as_ref())
            })
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    fn affine(&self, positions: &[Vec<usize>]) -> Affine {
        let first = &self.slices[positions[0][0]];
        let o = first.orientation();
        let [row_spacing, column_spacing] = first.pixel_spacing();
        let normal = first.slice_normal();

        let location = |z: usize| {
            positions
                .get(z)
                .and_then(|group| self.slices[group[0]].slice_location())
        };
        let slice_spacing = match (location(0), location(1)) {
            (Some(a), Some(b)) => b - a,
            _ => first
                .number("SpacingBetweenSlices")
                .or_else(|| first.number("SliceThickness"))
                .unwrap_or(1.0),
        };
        let origin = first.position().unwrap_or([0.0; 3]);

        let mut affine = IDENTITY;
        for axis in 0..3 {
            affine[axis][0] = o[axis] * column_spacing;
            affine[axis][1] = o[axis + 3] * row_spacing;
            affine[axis][2] = normal[axis] * slice_spacing;
            affine[axis][3] = origin[axis];
        }
        // DICOM patient space is LPS, NIfTI is RAS.
        for row in affine.iter_mut().take(2) {
            for value in row.iter_mut() {
                *value = -*value;
            }
        }
        affine
    }

    fn meta_extension(&self, positions: &[Vec<usize>]) -> MetaExtension {
        let n_slices = positions.len();
        let n_times = positions[0].len();

        // Slice order of `global.slices`: t * n_slices + z.
        let ordered: Vec<MetaMap> = (0..n_times)
            .flat_map(|t| positions.iter().map(move |group| group[t]))
            .map(|index| {
                self.slices[index]
                    .meta
                    .iter()
                    .filter(|(key, _)| !self.filter.is_excluded(key))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            })
            .collect();

        let mut keys: Vec<&String> = ordered.iter().flat_map(|meta| meta.keys()).collect();
        keys.sort();
        keys.dedup();

        let mut ext = MetaExtension::default();
        for key in keys {
            let values: Vec<MetaValue> = ordered
                .iter()
                .map(|meta| meta.get(key).cloned().unwrap_or(MetaValue::Null))
                .collect();
            let present = ordered.iter().all(|meta| meta.contains_key(key));

            if present && all_equal(&values) {
                ext.class_dict_mut(Classification::GlobalConst)
                    .insert(key.clone(), values[0].clone());
                continue;
            }

            if n_times > 1 {
                let per_time: Vec<&[MetaValue]> = values.chunks(n_slices).collect();
                if per_time.iter().all(|block| all_equal(block)) {
                    let samples = per_time.iter().map(|block| block[0].clone()).collect();
                    ext.class_dict_mut(Classification::TimeSamples)
                        .insert(key.clone(), MetaValue::Array(samples));
                    continue;
                }
                let constant_over_time = (0..n_slices).all(|z| {
                    per_time.iter().all(|block| block[z] == per_time[0][z])
                });
                if constant_over_time {
                    ext.class_dict_mut(Classification::TimeSlices)
                        .insert(key.clone(), MetaValue::Array(per_time[0].to_vec()));
                    continue;
                }
            }

            ext.class_dict_mut(Classification::GlobalSlices)
                .insert(key.clone(), MetaValue::Array(values));
        }
        ext
    }
}

fn all_equal(values: &[MetaValue]) -> bool {
    values.iter().all(|value| *value == values[0])
}

/// Key identifying the stack a slice belongs to. Keys order like tuples of
/// meta data values, absent values first.
#[derive(Debug, Clone)]
pub struct GroupKey(pub Vec<Option<MetaValue>>);

impl GroupKey {
    fn of(slice: &DicomSlice, key_format: Option<&str>) -> Result<Self> {
        match key_format {
            Some(template) => Ok(Self(vec![Some(MetaValue::String(format_named(
                template,
                &slice.meta,
            )?))])),
            None => Ok(Self(
                DEFAULT_GROUP_KEYS
                    .iter()
                    .map(|&key| {
                        let value = slice.meta.get(key)?;
                        Some(match key {
                            "ImageOrientationPatient" => round_orientation(value),
                            _ => value.clone(),
                        })
                    })
                    .collect(),
            )),
        }
    }
}

/// Orientation cosines rounded to [`POSITION_TOLERANCE`], so jitter in
/// the decimal strings does not split a series.
fn round_orientation(value: &MetaValue) -> MetaValue {
    match value {
        MetaValue::Array(cosines) => MetaValue::Array(cosines.iter().map(round_orientation).collect()),
        MetaValue::Number(_) => value
            .as_f64()
            .map(|cosine| {
                let rounded = (cosine / POSITION_TOLERANCE).round() * POSITION_TOLERANCE;
                // -0.0 and 0.0 must form one key.
                MetaValue::from(rounded + 0.0)
            })
            .unwrap_or_else(|| value.clone()),
        _ => value.clone(),
    }
}

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .iter()
            .zip(&other.0)
            .map(|(a, b)| compare_optional(a.as_ref(), b.as_ref()))
            .find(|ord| ord.is_ne())
            .unwrap_or_else(|| self.0.len().cmp(&other.0.len()))
    }
}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GroupKey {}

/// Partition slices into stacks, ordered by group key. With a key format
/// the rendered format is the key, otherwise [`DEFAULT_GROUP_KEYS`].
pub fn group_slices(
    slices: Vec<DicomSlice>,
    key_format: Option<&str>,
    filter: &KeyFilter,
) -> Result<BTreeMap<GroupKey, DicomStack>> {
    let mut stacks: BTreeMap<GroupKey, DicomStack> = BTreeMap::new();
    for slice in slices {
        let key = GroupKey::of(&slice, key_format)?;
        stacks
            .entry(key)
            .or_insert_with(|| DicomStack::new(filter.clone()))
            .add_slice(slice);
    }
    log::debug!("partitioned slices into {} stack(s)", stacks.len());
    Ok(stacks)
}
