use std::fs;
use std::path::Path;

use dicom::core::dictionary::DataDictionary;
use dicom::core::header::Header;
use dicom::core::value::{PrimitiveValue, Value};
use dicom::core::VR;
use dicom::dictionary_std::{tags, StandardDataDictionary};
use dicom::object::mem::InMemElement;
use dicom::object::{DefaultDicomObject, FileMetaTableBuilder, InMemDicomObject, OpenFileOptions};
use dicom::pixeldata::PixelDecoder;
use dicom::transfer_syntax::entries;
use ndarray::Array2;

use super::DicomReader;
use crate::error::{Error, Result};
use crate::model::{DicomSlice, MetaMap, MetaValue};

/// Reads DICOM files from disk, with or without the 128 byte preamble.
/// Files lacking the file meta group are read as bare data sets.
#[derive(Debug, Clone, Copy, Default)]
pub struct DicomFileReader;

impl DicomReader for DicomFileReader {
    fn read_slice(&self, path: &Path) -> Result<DicomSlice> {
        log::info!("Loading DICOM file: {}", path.display());
        let object = match OpenFileOptions::new().open_file(path) {
            Ok(object) => object,
            Err(err) => {
                log::warn!("{}: {err}, retrying as a bare data set", path.display());
                read_bare_dataset(path).map_err(|reason| {
                    let error = parse_error(path, format!("failed to open DICOM file ({err}; {reason})"));
                    log::error!("{error}");
                    error
                })?
            }
        };

        let meta = collect_meta(&object);
        let pixels = first_frame(path, &object)?;
        Ok(DicomSlice::new(path, meta, pixels))
    }
}

/// Forced read of a data set without preamble or file meta group, as
/// implicit then explicit VR little endian. A file meta group is added
/// so the pixel data can be decoded.
fn read_bare_dataset(path: &Path) -> std::result::Result<DefaultDicomObject, String> {
    let bytes = fs::read(path).map_err(|err| err.to_string())?;
    // Data sets open with a low group number, element lengths are
    // only trusted after that.
    let first_group = bytes
        .get(..2)
        .map(|group| u16::from_le_bytes([group[0], group[1]]));
    if !matches!(first_group, Some(0x0002..=0x0008)) {
        return Err("not a DICOM data set".to_string());
    }
    let mut reason = String::new();
    for ts in [
        entries::IMPLICIT_VR_LITTLE_ENDIAN.erased(),
        entries::EXPLICIT_VR_LITTLE_ENDIAN.erased(),
    ] {
        match InMemDicomObject::read_dataset_with_ts(bytes.as_slice(), &ts) {
            Ok(dataset) if dataset.get(tags::PIXEL_DATA).is_some() => {
                return dataset
                    .with_meta(FileMetaTableBuilder::new().transfer_syntax(ts.uid()))
                    .map_err(|err| err.to_string());
            }
            Ok(_) => reason = format!("no pixel data as {}", ts.name()),
            Err(err) => reason = format!("{err} as {}", ts.name()),
        }
    }
    Err(reason)
}

/// Standard, non-binary elements keyed by their dictionary keyword.
fn collect_meta(object: &DefaultDicomObject) -> MetaMap {
    let mut meta = MetaMap::new();
    for element in object.iter() {
        let tag = element.tag();
        if tag == tags::PIXEL_DATA || tag.group() % 2 == 1 {
            continue;
        }
        let Some(alias) = StandardDataDictionary.by_tag(tag).map(|entry| entry.alias) else {
            continue;
        };
        if let Some(value) = element_value(element) {
            meta.insert(alias.to_string(), value);
        }
    }
    meta
}

fn element_value(element: &InMemElement) -> Option<MetaValue> {
    let vr = element.vr();
    let Value::Primitive(primitive) = element.value() else {
        return None;
    };
    if matches!(primitive, PrimitiveValue::Empty) || is_binary_vr(vr) {
        return None;
    }

    let mut values: Vec<MetaValue> = match vr {
        VR::DS | VR::FL | VR::FD => element
            .to_multi_float64()
            .ok()?
            .into_iter()
            .map(MetaValue::from)
            .collect(),
        VR::IS | VR::SL | VR::SS | VR::SV | VR::UL | VR::US | VR::UV => element
            .to_multi_int::<i64>()
            .ok()?
            .into_iter()
            .map(MetaValue::from)
            .collect(),
        _ => element
            .to_str()
            .ok()?
            .split('\\')
            .map(|part| MetaValue::from(part.trim_matches(|c: char| c.is_whitespace() || c == '\0')))
            .collect(),
    };

    match values.len() {
        0 => None,
        1 => values.pop(),
        _ => Some(MetaValue::Array(values)),
    }
}

fn is_binary_vr(vr: VR) -> bool {
    matches!(
        vr,
        VR::OB | VR::OD | VR::OF | VR::OL | VR::OV | VR::OW | VR::UN | VR::SQ
    )
}

/// First frame as `(rows, columns)`.
fn first_frame(path: &Path, object: &DefaultDicomObject) -> Result<Array2<f64>> {
    let decoded = object
        .decode_pixel_data()
        .map_err(|err| parse_error(path, format!("failed to decode pixel data ({err})")))?;
    if decoded.number_of_frames() == 0 {
        return Err(parse_error(path, "no frames"));
    }

    let rows = decoded.rows() as usize;
    let columns = decoded.columns() as usize;
    let samples_per_pixel = usize::from(decoded.samples_per_pixel().max(1));
    let mut samples = decoded
        .to_vec_frame::<f64>(0)
        .map_err(|err| parse_error(path, format!("failed to materialize frame data ({err})")))?;
    if samples.len() < rows * columns * samples_per_pixel {
        return Err(parse_error(
            path,
            format!(
                "{} samples for a {rows}x{columns} frame with {samples_per_pixel} sample(s) per pixel",
                samples.len()
            ),
        ));
    }
    if samples_per_pixel > 1 {
        // Frames are interleaved, one run of samples per pixel.
        log::warn!(
            "{}: {samples_per_pixel} samples per pixel, keeping the first channel",
            path.display()
        );
        samples = samples.into_iter().step_by(samples_per_pixel).collect();
    }
    samples.truncate(rows * columns);

    Array2::from_shape_vec((rows, columns), samples)
        .map_err(|err| parse_error(path, err.to_string()))
}

fn parse_error(path: &Path, message: impl Into<String>) -> Error {
    Error::DicomParse {
        path: path.to_path_buf(),
        message: message.into(),
    }
}
