pub mod dicom_slice;
pub mod filter;
pub mod image;
pub mod meta;

pub use dicom_slice::DicomSlice;
pub use filter::KeyFilter;
pub use image::MetaImage;
pub use meta::{Classification, MetaExtension, MetaMap, MetaValue};
