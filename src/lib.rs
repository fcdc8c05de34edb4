//! Stack DICOM series into NIfTI volumes and edit the meta data embedded
//! in NIfTI extensions.

pub mod camino;
pub mod error;
pub mod interfaces;
pub mod io;
pub mod model;
pub mod stack;
pub mod utils;

pub use error::{Error, Result};
