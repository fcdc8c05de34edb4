//! Wrappers for the Camino diffusion MRI toolkit.

pub mod model_fit;

pub use model_fit::{ModelFit, ModelFitOutput};
