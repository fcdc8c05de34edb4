use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dcmnifti::interfaces::{NiftiGenerator, DEFAULT_OUT_EXT};
use serde::Deserialize;

use crate::cli::{OutputArgs, StackArgs};

/// Settings file format. Every field is optional; values given on the
/// command line take precedence, regex lists are combined.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub out_ext: Option<String>,
    pub out_dir: Option<PathBuf>,
    pub embed_meta: Option<bool>,
    pub include_regexes: Vec<String>,
    pub exclude_regexes: Vec<String>,
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let settings = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        log::debug!("Loaded configuration from: {:?}", path);
        Ok(settings)
    }

    pub fn generator(&self, output: &OutputArgs, out_dir: Option<&Path>) -> NiftiGenerator {
        NiftiGenerator {
            out_format: output.out_format.clone(),
            out_ext: output
                .out_ext
                .clone()
                .or_else(|| self.out_ext.clone())
                .unwrap_or_else(|| DEFAULT_OUT_EXT.to_string()),
            out_dir: out_dir.map(Path::to_path_buf),
        }
    }

    pub fn embed_meta(&self, args: &StackArgs) -> bool {
        args.embed_meta || self.embed_meta.unwrap_or(false)
    }

    pub fn exclude_regexes(&self, args: &StackArgs) -> Vec<String> {
        self.exclude_regexes
            .iter()
            .chain(&args.exclude_regexes)
            .cloned()
            .collect()
    }

    pub fn include_regexes(&self, args: &StackArgs) -> Vec<String> {
        self.include_regexes
            .iter()
            .chain(&args.include_regexes)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"out_ext": ".nii", "embed_meta": true, "exclude_regexes": ["^Echo"]}"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        let generator = settings.generator(&OutputArgs::default(), None);
        assert_eq!(generator.out_ext, ".nii");

        let cli = OutputArgs {
            out_format: None,
            out_ext: Some(".nii.gz".to_string()),
        };
        assert_eq!(settings.generator(&cli, None).out_ext, ".nii.gz");

        let args = StackArgs {
            dicom_files: vec!["a.dcm".to_string()],
            embed_meta: false,
            exclude_regexes: vec!["^Rep".to_string()],
            include_regexes: Vec::new(),
            output: OutputArgs::default(),
        };
        assert!(settings.embed_meta(&args));
        assert_eq!(settings.exclude_regexes(&args), vec!["^Echo", "^Rep"]);
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{"out_extension": ".nii"}"#).unwrap();
        assert!(Settings::load(&path).is_err());
        assert!(Settings::load(&dir.path().join("missing.json")).is_err());
    }
}
