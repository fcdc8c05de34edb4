use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::json;

use crate::error::{Error, Result};
use crate::interfaces::command_line::{
    build_args, build_cmdline, run_shell, SpecTable, TerminalOutput, TraitSpec,
};
use crate::interfaces::output_dir;
use crate::model::MetaValue;

/// Model names `modelfit` accepts. Multi-compartment models are given as
/// space separated names, e.g. `cylcyl ldt_wtd`.
pub const MODELS: &[&str] = &[
    "dt",
    "restore",
    "algdt",
    "nldt_pos",
    "nldt",
    "ldt_wtd",
    "adc",
    "ball_stick",
    "cylcyl",
    "cylcyl_eq",
    "pospos",
    "pospos_eq",
    "poscyl",
    "poscyl_eq",
    "cylcylcyl",
    "cylcylcyl_eq",
    "pospospos",
    "pospospos_eq",
    "posposcyl",
    "posposcyl_eq",
    "poscylcyl",
    "poscylcyl_eq",
];

pub const INPUT_DATA_TYPES: &[&str] = &["char", "short", "int", "long", "float", "double"];

/// Fits models of the diffusion signal to the data with Camino `modelfit`.
#[derive(Debug, Clone, Default)]
pub struct ModelFit {
    /// Extra arguments appended verbatim.
    pub args: Option<String>,
    pub bgmask: Option<PathBuf>,
    pub bgthresh: Option<f64>,
    pub cfthresh: Option<f64>,
    pub environ: BTreeMap<String, String>,
    pub fixedbvalue: Option<String>,
    pub fixedmodq: Option<String>,
    pub ignore_exception: bool,
    pub in_file: Option<PathBuf>,
    pub inputdatatype: Option<String>,
    pub model: Option<String>,
    pub noisemap: Option<PathBuf>,
    /// Generated from `in_file` when unset.
    pub out_file: Option<PathBuf>,
    pub outlier: Option<PathBuf>,
    pub outputfile: Option<PathBuf>,
    pub residualmap: Option<PathBuf>,
    pub scheme_file: Option<PathBuf>,
    pub sigma: Option<f64>,
    pub tau: Option<f64>,
    pub terminal_output: TerminalOutput,
    /// Directory generated outputs go to, the working directory by default.
    pub out_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelFitOutput {
    pub fitted_data: PathBuf,
}

impl ModelFit {
    pub const CMD: &'static str = "modelfit";

    pub fn input_spec() -> SpecTable {
        BTreeMap::from([
            ("args", TraitSpec::new().argstr("%s")),
            ("bgmask", TraitSpec::new().argstr("-bgmask %s")),
            ("bgthresh", TraitSpec::new().argstr("-bgthresh %G")),
            ("cfthresh", TraitSpec::new().argstr("-csfthresh %G")),
            ("environ", TraitSpec::new().nohash().usedefault()),
            ("fixedbvalue", TraitSpec::new().argstr("-fixedbvalue %s")),
            ("fixedmodq", TraitSpec::new().argstr("-fixedmod %s")),
            ("ignore_exception", TraitSpec::new().nohash().usedefault()),
            ("in_file", TraitSpec::new().argstr("-inputfile %s").mandatory()),
            ("inputdatatype", TraitSpec::new().argstr("-inputdatatype %s")),
            ("model", TraitSpec::new().argstr("-model %s").mandatory()),
            ("noisemap", TraitSpec::new().argstr("-noisemap %s")),
            ("out_file", TraitSpec::new().argstr("> %s").genfile().position(-1)),
            ("outlier", TraitSpec::new().argstr("-outliermap %s")),
            ("outputfile", TraitSpec::new().argstr("-outputfile %s")),
            ("residualmap", TraitSpec::new().argstr("-residualmap %s")),
            ("scheme_file", TraitSpec::new().argstr("-schemefile %s").mandatory()),
            ("sigma", TraitSpec::new().argstr("-sigma %G")),
            ("tau", TraitSpec::new().argstr("-tau %G")),
            ("terminal_output", TraitSpec::new().mandatory().nohash()),
        ])
    }

    pub fn output_spec() -> SpecTable {
        BTreeMap::from([("fitted_data", TraitSpec::new())])
    }

    /// `<in_file stem>_fit.Bdouble` in the output directory, unless
    /// `out_file` is set.
    pub fn out_file(&self) -> Result<PathBuf> {
        if let Some(out_file) = &self.out_file {
            return Ok(out_file.clone());
        }
        let in_file = self.in_file.as_ref().ok_or(Error::MissingInput("in_file"))?;
        let stem = file_stem(in_file);
        Ok(output_dir(self.out_dir.as_deref())?.join(format!("{stem}_fit.Bdouble")))
    }

    pub fn cmdline(&self) -> Result<String> {
        self.validate()?;
        let args = build_args(&Self::input_spec(), &self.arg_values()?)?;
        Ok(build_cmdline(Self::CMD, &args))
    }

    pub fn run(&self) -> Result<ModelFitOutput> {
        let cmdline = self.cmdline()?;
        run_shell(
            &cmdline,
            &self.environ,
            self.terminal_output,
            self.ignore_exception,
        )?;
        self.outputs()
    }

    pub fn outputs(&self) -> Result<ModelFitOutput> {
        let out_file = self.out_file()?;
        let fitted_data = if out_file.is_absolute() {
            out_file
        } else {
            std::env::current_dir()?.join(out_file)
        };
        Ok(ModelFitOutput { fitted_data })
    }

    fn validate(&self) -> Result<()> {
        if let Some(model) = &self.model {
            let known = !model.trim().is_empty()
                && model.split_whitespace().all(|name| MODELS.contains(&name));
            if !known {
                return Err(Error::InvalidInput(format!("unknown model `{model}`")));
            }
        }
        if let Some(datatype) = &self.inputdatatype {
            if !INPUT_DATA_TYPES.contains(&datatype.as_str()) {
                return Err(Error::InvalidInput(format!(
                    "unknown input data type `{datatype}`"
                )));
            }
        }
        Ok(())
    }

    fn arg_values(&self) -> Result<BTreeMap<&'static str, MetaValue>> {
        let path = |path: &Option<PathBuf>| path.as_ref().map(|path| json!(path.to_string_lossy()));
        let mut values = BTreeMap::from([
            ("args", self.args.as_ref().map(|args| json!(args))),
            ("bgmask", path(&self.bgmask)),
            ("bgthresh", self.bgthresh.map(|value| json!(value))),
            ("cfthresh", self.cfthresh.map(|value| json!(value))),
            ("fixedbvalue", self.fixedbvalue.as_ref().map(|value| json!(value))),
            ("fixedmodq", self.fixedmodq.as_ref().map(|value| json!(value))),
            ("in_file", path(&self.in_file)),
            ("inputdatatype", self.inputdatatype.as_ref().map(|value| json!(value))),
            ("model", self.model.as_ref().map(|value| json!(value))),
            ("noisemap", path(&self.noisemap)),
            ("outlier", path(&self.outlier)),
            ("outputfile", path(&self.outputfile)),
            ("residualmap", path(&self.residualmap)),
            ("scheme_file", path(&self.scheme_file)),
            ("sigma", self.sigma.map(|value| json!(value))),
            ("tau", self.tau.map(|value| json!(value))),
            ("terminal_output", Some(json!(self.terminal_output.as_str()))),
        ]);
        if self.in_file.is_some() {
            values.insert("out_file", Some(json!(self.out_file()?.to_string_lossy())));
        }
        Ok(values
            .into_iter()
            .filter_map(|(name, value)| value.map(|value| (name, value)))
            .collect())
    }
}

/// File name without any extensions, `dwi.Bfloat.gz` to `dwi`.
fn file_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.split_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fit() -> ModelFit {
        ModelFit {
            in_file: Some(PathBuf::from("/data/dwi.Bfloat")),
            scheme_file: Some(PathBuf::from("/data/A.scheme")),
            model: Some("dt".to_string()),
            out_dir: Some(PathBuf::from("/work")),
            ..ModelFit::default()
        }
    }

    #[test]
    fn test_input_map() {
        let expected = [
            ("args", Some("%s"), false, false, false, false, None),
            ("bgmask", Some("-bgmask %s"), false, false, false, false, None),
            ("bgthresh", Some("-bgthresh %G"), false, false, false, false, None),
            ("cfthresh", Some("-csfthresh %G"), false, false, false, false, None),
            ("environ", None, false, true, true, false, None),
            ("fixedbvalue", Some("-fixedbvalue %s"), false, false, false, false, None),
            ("fixedmodq", Some("-fixedmod %s"), false, false, false, false, None),
            ("ignore_exception", None, false, true, true, false, None),
            ("in_file", Some("-inputfile %s"), true, false, false, false, None),
            ("inputdatatype", Some("-inputdatatype %s"), false, false, false, false, None),
            ("model", Some("-model %s"), true, false, false, false, None),
            ("noisemap", Some("-noisemap %s"), false, false, false, false, None),
            ("out_file", Some("> %s"), false, false, false, true, Some(-1)),
            ("outlier", Some("-outliermap %s"), false, false, false, false, None),
            ("outputfile", Some("-outputfile %s"), false, false, false, false, None),
            ("residualmap", Some("-residualmap %s"), false, false, false, false, None),
            ("scheme_file", Some("-schemefile %s"), true, false, false, false, None),
            ("sigma", Some("-sigma %G"), false, false, false, false, None),
            ("tau", Some("-tau %G"), false, false, false, false, None),
            ("terminal_output", None, true, true, false, false, None),
        ];
        let specs = ModelFit::input_spec();
        assert_eq!(specs.len(), expected.len());
        for (name, argstr, mandatory, nohash, usedefault, genfile, position) in expected {
            let spec = specs[name];
            assert_eq!(
                spec,
                TraitSpec {
                    argstr,
                    mandatory,
                    nohash,
                    usedefault,
                    genfile,
                    position,
                },
                "{name}"
            );
        }
    }

    #[test]
    fn test_output_map() {
        let specs = ModelFit::output_spec();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs["fitted_data"], TraitSpec::default());
    }

    #[test]
    fn test_cmdline() {
        let mut fit = fit();
        fit.sigma = Some(0.0001);
        fit.bgthresh = Some(200.0);
        fit.inputdatatype = Some("float".to_string());
        assert_eq!(
            fit.cmdline().unwrap(),
            "modelfit -bgthresh 200 -inputfile /data/dwi.Bfloat -inputdatatype float \
             -model dt -schemefile /data/A.scheme -sigma 0.0001 > /work/dwi_fit.Bdouble"
        );
    }

    #[test]
    fn test_outputs() {
        assert_eq!(
            fit().outputs().unwrap().fitted_data,
            PathBuf::from("/work/dwi_fit.Bdouble")
        );
        let explicit = ModelFit {
            out_file: Some(PathBuf::from("/tmp/tensors.Bdouble")),
            ..fit()
        };
        assert_eq!(
            explicit.outputs().unwrap().fitted_data,
            PathBuf::from("/tmp/tensors.Bdouble")
        );
    }

    #[test]
    fn test_validation() {
        let multi = ModelFit {
            model: Some("cylcyl ldt_wtd".to_string()),
            ..fit()
        };
        assert!(multi.cmdline().is_ok());

        let unknown = ModelFit {
            model: Some("tensor".to_string()),
            ..fit()
        };
        assert!(matches!(unknown.cmdline(), Err(Error::InvalidInput(_))));

        let datatype = ModelFit {
            inputdatatype: Some("complex".to_string()),
            ..fit()
        };
        assert!(datatype.cmdline().is_err());

        let missing = ModelFit {
            scheme_file: None,
            ..fit()
        };
        assert!(matches!(missing.cmdline(), Err(Error::MissingInput("scheme_file"))));
    }
}
