use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use dcmnifti::interfaces::command_line::TerminalOutput;
use dcmnifti::model::Classification;

#[derive(Parser, Debug)]
#[command(
    name = "dcmnifti",
    version,
    about = "Stack DICOM series into NIfTI files and edit their embedded meta data",
    long_about = "
Stack DICOM series into NIfTI files and edit the meta data embedded in them.

Every command prints its outputs as a single JSON line on stdout. Logging
goes to stderr and is controlled by RUST_LOG (or --verbose).

Example Usage:
  # One NIfTI file per series found in a directory
  dcmnifti -o ~/nifti group-stack ~/dicom/session1

  # Stack a single series, keeping the DICOM meta data
  dcmnifti stack --embed-meta --out-format '%(SeriesNumber)03d-%(ProtocolName)s' 'series5/*.dcm'

  # Merge echoes into one 4D file ordered by echo time
  dcmnifti merge --sort-order EchoTime echo1.nii.gz echo2.nii.gz echo3.nii.gz
"
)]
pub struct Args {
    /// JSON settings file; explicit options take precedence
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory output files are written to (default: working directory)
    #[arg(short, long, global = true, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create one NIfTI file from a set of DICOM files
    Stack(StackArgs),
    /// Create one NIfTI file per series found in a set of DICOM files
    GroupStack(StackArgs),
    /// Look up meta data values in a NIfTI file
    Lookup {
        in_file: PathBuf,
        #[arg(required = true)]
        meta_keys: Vec<String>,
    },
    /// Copy meta data from one NIfTI file into (a copy of) another
    CopyMeta {
        src_file: PathBuf,
        dest_file: PathBuf,
        /// Only copy these classifications, e.g. `global.const`
        #[arg(long = "include-class", value_name = "CLASS")]
        include_classes: Vec<Classification>,
        /// Do not copy these classifications
        #[arg(long = "exclude-class", value_name = "CLASS")]
        exclude_classes: Vec<Classification>,
    },
    /// Merge NIfTI files along a dimension
    Merge {
        #[arg(required = true)]
        in_files: Vec<PathBuf>,
        /// Meta data key(s) to sort the inputs by
        #[arg(long, value_name = "KEY")]
        sort_order: Vec<String>,
        /// Default: last singular dimension, or a new one
        #[arg(long)]
        merge_dim: Option<usize>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Split a NIfTI file along a dimension
    Split {
        in_file: PathBuf,
        /// Default: last dimension
        #[arg(long)]
        split_dim: Option<usize>,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Fit a diffusion model with Camino modelfit
    Modelfit(ModelFitArgs),
}

/// Output file naming shared by the commands creating NIfTI files.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct OutputArgs {
    /// Named format filled from the image meta data, e.g. `%(SeriesNumber)03d`
    #[arg(long)]
    pub out_format: Option<String>,

    /// Output file extension (default: .nii.gz)
    #[arg(long)]
    pub out_ext: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct StackArgs {
    /// DICOM files, a directory or a glob pattern
    #[arg(required = true)]
    pub dicom_files: Vec<String>,

    /// Embed the DICOM meta data into the result
    #[arg(long)]
    pub embed_meta: bool,

    /// Meta data keys to exclude, in addition to the defaults (regex)
    #[arg(long = "exclude", value_name = "REGEX")]
    pub exclude_regexes: Vec<String>,

    /// Meta data keys to include, overriding exclude filters (regex)
    #[arg(long = "include", value_name = "REGEX")]
    pub include_regexes: Vec<String>,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ModelFitArgs {
    /// Voxel order data file
    #[arg(long)]
    pub in_file: PathBuf,

    /// Camino scheme file
    #[arg(long)]
    pub scheme_file: PathBuf,

    /// Model name(s), e.g. `dt` or `cylcyl ldt_wtd`
    #[arg(long)]
    pub model: String,

    /// Default: `<in_file stem>_fit.Bdouble` in the output directory
    #[arg(long)]
    pub out_file: Option<PathBuf>,

    #[arg(long)]
    pub inputdatatype: Option<String>,

    #[arg(long)]
    pub bgmask: Option<PathBuf>,

    #[arg(long)]
    pub bgthresh: Option<f64>,

    #[arg(long = "csfthresh")]
    pub cfthresh: Option<f64>,

    #[arg(long)]
    pub fixedbvalue: Option<String>,

    #[arg(long = "fixedmod")]
    pub fixedmodq: Option<String>,

    #[arg(long)]
    pub noisemap: Option<PathBuf>,

    #[arg(long = "outliermap")]
    pub outlier: Option<PathBuf>,

    #[arg(long)]
    pub outputfile: Option<PathBuf>,

    #[arg(long)]
    pub residualmap: Option<PathBuf>,

    #[arg(long)]
    pub sigma: Option<f64>,

    #[arg(long)]
    pub tau: Option<f64>,

    /// Extra arguments passed through verbatim
    #[arg(long, allow_hyphen_values = true)]
    pub args: Option<String>,

    /// stream, allatonce, file or none
    #[arg(long, default_value = "stream")]
    pub terminal_output: TerminalOutput,

    /// Report success even when modelfit fails
    #[arg(long)]
    pub ignore_exception: bool,
}
