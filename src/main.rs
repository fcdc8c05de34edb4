mod cli;
mod config;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use dcmnifti::camino::ModelFit;
use dcmnifti::interfaces::{
    CopyMeta, DcmStack, DicomFiles, GroupAndStack, LookupMeta, MergeNifti, SplitNifti,
};
use dcmnifti::io::{DicomFileReader, NiftiStore};
use serde_json::Value;

use crate::cli::{Args, Command, ModelFitArgs, StackArgs};
use crate::config::Settings;

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_secs()
        .try_init();

    let settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let out_dir = args.out_dir.clone().or_else(|| settings.out_dir.clone());
    if let Some(dir) = &out_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {:?}", dir))?;
    }

    let outputs = run(args.command, &settings, out_dir.as_deref())?;
    println!("{}", serde_json::to_string(&outputs)?);
    Ok(())
}

fn run(command: Command, settings: &Settings, out_dir: Option<&Path>) -> Result<Value> {
    let store = NiftiStore;
    let outputs = match command {
        Command::Stack(stack_args) => {
            let stack = dcm_stack(&stack_args, settings, out_dir);
            serde_json::to_value(
                stack
                    .run(&DicomFileReader, &store)
                    .context("Failed to stack DICOM files")?,
            )?
        }
        Command::GroupStack(stack_args) => {
            let group = GroupAndStack {
                stack: dcm_stack(&stack_args, settings, out_dir),
            };
            serde_json::to_value(
                group
                    .run(&DicomFileReader, &store)
                    .context("Failed to group and stack DICOM files")?,
            )?
        }
        Command::Lookup { in_file, meta_keys } => {
            let lookup = LookupMeta {
                in_file: Some(in_file),
                meta_keys,
            };
            serde_json::to_value(lookup.run(&store).context("Failed to look up meta data")?)?
        }
        Command::CopyMeta {
            src_file,
            dest_file,
            include_classes,
            exclude_classes,
        } => {
            let copy = CopyMeta {
                src_file: Some(src_file),
                dest_file: Some(dest_file),
                include_classes,
                exclude_classes,
                out_dir: out_dir.map(Path::to_path_buf),
            };
            serde_json::to_value(copy.run(&store).context("Failed to copy meta data")?)?
        }
        Command::Merge {
            in_files,
            sort_order,
            merge_dim,
            output,
        } => {
            let merge = MergeNifti {
                in_files,
                sort_order: (!sort_order.is_empty()).then(|| sort_order.into()),
                merge_dim,
                generator: settings.generator(&output, out_dir),
            };
            serde_json::to_value(merge.run(&store).context("Failed to merge NIfTI files")?)?
        }
        Command::Split {
            in_file,
            split_dim,
            output,
        } => {
            let split = SplitNifti {
                in_file: Some(in_file),
                split_dim,
                generator: settings.generator(&output, out_dir),
            };
            serde_json::to_value(split.run(&store).context("Failed to split NIfTI file")?)?
        }
        Command::Modelfit(fit_args) => {
            let fit = model_fit(fit_args, out_dir);
            serde_json::to_value(fit.run().context("modelfit failed")?)?
        }
    };
    Ok(outputs)
}

fn dcm_stack(args: &StackArgs, settings: &Settings, out_dir: Option<&Path>) -> DcmStack {
    let dicom_files = match args.dicom_files.as_slice() {
        [single] => DicomFiles::from_arg(single),
        files => DicomFiles::List(files.iter().map(PathBuf::from).collect()),
    };
    DcmStack {
        dicom_files: Some(dicom_files),
        embed_meta: settings.embed_meta(args),
        exclude_regexes: settings.exclude_regexes(args),
        include_regexes: settings.include_regexes(args),
        generator: settings.generator(&args.output, out_dir),
    }
}

fn model_fit(args: ModelFitArgs, out_dir: Option<&Path>) -> ModelFit {
    ModelFit {
        args: args.args,
        bgmask: args.bgmask,
        bgthresh: args.bgthresh,
        cfthresh: args.cfthresh,
        environ: std::collections::BTreeMap::new(),
        fixedbvalue: args.fixedbvalue,
        fixedmodq: args.fixedmodq,
        ignore_exception: args.ignore_exception,
        in_file: Some(args.in_file),
        inputdatatype: args.inputdatatype,
        model: Some(args.model),
        noisemap: args.noisemap,
        out_file: args.out_file,
        outlier: args.outlier,
        outputfile: args.outputfile,
        residualmap: args.residualmap,
        scheme_file: Some(args.scheme_file),
        sigma: args.sigma,
        tau: args.tau,
        terminal_output: args.terminal_output,
        out_dir: out_dir.map(Path::to_path_buf),
    }
}
