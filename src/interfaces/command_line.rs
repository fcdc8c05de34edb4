//! Declarative argument specs for wrapped command line tools and the
//! assembly of their command lines.

use std::collections::BTreeMap;
use std::process::{Command, Output, Stdio};

use crate::error::{Error, Result};
use crate::model::MetaValue;
use crate::utils::formatting::{format_positional, value_to_string};

/// Per-field metadata of a command line input or output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraitSpec {
    /// Positional format the value is rendered through.
    pub argstr: Option<&'static str>,
    pub mandatory: bool,
    /// Excluded from the hash of the inputs.
    pub nohash: bool,
    pub usedefault: bool,
    /// The value is generated when not set.
    pub genfile: bool,
    /// Negative positions count from the end, `-1` is last.
    pub position: Option<i32>,
}

impl TraitSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn argstr(mut self, argstr: &'static str) -> Self {
        self.argstr = Some(argstr);
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn nohash(mut self) -> Self {
        self.nohash = true;
        self
    }

    pub fn usedefault(mut self) -> Self {
        self.usedefault = true;
        self
    }

    pub fn genfile(mut self) -> Self {
        self.genfile = true;
        self
    }

    pub fn position(mut self, position: i32) -> Self {
        self.position = Some(position);
        self
    }
}

pub type SpecTable = BTreeMap<&'static str, TraitSpec>;

/// Render one argument. `None` for fields without an `argstr`, unset
/// values and false flags.
pub fn format_arg(spec: &TraitSpec, value: &MetaValue) -> Result<Option<String>> {
    let Some(argstr) = spec.argstr else {
        return Ok(None);
    };
    match value {
        MetaValue::Null | MetaValue::Bool(false) => Ok(None),
        MetaValue::Bool(true) => Ok(Some(argstr.to_string())),
        MetaValue::Array(values) => {
            let joined = values.iter().map(value_to_string).collect::<Vec<_>>().join(" ");
            format_positional(argstr, &[MetaValue::String(joined)]).map(Some)
        }
        value => format_positional(argstr, std::slice::from_ref(value)).map(Some),
    }
}

/// Arguments in command line order: non-negative positions first, then
/// unpositioned fields by name, then negative positions.
pub fn build_args(specs: &SpecTable, values: &BTreeMap<&'static str, MetaValue>) -> Result<Vec<String>> {
    for (name, spec) in specs {
        let set = values.get(name).is_some_and(|value| !value.is_null());
        if spec.mandatory && !set {
            return Err(Error::MissingInput(*name));
        }
    }

    let mut leading = Vec::new();
    let mut middle = Vec::new();
    let mut trailing = Vec::new();
    for (name, spec) in specs {
        let Some(value) = values.get(name) else {
            continue;
        };
        let Some(arg) = format_arg(spec, value)? else {
            continue;
        };
        match spec.position {
            Some(position) if position >= 0 => leading.push((position, arg)),
            Some(position) => trailing.push((position, arg)),
            None => middle.push(arg),
        }
    }
    leading.sort_by_key(|(position, _)| *position);
    trailing.sort_by_key(|(position, _)| *position);

    Ok(leading
        .into_iter()
        .map(|(_, arg)| arg)
        .chain(middle)
        .chain(trailing.into_iter().map(|(_, arg)| arg))
        .collect())
}

/// Executable followed by its arguments, space separated.
pub fn build_cmdline(cmd: &str, args: &[String]) -> String {
    std::iter::once(cmd.to_string())
        .chain(args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ")
}

/// What happens to the output of a run command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TerminalOutput {
    /// Passed through to this process.
    #[default]
    Stream,
    /// Collected and logged when the command finishes.
    AllAtOnce,
    /// Written to `stdout.nipype` and `stderr.nipype`.
    File,
    None,
}

impl std::str::FromStr for TerminalOutput {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "stream" => Ok(Self::Stream),
            "allatonce" => Ok(Self::AllAtOnce),
            "file" => Ok(Self::File),
            "none" => Ok(Self::None),
            other => Err(Error::InvalidInput(format!(
                "terminal_output must be one of stream, allatonce, file, none; got `{other}`"
            ))),
        }
    }
}

impl TerminalOutput {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stream => "stream",
            Self::AllAtOnce => "allatonce",
            Self::File => "file",
            Self::None => "none",
        }
    }
}

/// Run `cmdline` through `sh -c`. A non-zero exit is an error unless
/// `ignore_exception` is set.
pub fn run_shell(
    cmdline: &str,
    environ: &BTreeMap<String, String>,
    terminal_output: TerminalOutput,
    ignore_exception: bool,
) -> Result<()> {
    log::info!("Running: {cmdline}");
    let mut command = Command::new("sh");
    command.arg("-c").arg(cmdline).envs(environ);

    let status = match terminal_output {
        TerminalOutput::Stream => command.status()?,
        TerminalOutput::None => command
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?,
        TerminalOutput::AllAtOnce => {
            let Output { status, stdout, stderr } = command.output()?;
            log::info!("{}", String::from_utf8_lossy(&stdout));
            if !stderr.is_empty() {
                log::warn!("{}", String::from_utf8_lossy(&stderr));
            }
            status
        }
        TerminalOutput::File => {
            let Output { status, stdout, stderr } = command.output()?;
            std::fs::write("stdout.nipype", stdout)?;
            std::fs::write("stderr.nipype", stderr)?;
            status
        }
    };

    if !status.success() {
        let error = Error::CommandFailed {
            cmdline: cmdline.to_string(),
            status: status.to_string(),
        };
        if !ignore_exception {
            return Err(error);
        }
        log::warn!("{error}");
    }
    Ok(())
}
