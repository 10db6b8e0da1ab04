use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use error_stack::ResultExt;
use log::info;
use rpncdf_rs::{
    config::ConvertConfig,
    odict::Odict,
    pipeline::{self, ConvertSummary},
    utils,
};

/// Convert RPN-style standard files to netCDF datasets
///
/// Each input file becomes one netCDF dataset named after it with `.nc`
/// appended. The variables extracted are those listed in the variable
/// dictionary ("odict") that are actually present in each file; grid
/// descriptor records become `lat`/`lon` dimensions and coordinate
/// variables instead. When previous-window files are supplied, an
/// accumulated-precipitation variable is derived from the difference of
/// the two accumulation records (falling back to scaling the rate record
/// when it cannot be).
#[derive(Debug, Parser)]
struct Cli {
    /// The standard files to convert. Glob patterns are accepted for
    /// shells that do not expand them.
    #[clap(required = true)]
    inputs: Vec<String>,

    /// Directory to place the outputs in. Defaults to each input's own
    /// directory. Existing outputs are overwritten.
    #[clap(short = 'o', long)]
    output_dir: Option<PathBuf>,

    /// Previous-window files for the accumulated-precipitation
    /// difference, paired with the inputs by position. Glob patterns are
    /// accepted. When given, the expanded list must have exactly as many
    /// files as the input list.
    #[clap(short = 'p', long = "previous")]
    previous: Vec<String>,

    /// Path to the variable dictionary.
    #[clap(long, default_value = "o.dict")]
    odict: PathBuf,

    /// Optional TOML file overriding the conversion settings (skip list,
    /// precipitation variable codes, odict footer length).
    #[clap(long)]
    config: Option<PathBuf>,

    #[clap(flatten)]
    verbosity: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("Error occurred while reading {}", .0.display())]
    ReadError(PathBuf),
    #[error("Error occurred while converting {}", .0.display())]
    ConvertError(PathBuf),
    #[error("{0}")]
    Usage(String),
    #[error("{0}")]
    Custom(String),
}

impl CliError {
    fn read_error<P: Into<PathBuf>>(file: P) -> Self {
        Self::ReadError(file.into())
    }

    fn convert_error<P: Into<PathBuf>>(file: P) -> Self {
        Self::ConvertError(file.into())
    }

    fn usage<S: ToString>(msg: S) -> Self {
        Self::Usage(msg.to_string())
    }

    fn custom<S: ToString>(msg: S) -> Self {
        Self::Custom(msg.to_string())
    }
}

fn main() -> ExitCode {
    let clargs = Cli::parse();
    rpncdf_rs::logging::init_logging(clargs.verbosity.log_level_filter());

    if let Err(e) = driver(clargs) {
        eprintln!("{e:?}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn driver(clargs: Cli) -> error_stack::Result<(), CliError> {
    let inputs = expand_patterns(&clargs.inputs)?;
    let previous = expand_patterns(&clargs.previous)?;
    if !previous.is_empty() && previous.len() != inputs.len() {
        return Err(CliError::usage(format!(
            "--previous was given {} file(s) but there are {} input(s); the two lists pair by position",
            previous.len(),
            inputs.len()
        ))
        .into());
    }

    let config = match &clargs.config {
        Some(p) => ConvertConfig::from_toml_file(p)
            .change_context_lazy(|| CliError::read_error(p))?,
        None => ConvertConfig::default(),
    };

    let odict = Odict::from_file(&clargs.odict, config.odict_footer_lines)
        .change_context_lazy(|| CliError::read_error(&clargs.odict))?;
    if odict.is_empty() {
        return Err(CliError::custom(format!(
            "variable dictionary {} contains no entries",
            clargs.odict.display()
        ))
        .into());
    }

    let pbar = indicatif::ProgressBar::new(inputs.len() as u64);
    for (i, input) in inputs.iter().enumerate() {
        let output = utils::output_path(input, clargs.output_dir.as_deref());
        let prev = previous.get(i).map(|p| p.as_path());

        let summary: ConvertSummary =
            pipeline::convert_file(input, &output, prev, &odict, &config)
                .change_context_lazy(|| CliError::convert_error(input))?;

        info!("{} -> {}: {summary}", input.display(), output.display());
        pbar.inc(1);
    }
    pbar.finish_and_clear();

    Ok(())
}

/// Expand glob patterns into concrete paths.
///
/// A pattern with no matches is passed through as a literal path so that a
/// missing input surfaces as an open error on the actual file name rather
/// than being silently dropped.
fn expand_patterns(patterns: &[String]) -> error_stack::Result<Vec<PathBuf>, CliError> {
    let mut paths = Vec::new();
    for pattern in patterns {
        let entries = glob::glob(pattern)
            .change_context_lazy(|| CliError::usage(format!("invalid glob pattern: {pattern}")))?;
        let mut matched: Vec<PathBuf> = entries.filter_map(Result::ok).collect();
        if matched.is_empty() {
            paths.push(PathBuf::from(pattern));
        } else {
            matched.sort();
            paths.extend(matched);
        }
    }
    Ok(paths)
}
