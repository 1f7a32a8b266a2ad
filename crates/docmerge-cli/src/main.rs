//! `docmerge`: mail-merge DOCX documents from the command line

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use docmerge_core::archive::{CONTENT_TYPES_XML, REQUIRED_MEMBERS};
use docmerge_core::{
    detect, has_zip_signature, validate_and_merge, DocxArchive, MergeReport, ValidationResult,
};
use log::{debug, info};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Verbosity level for output control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Verbosity {
    /// Suppress all output except errors
    Quiet,
    /// Normal output (default)
    Normal,
    /// Verbose output with extra details
    Verbose,
}

impl Verbosity {
    /// Create from CLI flags
    const fn from_flags(quiet: bool, verbose: bool) -> Self {
        if quiet {
            Self::Quiet
        } else if verbose {
            Self::Verbose
        } else {
            Self::Normal
        }
    }

    /// Check if output should be shown (not quiet)
    const fn should_show_output(self) -> bool {
        !matches!(self, Self::Quiet)
    }

    /// Check if verbose output is requested
    const fn is_verbose(self) -> bool {
        matches!(self, Self::Verbose)
    }

    /// Default `env_logger` filter when `RUST_LOG` is unset
    const fn log_filter(self) -> &'static str {
        match self {
            Self::Quiet => "error",
            Self::Normal => "warn",
            Self::Verbose => "debug",
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "docmerge",
    about = "Find and fill merge fields in Word documents",
    long_about = "Find and fill merge fields in Word (DOCX) documents.\n\
                  \n\
                  Recognises MERGEFIELD simple fields, complex fields and «Name» placeholders.",
    version
)]
struct Args {
    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Show detailed processing information
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List the merge fields of a document
    Fields {
        /// DOCX file to inspect
        #[arg(value_name = "DOCX")]
        input: PathBuf,

        /// Print a JSON report instead of one name per line
        #[arg(long)]
        json: bool,
    },

    /// Validate JSON data against a document and write the merged copy
    #[command(long_about = "Validate JSON data against a document and write the merged copy.\n\
                      \n\
                      Keys are matched case-insensitively. When a key appears more than once\n\
                      the first occurrence is used and a warning is printed. Nothing is written\n\
                      if validation fails.")]
    Merge {
        /// DOCX template
        #[arg(value_name = "DOCX")]
        input: PathBuf,

        /// JSON object with merge values (`-` reads stdin)
        #[arg(short, long, value_name = "JSON")]
        data: PathBuf,

        /// Output path (default: <DOCX stem>_merged.docx next to the input)
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,

        /// Print a JSON report
        #[arg(long)]
        json: bool,
    },

    /// Check that a file is a usable DOCX package
    Check {
        /// File to check
        #[arg(value_name = "DOCX")]
        input: PathBuf,
    },
}

fn main() {
    let args = Args::parse();
    let verbosity = Verbosity::from_flags(args.quiet, args.verbose);

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(verbosity.log_filter()),
    )
    .init();

    if let Err(e) = run(args.command, verbosity) {
        eprintln!("{} {e:#}", "Error:".red().bold());
        std::process::exit(1);
    }
}

fn run(command: Commands, verbosity: Verbosity) -> Result<()> {
    match command {
        Commands::Fields { input, json } => fields(&input, json, verbosity),
        Commands::Merge {
            input,
            data,
            output,
            json,
        } => merge(&input, &data, output, json, verbosity),
        Commands::Check { input } => check(&input, verbosity),
    }
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn fields(input: &Path, json: bool, verbosity: Verbosity) -> Result<()> {
    let bytes = read_input(input)?;
    debug!("Read {} bytes from {}", bytes.len(), input.display());
    let report = detect(&bytes).with_context(|| format!("Failed to inspect {}", input.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    for name in &report.fields {
        println!("{name}");
    }
    if verbosity.should_show_output() {
        eprintln!(
            "{} {} merge field(s) in {}",
            "Found".green().bold(),
            report.count,
            input.display()
        );
    }
    Ok(())
}

fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map_or_else(|| "document".to_string(), |s| s.to_string_lossy().into_owned());
    input.with_file_name(format!("{stem}_merged.docx"))
}

fn read_data(path: &Path) -> Result<Vec<u8>> {
    if path.as_os_str() == "-" {
        debug!("Reading merge data from stdin");
        let mut raw = Vec::new();
        std::io::stdin()
            .read_to_end(&mut raw)
            .context("Failed to read merge data from stdin")?;
        return Ok(raw);
    }
    debug!("Reading merge data from {}", path.display());
    read_input(path)
}

fn print_validation(validation: &ValidationResult) {
    for warning in &validation.warnings {
        eprintln!("{} {warning}", "Warning:".yellow().bold());
    }
    for error in &validation.errors {
        eprintln!("{} {error}", "Invalid:".red().bold());
    }
}

fn merge(
    input: &Path,
    data: &Path,
    output: Option<PathBuf>,
    json: bool,
    verbosity: Verbosity,
) -> Result<()> {
    let bytes = read_input(input)?;
    let raw_data = read_data(data)?;

    let mut report: MergeReport = validate_and_merge(&bytes, &raw_data)
        .with_context(|| format!("Failed to merge into {}", input.display()))?;
    let merged = report.merged.take();

    if !json && verbosity.should_show_output() {
        print_validation(&report.validation);
    }

    let Some(merged) = merged else {
        if json {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        bail!(
            "validation failed with {} error(s); nothing written",
            report.validation.errors.len()
        );
    };

    let output = output.unwrap_or_else(|| default_output(input));
    debug!("Writing merged document to {}", output.display());
    std::fs::write(&output, &merged.bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!(
        "Merged {} into {} ({} skipped)",
        input.display(),
        output.display(),
        merged.skipped.len()
    );

    if json {
        let mut value = serde_json::to_value(&report)?;
        value["output"] = output.display().to_string().into();
        value["skipped_fields"] = merged.skipped.clone().into();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if verbosity.should_show_output() {
        for name in &merged.skipped {
            eprintln!("{} no data for field '{name}'", "Skipped:".yellow().bold());
        }
        println!(
            "{} {} ({} bytes)",
            "Merged".green().bold(),
            output.display(),
            merged.bytes.len()
        );
    }
    if verbosity.is_verbose() {
        eprintln!(
            "{} of {} field(s) filled",
            report.count.saturating_sub(merged.skipped.len()),
            report.count
        );
    }
    Ok(())
}

fn check(input: &Path, verbosity: Verbosity) -> Result<()> {
    let bytes = read_input(input)?;
    if !has_zip_signature(&bytes) {
        bail!("{} is not a ZIP archive", input.display());
    }
    let archive = DocxArchive::open(&bytes)
        .with_context(|| format!("Failed to open {}", input.display()))?;
    debug!("{} has {} members", input.display(), archive.len());

    if verbosity.should_show_output() {
        for part in REQUIRED_MEMBERS {
            let mark = if archive.has_member(part) {
                "ok".green()
            } else {
                "missing".red()
            };
            println!("{part:<22} {mark}");
        }
    }
    if verbosity.is_verbose() {
        for name in archive.member_names() {
            eprintln!("  {name}");
        }
    }

    if let Some(problem) = archive.structure_problem() {
        bail!("{} is not a valid DOCX document: {problem}", input.display());
    }
    if verbosity.should_show_output() {
        println!(
            "{} {} is a valid DOCX document ({} parts, {CONTENT_TYPES_XML} declares a Word main document)",
            "OK".green().bold(),
            input.display(),
            archive.len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_from_flags() {
        assert_eq!(Verbosity::from_flags(true, false), Verbosity::Quiet);
        assert_eq!(Verbosity::from_flags(false, true), Verbosity::Verbose);
        assert_eq!(Verbosity::from_flags(false, false), Verbosity::Normal);
        assert!(!Verbosity::Quiet.should_show_output());
        assert!(Verbosity::Verbose.is_verbose());
        assert_eq!(Verbosity::Verbose.log_filter(), "debug");
    }

    #[test]
    fn test_default_output() {
        assert_eq!(
            default_output(Path::new("/tmp/letters/invite.docx")),
            PathBuf::from("/tmp/letters/invite_merged.docx")
        );
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "docmerge", "merge", "in.docx", "--data", "d.json", "-o", "out.docx", "-v",
        ])
        .unwrap();
        assert!(args.verbose);
        match args.command {
            Commands::Merge { output, json, .. } => {
                assert_eq!(output, Some(PathBuf::from("out.docx")));
                assert!(!json);
            }
            other => panic!("unexpected command {other:?}"),
        }

        assert!(Args::try_parse_from(["docmerge", "-q", "-v", "check", "x.docx"]).is_err());
    }
}
