//! Argument parsing and top-level control flow for the `qd-cli` binary.
//! Kept in a library so integration tests can drive it without spawning a
//! subprocess.

use std::fmt;
use std::path::{Path, PathBuf};

use clap::Parser;
use qd_pipeline::{Pipeline, PipelineConfig, PipelineError, Stage, Value};

/// Convert a byte stream through named MFM/CRC/SysEx/QD pipeline stages.
#[derive(Parser, Debug)]
#[command(name = "qd-cli", about = "Roland QuickDisk codec pipeline")]
pub struct Cli {
    /// Stage name or composed macro; repeat to run several stages in order.
    #[arg(long = "mode", required = true)]
    pub mode: Vec<String>,

    /// Read input from this file instead of an empty buffer.
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Write output here instead of a name derived from `--input`.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Supply input as a hex string (no spaces or commas) instead of a file.
    /// The result is printed as a comma-separated hex dump to stdout.
    #[arg(long)]
    pub hex: Option<String>,

    /// Sync words to skip past in `mfm-sync`.
    #[arg(long, default_value_t = 1)]
    pub block: u32,

    /// 0 silent, 1 summary, 2 debug, 3 dump intermediate blocks.
    #[arg(long, default_value_t = 0)]
    pub verbose: u8,
}

#[derive(Debug)]
pub enum AppError {
    Args(String),
    Io(String),
    Pipeline(PipelineError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Args(msg) => write!(f, "invalid arguments: {msg}"),
            AppError::Io(msg) => write!(f, "I/O failure: {msg}"),
            AppError::Pipeline(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError::Pipeline(err)
    }
}

impl AppError {
    /// 0 success, 1 invalid arguments, 2 I/O failure, 3 decode failure.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Args(_) => 1,
            AppError::Io(_) => 2,
            AppError::Pipeline(p) => match p {
                PipelineError::InvalidArguments(_) | PipelineError::SysexFrameError(_) | PipelineError::OutOfRange(_) => 1,
                PipelineError::IoFailure(_) => 2,
                PipelineError::SyncNotFound | PipelineError::ChecksumMismatch(_) => 3,
            },
        }
    }
}

/// Map `0/1/2/3+` to the `log` filter levels the CLI's `--verbose` flag uses.
#[must_use]
pub fn verbosity_to_filter(verbose: u8) -> log::LevelFilter {
    match verbose {
        0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

fn parse_hex(s: &str) -> Result<Vec<u8>, String> {
    if s.len() % 2 != 0 {
        return Err(format!("hex string has odd length {}", s.len()));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|e| format!("invalid hex byte `{}`: {e}", &s[i..i + 2])))
        .collect()
}

fn to_hex_csv(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02X}")).collect::<Vec<_>>().join(",")
}

fn ext_for_stage(stage: Stage) -> &'static str {
    match stage {
        Stage::LutInvert => "inv",
        Stage::MfmEncode | Stage::MfmSync => "mfm",
        Stage::MfmDecode | Stage::CrcCheck | Stage::SyxRead => "bin",
        Stage::QdGenerate | Stage::QdSampleBlocks => "qd",
    }
}

fn last_stage_of(mode: &[String]) -> Result<Stage, AppError> {
    let last_name = mode.last().ok_or_else(|| AppError::Args("at least one --mode is required".to_string()))?;
    let stages = qd_pipeline::resolve_mode(last_name)?;
    stages.last().copied().ok_or_else(|| AppError::Args(format!("mode `{last_name}` expands to no stages")))
}

fn resolve_output_path(cli: &Cli, ext: &str) -> PathBuf {
    if let Some(path) = &cli.output {
        return path.clone();
    }
    if let Some(input) = &cli.input {
        return input.with_extension(ext);
    }
    if ext == "qd" {
        return PathBuf::from("blank.qd");
    }
    PathBuf::from(format!("output.{ext}"))
}

fn resolve_stages(mode: &[String]) -> Result<Vec<Stage>, AppError> {
    let mut stages = Vec::new();
    for name in mode {
        stages.extend(qd_pipeline::resolve_mode(name)?);
    }
    Ok(stages)
}

fn resolve_input(cli: &Cli) -> Result<Value, AppError> {
    if let Some(hex) = &cli.hex {
        let cleaned: String = hex.chars().filter(|c| !c.is_whitespace() && *c != ',').collect();
        let bytes = parse_hex(&cleaned).map_err(AppError::Args)?;
        return Ok(Value::Bytes(bytes));
    }
    if let Some(path) = &cli.input {
        return Ok(Value::Bytes(std::fs::read(path)?));
    }
    Ok(Value::Bytes(Vec::new()))
}

/// Run the pipeline named by `cli` and report the outcome. Writes either a
/// file (normal mode), a comma-separated hex dump to stdout (`--hex` input),
/// or a one-line summary (a terminal `syx-read`/`crc-check` stage).
pub fn run(cli: &Cli) -> Result<(), AppError> {
    let stages = resolve_stages(&cli.mode)?;
    let pipeline = Pipeline::new(stages);
    let config = PipelineConfig { block: cli.block, ..PipelineConfig::default() };

    let hex_mode = cli.hex.is_some();
    let initial = resolve_input(cli)?;
    let result = pipeline.run(initial, &config)?;

    if hex_mode {
        match &result {
            Value::Bytes(data) => println!("{}", to_hex_csv(data)),
            _ => log::warn!("non-byte pipeline result cannot be hex-dumped"),
        }
        return Ok(());
    }

    match result {
        Value::Bytes(data) => {
            let ext = ext_for_stage(last_stage_of(&cli.mode)?);
            let out_path = resolve_output_path(cli, ext);
            write_output(&out_path, &data)?;
            log::info!("wrote {} bytes to {}", data.len(), out_path.display());
        }
        Value::Residue(residue) => {
            println!("CRC residue: {residue:#06x}");
            if residue != 0 {
                return Err(PipelineError::ChecksumMismatch(residue).into());
            }
        }
        Value::Sample(sample) => {
            println!(
                "tone_name={} structure={:?} active_banks={:?}",
                sample.tone_name,
                sample.sampling_structure,
                sample.sampling_structure.active_banks()
            );
        }
    }

    Ok(())
}

fn write_output(path: &Path, data: &[u8]) -> Result<(), AppError> {
    std::fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_round_trips_known_bytes() {
        assert_eq!(parse_hex("00FF55AA").unwrap(), vec![0x00, 0xFF, 0x55, 0xAA]);
    }

    #[test]
    fn parse_hex_rejects_odd_length() {
        assert!(parse_hex("ABC").is_err());
    }

    #[test]
    fn to_hex_csv_matches_expected_format() {
        assert_eq!(to_hex_csv(&[0x00, 0xFF, 0x0A]), "00,FF,0A");
    }

    #[test]
    fn last_stage_of_expands_composed_macros() {
        let mode = vec!["encode".to_string()];
        assert_eq!(last_stage_of(&mode).unwrap(), Stage::LutInvert);
    }

    #[test]
    fn resolve_output_path_derives_from_input_basename() {
        let cli = Cli { mode: vec![], input: Some(PathBuf::from("dump.bin")), output: None, hex: None, block: 1, verbose: 0 };
        assert_eq!(resolve_output_path(&cli, "mfm"), PathBuf::from("dump.mfm"));
    }

    #[test]
    fn resolve_output_path_defaults_blank_qd_for_generate() {
        let cli = Cli { mode: vec![], input: None, output: None, hex: None, block: 1, verbose: 0 };
        assert_eq!(resolve_output_path(&cli, "qd"), PathBuf::from("blank.qd"));
    }

    #[test]
    fn verbosity_levels_map_as_documented() {
        assert_eq!(verbosity_to_filter(0), log::LevelFilter::Error);
        assert_eq!(verbosity_to_filter(3), log::LevelFilter::Trace);
    }
}
