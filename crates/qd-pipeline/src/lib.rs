//! Ordered composition of named codec stages over a byte vector (or, for
//! the SysEx/QD stages, a [`qd_sample::Sample`]).
//!
//! A [`Pipeline`] is just a `Vec<Stage>`; [`Pipeline::run`] folds a starting
//! [`Value`] through each stage in order. The composed macros (`encode`,
//! `decode`, `syx-to-qd`) are pure sugar expanded by [`Stage::parse`]'s
//! sibling [`expand_macro`].

use std::fmt;

use qd_sample::Sample;

#[derive(Debug)]
pub enum PipelineError {
    InvalidArguments(String),
    IoFailure(String),
    SyncNotFound,
    ChecksumMismatch(u16),
    SysexFrameError(String),
    OutOfRange(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::InvalidArguments(msg) => write!(f, "invalid arguments: {msg}"),
            PipelineError::IoFailure(msg) => write!(f, "I/O failure: {msg}"),
            PipelineError::SyncNotFound => write!(f, "MFM sync word not found"),
            PipelineError::ChecksumMismatch(residue) => {
                write!(f, "CRC check failed, residue {residue:#06x}")
            }
            PipelineError::SysexFrameError(msg) => write!(f, "malformed SysEx frame: {msg}"),
            PipelineError::OutOfRange(msg) => write!(f, "value out of range: {msg}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::IoFailure(err.to_string())
    }
}

impl From<qd_mfm::MfmError> for PipelineError {
    fn from(_: qd_mfm::MfmError) -> Self {
        PipelineError::SyncNotFound
    }
}

/// A value flowing between pipeline stages. Most stages operate on
/// [`Value::Bytes`]; `crc-check` produces a [`Value::Residue`] and
/// `syx-read` produces a [`Value::Sample`].
#[derive(Debug, Clone)]
pub enum Value {
    Bytes(Vec<u8>),
    Residue(u16),
    Sample(Box<Sample>),
}

impl Value {
    fn into_bytes(self, stage: &str) -> Result<Vec<u8>, PipelineError> {
        match self {
            Value::Bytes(b) => Ok(b),
            _ => Err(PipelineError::InvalidArguments(format!("stage `{stage}` requires a byte vector input"))),
        }
    }

    fn into_sample(self, stage: &str) -> Result<Sample, PipelineError> {
        match self {
            Value::Sample(s) => Ok(*s),
            _ => Err(PipelineError::InvalidArguments(format!("stage `{stage}` requires a sample input"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    LutInvert,
    MfmEncode,
    MfmDecode,
    MfmSync,
    CrcCheck,
    QdGenerate,
    SyxRead,
    QdSampleBlocks,
}

impl Stage {
    pub fn parse(name: &str) -> Result<Self, PipelineError> {
        match name {
            "lut-invert" => Ok(Stage::LutInvert),
            "mfm-encode" => Ok(Stage::MfmEncode),
            "mfm-decode" => Ok(Stage::MfmDecode),
            "mfm-sync" => Ok(Stage::MfmSync),
            "crc-check" => Ok(Stage::CrcCheck),
            "qd-generate" => Ok(Stage::QdGenerate),
            "syx-read" => Ok(Stage::SyxRead),
            "qd-sample-blocks" => Ok(Stage::QdSampleBlocks),
            other => Err(PipelineError::InvalidArguments(format!("unrecognized stage `{other}`"))),
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Stage::LutInvert => "lut-invert",
            Stage::MfmEncode => "mfm-encode",
            Stage::MfmDecode => "mfm-decode",
            Stage::MfmSync => "mfm-sync",
            Stage::CrcCheck => "crc-check",
            Stage::QdGenerate => "qd-generate",
            Stage::SyxRead => "syx-read",
            Stage::QdSampleBlocks => "qd-sample-blocks",
        }
    }
}

/// Expand a composed macro name into its constituent stages. Returns `None`
/// for a name that is not a macro (it might still be a plain stage name).
#[must_use]
pub fn expand_macro(name: &str) -> Option<Vec<Stage>> {
    match name {
        "encode" => Some(vec![Stage::LutInvert, Stage::MfmEncode, Stage::LutInvert]),
        "decode" => Some(vec![Stage::LutInvert, Stage::MfmSync, Stage::MfmDecode, Stage::LutInvert]),
        "syx-to-qd" => Some(vec![Stage::SyxRead, Stage::QdSampleBlocks]),
        _ => None,
    }
}

/// Parse a single `--mode` value into the stage(s) it names: a macro
/// expands to several stages, a plain stage name to exactly one.
pub fn resolve_mode(name: &str) -> Result<Vec<Stage>, PipelineError> {
    if let Some(stages) = expand_macro(name) {
        return Ok(stages);
    }
    Stage::parse(name).map(|s| vec![s])
}

/// Runtime configuration threaded through stage execution.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Sync words to skip past in `mfm-sync` (`--block`, default 1).
    pub block: u32,
    /// Reject an `mfm-encode` output larger than this many bytes.
    pub output_ceiling: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig { block: 1, output_ceiling: 16 * 1024 * 1024 }
    }
}

/// An ordered list of stages, run left to right over a starting [`Value`].
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    pub stages: Vec<Stage>,
}

impl Pipeline {
    #[must_use]
    pub fn new(stages: Vec<Stage>) -> Self {
        Pipeline { stages }
    }

    pub fn run(&self, input: Value, config: &PipelineConfig) -> Result<Value, PipelineError> {
        let mut value = input;
        for &stage in &self.stages {
            log::debug!("running stage {}", stage.name());
            value = run_stage(value, stage, config)?;
        }
        Ok(value)
    }
}

fn run_stage(value: Value, stage: Stage, config: &PipelineConfig) -> Result<Value, PipelineError> {
    match stage {
        Stage::LutInvert => {
            let data = value.into_bytes(stage.name())?;
            Ok(Value::Bytes(data.iter().map(|&b| qd_lut::reverse(b)).collect()))
        }
        Stage::MfmEncode => {
            let data = value.into_bytes(stage.name())?;
            let encoded = qd_mfm::encode(&data);
            if encoded.len() > config.output_ceiling {
                return Err(PipelineError::InvalidArguments(format!(
                    "mfm-encode output of {} bytes exceeds the configured ceiling of {}",
                    encoded.len(),
                    config.output_ceiling
                )));
            }
            Ok(Value::Bytes(encoded))
        }
        Stage::MfmDecode => {
            let data = value.into_bytes(stage.name())?;
            Ok(Value::Bytes(qd_mfm::decode(&data)))
        }
        Stage::MfmSync => {
            let data = value.into_bytes(stage.name())?;
            let tail = qd_mfm::sync(&data, config.block)?;
            Ok(Value::Bytes(tail))
        }
        Stage::CrcCheck => {
            let data = value.into_bytes(stage.name())?;
            Ok(Value::Residue(qd_crc::check(&data)))
        }
        Stage::QdGenerate => Ok(Value::Bytes(qd_container::generate())),
        Stage::SyxRead => {
            let data = value.into_bytes(stage.name())?;
            Ok(Value::Sample(Box::new(qd_sysex::read(&data))))
        }
        Stage::QdSampleBlocks => {
            let sample = value.into_sample(stage.name())?;
            Ok(Value::Bytes(qd_container::sample_blocks(&sample)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_round_trips() {
        let encode = Pipeline::new(resolve_mode("encode").unwrap());
        let decode_stages: Vec<Stage> = vec![Stage::LutInvert, Stage::MfmSync, Stage::MfmDecode, Stage::LutInvert];
        let config = PipelineConfig { block: 0, output_ceiling: usize::MAX };

        let x = vec![0x00u8, 0xFF, 0x55, 0xAA];
        let Value::Bytes(encoded) = encode.run(Value::Bytes(x.clone()), &config).unwrap() else {
            panic!("expected bytes");
        };
        let decode = Pipeline::new(decode_stages);
        let Value::Bytes(decoded) = decode.run(Value::Bytes(encoded), &config).unwrap() else {
            panic!("expected bytes");
        };
        assert_eq!(decoded, x);
    }

    #[test]
    fn mfm_encode_rejects_output_over_ceiling() {
        let pipeline = Pipeline::new(vec![Stage::MfmEncode]);
        let config = PipelineConfig { block: 1, output_ceiling: 4 };
        let result = pipeline.run(Value::Bytes(vec![0u8; 10]), &config);
        assert!(matches!(result, Err(PipelineError::InvalidArguments(_))));
    }

    #[test]
    fn qd_generate_ignores_input_value() {
        let pipeline = Pipeline::new(vec![Stage::QdGenerate]);
        let config = PipelineConfig::default();
        let result = pipeline.run(Value::Bytes(vec![]), &config).unwrap();
        let Value::Bytes(container) = result else { panic!("expected bytes") };
        assert_eq!(&container[..8], b"DCDQDS10");
    }

    #[test]
    fn crc_check_stage_reports_residue() {
        let pipeline = Pipeline::new(vec![Stage::CrcCheck]);
        let config = PipelineConfig::default();
        let result = pipeline.run(Value::Bytes(vec![]), &config).unwrap();
        assert!(matches!(result, Value::Residue(0)));
    }

    #[test]
    fn syx_to_qd_macro_threads_sample_through() {
        let pipeline = Pipeline::new(expand_macro("syx-to-qd").unwrap());
        let config = PipelineConfig::default();
        let result = pipeline.run(Value::Bytes(vec![]), &config).unwrap();
        assert!(matches!(result, Value::Bytes(_)));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(matches!(resolve_mode("not-a-stage"), Err(PipelineError::InvalidArguments(_))));
    }
}
