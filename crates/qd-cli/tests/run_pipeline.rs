//! Exercises `qd_cli::run` directly rather than spawning the built binary,
//! matching how the workspace's other crates drive their public API from
//! `tests/`.

use std::path::PathBuf;

use qd_cli::{run, Cli};

fn scratch_path(name: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    path.push(format!("qd-cli-test-{name}-{}", std::process::id()));
    path
}

fn cli(mode: Vec<&str>, input: Option<PathBuf>, output: Option<PathBuf>, hex: Option<&str>) -> Cli {
    Cli {
        mode: mode.into_iter().map(str::to_string).collect(),
        input,
        output,
        hex: hex.map(str::to_string),
        block: 1,
        verbose: 0,
    }
}

#[test]
fn qd_generate_writes_a_blank_container_file() {
    let out = scratch_path("blank-container.qd");
    let _ = std::fs::remove_file(&out);

    let args = cli(vec!["qd-generate"], None, Some(out.clone()), None);
    run(&args).expect("qd-generate should succeed with no input");

    let contents = std::fs::read(&out).expect("output file should exist");
    assert_eq!(&contents[..8], b"DCDQDS10");

    std::fs::remove_file(&out).ok();
}

#[test]
fn encode_then_decode_round_trips_through_files() {
    let input = scratch_path("roundtrip-input.bin");
    let encoded = scratch_path("roundtrip-encoded.mfm");
    let decoded = scratch_path("roundtrip-decoded.bin");
    for p in [&input, &encoded, &decoded] {
        let _ = std::fs::remove_file(p);
    }

    std::fs::write(&input, [0x00u8, 0xFF, 0x55, 0xAA]).unwrap();

    let encode_args = cli(vec!["encode"], Some(input.clone()), Some(encoded.clone()), None);
    run(&encode_args).expect("encode should succeed");

    let decode_args = Cli {
        mode: vec!["lut-invert".to_string(), "mfm-sync".to_string(), "mfm-decode".to_string(), "lut-invert".to_string()],
        input: Some(encoded.clone()),
        output: Some(decoded.clone()),
        hex: None,
        block: 0,
        verbose: 0,
    };
    run(&decode_args).expect("decode should succeed");

    let result = std::fs::read(&decoded).unwrap();
    assert_eq!(result, vec![0x00u8, 0xFF, 0x55, 0xAA]);

    for p in [&input, &encoded, &decoded] {
        std::fs::remove_file(p).ok();
    }
}

#[test]
fn hex_input_is_dumped_to_stdout_not_a_file() {
    let args = cli(vec!["lut-invert"], None, None, Some("00FF"));
    run(&args).expect("lut-invert over a hex string should succeed");
}

#[test]
fn crc_check_of_empty_input_reports_zero_residue() {
    let args = cli(vec!["crc-check"], None, None, None);
    run(&args).expect("an all-zero CRC residue is success, not a checksum-mismatch error");
}

#[test]
fn unrecognized_mode_is_an_argument_error_with_exit_code_one() {
    let args = cli(vec!["not-a-real-stage"], None, None, None);
    let err = run(&args).expect_err("an unknown stage name must be rejected");
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn missing_input_file_is_an_io_error_with_exit_code_two() {
    let args = cli(vec!["lut-invert"], Some(PathBuf::from("/nonexistent/path/for/qd-cli-tests.bin")), None, None);
    let err = run(&args).expect_err("a missing input file must surface as an I/O failure");
    assert_eq!(err.exit_code(), 2);
}
