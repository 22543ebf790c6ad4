//! stencil: blur an image and write its edge magnitude to `out.jpg`.
//!
//! Runs the Gaussian blur and Prewitt gradient-magnitude pipeline on one
//! image with the default configuration, then prints the wall-clock time
//! from the start of decoding until `out.jpg` is in place.
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin stencil -- <IMAGE_PATH>
//! ```
//!
//! # Exit codes
//!
//! - `0`: `out.jpg` written
//! - `1`: wrong number of arguments
//! - `2`: the input could not be read or decoded
//! - `3`: processing, encoding or writing the output failed
//!
//! Set `RUST_LOG=debug` to log the per-stage diagnostics report.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use stencil_pipeline::diagnostics::{Clock, process_staged_with_diagnostics};
use stencil_pipeline::{PipelineConfig, PipelineError, codec};

/// Output file, written to the working directory.
const OUTPUT_PATH: &str = "out.jpg";

const EXIT_USAGE: u8 = 1;
const EXIT_DECODE: u8 = 2;
const EXIT_FAILURE: u8 = 3;

/// Blur an image and write its Prewitt edge magnitude to out.jpg.
#[derive(Parser)]
#[command(name = "stencil", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Exit code for a pipeline error.
const fn exit_code_for(err: &PipelineError) -> u8 {
    if err.is_decode_failure() {
        EXIT_DECODE
    } else {
        EXIT_FAILURE
    }
}

/// Sibling of `output` that receives the encoded bytes before they are
/// renamed into place.
fn staging_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Process `image_bytes` and write the result to `output`.
///
/// Returns the wall-clock duration from decoding through the rename of
/// `output`. Nothing is written unless every stage and the JPEG encoding
/// succeed, and `output` never holds a partial file.
fn run<C: Clock>(image_bytes: &[u8], output: &Path, clock: &C) -> Result<Duration, u8> {
    let start = clock.now();
    let config = PipelineConfig::default();
    let (staged, diagnostics) = process_staged_with_diagnostics(image_bytes, &config, clock)
        .map_err(|e| {
            eprintln!("Pipeline error: {e}");
            exit_code_for(&e)
        })?;
    log::debug!("\n{}", diagnostics.report());

    let jpeg = codec::encode_jpeg(&staged.output).map_err(|e| {
        eprintln!("Error encoding output: {e}");
        EXIT_FAILURE
    })?;
    let staging = staging_path(output);
    std::fs::write(&staging, jpeg)
        .and_then(|()| std::fs::rename(&staging, output))
        .map_err(|e| {
            std::fs::remove_file(&staging).ok();
            eprintln!("Error writing {}: {e}", output.display());
            EXIT_FAILURE
        })?;

    Ok(clock.elapsed(&start))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            e.print().ok();
            return if e.use_stderr() {
                ExitCode::from(EXIT_USAGE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let image_bytes = match std::fs::read(&cli.image_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::from(EXIT_DECODE);
        }
    };
    log::info!(
        "Image: {} ({} bytes)",
        cli.image_path.display(),
        image_bytes.len()
    );

    match run(&image_bytes, Path::new(OUTPUT_PATH), &StdClock) {
        Ok(elapsed) => {
            println!("ptime = {:.6}", elapsed.as_secs_f64());
            ExitCode::SUCCESS
        }
        Err(code) => ExitCode::from(code),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::RefCell;

    use clap::CommandFactory;

    use super::*;

    /// Records whether the output file existed at every reading.
    struct WatchClock {
        output: PathBuf,
        seen: RefCell<Vec<bool>>,
    }

    impl WatchClock {
        fn new(output: &Path) -> Self {
            Self {
                output: output.to_path_buf(),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl Clock for WatchClock {
        type Instant = ();

        fn now(&self) {
            self.seen.borrow_mut().push(self.output.exists());
        }

        fn elapsed(&self, _since: &()) -> Duration {
            self.now();
            Duration::ZERO
        }
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image_fixture(width, height);
        codec::encode_png(&img).unwrap()
    }

    fn image_fixture(width: u32, height: u32) -> stencil_pipeline::RawImage {
        let data = (0..width * height * 3)
            .map(|i| u8::try_from(i % 251).unwrap())
            .collect();
        stencil_pipeline::RawImage::new(width, height, data).unwrap()
    }

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("stencil-cli-{}-{name}", std::process::id()))
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn exactly_one_path_is_required() {
        assert!(Cli::try_parse_from(["stencil"]).is_err());
        assert!(Cli::try_parse_from(["stencil", "a.png", "b.png"]).is_err());
        let cli = Cli::try_parse_from(["stencil", "a.png"]).unwrap();
        assert_eq!(cli.image_path, PathBuf::from("a.png"));
    }

    #[test]
    fn usage_errors_go_to_stderr() {
        let err = Cli::try_parse_from(["stencil"]).err().unwrap();
        assert!(err.use_stderr());
        let help = Cli::try_parse_from(["stencil", "--help"]).err().unwrap();
        assert!(!help.use_stderr());
    }

    #[test]
    fn decode_errors_map_to_their_own_exit_code() {
        assert_eq!(exit_code_for(&PipelineError::EmptyInput), EXIT_DECODE);
        assert_eq!(
            exit_code_for(&PipelineError::InvalidParameter("sigma".into())),
            EXIT_FAILURE
        );
        assert_eq!(exit_code_for(&PipelineError::AliasingViolation), EXIT_FAILURE);
    }

    #[test]
    fn run_writes_a_jpeg_of_the_same_size() {
        let output = scratch_path("ok.jpg");
        run(&png_bytes(12, 9), &output, &StdClock).unwrap();
        let written = codec::decode(&std::fs::read(&output).unwrap()).unwrap();
        assert_eq!((written.width(), written.height()), (12, 9));
        assert!(!staging_path(&output).exists());
        std::fs::remove_file(&output).ok();
    }

    #[test]
    fn timing_stops_after_the_output_is_in_place() {
        let output = scratch_path("timed.jpg");
        let clock = WatchClock::new(&output);
        run(&png_bytes(6, 4), &output, &clock).unwrap();
        let seen = clock.seen.into_inner();
        assert_eq!(seen.first(), Some(&false));
        assert_eq!(seen.last(), Some(&true));
        std::fs::remove_file(&output).ok();
    }

    #[test]
    fn failed_write_leaves_no_files_behind() {
        let output = scratch_path("missing-dir").join("out.jpg");
        assert_eq!(run(&png_bytes(5, 5), &output, &StdClock), Err(EXIT_FAILURE));
        assert!(!output.exists());
        assert!(!staging_path(&output).exists());
    }

    #[test]
    fn failed_rename_removes_the_staging_file() {
        let output = scratch_path("occupied.jpg");
        std::fs::create_dir_all(&output).unwrap();
        assert_eq!(run(&png_bytes(5, 5), &output, &StdClock), Err(EXIT_FAILURE));
        assert!(output.is_dir());
        assert!(!staging_path(&output).exists());
        std::fs::remove_dir(&output).ok();
    }

    #[test]
    fn staging_path_is_a_sibling() {
        assert_eq!(
            staging_path(Path::new("dir/out.jpg")),
            PathBuf::from("dir/out.jpg.tmp")
        );
    }

    #[test]
    fn run_leaves_no_output_when_decoding_fails() {
        let output = scratch_path("bad.jpg");
        assert_eq!(run(b"not an image", &output, &StdClock), Err(EXIT_DECODE));
        assert!(!output.exists());
    }
}
