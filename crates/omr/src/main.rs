//! `omr` CLI: thin offline-batch wrapper around the decode/render pipeline.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use log::LevelFilter;

use omr_core::PreprocessParams;
use omr_detect::{decode, BubbleSampleParams, DecodeOptions, MarkerDetectParams, ScanResult, Source};
use omr_render::{render, SheetRequest};
use serde::Deserialize;

/// Overrides for the pipeline's tunable stages, loaded from the `--params`
/// JSON file. Each of the three keys is optional and, when present, must be
/// a complete `*Params` object (no field-level defaulting) that wholly
/// replaces that stage's `Default`; an absent key keeps the stage untouched.
#[derive(Deserialize, Debug, Default)]
struct ParamOverrides {
    preprocess: Option<PreprocessParams>,
    marker: Option<MarkerDetectParams>,
    bubble: Option<BubbleSampleParams>,
}

/// Optical mark recognition engine: decode answer sheets or render the PDF
/// templates the detector is calibrated against.
#[derive(Parser, Debug)]
#[command(name = "omr", version, about = "Optical mark recognition engine CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Emit structured logs via `tracing` (honors `RUST_LOG`) instead of the
    /// plain `log` backend. Requires the `tracing` feature.
    #[arg(long, global = true)]
    json_logs: bool,

    /// Log verbosity for the plain backend (ignored when `--json-logs` is set).
    #[arg(long, value_enum, global = true, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for LevelFilter {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Trace => LevelFilter::Trace,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Error => LevelFilter::Error,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SourceArg {
    Camera,
    Upload,
}

impl From<SourceArg> for Source {
    fn from(value: SourceArg) -> Self {
        match value {
            SourceArg::Camera => Source::Camera,
            SourceArg::Upload => Source::Upload,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode one answer-sheet image and print its `ScanResult`.
    Decode {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        questions: usize,
        #[arg(long)]
        choices: usize,
        #[arg(long, value_enum)]
        source: SourceArg,
        /// Print the full `ScanResult` as JSON instead of a short summary.
        #[arg(long)]
        json: bool,
        /// Path to a JSON file overriding any subset of the pipeline's
        /// tunable parameters; see [`ParamOverrides`].
        #[arg(long)]
        params: Option<PathBuf>,
    },
    /// Render a blank PDF answer sheet for a registered template.
    Render {
        #[arg(long)]
        template: usize,
        #[arg(long)]
        choices: usize,
        #[arg(long)]
        output: PathBuf,
    },
}

fn init_logging(cli: &Cli) {
    #[cfg(feature = "tracing")]
    if cli.json_logs {
        omr_core::init_tracing(true);
        return;
    }
    #[cfg(not(feature = "tracing"))]
    if cli.json_logs {
        log::warn!("--json-logs requires the `tracing` feature; falling back to plain logging");
    }
    let _ = omr_core::init_with_level(cli.log_level.into());
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match &cli.command {
        Command::Decode {
            input,
            questions,
            choices,
            source,
            json,
            params,
        } => run_decode(input, *questions, *choices, (*source).into(), *json, params.as_deref()),
        Command::Render {
            template,
            choices,
            output,
        } => run_render(*template, *choices, output),
    }
}

/// Exit 0 on success, 2 if markers not found, 3 on image decode error
fn run_decode(
    input: &PathBuf,
    num_questions: usize,
    choices_per_question: usize,
    source: Source,
    json: bool,
    params: Option<&std::path::Path>,
) -> ExitCode {
    let bytes = match std::fs::read(input) {
        Ok(b) => b,
        Err(err) => {
            log::error!("could not read {}: {err}", input.display());
            return ExitCode::from(3);
        }
    };

    let overrides = match params.map(load_param_overrides) {
        Some(Ok(overrides)) => overrides,
        Some(Err(err)) => {
            log::error!("could not load --params file: {err}");
            return ExitCode::from(3);
        }
        None => ParamOverrides::default(),
    };

    let options = DecodeOptions {
        capture_bubble_debug: json,
        debug_dir: std::env::var_os("DEBUG_DIR").map(PathBuf::from),
        preprocess_params: overrides.preprocess,
        marker_params: overrides.marker,
        bubble_params: overrides.bubble,
    };

    match decode(&bytes, num_questions, choices_per_question, source, &options) {
        Ok(result) => {
            print_result(&result, json);
            if result.markers_found {
                ExitCode::SUCCESS
            } else {
                log::warn!("markers not found; result is degraded");
                ExitCode::from(2)
            }
        }
        Err(omr_detect::DecodeError::Image(err)) => {
            log::error!("image decode error: {err}");
            ExitCode::from(3)
        }
        Err(err @ omr_detect::DecodeError::TemplateUnknown { .. }) => {
            log::error!("{err}");
            ExitCode::from(3)
        }
    }
}

fn load_param_overrides(path: &std::path::Path) -> Result<ParamOverrides, std::io::Error> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(std::io::Error::other)
}

fn print_result(result: &ScanResult, json: bool) {
    if json {
        match serde_json::to_string_pretty(result) {
            Ok(text) => println!("{text}"),
            Err(err) => log::error!("failed to serialize result: {err}"),
        }
        return;
    }

    let id: String = result
        .student_id
        .iter()
        .map(|d| d.map(|v| char::from_digit(v as u32, 10).unwrap_or('?')).unwrap_or('?'))
        .collect();
    let answers: String = result
        .answers
        .iter()
        .map(|a| match a {
            omr_detect::AnswerMark::Blank => '_',
            omr_detect::AnswerMark::Single(idx) => (b'A' + *idx as u8) as char,
        })
        .collect();
    println!("student id : {id}");
    println!("answers    : {answers}");
    println!("markers ok : {}", result.markers_found);
    if !result.multiple_answer_questions.is_empty() {
        println!("multiple   : {:?}", result.multiple_answer_questions);
    }
    if !result.id_double_shade_columns.is_empty() {
        println!("double id  : {:?}", result.id_double_shade_columns);
    }
}

/// Exit 0 on success, 1 on I/O error
fn run_render(num_questions: usize, choices_per_question: usize, output: &PathBuf) -> ExitCode {
    let request = SheetRequest {
        name: "Blank Template".to_string(),
        num_questions,
        choices_per_question,
        exam_code: None,
        header_text: None,
        logo_bytes: None,
    };

    let bytes = match render(&request) {
        Ok(b) => b,
        Err(err) => {
            log::error!("render failed: {err}");
            return ExitCode::from(1);
        }
    };

    match std::fs::write(output, bytes) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("could not write {}: {err}", output.display());
            ExitCode::from(1)
        }
    }
}
