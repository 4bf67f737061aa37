use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use aggfuzz_harness::config::{FuzzerOptions, FuzzerSettings, parse_function_list, resolve_seed};
use aggfuzz_harness::logging::init_tracing;
use aggfuzz_harness::oracle::SqliteEngine;
use aggfuzz_harness::registry::RegistryEntrySummary;
use aggfuzz_harness::synth::TimestampPrecision;
use serde::Serialize;

#[derive(Debug, Default)]
struct CliConfig {
    seed: Option<u64>,
    only: Option<String>,
    config_path: Option<PathBuf>,
    output_path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct RegistryReport {
    seed: u64,
    sqlite_version: &'static str,
    only_functions: Vec<String>,
    skip_functions: Vec<String>,
    reference_disabled: Vec<String>,
    timestamp_precision: TimestampPrecision,
    vector_size: usize,
    null_ratio: f64,
    entries: Vec<ReportEntry>,
}

#[derive(Debug, Serialize)]
struct ReportEntry {
    #[serde(flatten)]
    binding: RegistryEntrySummary,
    selectable: bool,
}

fn print_help() {
    let help = "\
extension_registry_report: resolved fuzzer options and per-function extensions

USAGE:
    cargo run -p aggfuzz-harness --bin extension_registry_report -- [OPTIONS]

OPTIONS:
    --seed <U64>        Root seed (0 or omitted: current time)
    --only <LIST>       Comma separated functions to restrict fuzzing to
    --config <PATH>     TOML settings file
    --output <PATH>     Write JSON report to path (stdout when omitted)
    -h, --help          Show this help
";
    println!("{help}");
}

fn parse_args(args: &[String]) -> Result<CliConfig, String> {
    let mut config = CliConfig::default();

    let mut index = 0;
    while index < args.len() {
        let flag = args[index].as_str();
        let mut value = || {
            index += 1;
            args.get(index)
                .cloned()
                .ok_or_else(|| format!("{flag} requires a value"))
        };
        match flag {
            "--seed" => {
                let raw = value()?;
                let seed = raw
                    .parse::<u64>()
                    .map_err(|error| format!("invalid --seed {raw}: {error}"))?;
                config.seed = Some(seed);
            }
            "--only" => config.only = Some(value()?),
            "--config" => config.config_path = Some(PathBuf::from(value()?)),
            "--output" => config.output_path = Some(PathBuf::from(value()?)),
            "-h" | "--help" => {
                print_help();
                return Err(String::new());
            }
            unknown => {
                return Err(format!("unknown option: {unknown}"));
            }
        }
        index += 1;
    }

    Ok(config)
}

fn load_options(config: &CliConfig) -> Result<FuzzerOptions, String> {
    let mut options = match &config.config_path {
        Some(path) => FuzzerSettings::from_path(path)
            .and_then(FuzzerSettings::into_options)
            .map_err(|error| format!("config_load_failed path={} error={error}", path.display()))?,
        None => FuzzerOptions::default(),
    };
    if let Some(seed) = config.seed {
        options.seed = seed;
    }
    if let Some(only) = &config.only {
        options.only_functions = parse_function_list(only);
    }
    Ok(options)
}

fn build_report(options: &FuzzerOptions) -> RegistryReport {
    let entries = options
        .extensions
        .summary()
        .into_iter()
        .map(|binding| ReportEntry {
            selectable: options.is_function_selectable(&binding.function),
            binding,
        })
        .collect();
    RegistryReport {
        seed: resolve_seed(options.seed),
        sqlite_version: SqliteEngine::version(),
        only_functions: options.only_functions.iter().cloned().collect(),
        skip_functions: options.skip_functions.iter().cloned().collect(),
        reference_disabled: options.reference_disabled.iter().cloned().collect(),
        timestamp_precision: options.timestamp_precision,
        vector_size: options.vector_size,
        null_ratio: options.null_ratio,
        entries,
    }
}

fn run(args: &[String]) -> Result<(), String> {
    let config = parse_args(args)?;
    let options = load_options(&config)?;
    let report = build_report(&options);

    let payload = serde_json::to_string_pretty(&report)
        .map_err(|error| format!("report_serialize_failed: {error}"))?;

    if let Some(output_path) = &config.output_path {
        std::fs::write(output_path, payload).map_err(|error| {
            format!(
                "report_write_failed path={} error={error}",
                output_path.display()
            )
        })?;
    } else {
        println!("{payload}");
    }
    Ok(())
}

fn main() -> ExitCode {
    init_tracing("info");
    let args: Vec<String> = env::args().skip(1).collect();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) if error.is_empty() => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("ERROR extension_registry_report failed: {error}");
            ExitCode::from(2)
        }
    }
}
