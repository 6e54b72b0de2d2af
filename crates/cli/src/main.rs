// PicBlink - PIC Blink Firmware and Simulation Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use firmware::fuses::{ConfigWord, FuseConfig};
use picblink_config::{
    BlinkManifest, DeviceDescriptor, PinLevel, StopReason, TestAssertion, TestLimits, TestScript,
};
use picblink_core::metrics::PerformanceMetrics;
use picblink_core::snapshot::MachineSnapshot;
use picblink_core::{Machine, MachineConfig, SimResult, SimulationError, SimulationObserver};

mod vcd_trace;

use vcd_trace::VcdObserver;

const EXIT_PASS: u8 = 0;
const EXIT_ASSERT_FAIL: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

const RESULT_SCHEMA_VERSION: &str = "1.0";

// Guard against accidentally huge runs from CI misconfiguration.
const MAX_ALLOWED_ITERATIONS: u64 = 10_000_000;

fn parse_u16_word(s: &str) -> Result<u16, String> {
    let trimmed = s.trim();
    if let Some(hex) = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        u16::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex word '{}': {}", s, e))
    } else {
        trimmed
            .parse::<u16>()
            .map_err(|e| format!("Invalid word '{}': {}", s, e))
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about = "PIC blink firmware simulator and image tools", long_about = None)]
struct Cli {
    /// Enable register-level tracing
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Simulate the blink loop and report the LED waveform.
    Run(RunArgs),

    /// Deterministic, CI-friendly runner mode driven by a test script (YAML).
    Test(TestArgs),

    /// Convert an Intel HEX image into an SCX writer image.
    #[command(name = "hex2scx")]
    Hex2Scx(Hex2ScxArgs),

    /// Show the configuration word for a set of fuses, or decode one.
    Fuses(FusesArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the blink manifest (YAML)
    #[arg(short, long)]
    manifest: Option<PathBuf>,

    /// Number of loop iterations to simulate
    #[arg(short, long, default_value = "4")]
    iterations: u64,

    /// Write a machine snapshot (JSON) after the run
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Write the port waveform as a VCD file
    #[arg(long)]
    vcd: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct TestArgs {
    /// Path to the test script (YAML)
    #[arg(short = 'c', long)]
    script: PathBuf,

    /// Blink manifest (overrides the script input)
    #[arg(short, long)]
    manifest: Option<PathBuf>,

    /// Intel HEX image (overrides the script input)
    #[arg(long)]
    hex: Option<PathBuf>,

    /// Override max iterations (takes precedence over script)
    #[arg(long)]
    max_iterations: Option<u64>,

    /// Override max cycles limit
    #[arg(long)]
    max_cycles: Option<u64>,

    /// Directory to write test artifacts (result.json, snapshot.json, junit.xml)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Optional path to write a JUnit XML report for CI systems
    #[arg(long)]
    junit: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct Hex2ScxArgs {
    /// Input Intel HEX file
    input: PathBuf,

    /// Output SCX file
    output: PathBuf,

    /// Target MCU name, or a device descriptor (YAML)
    #[arg(long, default_value = picblink_config::DEFAULT_DEVICE)]
    mcu: String,
}

#[derive(Parser, Debug)]
struct FusesArgs {
    /// Path to the blink manifest (YAML)
    #[arg(short, long)]
    manifest: Option<PathBuf>,

    /// Decode a raw configuration word instead
    #[arg(long, value_parser = parse_u16_word, conflicts_with = "manifest")]
    decode: Option<u16>,
}

#[derive(Debug, Serialize)]
struct TestResult {
    result_schema_version: String,
    status: String,
    iterations: u64,
    cycles: u64,
    stop_reason: Option<StopReason>,
    limits: Option<TestLimits>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    assertions: Vec<AssertionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    observed: Option<Observed>,
    config_hash: String,
    config: TestConfig,
}

#[derive(Debug, Serialize, Clone)]
struct AssertionResult {
    assertion: TestAssertion,
    passed: bool,
}

#[derive(Debug, Serialize, Clone)]
struct Observed {
    pin_sequence: Vec<PinLevel>,
    period_us: Option<f64>,
    duty_cycle: Option<f64>,
    direction_writes: u64,
    config_word: u16,
}

#[derive(Debug, Serialize, Clone)]
struct TestConfig {
    script: PathBuf,
    manifest: Option<PathBuf>,
    hex: Option<PathBuf>,
}

/// Everything the test run needs once its inputs have been read.
struct PreparedInputs {
    machine_config: MachineConfig,
    config_word: u16,
    config_hash: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing with appropriate level based on --trace flag
    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    match cli.command {
        Commands::Run(args) => run_blink(args),
        Commands::Test(args) => run_test(args),
        Commands::Hex2Scx(args) => run_hex2scx(args),
        Commands::Fuses(args) => run_fuses(args),
    }
}

fn load_manifest(path: Option<&Path>) -> anyhow::Result<(BlinkManifest, DeviceDescriptor)> {
    match path {
        Some(path) => {
            info!("Loading blink manifest: {:?}", path);
            let manifest = BlinkManifest::from_file(path)?;
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            let device = DeviceDescriptor::resolve(&manifest.device, base)
                .with_context(|| format!("Failed to resolve device '{}'", manifest.device))?;
            info!("Target device: {}", device.name);
            Ok((manifest, device))
        }
        None => {
            info!("Using built-in blink settings");
            Ok((BlinkManifest::default(), DeviceDescriptor::default()))
        }
    }
}

fn run_blink(args: RunArgs) -> ExitCode {
    if args.iterations > MAX_ALLOWED_ITERATIONS {
        error!(
            "iterations {} exceeds MAX_ALLOWED_ITERATIONS {}",
            args.iterations, MAX_ALLOWED_ITERATIONS
        );
        return ExitCode::from(EXIT_CONFIG_ERROR);
    }

    let config = match load_manifest(args.manifest.as_deref())
        .and_then(|(manifest, device)| MachineConfig::from_manifest(&manifest, &device))
    {
        Ok(c) => c,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    match simulate(&args, config) {
        Ok(()) => ExitCode::from(EXIT_PASS),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_RUNTIME_ERROR)
        }
    }
}

fn simulate(args: &RunArgs, config: MachineConfig) -> anyhow::Result<()> {
    let metrics = Arc::new(PerformanceMetrics::new());
    let mut observers: Vec<Arc<dyn SimulationObserver>> = vec![metrics.clone()];
    if let Some(path) = &args.vcd {
        info!("Writing waveform to {:?}", path);
        observers.push(Arc::new(VcdObserver::new(path, &config)?));
    }

    let mut machine = Machine::with_observers(config, observers)?;
    info!("Running {} iteration(s)...", args.iterations);
    machine.run_iterations(args.iterations)?;
    machine.stop();

    let trace = machine.pin_trace()?;
    let levels: Vec<&str> = trace
        .levels()
        .iter()
        .map(|l| match l {
            PinLevel::High => "HIGH",
            PinLevel::Low => "LOW",
        })
        .collect();
    info!("Pin {} sequence: {}", trace.pin, levels.join(" -> "));
    if let Some(period) = trace.period_us(config.clock_hz) {
        info!("Period: {:.1} us", period);
    }
    if let Some(duty) = trace.duty_cycle() {
        info!("Duty cycle: {:.2}%", duty * 100.0);
    }
    report_metrics(&metrics, config.clock_hz);

    if let Some(path) = &args.snapshot {
        let snapshot = machine.snapshot()?;
        let f = std::fs::File::create(path)
            .with_context(|| format!("Failed to create snapshot file {:?}", path))?;
        serde_json::to_writer_pretty(f, &snapshot)?;
        info!("Snapshot written to {:?}", path);
    }

    Ok(())
}

fn report_metrics(metrics: &PerformanceMetrics, clock_hz: u32) {
    let cycles = metrics.get_cycles();
    info!("Simulation finished.");
    info!("  Iterations: {}", metrics.get_iterations());
    info!("  Register writes: {}", metrics.get_register_writes());
    info!(
        "  Cycles: {} ({:.3} ms of target time)",
        cycles,
        firmware::delay::cycles_to_ns(cycles, clock_hz) as f64 / 1_000_000.0
    );
    info!("  Speed: {:.2} MHz", metrics.get_cycles_per_sec() / 1_000_000.0);
}

fn run_test(args: TestArgs) -> ExitCode {
    let mut config = TestConfig {
        script: args.script.clone(),
        manifest: args.manifest.clone(),
        hex: args.hex.clone(),
    };

    let script = match TestScript::from_file(&args.script) {
        Ok(s) => s,
        Err(e) => return config_error(&args, config, None, e),
    };

    if config.manifest.is_none() {
        config.manifest = script
            .inputs
            .manifest
            .as_deref()
            .map(|m| TestScript::resolve_input(&args.script, m));
    }
    if config.hex.is_none() {
        config.hex = script
            .inputs
            .hex
            .as_deref()
            .map(|h| TestScript::resolve_input(&args.script, h));
    }

    let limits = TestLimits {
        max_iterations: args
            .max_iterations
            .unwrap_or(script.limits.max_iterations),
        max_cycles: args.max_cycles.or(script.limits.max_cycles),
    };

    if limits.max_iterations > MAX_ALLOWED_ITERATIONS {
        let e = anyhow::anyhow!(
            "max_iterations {} exceeds MAX_ALLOWED_ITERATIONS {}",
            limits.max_iterations,
            MAX_ALLOWED_ITERATIONS
        );
        return config_error(&args, config, Some(limits), e);
    }

    let prepared = match prepare_inputs(&config) {
        Ok(p) => p,
        Err(e) => return config_error(&args, config, Some(limits), e),
    };

    execute_test(&args, config, limits, &script.assertions, prepared)
}

fn prepare_inputs(config: &TestConfig) -> anyhow::Result<PreparedInputs> {
    let mut hasher = Sha256::new();

    if let Some(path) = &config.manifest {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read blink manifest {:?}", path))?;
        hasher.update(&bytes);
    }
    let (manifest, device) = load_manifest(config.manifest.as_deref())?;
    let machine_config = MachineConfig::from_manifest(&manifest, &device)?;

    let mut config_word = manifest.fuses.encode().bits();
    if let Some(path) = &config.hex {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read HEX file {:?}", path))?;
        hasher.update(&bytes);

        let text = std::str::from_utf8(&bytes)
            .with_context(|| format!("HEX file {:?} is not valid text", path))?;
        let image = picblink_loader::parse_intel_hex(text)
            .with_context(|| format!("Failed to parse HEX file {:?}", path))?;
        match image.word_at(device.config_address as u32) {
            Some(word) => {
                if word != config_word {
                    warn!(
                        "CONFIG word in {:?} is {:#06x}, manifest fuses encode {:#06x}",
                        path, word, config_word
                    );
                }
                config_word = word;
            }
            None => warn!(
                "No CONFIG word at {:#06x} in {:?}, using manifest fuses",
                device.config_address, path
            ),
        }
    }

    Ok(PreparedInputs {
        machine_config,
        config_word,
        config_hash: format!("{:x}", hasher.finalize()),
    })
}

fn stop_reason_for(e: &SimulationError) -> StopReason {
    match e {
        SimulationError::MemoryViolation(_) | SimulationError::MissingPort => {
            StopReason::MemoryViolation
        }
    }
}

fn observe(machine: &Machine, config_word: u16) -> SimResult<Observed> {
    let trace = machine.pin_trace()?;
    Ok(Observed {
        pin_sequence: trace.levels(),
        period_us: trace.period_us(machine.config.clock_hz),
        duty_cycle: trace.duty_cycle(),
        direction_writes: machine.gpio()?.tris_writes(),
        config_word,
    })
}

fn execute_test(
    args: &TestArgs,
    config: TestConfig,
    limits: TestLimits,
    assertions: &[TestAssertion],
    prepared: PreparedInputs,
) -> ExitCode {
    let start = Instant::now();
    let metrics = Arc::new(PerformanceMetrics::new());
    let mut stop_reason = StopReason::MaxIterations;
    let mut sim_error_happened = false;

    let mut machine = match Machine::with_observers(prepared.machine_config, vec![metrics.clone()])
    {
        Ok(m) => Some(m),
        Err(e) => {
            error!("Simulation error during boot: {}", e);
            stop_reason = stop_reason_for(&e);
            sim_error_happened = true;
            None
        }
    };

    if let Some(machine) = machine.as_mut() {
        for iteration in 0..limits.max_iterations {
            if let Some(limit) = limits.max_cycles {
                if machine.cycles() >= limit {
                    stop_reason = StopReason::MaxCycles;
                    break;
                }
            }
            if let Err(e) = machine.step() {
                error!("Simulation error at iteration {}: {}", iteration, e);
                stop_reason = stop_reason_for(&e);
                sim_error_happened = true;
                break;
            }
        }
        machine.stop();
    }

    let observed = machine
        .as_ref()
        .and_then(|m| observe(m, prepared.config_word).ok());

    let mut assertion_results = Vec::new();
    let mut all_passed = true;
    let mut expected_stop_reason_matched = false;

    for assertion in assertions {
        let passed = match assertion {
            TestAssertion::PinSequence(a) => observed
                .as_ref()
                .is_some_and(|o| o.pin_sequence.starts_with(&a.pin_sequence)),
            TestAssertion::Period(a) => observed
                .as_ref()
                .and_then(|o| o.period_us)
                .is_some_and(|p| a.period_us.accepts(p)),
            TestAssertion::DutyCycle(a) => observed
                .as_ref()
                .and_then(|o| o.duty_cycle)
                .is_some_and(|d| a.duty_cycle.accepts(d)),
            TestAssertion::DirectionWrites(a) => observed
                .as_ref()
                .is_some_and(|o| o.direction_writes == a.direction_writes),
            TestAssertion::ConfigWord(a) => prepared.config_word == a.config_word,
            TestAssertion::ExpectedStopReason(a) => a.expected_stop_reason == stop_reason,
        };

        if matches!(assertion, TestAssertion::ExpectedStopReason(_)) && passed {
            expected_stop_reason_matched = true;
        }

        if !passed {
            all_passed = false;
            error!("Assertion failed: {:?} (observed: {:?})", assertion, observed);
        }

        assertion_results.push(AssertionResult {
            assertion: assertion.clone(),
            passed,
        });
    }

    let (status, code) = if !all_passed {
        ("fail", EXIT_ASSERT_FAIL)
    } else if sim_error_happened && !expected_stop_reason_matched {
        ("error", EXIT_RUNTIME_ERROR)
    } else {
        ("pass", EXIT_PASS)
    };
    info!("Test {}: stop reason {:?}", status, stop_reason);

    let (iterations, cycles) = machine
        .as_ref()
        .map(|m| (m.iterations(), m.cycles()))
        .unwrap_or((0, metrics.get_cycles()));
    let snapshot = machine.as_ref().and_then(|m| m.snapshot().ok());

    let result = TestResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: status.to_string(),
        iterations,
        cycles,
        stop_reason: Some(stop_reason),
        limits: Some(limits),
        message: None,
        assertions: assertion_results,
        observed,
        config_hash: prepared.config_hash,
        config,
    };
    write_outputs(args, &result, snapshot.as_ref(), start.elapsed());

    ExitCode::from(code)
}

fn config_error(
    args: &TestArgs,
    config: TestConfig,
    limits: Option<TestLimits>,
    e: anyhow::Error,
) -> ExitCode {
    let msg = format!("{:#}", e);
    error!("{}", msg);

    let result = TestResult {
        result_schema_version: RESULT_SCHEMA_VERSION.to_string(),
        status: "error".to_string(),
        iterations: 0,
        cycles: 0,
        stop_reason: None,
        limits,
        message: Some(msg),
        assertions: Vec::new(),
        observed: None,
        config_hash: String::new(),
        config,
    };
    write_outputs(args, &result, None, Duration::ZERO);

    ExitCode::from(EXIT_CONFIG_ERROR)
}

fn write_outputs(
    args: &TestArgs,
    result: &TestResult,
    snapshot: Option<&MachineSnapshot>,
    duration: Duration,
) {
    if let Some(output_dir) = &args.output_dir {
        if let Err(e) = std::fs::create_dir_all(output_dir) {
            error!("Failed to create output directory {:?}: {}", output_dir, e);
        } else {
            write_json(&output_dir.join("result.json"), result);
            if let Some(snapshot) = snapshot {
                write_json(&output_dir.join("snapshot.json"), snapshot);
            }

            let junit_path = output_dir.join("junit.xml");
            if let Err(e) = write_junit_xml(&junit_path, result, duration) {
                error!("Failed to write junit.xml: {}", e);
            }
        }
    }

    if let Some(junit_path) = &args.junit {
        if let Some(parent) = junit_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = write_junit_xml(junit_path, result, duration) {
            error!("Failed to write JUnit report {:?}: {}", junit_path, e);
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) {
    match std::fs::File::create(path) {
        Ok(f) => {
            if let Err(e) = serde_json::to_writer_pretty(f, value) {
                error!("Failed to write {:?}: {}", path, e);
            }
        }
        Err(e) => error!("Failed to create {:?}: {}", path, e),
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn write_junit_xml(path: &Path, result: &TestResult, duration: Duration) -> std::io::Result<()> {
    let mut details = String::new();
    details.push_str(&format!(
        "result_schema_version={}\n",
        result.result_schema_version
    ));
    if let Some(reason) = &result.stop_reason {
        details.push_str(&format!("stop_reason={:?}\n", reason));
    }
    if let Some(msg) = &result.message {
        details.push_str(&format!("message={}\n", msg));
    }
    details.push_str(&format!("iterations={}\n", result.iterations));
    details.push_str(&format!("cycles={}\n", result.cycles));
    if let Some(limits) = &result.limits {
        details.push_str("limits:\n");
        details.push_str(&format!("  - max_iterations={}\n", limits.max_iterations));
        if let Some(v) = limits.max_cycles {
            details.push_str(&format!("  - max_cycles={}\n", v));
        }
    }
    if let Some(o) = &result.observed {
        details.push_str(&format!("observed={:?}\n", o));
    }
    details.push_str(&format!("config_hash={}\n", result.config_hash));
    details.push_str(&format!("script={}\n", result.config.script.display()));
    if let Some(m) = &result.config.manifest {
        details.push_str(&format!("manifest={}\n", m.display()));
    }
    if let Some(h) = &result.config.hex {
        details.push_str(&format!("hex={}\n", h.display()));
    }

    let time_secs = duration.as_secs_f64();
    let mut tests: u64 = 0;
    let mut failures: u64 = 0;
    let mut errors: u64 = 0;
    let mut testcases = String::new();

    // The "run" testcase carries config and runtime errors.
    tests += 1;
    testcases.push_str(&format!(
        "  <testcase classname=\"picblink\" name=\"run\" time=\"{:.6}\">\n",
        time_secs
    ));
    if result.status == "error" {
        let err_type = if result.stop_reason.is_none() {
            "config error"
        } else {
            "runtime error"
        };
        errors += 1;
        testcases.push_str(&format!(
            "    <error message=\"{}\">{}</error>\n",
            xml_escape(err_type),
            xml_escape(&details)
        ));
    }
    testcases.push_str("  </testcase>\n");

    for (idx, a) in result.assertions.iter().enumerate() {
        tests += 1;
        let name = format!(
            "assertion {}: {}",
            idx + 1,
            assertion_short_name(&a.assertion)
        );
        testcases.push_str(&format!(
            "  <testcase classname=\"picblink\" name=\"{}\" time=\"0.000000\">\n",
            xml_escape(&name)
        ));
        if !a.passed {
            failures += 1;
            testcases.push_str(&format!(
                "    <failure message=\"assertion failed\">{}</failure>\n",
                xml_escape(&format!("{}\n\n{}", name, details))
            ));
        }
        testcases.push_str("  </testcase>\n");
    }

    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push('\n');
    xml.push_str(&format!(
        r#"<testsuite name="picblink" tests="{}" failures="{}" errors="{}" time="{:.6}">"#,
        tests, failures, errors, time_secs
    ));
    xml.push('\n');
    xml.push_str("  <properties>\n");
    xml.push_str(&format!(
        "    <property name=\"result_schema_version\" value=\"{}\"/>\n",
        xml_escape(&result.result_schema_version)
    ));
    if let Some(reason) = &result.stop_reason {
        xml.push_str(&format!(
            "    <property name=\"stop_reason\" value=\"{}\"/>\n",
            xml_escape(&format!("{:?}", reason))
        ));
    }
    xml.push_str(&format!(
        "    <property name=\"config_hash\" value=\"{}\"/>\n",
        xml_escape(&result.config_hash)
    ));
    xml.push_str("  </properties>\n");
    xml.push_str(&testcases);
    xml.push_str("</testsuite>\n");

    std::fs::write(path, xml)
}

fn assertion_short_name(assertion: &TestAssertion) -> String {
    match assertion {
        TestAssertion::PinSequence(a) => format!("pin_sequence: {:?}", a.pin_sequence),
        TestAssertion::Period(a) => format!(
            "period_us: {} +/- {}",
            a.period_us.expected, a.period_us.tolerance
        ),
        TestAssertion::DutyCycle(a) => format!(
            "duty_cycle: {} +/- {}",
            a.duty_cycle.expected, a.duty_cycle.tolerance
        ),
        TestAssertion::DirectionWrites(a) => format!("direction_writes: {}", a.direction_writes),
        TestAssertion::ConfigWord(a) => format!("config_word: {:#06x}", a.config_word),
        TestAssertion::ExpectedStopReason(a) => {
            format!("expected_stop_reason: {:?}", a.expected_stop_reason)
        }
    }
}

fn run_hex2scx(args: Hex2ScxArgs) -> ExitCode {
    match convert_hex(&args) {
        Ok(()) => ExitCode::from(EXIT_PASS),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_CONFIG_ERROR)
        }
    }
}

fn convert_hex(args: &Hex2ScxArgs) -> anyhow::Result<()> {
    let device = if args.mcu.ends_with(".yaml") || args.mcu.ends_with(".yml") {
        DeviceDescriptor::from_file(&args.mcu)?
    } else {
        picblink_loader::scx::device_or_default(&args.mcu)
    };

    info!("Loading HEX image: {:?}", args.input);
    let image = picblink_loader::load_hex(&args.input)?;
    let scx = picblink_loader::ScxImage::from_program(&image, &device)?;
    scx.write_to(&args.output)
}

fn run_fuses(args: FusesArgs) -> ExitCode {
    if let Some(word) = args.decode {
        let fuses = FuseConfig::decode(ConfigWord::from_bits_retain(word));
        return match serde_yaml::to_string(&fuses) {
            Ok(yaml) => {
                print!("{}", yaml);
                ExitCode::from(EXIT_PASS)
            }
            Err(e) => {
                error!("Failed to render fuses: {}", e);
                ExitCode::from(EXIT_RUNTIME_ERROR)
            }
        };
    }

    let (manifest, device) = match load_manifest(args.manifest.as_deref()) {
        Ok(v) => v,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let fuses = manifest.fuses;
    println!(
        "CONFIG @ {:#06x} = {:#06x}",
        device.config_address,
        fuses.encode().bits()
    );
    println!("  oscillator      {:?}", fuses.oscillator);
    println!("  watchdog        {:?}", fuses.watchdog);
    println!("  power_up_timer  {:?}", fuses.power_up_timer);
    println!("  master_clear    {:?}", fuses.master_clear);
    println!("  code_protect    {:?}", fuses.code_protect);
    println!("  brown_out       {:?}", fuses.brown_out);
    ExitCode::from(EXIT_PASS)
}
