//! Runs the built-in verification suite on the selected backend.
//!
//! ```text
//! cargo run --example verify_suite [config.json] [report.json]
//! KVERIFY_DEVICE=cpu:0 KVERIFY_ITERS=50 RUST_LOG=debug cargo run --example verify_suite
//! ```

use kernel_verify::inputs::{arange, probabilities, uniform};
use kernel_verify::ops::{CHUNK, CUMSUM, MULTINOMIAL};
use kernel_verify::{DType, HarnessConfig, OperationParameters, TestCase, TestDriver, ToleranceSpec};

fn cases() -> Result<Vec<TestCase>, Box<dyn std::error::Error>> {
    Ok(vec![
        TestCase::new("cumsum-2x16", OperationParameters::new(CUMSUM).with("axis", 1))
            .with_input_fn(|| Ok(vec![uniform("x", vec![2, 16], 7, -1.0, 1.0)?]))
            .with_tolerance(ToleranceSpec::combined(1e-2, 1e-2)?),
        TestCase::new("cumsum-bf16-axis0", OperationParameters::new(CUMSUM).with("axis", 0))
            .with_inputs(vec![arange("x", vec![32, 8], DType::BF16)?])
            .with_tolerance(ToleranceSpec::for_dtype(DType::BF16)),
        TestCase::new(
            "multinomial-3x3",
            OperationParameters::new(MULTINOMIAL).with("num_samples", 1).with("seed", 1234),
        )
        .with_input_fn(|| Ok(vec![probabilities("p", 3, 3, 5)?])),
        TestCase::new("chunk-6x6", OperationParameters::new(CHUNK).with("chunks", 2).with("axis", 0))
            .with_inputs(vec![arange("x", vec![6, 6], DType::F32)?])
            .with_tolerance(ToleranceSpec::exact()),
    ])
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => HarnessConfig::from_json_file(path)?,
        None => HarnessConfig::default(),
    }
    .with_env_overrides()?;

    let driver = TestDriver::from_config(config)?;
    let suite = driver.run_suite(&cases()?);

    println!("{}", suite.summary_string());
    if let Some(stats) = &suite.statistics {
        println!("{}", stats.summary_string());
    }
    if let Some(out) = args.next() {
        suite.write_json(&out)?;
        println!("report written to {out}");
    }

    if suite.all_passed() {
        Ok(())
    } else {
        Err(format!("{} failed, {} aborted", suite.failed_count(), suite.aborts.len()).into())
    }
}
