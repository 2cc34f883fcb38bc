use std::fs;
use std::path::Path;
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;

use pdf_shrink::cli::{format_size, Args};
use pdf_shrink::{CompressionResult, Compressor, Progress, ProgressEvent, Settings};

const RULE: &str = "==================================================";

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // RUST_LOG wins over -v
    let mut logger = env_logger::Builder::new();
    logger.filter_level(match args.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    });
    if let Ok(spec) = std::env::var("RUST_LOG") {
        logger.parse_filters(&spec);
    }
    logger.init();

    if args.output.is_some() && args.input.len() > 1 {
        eprintln!("Error: --output can only be used with a single input file.");
        return Ok(ExitCode::FAILURE);
    }

    let compressor = Compressor::new(Settings::from_args(&args));
    let mut succeeded = 0;
    let mut failed = 0;

    for input in &args.input {
        if !input.exists() {
            eprintln!("Error: File not found: {}", input.display());
            failed += 1;
            continue;
        }
        let is_pdf = input
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if !is_pdf {
            eprintln!("Warning: Skipping non-PDF file: {}", input.display());
            continue;
        }

        match process_file(&compressor, &args, input) {
            Ok(true) => succeeded += 1,
            Ok(false) => failed += 1,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                failed += 1;
            }
        }
    }

    if args.input.len() > 1 {
        println!();
        println!("{}", RULE);
        println!(
            "Processed {} files: {} succeeded, {} failed",
            succeeded + failed,
            succeeded,
            failed
        );
    }

    Ok(if failed == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Compress one file; `Ok(false)` when compression itself failed.
fn process_file(compressor: &Compressor, args: &Args, input: &Path) -> Result<bool> {
    let output_path = args.output_path(input);
    if !args.quiet {
        println!();
        println!("{}", RULE);
        println!("PDF Compressor: {}", input.display());
        println!("{}", RULE);
    }

    let data = fs::read(input)
        .with_context(|| format!("Failed to read input file: {}", input.display()))?;

    let start = Instant::now();
    let quiet = args.quiet;
    let mut sink = |event: ProgressEvent| {
        if !quiet {
            println!("{}", event.message);
        }
    };
    let result = compressor.compress(&data, &mut Progress::new(&mut sink));
    log::debug!("{} finished in {:.2?}", input.display(), start.elapsed());

    if let Some(output) = &result.output {
        fs::write(&output_path, output)
            .with_context(|| format!("Failed to write output file: {}", output_path.display()))?;
    }
    print_result(&result, &output_path);
    Ok(result.success)
}

fn print_result(result: &CompressionResult, output_path: &Path) {
    println!();
    println!("{}", RULE);
    if !result.success {
        println!(
            "FAILED: {}",
            result.error_message.as_deref().unwrap_or("unknown error")
        );
        return;
    }

    println!("Output:   {}", output_path.display());
    println!("Original: {}", format_size(result.original_size_bytes));
    println!("Final:    {}", format_size(result.final_size_bytes));
    println!(
        "Savings:  {:.1}% ({:.1}x smaller)",
        result.savings_percent(),
        result.reduction_ratio()
    );
    println!("Step:     {}", result.step_used);

    if result.target_reached {
        println!("\nTarget size reached!");
    } else {
        println!("\nNote: Could not reach target size.");
        println!("      The PDF may have large vector graphics or few compressible images.");
    }
}
