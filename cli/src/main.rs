use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use voxtext_core::config::Config;
use voxtext_core::engine::{Engine, TranscribeOptions, TranscriptionResult};
use voxtext_core::models::ModelSize;
use voxtext_core::record;

#[derive(Parser)]
#[command(name = "voxtext")]
#[command(about = "voxtext - local speech-to-text console")]
#[command(version)]
struct Cli {
    /// Model size to load.
    #[arg(long)]
    model: Option<ModelSize>,
    /// Skip accelerator probing and load on CPU.
    #[arg(long)]
    cpu: bool,
    /// Language code (auto-detect when omitted).
    #[arg(long)]
    language: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    voxtext_core::install_inference_logging();

    let mut config = Config::load().unwrap_or_default();
    if let Some(model) = cli.model {
        config.model.size = model;
    }
    if cli.cpu {
        config.model.prefer_gpu = false;
    }
    if cli.language.is_some() {
        config.model.language = cli.language.clone();
    }

    println!("Loading {} model...", config.model.size);
    let engine = Engine::new(&config).context("failed to initialize transcription engine")?;

    let status = engine.status();
    println!(
        "Model ready: {} on {}/{}",
        status.model_size, status.device, status.precision
    );

    let stdin = io::stdin();
    loop {
        println!();
        println!("Options:");
        println!("  1. Record and transcribe from microphone");
        println!("  2. Transcribe an audio/video file");
        println!("  3. Exit");

        let choice = prompt(&stdin, "Enter your choice (1-3): ")?;
        match choice.as_str() {
            "1" => run_recording(&stdin, &engine)?,
            "2" => run_file(&stdin, &engine)?,
            "3" => break,
            _ => println!("Invalid choice, try again."),
        }
    }

    Ok(())
}

fn run_recording(stdin: &io::Stdin, engine: &Engine) -> anyhow::Result<()> {
    let answer = prompt(stdin, "Recording duration in seconds [default: 5]: ")?;
    let duration: f32 = if answer.is_empty() {
        5.0
    } else {
        match answer.parse() {
            Ok(value) => value,
            Err(_) => {
                println!("Not a number: {answer}");
                return Ok(());
            }
        }
    };

    println!("Recording for {duration}s. Speak now...");
    match record::record_and_transcribe(engine, duration, &TranscribeOptions::default()) {
        Ok(result) => print_result(&result),
        Err(e) => eprintln!("Recording/transcription failed: {e}"),
    }
    Ok(())
}

fn run_file(stdin: &io::Stdin, engine: &Engine) -> anyhow::Result<()> {
    let answer = prompt(stdin, "Path to audio/video file: ")?;
    let path = Path::new(&answer);
    if !path.exists() {
        println!("File not found: {answer}");
        return Ok(());
    }

    match engine.transcribe(path, &TranscribeOptions::default()) {
        Ok(result) => print_result(&result),
        Err(e) => eprintln!("Transcription failed: {e}"),
    }
    Ok(())
}

fn print_result(result: &TranscriptionResult) {
    println!();
    println!("Transcription:");
    println!("{}", result.text);
    println!(
        "(language: {} at {:.0}%, {} segments, {:.1}s)",
        result.language_code,
        result.language_confidence * 100.0,
        result.segment_count,
        result.duration_seconds
    );
}

fn prompt(stdin: &io::Stdin, message: &str) -> anyhow::Result<String> {
    print!("{message}");
    io::stdout().flush()?;
    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}
