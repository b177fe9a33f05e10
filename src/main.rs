use anyhow::{bail, Context};
use speechscan::{
    AnalysisEvent, AnalysisOrchestrator, AnalysisRequest, AnalysisResult, NegotiatorConfig,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

struct CliArgs {
    path: PathBuf,
    sensitivity: u8,
    frame_duration_ms: u32,
    json: bool,
}

fn parse_args() -> anyhow::Result<CliArgs> {
    let mut path = None;
    let mut sensitivity = 2u8;
    let mut frame_duration_ms = 30u32;
    let mut json = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--sensitivity" => {
                let value = args.next().context("--sensitivity needs a value")?;
                sensitivity = value.parse().context("invalid sensitivity")?;
            }
            "--frames" => {
                let value = args.next().context("--frames needs a value")?;
                frame_duration_ms = value.parse().context("invalid frame duration")?;
            }
            "--json" => json = true,
            other if path.is_none() => path = Some(PathBuf::from(other)),
            other => bail!("unexpected argument: {other}"),
        }
    }

    let Some(path) = path else {
        bail!("usage: speechscan <audio-file> [--sensitivity 0-3] [--frames 10|20|30] [--json]");
    };

    Ok(CliArgs {
        path,
        sensitivity,
        frame_duration_ms,
        json,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = parse_args()?;

    let orchestrator = AnalysisOrchestrator::new(NegotiatorConfig::default());
    let mut job = orchestrator.spawn(AnalysisRequest {
        path: args.path,
        sensitivity: args.sensitivity,
        frame_duration_ms: args.frame_duration_ms,
    });

    while let Some(event) = job.events.recv().await {
        match event {
            AnalysisEvent::Status(message) => eprintln!("{message}"),
            AnalysisEvent::Progress(percent) => eprintln!("  {percent:.0}%"),
            AnalysisEvent::Done(result) => {
                if args.json {
                    println!("{}", serde_json::to_string_pretty(&result)?);
                } else {
                    print_result(&result);
                }
            }
            AnalysisEvent::Failed(message) => bail!("analysis failed: {message}"),
        }
    }

    job.join().await;
    Ok(())
}

fn print_result(result: &AnalysisResult) {
    println!("File:          {}", result.file_name);
    println!("Total:         {:.2}s", result.total_duration);
    println!(
        "Speech:        {:.2}s ({:.1}%)",
        result.speech_duration,
        result.speech_percentage()
    );
    println!(
        "Silence:       {:.2}s ({:.1}%)",
        result.silence_duration,
        result.silence_percentage()
    );
    println!("Sample rate:   {} Hz", result.sample_rate);
    println!(
        "VAD:           sensitivity {}, {} ms frames",
        result.sensitivity, result.frame_duration_ms
    );

    if result.speech_segments.is_empty() {
        println!("No speech segments detected.");
        return;
    }

    println!("Segments:");
    for (index, segment) in result.speech_segments.iter().enumerate() {
        println!(
            "  {:>3}: {:8.2}s -> {:8.2}s  ({:.2}s)",
            index + 1,
            segment.start_seconds,
            segment.end_seconds,
            segment.duration()
        );
    }
}
