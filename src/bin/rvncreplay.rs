//! `rvncreplay`: post-processes a recorded session (§4.6-§4.8) without a
//! live VNC connection.
//!
//! Grounded on the same `env_logger::init()` + clap-derive shape as
//! `rvncclient.rs`/`rvncproxy.rs`; the teacher has no replay/mapper
//! binary of its own (no replay layer exists in `whitequark-rust-vnc`),
//! so this one is built straight from SPEC_FULL §4.6-§4.8 with the
//! library's `recording::ReplayParser`, `actions::synthesize`, and
//! `mapper` doing the actual work.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::{error, info};

use pf_vnc::actions::synthesize;
use pf_vnc::mapper::{self, MapperConfig, ScreenshotFormat};
use pf_vnc::recording::ReplayParser;

#[derive(Parser)]
#[command(name = "rvncreplay", about = "RFB/VNC recording post-processor")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a recording directory and print the synthesized action
    /// timeline to stdout as JSON.
    Actions {
        /// Directory containing `client.rfb.bin`/`server.rfb.bin` and
        /// their `.time.bin` indices.
        dir: PathBuf,
    },
    /// Align an `execution.json` trace to a recording and export
    /// before/after screenshots plus a JSON index.
    Screenshots {
        /// Recording directory (as produced by `start_recording`).
        recording_dir: PathBuf,
        /// Path to `execution.json` or `reenact_execution.json`.
        execution: PathBuf,
        /// Directory to write `action_screenshots/` and the index JSON
        /// into.
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
        /// Export screenshots as PNG instead of JPEG.
        #[arg(long)]
        png: bool,
        /// Maximum screenshot width; wider frames are downscaled.
        #[arg(long, default_value_t = 1280)]
        max_width: u32,
    },
}

fn run_actions(dir: &PathBuf) -> pf_vnc::Result<()> {
    let mut parser = ReplayParser::open(dir)?;
    let mut events = Vec::new();
    while let Some(step) = parser.next_step()? {
        events.push((step.timestamp_ns, step.event));
    }
    let steps = synthesize(events);
    let json = serde_json::to_string_pretty(&steps)
        .map_err(|e| pf_vnc::RfbError::codec(format!("failed to serialize actions: {}", e)))?;
    println!("{}", json);
    info!("synthesized {} action(s) from {}", steps.len(), dir.display());
    Ok(())
}

fn run_screenshots(
    recording_dir: &PathBuf,
    execution: &PathBuf,
    out: &PathBuf,
    png: bool,
    max_width: u32,
) -> pf_vnc::Result<()> {
    let trace = mapper::load_execution_trace(execution)?;
    let config = MapperConfig {
        format: if png { ScreenshotFormat::Png } else { ScreenshotFormat::Jpeg },
        max_image_width: max_width,
        ..MapperConfig::default()
    };
    std::fs::create_dir_all(out)?;
    let records = mapper::run(recording_dir, &trace, out, &config)?;
    let index_path = out.join(mapper::output_json_filename(execution));
    mapper::write_index_json(&records, &index_path)?;
    info!(
        "wrote {} screenshot record(s) to {}",
        records.len(),
        index_path.display()
    );
    Ok(())
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match &cli.command {
        Command::Actions { dir } => run_actions(dir),
        Command::Screenshots {
            recording_dir,
            execution,
            out,
            png,
            max_width,
        } => run_screenshots(recording_dir, execution, out, *png, *max_width),
    };

    if let Err(error) = result {
        error!("replay post-processing failed: {}", error);
        std::process::exit(1);
    }
}
