// SPDX-License-Identifier: GPL-3.0-only

use rpi_video::{CancelToken, CaptureSession, MediaFramework, SessionReport, VideoParam, signals};
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=rpi_video=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let param = VideoParam::default();
    let cancel = CancelToken::new();
    if let Err(e) = signals::install(param.signal_policy, cancel.clone()) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    println!("rpi-video {}", env!("GIT_VERSION"));
    println!(
        "Recording {}x{} @ {} fps, {} bit/s for {}s",
        param.width, param.height, param.frame_rate, param.bit_rate, param.max_seconds
    );

    let report = record(param, cancel);
    print_report(&report);
    ExitCode::from(report.exit_code())
}

#[cfg(all(feature = "mmal", any(target_arch = "arm", target_arch = "aarch64")))]
fn record(param: VideoParam, cancel: CancelToken) -> SessionReport {
    let framework = Arc::new(rpi_video::backends::mmal::MmalFramework::new());
    run_session(framework, param, cancel)
}

#[cfg(not(all(feature = "mmal", any(target_arch = "arm", target_arch = "aarch64"))))]
fn record(param: VideoParam, cancel: CancelToken) -> SessionReport {
    tracing::warn!("Built without MMAL support, recording from the simulated camera");
    let framework = Arc::new(rpi_video::backends::simulated::SimulatedFramework::new());
    run_session(framework, param, cancel)
}

fn run_session<F: MediaFramework>(
    framework: Arc<F>,
    param: VideoParam,
    cancel: CancelToken,
) -> SessionReport {
    CaptureSession::new(framework, param)
        .with_cancel_token(cancel)
        .run()
}

fn print_report(report: &SessionReport) {
    println!();
    match &report.error {
        None => {
            println!("Video saved: {}", report.output_path.display());
            println!(
                "Wrote {} bytes in {} buffers",
                report.bytes_written, report.buffers_delivered
            );
        }
        Some(e) => {
            println!("Recording failed after reaching `{}`: {}", report.reached, e);
            if report.output_created {
                println!("Partial output kept: {}", report.output_path.display());
            }
        }
    }
}
