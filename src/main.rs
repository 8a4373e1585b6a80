//! ueye-capture demo binary: exercises a full capture cycle against the
//! simulated driver.

use std::sync::Arc;
use std::time::Duration;
use ueye_capture::sim::SimulatedCamera;
use ueye_capture::{CameraConfig, PixelFormat, Roi, Session};

fn main() {
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> ueye_capture::Result<()> {
    let adapter = Arc::new(SimulatedCamera::new());
    let session = Session::open(adapter, 0)?;

    let config = CameraConfig {
        exposure_ms: 10.0,
        roi: Roi::full(640, 480),
        format: PixelFormat::Mono8,
        ..CameraConfig::default()
    };
    session.configure(&config)?;

    println!(
        "Configured {}x{} {:?}, exposure {} ms",
        config.roi.width, config.roi.height, config.format, config.exposure_ms
    );

    session.start_capture(4)?;

    for _ in 0..5 {
        let frame = session.acquire_frame(Duration::from_secs(1))?;
        println!(
            "Frame {}: {} bytes, timestamp: {:?}",
            frame.info.frame_number,
            frame.data.len(),
            frame.info.timestamp
        );
    }

    session.stop_capture()?;
    session.close()
}
