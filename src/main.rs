//! Pi-cam-viewfinder binary: capture for a fixed window and print frame metadata.

use clap::{Parser, ValueEnum};
use pi_cam_viewfinder::traits::{CameraManager, Result};
use pi_cam_viewfinder::{run_capture, CaptureOptions, FourCC, MockManager, Size, StreamRole};
use std::time::Duration;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Camera stack to capture from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Real cameras through libcamera.
    #[cfg(feature = "libcamera")]
    #[default]
    Libcamera,
    /// Simulated camera stack.
    #[cfg_attr(not(feature = "libcamera"), default)]
    Mock,
}

#[derive(Parser, Debug)]
#[command(name = "pi-cam-viewfinder")]
#[command(version, about = "Capture viewfinder frames and print their metadata", long_about = None)]
struct Args {
    /// Camera stack to use
    #[arg(long, value_enum, default_value_t = Backend::default(), env = "PI_CAM_BACKEND")]
    backend: Backend,

    /// Camera id (defaults to the first camera found)
    #[arg(long, env = "PI_CAM_CAMERA")]
    camera: Option<String>,

    /// Requested frame width
    #[arg(long, default_value_t = 640, env = "PI_CAM_WIDTH")]
    width: u32,

    /// Requested frame height
    #[arg(long, default_value_t = 480, env = "PI_CAM_HEIGHT")]
    height: u32,

    /// Requested pixel format as a FourCC (e.g. YUYV, NV12)
    #[arg(long, env = "PI_CAM_PIXEL_FORMAT")]
    pixel_format: Option<FourCC>,

    /// Requested number of buffers
    #[arg(long, env = "PI_CAM_BUFFERS")]
    buffers: Option<u32>,

    /// Stream role: viewfinder, still, video or raw
    #[arg(long, default_value = "viewfinder", env = "PI_CAM_ROLE")]
    role: StreamRole,

    /// Capture window in milliseconds
    #[arg(long = "duration-ms", default_value_t = 1000, env = "PI_CAM_DURATION_MS")]
    duration_ms: u64,

    /// Number of cameras the mock backend reports
    #[arg(long, default_value_t = 1, env = "PI_CAM_MOCK_CAMERAS")]
    mock_cameras: usize,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            camera: self.camera.clone(),
            role: self.role,
            size: Size::new(self.width, self.height),
            pixel_format: self.pixel_format,
            buffer_count: self.buffers,
            window: Duration::from_millis(self.duration_ms),
        }
    }
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    let code = match run(&args) {
        Ok(()) => 0,
        Err(err) => {
            error!("{err}");
            err.exit_code()
        }
    };
    std::process::exit(code);
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: &Args) -> Result<()> {
    let options = args.capture_options();

    match args.backend {
        #[cfg(feature = "libcamera")]
        Backend::Libcamera => {
            let manager = pi_cam_viewfinder::LibcameraManager::new()?;
            capture(&manager, &options)
        }
        Backend::Mock => {
            let ids = (0..args.mock_cameras).map(|index| format!("mock:{index}"));
            let manager = MockManager::new(ids).with_frame_interval(Duration::from_millis(33));
            capture(&manager, &options)
        }
    }
}

fn capture<M: CameraManager>(manager: &M, options: &CaptureOptions) -> Result<()> {
    run_capture(manager, options, std::io::stdout())?;
    Ok(())
}
