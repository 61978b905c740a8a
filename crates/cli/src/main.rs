use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use phonecam::config::{DEFAULT_AUDIO_PORT, DEFAULT_VIDEO_PORT};
use phonecam::media::pattern::TestPattern;
use phonecam::media::tone::ToneSource;
use phonecam::media::yuv::{DEFAULT_JPEG_QUALITY, JpegCompressor};
use phonecam::protocol::{AudioFormat, FrameReader, Record};
use phonecam::{
    AudioSource, CapturePipeline, EventSink, Result, Rotation, StreamConfig, StreamController,
    StreamEvent, TransportMode,
};

#[cfg(feature = "mic")]
mod mic;

#[derive(Parser)]
#[command(
    name = "phonecam",
    about = "Stream camera frames and microphone audio to a single viewer over TCP"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the device-side servers with a test pattern and tone
    Serve(ServeArgs),
    /// Connect to a video server and read frame records
    View(ViewArgs),
    /// Connect to an audio server and read raw PCM
    Listen(ListenArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// usb (loopback, for adb forward) or network (all interfaces)
    #[arg(long, default_value = "network")]
    mode: TransportMode,

    #[arg(long, default_value_t = DEFAULT_VIDEO_PORT)]
    video_port: u16,

    #[arg(long, default_value_t = DEFAULT_AUDIO_PORT)]
    audio_port: u16,

    #[arg(long, default_value_t = 640)]
    width: usize,

    #[arg(long, default_value_t = 480)]
    height: usize,

    /// Target frame rate (0 = as fast as possible)
    #[arg(long, default_value_t = 15)]
    fps: u32,

    /// JPEG quality, 1-100
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY)]
    quality: u8,

    /// Rotation tag sent with every frame (0, 90, 180, 270)
    #[arg(long, default_value = "0", value_parser = parse_rotation)]
    rotation: Rotation,

    /// Capture the default input device instead of a test tone
    #[cfg(feature = "mic")]
    #[arg(long)]
    mic: bool,
}

#[derive(Args)]
struct ViewArgs {
    #[arg(long, default_value = "127.0.0.1:8554")]
    addr: String,

    /// Directory to write frame-NNNNNN.jpg files into
    #[arg(long)]
    out: Option<PathBuf>,

    /// Stop after this many frames
    #[arg(long)]
    limit: Option<u64>,
}

#[derive(Args)]
struct ListenArgs {
    #[arg(long, default_value = "127.0.0.1:8555")]
    addr: String,

    /// File to write raw PCM (s16le, mono, 44100 Hz) into
    #[arg(long)]
    out: Option<PathBuf>,

    /// Stop after this many seconds of audio
    #[arg(long)]
    seconds: Option<u64>,
}

fn parse_rotation(s: &str) -> std::result::Result<Rotation, String> {
    let degrees: i32 = s.parse().map_err(|e| format!("{e}"))?;
    Rotation::from_degrees(degrees).ok_or_else(|| format!("{degrees} is not a multiple of 90"))
}

/// Prints controller events the way a status log would show them.
struct ConsoleSink;

impl EventSink for ConsoleSink {
    fn emit(&self, event: StreamEvent) {
        println!("{event}");
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Serve(args) => serve(args),
        Command::View(args) => view(args),
        Command::Listen(args) => listen(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn serve(args: ServeArgs) -> Result<()> {
    let config = StreamConfig {
        video_port: args.video_port,
        audio_port: args.audio_port,
        mode: args.mode,
        jpeg_quality: args.quality,
        ..StreamConfig::default()
    };

    let controller = Arc::new(
        StreamController::builder(config.clone())
            .audio_source(audio_source(&args, config.audio))
            .events(Arc::new(ConsoleSink))
            .build(),
    );
    controller.start_streaming();

    let pattern = TestPattern::new(args.width, args.height, JpegCompressor::new(config.jpeg_quality))
        .with_rotation(args.rotation);
    let mut pipeline = CapturePipeline::spawn(pattern, controller.clone(), args.fps)?;

    if let Some(endpoint) = controller.endpoint() {
        println!("Streaming at {endpoint}; press Enter to stop");
    }
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    pipeline.stop();
    controller.stop_streaming();
    Ok(())
}

#[cfg(feature = "mic")]
fn audio_source(args: &ServeArgs, format: AudioFormat) -> Arc<dyn AudioSource> {
    if args.mic {
        Arc::new(mic::MicSource::new(format))
    } else {
        Arc::new(ToneSource::new(format, 440.0))
    }
}

#[cfg(not(feature = "mic"))]
fn audio_source(_args: &ServeArgs, format: AudioFormat) -> Arc<dyn AudioSource> {
    Arc::new(ToneSource::new(format, 440.0))
}

fn view(args: ViewArgs) -> Result<()> {
    let stream = TcpStream::connect(&args.addr)?;
    tracing::info!(addr = %args.addr, "connected to video server");

    if let Some(dir) = &args.out {
        fs::create_dir_all(dir)?;
    }

    let mut reader = FrameReader::new(BufReader::new(stream));
    let mut frames = 0u64;
    while let Some(record) = reader.next_record()? {
        let frame = match record {
            Record::Frame(frame) => frame,
            Record::EndOfStream => {
                tracing::info!("server ended the stream");
                break;
            }
        };
        frames += 1;
        tracing::info!(
            frame = frames,
            bytes = frame.payload.len(),
            rotation = frame.rotation.degrees(),
            "frame received"
        );
        if let Some(dir) = &args.out {
            fs::write(dir.join(format!("frame-{frames:06}.jpg")), &frame.payload)?;
        }
        if args.limit.is_some_and(|limit| frames >= limit) {
            break;
        }
    }

    println!("received {frames} frames");
    Ok(())
}

fn listen(args: ListenArgs) -> Result<()> {
    let mut stream = TcpStream::connect(&args.addr)?;
    tracing::info!(addr = %args.addr, "connected to audio server");

    let format = AudioFormat::default();
    let limit = args
        .seconds
        .map(|s| s.saturating_mul(format.bytes_per_second() as u64));
    let mut out = match &args.out {
        Some(path) => Some(BufWriter::new(File::create(path)?)),
        None => None,
    };

    let mut buf = [0u8; 4096];
    let mut total = 0u64;
    loop {
        let mut n = stream.read(&mut buf)?;
        if n == 0 {
            break;
        }
        if let Some(limit) = limit {
            n = n.min((limit - total) as usize);
        }
        if let Some(out) = out.as_mut() {
            out.write_all(&buf[..n])?;
        }
        total += n as u64;
        if limit.is_some_and(|limit| total >= limit) {
            break;
        }
    }
    if let Some(mut out) = out {
        out.flush()?;
    }

    let seconds = format.duration_of(total as usize).as_secs_f32();
    println!("received {total} bytes ({seconds:.1}s of audio)");
    Ok(())
}
