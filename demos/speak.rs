//! Play a WAV file with pre-generated facial data over LiveLink.
//!
//! ```text
//! cargo run --example speak -- speech.wav speech_frames.json [gestures/] [config.json]
//! ```
//!
//! `speech_frames.json` holds the inference output as an array of frames, each
//! an array of 68 floats.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use facesync_rs::{
    animation::GestureLibrary,
    audio::{wav_duration, WavClockPlayer},
    config::EngineConfig,
    livelink::UdpTransport,
    playback::{IdleAnimation, PlaybackEngine},
    FacialSequence,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let (Some(wav_path), Some(frames_path)) = (args.next(), args.next()) else {
        eprintln!("usage: speak <audio.wav> <frames.json> [gesture dir] [config.json]");
        std::process::exit(2);
    };
    let gesture_dir = args.next().map(PathBuf::from);
    let config = match args.next() {
        Some(path) => EngineConfig::from_json_file(&PathBuf::from(path))?,
        None => EngineConfig::default(),
    };

    let library = match gesture_dir {
        Some(dir) => GestureLibrary::load_dir(&dir)?,
        None => GestureLibrary::new(),
    };
    let emotions: Vec<String> = library.emotions().map(|e| e.to_string()).collect();
    println!("Gesture clips: {} ({})", library.len(), emotions.join(", "));

    let transport = Arc::new(UdpTransport::connect(config.livelink_addr.as_str())?);
    let idle = IdleAnimation::neutral(&config.blink);
    let engine = PlaybackEngine::start(
        config,
        transport,
        Arc::new(WavClockPlayer),
        Arc::new(library),
        idle,
    )?;

    println!(
        "Streaming to {} as subject {:?} at {} fps",
        engine.config().livelink_addr,
        engine.config().subject_name,
        engine.config().fps
    );

    let audio = std::fs::read(&wav_path)?;
    let generated: FacialSequence = serde_json::from_str(&std::fs::read_to_string(&frames_path)?)?;

    let prep_start = Instant::now();
    let encoded = engine.prepare(&generated)?;
    println!(
        "Prepared {} frames ({:.2?} of animation, {:.2?} of audio) in {:.2?}",
        encoded.len(),
        encoded.duration(),
        wav_duration(&audio)?,
        prep_start.elapsed()
    );

    // let the idle loop settle before the first session
    std::thread::sleep(Duration::from_millis(500));

    let report = engine.play(&encoded, &audio)?;
    println!(
        "Session finished in {:.2?} (audio ok: {}, frames: {:?})",
        report.elapsed,
        report.audio.is_ok(),
        report.frames
    );

    std::thread::sleep(Duration::from_secs(1));
    engine.stop();
    Ok(())
}
