//! # aviread
//!
//! Headless AVI player: parses a file, then walks the first video and audio
//! streams the way a real player would, logging every packet it would hand
//! to a decoder.

use anyhow::{Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};

use aviread_core::avi_demux::{Container, Packet, PacketKind, PacketSink, PixelFormat, StreamReader};
use aviread_core::DemuxConfig;

// ============================================================================
// Options
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
struct PlayerOptions {
    input: PathBuf,
    frames: u64,
    seek_ms: Option<u64>,
    json: bool,
    config: Option<PathBuf>,
    quiet_audio: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aviread=info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let options = parse_args(&args)?;
    let config = load_config(options.config.as_deref())?;

    if options.json {
        let json = aviread_core::avi_demux::avi_probe(&options.input, config)
            .with_context(|| format!("probing {}", options.input.display()))?;
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    tracing::info!("aviread v{}", aviread_core::VERSION);
    let stats = play(&options, config)?;
    tracing::info!(
        "Playback complete: video_frames={}, audio_packets={}, audio_bytes={}, palette_changes={}",
        stats.video_frames,
        stats.audio_packets,
        stats.audio_bytes,
        stats.palette_changes
    );
    Ok(())
}

fn parse_args(args: &[String]) -> Result<PlayerOptions> {
    let mut input: Option<PathBuf> = None;
    let mut frames: u64 = 120;
    let mut seek_ms = None;
    let mut json = false;
    let mut config = None;
    let mut quiet_audio = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--frames" | "-n" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("Missing value for --frames"))?;
                frames = value
                    .parse::<u64>()
                    .map_err(|e| anyhow::anyhow!("Invalid frame count {}: {}", value, e))?;
                i += 2;
            }
            "--seek-ms" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("Missing value for --seek-ms"))?;
                seek_ms = Some(
                    value
                        .parse::<u64>()
                        .map_err(|e| anyhow::anyhow!("Invalid seek time {}: {}", value, e))?,
                );
                i += 2;
            }
            "--config" => {
                let value = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("Missing value for --config"))?;
                config = Some(PathBuf::from(value));
                i += 2;
            }
            "--json" => {
                json = true;
                i += 1;
            }
            "--quiet-audio" => {
                quiet_audio = true;
                i += 1;
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other if other.starts_with('-') => {
                return Err(anyhow::anyhow!("Unknown option {}", other));
            }
            other => {
                input = Some(PathBuf::from(other));
                i += 1;
            }
        }
    }

    let input = input.ok_or_else(|| {
        print_usage();
        anyhow::anyhow!("Missing input file")
    })?;

    Ok(PlayerOptions {
        input,
        frames,
        seek_ms,
        json,
        config,
        quiet_audio,
    })
}

fn print_usage() {
    eprintln!(
        "\nUsage:\n  aviread <file.avi> [--json] [--frames <n>] [--seek-ms <t>] [--config <cfg.json>] [--quiet-audio]\n"
    );
}

fn load_config(path: Option<&Path>) -> Result<DemuxConfig> {
    let Some(path) = path else {
        return Ok(DemuxConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    DemuxConfig::from_json(&text).with_context(|| format!("parsing config {}", path.display()))
}

// ============================================================================
// Playback
// ============================================================================

#[derive(Debug, Default, Clone, PartialEq)]
struct PlaybackStats {
    video_frames: u64,
    audio_packets: u64,
    audio_bytes: u64,
    palette_changes: u64,
}

/// Stands in for the decoders: logs what would be decoded.
struct PacketLogger<'a> {
    stats: &'a mut PlaybackStats,
}

impl PacketSink for PacketLogger<'_> {
    fn on_video_compressed(&mut self, offset: u64, len: u32) {
        self.stats.video_frames += 1;
        tracing::info!("compressed video frame at {:#x}, {} bytes", offset, len);
    }

    fn on_video(&mut self, offset: u64, len: u32) {
        self.stats.video_frames += 1;
        tracing::info!("video frame at {:#x}, {} bytes", offset, len);
    }

    fn on_palette_change(&mut self, offset: u64, len: u32) {
        self.stats.palette_changes += 1;
        tracing::info!("palette change at {:#x}, {} bytes", offset, len);
    }

    fn on_audio(&mut self, offset: u64, len: u32) {
        self.stats.audio_packets += 1;
        self.stats.audio_bytes += len as u64;
        tracing::debug!("audio packet at {:#x}, {} bytes", offset, len);
    }
}

fn open(path: &Path) -> Result<File> {
    File::open(path).with_context(|| format!("opening {}", path.display()))
}

fn play(options: &PlayerOptions, config: DemuxConfig) -> Result<PlaybackStats> {
    let mut file = open(&options.input)?;
    let container = Container::parse_with_config(&mut file, config)
        .with_context(|| format!("parsing {}", options.input.display()))?;

    let summary = container.summary();
    tracing::info!(
        "{}x{} @ {:.3} fps, {} streams",
        summary.width,
        summary.height,
        summary.fps,
        summary.streams.len()
    );

    // Each reader gets its own handle so their positions never interfere.
    let (video, audio) = container.open_av_pair(open(&options.input)?, open(&options.input)?)?;
    let mut stats = PlaybackStats::default();

    let Some(mut video) = video else {
        if let Some(mut audio) = audio {
            drain_audio(&mut audio, u64::MAX, &mut stats)?;
        } else {
            tracing::warn!("No video or audio stream to play");
        }
        return Ok(stats);
    };
    let mut audio = audio;
    if let Some(audio) = audio.as_mut() {
        audio.set_quiet(options.quiet_audio);
    }
    if let Some(format) = video.pixel_format() {
        tracing::info!("Video pixel format: {:?}", format);
    }

    let mut pending = match options.seek_ms {
        Some(ms) => {
            if let Some(audio) = audio.as_mut() {
                audio.seek_to_time(ms, None)?;
            }
            let landed = video.seek_to_time(ms, None)?;
            if landed.is_none() {
                tracing::warn!("Seek to {} ms is past the end of the video stream", ms);
                return Ok(stats);
            }
            landed
        }
        None => None,
    };

    while stats.video_frames < options.frames {
        let packet = match pending.take() {
            Some(p) => p,
            None => match video.advance()? {
                Some(p) => p,
                None => break,
            },
        };
        video.dispatch(&mut PacketLogger { stats: &mut stats })?;
        if packet.kind() == Some(PacketKind::PaletteChange) {
            apply_palette(&mut video)?;
            continue;
        }

        if let Some(audio) = audio.as_mut() {
            let until = audio.byte_offset_from_time(frame_end_ms(&video, &packet));
            drain_audio(audio, until, &mut stats)?;
        }
    }

    Ok(stats)
}

/// Presentation time at which `packet` stops being shown.
fn frame_end_ms<S: aviread_core::ByteSource>(video: &StreamReader<'_, S>, packet: &Packet) -> u64 {
    let header = &video.stream_info().header;
    if header.rate == 0 {
        return 0;
    }
    (packet.stream_packet_index + 1) * header.scale as u64 * 1000 / header.rate as u64
}

fn apply_palette<S: aviread_core::ByteSource>(video: &mut StreamReader<'_, S>) -> Result<()> {
    if video.pixel_format() != Some(PixelFormat::IndexedColor) {
        tracing::warn!("Ignoring palette change on a non indexed-color stream");
        return Ok(());
    }
    video.apply_current_palette_change()?;
    Ok(())
}

/// Feed audio packets until the stream has delivered `until` bytes.
fn drain_audio<S: aviread_core::ByteSource>(
    audio: &mut StreamReader<'_, S>,
    until: u64,
    stats: &mut PlaybackStats,
) -> Result<()> {
    loop {
        let delivered = audio
            .last_packet()
            .map_or(0, |p| p.stream_byte_offset + p.len as u64);
        if delivered >= until || audio.is_end_of_stream() {
            return Ok(());
        }
        if audio.advance_dispatch(&mut PacketLogger { stats: &mut *stats })?.is_none() {
            return Ok(());
        }
    }
}
