//! Shared helpers for the `jopus` demos.

use jopus::OpusAudio;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Installs a fmt subscriber: `jopus=debug` plus `RUST_LOG` directives.
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy()
                .add_directive("jopus=debug".parse()?),
        )
        .with_line_number(true)
        .with_file(true)
        .init();
    Ok(())
}

/// Logs the metadata of a decoded stream.
pub fn log_summary(name: &str, audio: &OpusAudio) {
    let peak = audio.samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
    tracing::info!(
        name,
        channels = audio.channel_count,
        frames = audio.frames(),
        duration_secs = audio.duration,
        bytes = audio.size_in_bytes,
        input_sample_rate = audio.input_sample_rate,
        pre_skip = audio.pre_skip,
        output_gain = audio.output_gain,
        mapping_family = audio.mapping_family,
        vendor = %audio.vendor,
        peak,
        "decoded"
    );
    for comment in &audio.comments {
        tracing::info!(name, %comment, "tag");
    }
}
