use anyhow::{Context, Result};
use pcm_resampler::log::{init_tracing, set_chunk_trace};
use pcm_resampler::{spawn_conversion, ConversionConfig};

// Usage: pcm-resample [config.json]
#[tokio::main]
async fn main() -> Result<()> {
    let config = match std::env::args().nth(1) {
        Some(path) => ConversionConfig::from_json_file(&path)?,
        None => ConversionConfig::default(),
    };

    if config.chunk_trace {
        init_tracing("info,pcm_resampler=debug")?;
        set_chunk_trace(true);
    } else {
        init_tracing("info")?;
    }

    let handle = spawn_conversion(config);
    let report = handle.join().await.context("Conversion failed")?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
