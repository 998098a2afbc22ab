// SPE Pipeline - single-photoelectron waveform analysis
// Classification, alignment, feature extraction, pulse shaping and
// population statistics over oscilloscope captures

// Module declarations
pub mod aggregate;
pub mod analysis;
pub mod cache;
pub mod calibration;
pub mod config;
pub mod error;
pub mod fixtures;
pub mod pipeline;
pub mod store;
pub mod waveform;

// Re-exports for convenience
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use pipeline::{BatchPipeline, IdRange};
pub use store::{DirectoryStore, MemoryStore, Partition, WaveformStore};
pub use waveform::{WaveformId, WaveformRecord};

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber; `RUST_LOG` overrides the default `info` level
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
