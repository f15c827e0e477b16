//! Analysis services
//!
//! Narrow adapters around the external collaborators (ffprobe, ffmpeg, the
//! ensemble classifier, the LLM server) plus the pure analysis pieces
//! (tempo estimation, taxonomy mapping, instrument finalization).

pub mod audio_probes;
pub mod container_probe;
pub mod creative;
pub mod decoder;
pub mod ensemble;
pub mod finalizer;
pub mod tag_reader;
pub mod taxonomy;
pub mod tempo;
pub mod waveform;

pub use audio_probes::{AudioProbeRunner, ProbeOutcome};
pub use container_probe::{ContainerProbe, ProbeError};
pub use creative::{CreativeClient, CreativeOutcome};
pub use decoder::{AudioDecoder, FfmpegDecoder};
pub use ensemble::{EnsembleOutcome, EnsembleRunner};
pub use tag_reader::TagReader;
pub use tempo::TempoEstimator;
pub use waveform::WaveformRenderer;
