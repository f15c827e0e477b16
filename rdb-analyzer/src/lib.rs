//! rdb-analyzer - offline audio analysis pipeline
//!
//! Takes a set of MP3/WAV/AIFF files and produces, per file, a durable
//! analysis record: technical metadata (duration, sample rate, tags, BPM),
//! a creative description from a locally hosted LLM, and an instrumentation
//! list from an ensemble of audio classifiers. Records persist to a per-file
//! JSON sidecar and into the library-wide `RhythmDB.json` /
//! `CriteriaDB.json` stores consumed by the search facet UI.

pub mod config;
pub mod phases;
pub mod scanner;
pub mod scheduler;
pub mod services;
pub mod store;

use crate::config::AnalyzerConfig;
use crate::phases::{CreativeAnalyzer, InstrumentationAnalyzer, TechnicalAnalyzer};
use crate::scheduler::AnalysisScheduler;
use crate::services::{
    AudioProbeRunner, ContainerProbe, CreativeClient, EnsembleRunner, FfmpegDecoder, TagReader,
    TempoEstimator, WaveformRenderer,
};
use crate::store::LibraryStore;
use rdb_common::events::EventBus;
use std::sync::Arc;

/// Wire the production services into a scheduler.
pub fn build_scheduler(config: &AnalyzerConfig, bus: EventBus) -> (AnalysisScheduler, Arc<LibraryStore>) {
    let store = Arc::new(LibraryStore::new(config.library_folder.clone()));

    let technical = TechnicalAnalyzer::new(
        ContainerProbe::new(),
        TagReader::new(),
        AudioProbeRunner::new(config.probe_command.clone()),
        TempoEstimator::new(Arc::new(FfmpegDecoder::new())),
    );

    let creative_client = CreativeClient::new(&config.llm_url, &config.llm_model)
        .with_diagnostic_log(config.library_folder.join("llm_parse_failures.log"));
    let creative = CreativeAnalyzer::new(creative_client);

    let instrumentation = InstrumentationAnalyzer::new(
        EnsembleRunner::new(config.classifier_command.clone()),
        config.demucs,
    );

    let waveform = config
        .waveform_folder
        .clone()
        .map(WaveformRenderer::new);

    let scheduler = AnalysisScheduler::new(
        config,
        bus,
        Arc::new(technical),
        Arc::new(creative),
        Arc::new(instrumentation),
        store.clone(),
        waveform,
    );
    (scheduler, store)
}
