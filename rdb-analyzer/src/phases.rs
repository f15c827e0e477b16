//! Phase seams
//!
//! The scheduler drives each track through three phases behind these
//! traits, so orchestration tests run without child processes or a model
//! server. The production implementations compose the service adapters.

use crate::services::audio_probes::{AudioProbeRunner, ProbeOutcome};
use crate::services::container_probe::{ContainerProbe, ProbeError};
use crate::services::creative::{CreativeClient, CreativeOutcome};
use crate::services::ensemble::{EnsembleOutcome, EnsembleRunner};
use crate::services::tag_reader::{parse_tbpm, TagReader};
use crate::services::tempo::{alt_tempos, TempoEstimator};
use async_trait::async_trait;
use rdb_common::model::{TechnicalFacts, TempoSource};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Technical phase output: facts plus the merged probe hints that feed the
/// later phases.
#[derive(Debug, Clone, Default)]
pub struct TechnicalOutcome {
    pub facts: TechnicalFacts,
    pub probes: ProbeOutcome,
}

/// Context for the creative phase.
#[derive(Debug, Clone, Default)]
pub struct CreativeContext {
    pub title: String,
    pub bpm: Option<u32>,
    pub hints: BTreeMap<String, bool>,
}

/// Context for the instrumentation phase.
#[derive(Debug, Clone, Default)]
pub struct InstrumentationContext {
    pub path: PathBuf,
    pub hints: BTreeMap<String, bool>,
    /// Creative suggestions, populated in sequential mode where the
    /// creative phase completes first. Advisory only.
    pub creative_suggestions: Vec<String>,
}

#[async_trait]
pub trait TechnicalPhase: Send + Sync {
    /// Extract container facts, tags and tempo. A probe failure is the one
    /// fatal condition; everything else degrades in place.
    async fn analyze(&self, path: &Path) -> Result<TechnicalOutcome, ProbeError>;
}

#[async_trait]
pub trait CreativePhase: Send + Sync {
    async fn analyze(&self, ctx: &CreativeContext) -> CreativeOutcome;
}

#[async_trait]
pub trait InstrumentationPhase: Send + Sync {
    async fn analyze(&self, ctx: &InstrumentationContext) -> EnsembleOutcome;
}

/// Production technical phase: ffprobe + lofty + window probes + tempo.
pub struct TechnicalAnalyzer {
    container: ContainerProbe,
    tags: TagReader,
    probes: AudioProbeRunner,
    tempo: TempoEstimator,
}

impl TechnicalAnalyzer {
    pub fn new(
        container: ContainerProbe,
        tags: TagReader,
        probes: AudioProbeRunner,
        tempo: TempoEstimator,
    ) -> Self {
        Self {
            container,
            tags,
            probes,
            tempo,
        }
    }
}

#[async_trait]
impl TechnicalPhase for TechnicalAnalyzer {
    async fn analyze(&self, path: &Path) -> Result<TechnicalOutcome, ProbeError> {
        let mut facts = self.container.probe(path).await?;
        facts.tags = self.tags.read_or_empty(path);

        let probes = self.probes.run(path, facts.duration_sec).await;

        let estimate = self
            .tempo
            .estimate(path, facts.duration_sec, &probes.hints)
            .await;
        apply_tempo(&mut facts, estimate);

        Ok(TechnicalOutcome { facts, probes })
    }
}

/// Settle the final tempo fields: the estimator's value, the `TBPM` tag
/// override, and the alt tempos derived from whichever won.
pub fn apply_tempo(facts: &mut TechnicalFacts, estimate: Option<crate::services::tempo::TempoEstimate>) {
    facts.estimated_bpm = estimate.map(|e| e.bpm);

    match facts.tags.tbpm.as_deref().and_then(parse_tbpm) {
        Some(tag_bpm) => {
            facts.bpm = Some(tag_bpm);
            facts.bpm_source = Some(TempoSource::Id3);
        }
        None => {
            facts.bpm = estimate.map(|e| e.bpm);
            facts.bpm_source = estimate.map(|e| e.source);
        }
    }

    if let Some(bpm) = facts.bpm {
        let (half, double) = alt_tempos(bpm);
        facts.bpm_alt_half = half;
        facts.bpm_alt_double = double;
    }
}

/// Production creative phase wrapping the chat-completion client.
pub struct CreativeAnalyzer {
    client: CreativeClient,
}

impl CreativeAnalyzer {
    pub fn new(client: CreativeClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CreativePhase for CreativeAnalyzer {
    async fn analyze(&self, ctx: &CreativeContext) -> CreativeOutcome {
        self.client.analyze(&ctx.title, ctx.bpm, &ctx.hints).await
    }
}

/// Production instrumentation phase wrapping the classifier subprocess.
pub struct InstrumentationAnalyzer {
    runner: EnsembleRunner,
    demucs: bool,
}

impl InstrumentationAnalyzer {
    pub fn new(runner: EnsembleRunner, demucs: bool) -> Self {
        Self { runner, demucs }
    }
}

#[async_trait]
impl InstrumentationPhase for InstrumentationAnalyzer {
    async fn analyze(&self, ctx: &InstrumentationContext) -> EnsembleOutcome {
        if !ctx.creative_suggestions.is_empty() {
            tracing::debug!(
                file = %ctx.path.display(),
                suggestions = ?ctx.creative_suggestions,
                "Creative suggestions available to classifier stage"
            );
        }
        self.runner.run(&ctx.path, self.demucs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::tempo::TempoEstimate;

    #[test]
    fn tag_override_wins_and_keeps_estimator_value() {
        let mut facts = TechnicalFacts::default();
        facts.tags.tbpm = Some("148 bpm".to_string());
        apply_tempo(
            &mut facts,
            Some(TempoEstimate {
                bpm: 98,
                source: TempoSource::Thirds,
            }),
        );
        assert_eq!(facts.bpm, Some(148));
        assert_eq!(facts.bpm_source, Some(TempoSource::Id3));
        assert_eq!(facts.estimated_bpm, Some(98));
        assert_eq!(facts.bpm_alt_half, Some(74));
        // 296 falls outside [50, 200].
        assert_eq!(facts.bpm_alt_double, None);
    }

    #[test]
    fn invalid_tag_falls_back_to_estimator() {
        let mut facts = TechnicalFacts::default();
        facts.tags.tbpm = Some("400".to_string());
        apply_tempo(
            &mut facts,
            Some(TempoEstimate {
                bpm: 98,
                source: TempoSource::Acf,
            }),
        );
        assert_eq!(facts.bpm, Some(98));
        assert_eq!(facts.bpm_source, Some(TempoSource::Acf));
        assert_eq!(facts.bpm_alt_half, None);
        assert_eq!(facts.bpm_alt_double, Some(196));
    }

    #[test]
    fn no_estimate_and_no_tag_leaves_bpm_null() {
        let mut facts = TechnicalFacts::default();
        apply_tempo(&mut facts, None);
        assert_eq!(facts.bpm, None);
        assert_eq!(facts.bpm_source, None);
        assert_eq!(facts.bpm_alt_half, None);
    }

    #[test]
    fn tag_override_applies_without_estimate() {
        let mut facts = TechnicalFacts::default();
        facts.tags.tbpm = Some("92".to_string());
        apply_tempo(&mut facts, None);
        assert_eq!(facts.bpm, Some(92));
        assert_eq!(facts.bpm_source, Some(TempoSource::Id3));
        assert_eq!(facts.estimated_bpm, None);
        assert_eq!(facts.bpm_alt_half, None);
        assert_eq!(facts.bpm_alt_double, Some(184));
    }
}
