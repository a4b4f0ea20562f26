//! Concept extraction.
//!
//! One LLM call per note, bounded by a timeout and by the caller's stop flag.
//! A failed, timed-out or cancelled call degrades to the rule-based extractor;
//! extraction itself never returns an error.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use notegraph_core::{
    markdown, Error, ExtractedConcept, ExtractionConfig, ExtractionOptions, ExtractionOutcome,
    ExtractionSource, GenerationBackend, NoteInput, Result, SkipRules, StopFlag,
};

use crate::detector::NoteTypeDetector;
use crate::parse::{parse_concepts, ParseTier};
use crate::{prompt, quality, rules};

/// LLM-backed concept extractor with a rule-based fallback.
pub struct ConceptExtractor {
    generator: Arc<dyn GenerationBackend>,
    detector: NoteTypeDetector,
    config: ExtractionConfig,
}

impl ConceptExtractor {
    pub fn new(
        generator: Arc<dyn GenerationBackend>,
        config: ExtractionConfig,
        skip_rules: SkipRules,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            generator,
            detector: NoteTypeDetector::new(skip_rules)?,
            config,
        })
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    pub fn detector(&self) -> &NoteTypeDetector {
        &self.detector
    }

    /// Replace the extraction config. Takes effect on the next call.
    pub fn update_config(&mut self, config: ExtractionConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn update_skip_rules(&mut self, rules: SkipRules) -> Result<()> {
        self.detector.update_config(rules)
    }

    /// Extract concepts from one note.
    pub async fn extract(
        &self,
        content: &str,
        title: Option<&str>,
        options: &ExtractionOptions,
    ) -> ExtractionOutcome {
        self.extract_cancellable(content, title, options, &StopFlag::new())
            .await
    }

    /// Like [`extract`](Self::extract), but an in-flight LLM call is abandoned
    /// as soon as `stop` fires.
    #[instrument(
        skip_all,
        fields(
            subsystem = "concepts",
            component = "extractor",
            op = "extract",
            title = title.unwrap_or_default(),
        )
    )]
    pub async fn extract_cancellable(
        &self,
        content: &str,
        title: Option<&str>,
        options: &ExtractionOptions,
        stop: &StopFlag,
    ) -> ExtractionOutcome {
        let path = options
            .path
            .clone()
            .or_else(|| title.map(str::to_string))
            .unwrap_or_default();
        let detection = self.detector.detect(&NoteInput {
            path,
            content: content.to_string(),
            tags: options.tags.clone(),
        });
        if detection.should_skip {
            info!(note_type = %detection.note_type, reason = %detection.reason, "Skipping extraction");
            return ExtractionOutcome::skipped(detection);
        }

        let max_concepts = options.max_concepts.unwrap_or(self.config.max_concepts).max(1);
        let start = Instant::now();

        let (raw, source) = match self
            .request_concepts(content, title, options, max_concepts, stop)
            .await
        {
            Ok(concepts) => (concepts, ExtractionSource::Ai),
            Err(e) => {
                warn!(error = %e, "LLM extraction failed, using rule-based fallback");
                (rules::rule_based_concepts(content, title), ExtractionSource::RuleBased)
            }
        };

        let candidates = raw.len();
        let (concepts, confidence) = quality::filter_concepts(raw, &self.config, max_concepts);
        info!(
            source = %source,
            candidates,
            concept_count = concepts.len(),
            confidence,
            duration_ms = start.elapsed().as_millis() as u64,
            "Concepts extracted"
        );

        ExtractionOutcome {
            concepts,
            note_type: detection.note_type,
            skip_reason: None,
            confidence,
            source,
        }
    }

    async fn request_concepts(
        &self,
        content: &str,
        title: Option<&str>,
        options: &ExtractionOptions,
        max_concepts: usize,
        stop: &StopFlag,
    ) -> Result<Vec<ExtractedConcept>> {
        if stop.is_stopped() {
            return Err(Error::Cancelled("stop requested before LLM call".to_string()));
        }

        let body = markdown::plain_text(content);
        let system = prompt::system_prompt(&self.config);
        let user = prompt::user_prompt(
            title,
            &body,
            &options.existing_concepts,
            max_concepts,
            &self.config,
        );
        debug!(
            prompt_len = user.len(),
            model = self.generator.model_name(),
            "Requesting concepts"
        );

        let window = Duration::from_secs(self.config.llm_timeout_secs);
        let call = self.generator.generate_json_with_system(&system, &user);
        let response = tokio::select! {
            result = tokio::time::timeout(window, call) => match result {
                Ok(response) => response?,
                Err(_) => {
                    return Err(Error::Inference(format!(
                        "LLM call timed out after {}s",
                        self.config.llm_timeout_secs
                    )))
                }
            },
            _ = stop.cancelled() => {
                return Err(Error::Cancelled("stop requested during LLM call".to_string()));
            }
        };

        let parsed = parse_concepts(&response);
        match parsed.tier {
            ParseTier::Strict => {}
            ParseTier::Empty => {
                return Err(Error::Inference(format!(
                    "no concepts recoverable from {} byte response",
                    response.len()
                )));
            }
            tier => {
                warn!(parse_tier = %tier, response_len = response.len(), "Recovered concepts from malformed response");
            }
        }
        Ok(parsed.concepts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notegraph_inference::mock::ScriptedGenerator;

    const NOTE: &str = "# Kafka Consumers\n\nKafka delivers messages at least once, so a consumer \
                        may see the same message twice. Handlers must be **idempotent** so that \
                        processing a duplicate has no additional effect on downstream state.";

    fn extractor(generator: ScriptedGenerator) -> ConceptExtractor {
        ConceptExtractor::new(
            Arc::new(generator),
            ExtractionConfig::default(),
            SkipRules::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_ai_concepts_pass_quality_filter() {
        let generator = ScriptedGenerator::new().with_reply(
            r#"{"concepts":[
                {"name":"Idempotency","confidence":0.92,"reason":"duplicates must be harmless"},
                {"name":"Overview","confidence":0.9,"reason":"generic"},
                {"name":"At-least-once Delivery","confidence":0.4,"reason":"weak"}
            ]}"#,
        );
        let outcome = extractor(generator.clone())
            .extract(NOTE, Some("Kafka"), &ExtractionOptions::default())
            .await;

        assert_eq!(outcome.source, ExtractionSource::Ai);
        assert_eq!(outcome.concepts.len(), 1);
        assert_eq!(outcome.concepts[0].name, "Idempotency");
        assert!((outcome.confidence - 0.92).abs() < 1e-6);
        assert_eq!(generator.call_count(), 1);
    }

    #[tokio::test]
    async fn test_truncated_response_recovers_complete_items() {
        let generator = ScriptedGenerator::new().with_reply(
            r#"{"concepts":[{"name":"Idempotency","confidence":0.9,"reason":"safe retries"},{"name":"Message Que"#,
        );
        let outcome = extractor(generator)
            .extract(NOTE, None, &ExtractionOptions::default())
            .await;
        assert_eq!(outcome.source, ExtractionSource::Ai);
        let names: Vec<_> = outcome.concepts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Idempotency"]);
    }

    #[tokio::test]
    async fn test_cut_off_name_in_string_list_is_not_a_concept() {
        let generator =
            ScriptedGenerator::new().with_reply(r#"{"concepts":["Idempotency","Message Que"#);
        let outcome = extractor(generator)
            .extract(NOTE, None, &ExtractionOptions::default())
            .await;
        assert_eq!(outcome.source, ExtractionSource::Ai);
        let names: Vec<_> = outcome.concepts.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Idempotency"]);
    }

    #[tokio::test]
    async fn test_backend_failure_falls_back_to_rules() {
        let generator = ScriptedGenerator::new().failing("connection refused");
        let outcome = extractor(generator)
            .extract(NOTE, Some("Kafka Consumers"), &ExtractionOptions::default())
            .await;
        assert_eq!(outcome.source, ExtractionSource::RuleBased);
        assert!(outcome.concepts.iter().any(|c| c.name == "Kafka Consumers"));
        assert!(outcome.concepts.iter().any(|c| c.name == "idempotent"));
    }

    #[tokio::test]
    async fn test_unparseable_response_falls_back_to_rules() {
        let generator = ScriptedGenerator::new().with_reply("Sorry, I cannot help with that.");
        let outcome = extractor(generator)
            .extract(NOTE, Some("Kafka Consumers"), &ExtractionOptions::default())
            .await;
        assert_eq!(outcome.source, ExtractionSource::RuleBased);
        assert!(!outcome.concepts.is_empty());
    }

    #[tokio::test]
    async fn test_empty_ai_list_is_not_a_failure() {
        let generator = ScriptedGenerator::new().with_reply(r#"{"concepts":[]}"#);
        let outcome = extractor(generator)
            .extract(NOTE, Some("Kafka Consumers"), &ExtractionOptions::default())
            .await;
        assert_eq!(outcome.source, ExtractionSource::Ai);
        assert!(outcome.concepts.is_empty());
        assert_eq!(
            outcome.confidence,
            notegraph_core::defaults::FALLBACK_OVERALL_CONFIDENCE
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_falls_back_to_rules() {
        let generator = ScriptedGenerator::new()
            .with_latency(Duration::from_secs(600))
            .with_reply(r#"{"concepts":["Never Seen"]}"#);
        let extractor = ConceptExtractor::new(
            Arc::new(generator),
            ExtractionConfig {
                llm_timeout_secs: 5,
                ..Default::default()
            },
            SkipRules::default(),
        )
        .unwrap();

        let outcome = extractor
            .extract(NOTE, Some("Kafka Consumers"), &ExtractionOptions::default())
            .await;
        assert_eq!(outcome.source, ExtractionSource::RuleBased);
        assert!(outcome.concepts.iter().all(|c| c.name != "Never Seen"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_flag_cancels_in_flight_call() {
        let generator = ScriptedGenerator::new()
            .with_latency(Duration::from_secs(30))
            .with_reply(r#"{"concepts":["Never Seen"]}"#);
        let extractor = extractor(generator);
        let stop = StopFlag::new();

        let stopper = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            stopper.stop();
        });

        let outcome = extractor
            .extract_cancellable(NOTE, Some("Kafka Consumers"), &ExtractionOptions::default(), &stop)
            .await;
        assert_eq!(outcome.source, ExtractionSource::RuleBased);
    }

    #[tokio::test]
    async fn test_skipped_note_makes_no_call() {
        let generator = ScriptedGenerator::new();
        let extractor = extractor(generator.clone());
        let options = ExtractionOptions {
            path: Some("templates/daily.md".to_string()),
            ..Default::default()
        };
        let outcome = extractor.extract(NOTE, None, &options).await;
        assert!(outcome.is_skipped());
        assert!(outcome.skip_reason.is_some());
        assert_eq!(generator.call_count(), 0);
    }

    #[tokio::test]
    async fn test_max_concepts_option_and_existing_concepts_in_prompt() {
        let generator = ScriptedGenerator::new()
            .with_reply(r#"["Idempotency","Message Queue","Consumer Group"]"#);
        let options = ExtractionOptions {
            existing_concepts: vec!["Idempotency".to_string()],
            max_concepts: Some(2),
            ..Default::default()
        };
        let outcome = extractor(generator.clone())
            .extract(NOTE, None, &options)
            .await;
        assert_eq!(outcome.concepts.len(), 2);

        let calls = generator.calls();
        assert!(calls[0].prompt.contains("at most 2 concepts"));
        assert!(calls[0].prompt.contains("Existing concepts"));
        assert!(calls[0].system.contains("JSON"));
    }

    #[tokio::test]
    async fn test_update_config_validates() {
        let mut extractor = extractor(ScriptedGenerator::new());
        let bad = ExtractionConfig {
            min_confidence: 1.5,
            ..Default::default()
        };
        assert!(extractor.update_config(bad).is_err());
        assert_eq!(extractor.config().min_confidence, 0.6);
    }
}
