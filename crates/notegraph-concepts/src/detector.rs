//! Note type detection.
//!
//! Rules are evaluated in order and the first hit wins:
//! 1. path under a skip prefix → template
//! 2. tag in the skip list → vocabulary
//! 3. more than a handful of images dominating the content → image collection
//! 4. many short non-empty lines → vocabulary (flat list)
//! 5. stripped text shorter than the minimum → skipped as too short
//!
//! Anything else is a normal note and proceeds to extraction.

use tracing::debug;

use notegraph_core::{defaults, markdown, DetectionResult, NoteInput, NoteType, Result, SkipRules};

/// Classifies notes and decides whether extraction should run.
#[derive(Debug, Clone, Default)]
pub struct NoteTypeDetector {
    rules: SkipRules,
}

impl NoteTypeDetector {
    pub fn new(rules: SkipRules) -> Result<Self> {
        rules.validate()?;
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &SkipRules {
        &self.rules
    }

    /// Replace the skip rules. Takes effect on the next `detect` call.
    pub fn update_config(&mut self, rules: SkipRules) -> Result<()> {
        rules.validate()?;
        self.rules = rules;
        Ok(())
    }

    pub fn detect(&self, note: &NoteInput) -> DetectionResult {
        let result = self.classify(note);
        debug!(
            subsystem = "concepts",
            component = "detector",
            path = %note.path,
            note_type = %result.note_type,
            should_skip = result.should_skip,
            reason = %result.reason,
            "Note type detected"
        );
        result
    }

    fn classify(&self, note: &NoteInput) -> DetectionResult {
        let path = note.path.trim_start_matches('/');
        for prefix in &self.rules.skip_paths {
            let prefix = prefix.trim_start_matches('/');
            if !prefix.is_empty() && path.starts_with(prefix) {
                return DetectionResult::skip(
                    NoteType::Template,
                    format!("path is under skipped prefix '{}'", prefix),
                );
            }
        }

        let skip_tags: Vec<String> = self.rules.skip_tags.iter().map(|t| normalize_tag(t)).collect();
        if let Some(tag) = note
            .tags
            .iter()
            .map(|t| normalize_tag(t))
            .find(|t| skip_tags.contains(t))
        {
            return DetectionResult::skip(
                NoteType::Vocabulary,
                format!("tagged '{}'", tag),
            );
        }

        let image_count = markdown::count_embedded_images(&note.content);
        if image_count > defaults::IMAGE_COUNT_THRESHOLD {
            let total_len = note.content.chars().count().max(1);
            let ratio = (image_count * defaults::IMAGE_WEIGHT_CHARS) as f32 / total_len as f32;
            if ratio > self.rules.max_image_ratio {
                return DetectionResult::skip(
                    NoteType::ImageCollection,
                    format!("{} embedded images (ratio {:.2})", image_count, ratio),
                );
            }
        }

        let plain = markdown::plain_text(&note.content);
        let lines: Vec<&str> = plain
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        if lines.len() > defaults::FLAT_LIST_MIN_LINES {
            let total: usize = lines.iter().map(|l| l.chars().count()).sum();
            let avg = total as f32 / lines.len() as f32;
            if avg < defaults::FLAT_LIST_MAX_AVG_LINE_LEN {
                return DetectionResult::skip(
                    NoteType::Vocabulary,
                    format!("flat list of {} short lines (avg {:.1} chars)", lines.len(), avg),
                );
            }
        }

        let text_len = plain.trim().chars().count();
        if text_len < self.rules.min_text_length {
            return DetectionResult::skip(
                NoteType::Normal,
                format!(
                    "text too short ({} < {} chars)",
                    text_len, self.rules.min_text_length
                ),
            );
        }

        DetectionResult::keep("normal note")
    }
}

fn normalize_tag(tag: &str) -> String {
    tag.trim().trim_start_matches('#').to_lowercase()
}
