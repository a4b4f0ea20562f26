//! Terminal rendering.

use async_trait::async_trait;

use notegraph_core::{AssociationStats, NoteAssociation, SyncListener};
use notegraph_jobs::SyncReport;

/// Prints sync progress to stderr, keeping stdout for command output.
pub struct ConsoleListener;

#[async_trait]
impl SyncListener for ConsoleListener {
    async fn on_note_indexed(&self, note_id: &str, concepts: &[String]) {
        eprintln!("  indexed  {}  [{}]", note_id, concepts.join(", "));
    }

    async fn on_note_skipped(&self, note_id: &str, reason: &str) {
        eprintln!("  skipped  {}  ({})", note_id, reason);
    }

    async fn on_note_failed(&self, note_id: &str, error: &str) {
        eprintln!("  failed   {}  {}", note_id, error);
    }

    async fn on_sync_finished(&self, _processed: usize, _skipped: usize, _failed: usize) {}
}

pub fn format_report(action: &str, report: &SyncReport) -> String {
    let mut out = format!(
        "{}: {} processed, {} skipped, {} failed",
        action, report.processed, report.skipped, report.failed
    );
    if report.stopped {
        out.push_str(" (stopped early)");
    }
    out
}

pub fn format_associations(associations: &[NoteAssociation]) -> String {
    if associations.is_empty() {
        return "No associations found.".to_string();
    }
    associations
        .iter()
        .map(|a| {
            format!(
                "{:.2}  {} <-> {}  [{}]",
                a.confidence,
                a.source_note_id,
                a.target_note_id,
                a.shared_concepts.join(", ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_stats(stats: &AssociationStats) -> String {
    format!(
        "Notes:                {}\n\
         Concepts:             {}\n\
         Concepts per note:    {:.2}\n\
         Notes per concept:    {:.2}\n\
         Possible note pairs:  {}",
        stats.total_notes,
        stats.total_concepts,
        stats.avg_concepts_per_note,
        stats.avg_notes_per_concept,
        stats.total_associations
    )
}
