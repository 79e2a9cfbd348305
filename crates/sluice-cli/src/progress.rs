// AI
//! 📊 progress.rs — "Are we there yet?" — every bulk load, every time, forever.
//!
//! 🚀 A progress bar for actions sent, a rate table riding along in its message,
//! and at the end a failure table so comfy it has lumbar support.
//!
//! ⚠️  Warning: Watching this progress bar will not make the cluster index faster.
//! Neither will refreshing it. We've tried. Science says no.

use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING, presets::UTF8_FULL};
use indicatif::{ProgressBar, ProgressStyle};

/// 🔢 Formats a number with commas. "1000000 actions" → "1,000,000 actions".
pub(crate) fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ MM:SS, or HH:MM:SS for the long hauls. If it shows hours, call your mom.
pub(crate) fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 📊 Tracks actions and batches as they come back, renders them on the bar.
pub(crate) struct BulkProgress {
    /// 🏷️ what are we loading? usually the file name
    source_name: String,
    total_actions: u64,
    actions_done: u64,
    actions_failed: u64,
    batches_done: u64,
    batches_failed: u64,
    progress_bar: ProgressBar,
    start_time: Instant,
}

impl std::fmt::Debug for BulkProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 ProgressBar is a diva and doesn't derive Debug
        f.debug_struct("BulkProgress")
            .field("source_name", &self.source_name)
            .field("total_actions", &self.total_actions)
            .field("actions_done", &self.actions_done)
            .field("actions_failed", &self.actions_failed)
            .finish()
    }
}

impl BulkProgress {
    pub(crate) fn new(source_name: String, total_actions: u64) -> Self {
        let progress_bar = ProgressBar::new(total_actions);
        // -- 🎨 the template is hardcoded, but a broken one falls back to the plain bar instead of a panic
        let style = ProgressStyle::default_bar()
            .template("{msg}\n| [{bar:40.cyan/blue}]")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        progress_bar.set_style(style);

        Self {
            source_name,
            total_actions,
            actions_done: 0,
            actions_failed: 0,
            batches_done: 0,
            batches_failed: 0,
            progress_bar,
            start_time: Instant::now(),
        }
    }

    /// 🔄 One batch came back. `failed` is how many of its actions didn't make it.
    pub(crate) fn record_batch(&mut self, actions: u64, failed: u64) {
        self.actions_done += actions;
        self.actions_failed += failed;
        self.batches_done += 1;
        if failed > 0 {
            self.batches_failed += 1;
        }
        self.render();
        self.progress_bar.set_position(self.actions_done);
    }

    pub(crate) fn finish(&self) {
        self.progress_bar.finish();
    }

    pub(crate) fn actions_failed(&self) -> u64 {
        self.actions_failed
    }

    pub(crate) fn batches_failed(&self) -> u64 {
        self.batches_failed
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    fn render(&self) {
        let elapsed = self.start_time.elapsed();
        let actions_per_sec = if elapsed.as_secs_f64() > 0.0 {
            self.actions_done as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let percent = if self.total_actions > 0 {
            (self.actions_done as f64 / self.total_actions as f64) * 100.0
        } else {
            0.0
        };
        let remaining = if actions_per_sec > 0.0 && self.total_actions > self.actions_done {
            // 🔮 linear extrapolation. assumes the cluster stays in the mood.
            let left = (self.total_actions - self.actions_done) as f64 / actions_per_sec;
            format_duration(Duration::from_secs_f64(left))
        } else {
            "--:--".to_string()
        };

        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.add_row(vec![
            Cell::new(format!("{} Actions/s", format_number(actions_per_sec as u64)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!(
                "{} / {} Actions",
                format_number(self.actions_done),
                format_number(self.total_actions)
            ))
            .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} batches", format_number(self.batches_done)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} failed actions", format_number(self.actions_failed)))
                .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} elapsed", format_duration(elapsed))).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2}% / {} remaining", percent, remaining))
                .set_alignment(CellAlignment::Right),
        ]);

        self.progress_bar
            .set_message(format!("source: {}\n{}", self.source_name, table));
    }
}

/// 💀 One row of the post-mortem.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FailureRow {
    pub(crate) batch: usize,
    /// position inside the batch, `None` when the whole batch failed
    pub(crate) position: Option<usize>,
    pub(crate) op_type: String,
    pub(crate) id: String,
    pub(crate) error: String,
}

/// 🍽️ The failure summary. One row per failed action, or per failed batch.
pub(crate) fn failure_table(rows: &[FailureRow]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["batch", "item", "op", "id", "error"]);
    for row in rows {
        table.add_row(vec![
            Cell::new(row.batch).set_alignment(CellAlignment::Right),
            Cell::new(
                row.position
                    .map_or_else(|| "whole batch".to_string(), |p| p.to_string()),
            )
            .set_alignment(CellAlignment::Right),
            Cell::new(&row.op_type),
            Cell::new(&row.id),
            Cell::new(&row.error),
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_big_numbers_get_commas() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1_000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn the_one_where_durations_grow_an_hours_column() {
        assert_eq!(format_duration(Duration::from_secs(65)), "01:05");
        assert_eq!(format_duration(Duration::from_secs(3_725)), "01:02:05");
    }

    #[test]
    fn the_one_where_the_post_mortem_lists_every_casualty() {
        let table = failure_table(&[
            FailureRow {
                batch: 0,
                position: Some(3),
                op_type: "create".to_string(),
                id: "42".to_string(),
                error: "version_conflict_engine_exception: exists".to_string(),
            },
            FailureRow {
                batch: 2,
                position: None,
                op_type: "-".to_string(),
                id: "-".to_string(),
                error: "connection refused".to_string(),
            },
        ]);
        let rendered = table.to_string();
        assert!(rendered.contains("version_conflict_engine_exception"));
        assert!(rendered.contains("whole batch"));
        assert_eq!(table.row_iter().count(), 2);
    }

    #[test]
    fn the_one_where_progress_counts_the_bad_batches() {
        let mut progress = BulkProgress::new("test.ndjson".to_string(), 10);
        progress.record_batch(5, 0);
        progress.record_batch(5, 2);
        progress.finish();
        assert_eq!(progress.actions_failed(), 2);
        assert_eq!(progress.batches_failed(), 1);
    }
}
