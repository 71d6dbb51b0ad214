//! Presentation: a pure mapping from the tracked job to what is shown.
//!
//! Counters are displayed exactly as received. Nothing here cross-checks
//! them; the only correction is clamping the bar to 0..=100.

mod terminal;

use crate::core::{ImportJob, ProgressSnapshot, Stage, SubscriberState, UploadId};

pub use terminal::{render_text, TerminalRenderer};

#[derive(Debug, Clone, PartialEq)]
pub enum ImportView {
    /// No job yet
    FilePicker,
    Progress(ProgressView),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressView {
    pub upload_id: UploadId,
    pub stage: Stage,
    pub indicator: &'static str,
    pub bar_percent: u8,
    pub counters: [Counter; 6],
    /// Upload estimate, shown until the server reports a real total
    pub estimated_total: Option<u64>,
    pub success: Option<SuccessPanel>,
    pub subscribed: bool,
    pub connection_lost: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counter {
    pub label: &'static str,
    pub value: u64,
}

/// Shown once the job is `done`; dismissed by resetting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuccessPanel {
    pub title: String,
    pub inserted: u64,
    pub duplicates: u64,
    pub errors: u64,
}

impl ImportView {
    pub fn from_parts(
        upload_id: Option<&UploadId>,
        snapshot: Option<&ProgressSnapshot>,
        subscribed: bool,
    ) -> Self {
        let Some(upload_id) = upload_id else {
            return ImportView::FilePicker;
        };

        let zero;
        let snapshot = match snapshot {
            Some(snapshot) => snapshot,
            None => {
                zero = ProgressSnapshot::initial(upload_id);
                &zero
            }
        };

        let success = snapshot.stage.is_terminal().then(|| SuccessPanel {
            title: "Import complete".to_string(),
            inserted: snapshot.inserted,
            duplicates: snapshot.duplicates,
            errors: snapshot.errors,
        });

        ImportView::Progress(ProgressView {
            upload_id: upload_id.clone(),
            stage: snapshot.stage,
            indicator: snapshot.stage.indicator(),
            bar_percent: clamp_percentage(snapshot.percentage),
            counters: counters(snapshot),
            estimated_total: None,
            success,
            subscribed,
            connection_lost: false,
        })
    }

    pub fn from_job(job: &ImportJob) -> Self {
        let mut view = Self::from_parts(job.upload_id.as_ref(), job.snapshot.as_ref(), job.subscribed);
        if let ImportView::Progress(progress) = &mut view {
            progress.connection_lost = job.state == SubscriberState::Stalled;
            if progress.counters[0].value == 0 {
                progress.estimated_total = job.estimated_total;
            }
        }
        view
    }
}

pub fn clamp_percentage(percentage: f64) -> u8 {
    if percentage.is_nan() {
        return 0;
    }
    percentage.round().clamp(0.0, 100.0) as u8
}

fn counters(snapshot: &ProgressSnapshot) -> [Counter; 6] {
    [
        Counter { label: "Total", value: snapshot.total },
        Counter { label: "Processed", value: snapshot.processed },
        Counter { label: "Inserted", value: snapshot.inserted },
        Counter { label: "Duplicates", value: snapshot.duplicates },
        Counter { label: "Errors", value: snapshot.errors },
        Counter { label: "Remaining", value: snapshot.remaining },
    ]
}
