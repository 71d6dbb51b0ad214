use std::io::{self, Write};
use crossterm::style::{Print, Stylize};
use crossterm::{cursor, queue, terminal};
use crate::initiator::ACCEPTED_EXTENSIONS;
use super::{ImportView, ProgressView};

pub fn render_text(view: &ImportView, bar_width: usize) -> Vec<String> {
    match view {
        ImportView::FilePicker => {
            let extensions: Vec<String> = ACCEPTED_EXTENSIONS.iter().map(|ext| format!(".{}", ext)).collect();
            vec![format!(
                "Select one or more spreadsheet files ({}) to import.",
                extensions.join(", ")
            )]
        }
        ImportView::Progress(progress) => render_progress(progress, bar_width.max(10)),
    }
}

fn render_progress(view: &ProgressView, bar_width: usize) -> Vec<String> {
    let filled = bar_width * view.bar_percent as usize / 100;
    let header = match view.estimated_total {
        Some(estimate) => format!(
            "{} {}  (import {}, about {} rows)",
            view.indicator,
            view.stage.label(),
            view.upload_id,
            estimate
        ),
        None => format!("{} {}  (import {})", view.indicator, view.stage.label(), view.upload_id),
    };
    let mut lines = vec![
        header,
        format!(
            "[{}{}] {:>3}%",
            "#".repeat(filled),
            "-".repeat(bar_width - filled),
            view.bar_percent
        ),
        view.counters
            .iter()
            .map(|counter| format!("{}: {}", counter.label, counter.value))
            .collect::<Vec<_>>()
            .join(" | "),
    ];

    if view.connection_lost {
        lines.push("! Connection lost, waiting for the server to report progress".to_string());
    } else if !view.subscribed && view.success.is_none() {
        lines.push("Waiting for the server to confirm the subscription...".to_string());
    }

    if let Some(success) = &view.success {
        lines.push(format!(
            "{}: {} inserted, {} duplicates, {} errors",
            success.title, success.inserted, success.duplicates, success.errors
        ));
    }

    lines
}

/// Redraws the view in place, overwriting the block drawn last time.
#[derive(Debug, Default)]
pub struct TerminalRenderer {
    drawn: u16,
    bar_width: usize,
}

impl TerminalRenderer {
    pub fn new() -> Self {
        let bar_width = terminal::size()
            .map(|(columns, _)| (columns as usize).saturating_sub(8).min(60))
            .unwrap_or(40);

        Self { drawn: 0, bar_width }
    }

    pub fn draw<W: Write>(&mut self, out: &mut W, view: &ImportView) -> io::Result<()> {
        if self.drawn > 0 {
            queue!(
                out,
                cursor::MoveToPreviousLine(self.drawn),
                terminal::Clear(terminal::ClearType::FromCursorDown)
            )?;
        }

        let lines = render_text(view, self.bar_width);
        let success = matches!(view, ImportView::Progress(progress) if progress.success.is_some());
        let last = lines.len().saturating_sub(1);

        for (index, line) in lines.iter().enumerate() {
            if success && index == last {
                queue!(out, Print(line.as_str().green()), Print("\r\n"))?;
            } else {
                queue!(out, Print(line), Print("\r\n"))?;
            }
        }

        self.drawn = lines.len() as u16;
        out.flush()
    }
}
