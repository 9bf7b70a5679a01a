use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::info;
use workflow_capture::util::slugify;
use workflow_capture::{RunReport, TraceFrame};

#[derive(Serialize)]
struct FrameEntry<'a> {
    step: usize,
    url: &'a str,
    title: &'a str,
    timestamp: DateTime<Utc>,
    filename: String,
}

fn screenshot_name(step: usize) -> String {
    format!("screenshots/step_{step:02}.png")
}

fn frame_entries(frames: &[TraceFrame]) -> Vec<FrameEntry<'_>> {
    frames
        .iter()
        .map(|frame| FrameEntry {
            step: frame.step,
            url: &frame.url,
            title: &frame.title,
            timestamp: frame.timestamp,
            filename: screenshot_name(frame.step),
        })
        .collect()
}

/// Writes `<output>/<app>/<task-slug>_<timestamp>/` with the screenshots,
/// `workflow.json` and a Markdown guide. Returns the run directory.
pub fn save(report: &RunReport, output: &Path, now: DateTime<Utc>) -> Result<PathBuf> {
    let dir = output
        .join(slugify(&report.app))
        .join(format!("{}_{}", slugify(&report.task), now.format("%Y%m%d_%H%M%S")));
    let shots = dir.join("screenshots");
    std::fs::create_dir_all(&shots)
        .with_context(|| format!("could not create {}", shots.display()))?;

    for frame in report.frames.iter().filter(|f| !f.screenshot.is_empty()) {
        let path = dir.join(screenshot_name(frame.step));
        std::fs::write(&path, &frame.screenshot)
            .with_context(|| format!("could not write {}", path.display()))?;
    }

    let metadata = json!({
        "task": report.task,
        "app": report.app,
        "start_url": report.start_url,
        "state": report.outcome.state(),
        "outcome": report.outcome,
        "history": report.history,
        "frames": frame_entries(&report.frames),
        "saved_at": now,
    });
    std::fs::write(dir.join("workflow.json"), serde_json::to_string_pretty(&metadata)?)
        .context("could not write workflow.json")?;
    std::fs::write(dir.join("README.md"), render_readme(report, now))
        .context("could not write README.md")?;

    info!(path = %dir.display(), frames = report.frames.len(), "saved workflow");
    Ok(dir)
}

fn render_readme(report: &RunReport, now: DateTime<Utc>) -> String {
    let outcome = &report.outcome;
    let status = match &outcome.failure_reason {
        None => "Completed".to_string(),
        Some(reason) => format!("Incomplete ({reason})"),
    };

    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", report.task);
    let _ = writeln!(out, "**App**: {}  ", report.app);
    let _ = writeln!(out, "**Status**: {status}  ");
    let _ = writeln!(
        out,
        "**Steps**: {} ({} successful)  ",
        outcome.steps, outcome.successful_actions
    );
    let _ = writeln!(out, "**Date**: {}\n", now.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(out, "Starting URL: {}\n", report.start_url);
    let _ = writeln!(out, "## Steps\n");

    for frame in &report.frames {
        let _ = writeln!(out, "### Step {}\n", frame.step);
        if let Some(record) = report.history.records().iter().find(|r| r.step == frame.step) {
            let intent = &record.intent;
            let mut line = format!("**Action**: {} `{}`", intent.kind, intent.target);
            if !intent.text.is_empty() {
                let _ = write!(line, " with \"{}\"", intent.text);
            }
            let _ = writeln!(out, "{line} ({:?})  ", record.status);
            if !intent.rationale.is_empty() {
                let _ = writeln!(out, "_{}_  ", intent.rationale);
            }
        }
        let _ = writeln!(out, "**URL**: {}\n", frame.url);
        let _ = writeln!(out, "![Step {}]({})\n", frame.step, screenshot_name(frame.step));
    }
    out
}
