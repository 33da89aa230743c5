//! Plain-text rendering of the comments view.

use std::fmt::Write as _;

use textwrap::{wrap, Options as WrapOptions};
use unicode_width::UnicodeWidthStr;

use crate::controller::{Dataset, Progress};
use crate::model::{Comment, Sentiment};
use crate::view::{Page, ViewState};

pub const PREVIEW_CHARS: usize = 150;
const BAR_WIDTH: usize = 30;
const DEFAULT_WIDTH: usize = 80;

pub const OFFLINE_BANNER: &str = "⚠ You are offline. Waiting for the network to come back...";

pub fn progress_line(progress: &Progress) -> String {
    progress.message.clone().unwrap_or_default()
}

pub fn summary(dataset: &Dataset) -> String {
    let mut out = String::new();
    let set = &dataset.set;
    let dist = &dataset.distribution;

    let _ = writeln!(out, "Sentiment Analysis for Video: {}", set.video_id);
    let _ = writeln!(out, "{}", set.title);
    if let Some(published) = set.published_at {
        let _ = writeln!(out, "Published {}", published.format("%Y-%m-%d %H:%M UTC"));
    }
    let _ = writeln!(out, "{} comments analyzed", dist.total());
    out.push('\n');

    let label_width = Sentiment::ALL
        .iter()
        .map(|label| UnicodeWidthStr::width(label.display_name()))
        .max()
        .unwrap_or(0);
    for (label, count) in dist.iter() {
        let pct = dist.percentage(label);
        let filled = ((pct / 100.0) * BAR_WIDTH as f64).round() as usize;
        let name = label.display_name();
        let pad = label_width.saturating_sub(UnicodeWidthStr::width(name));
        let _ = writeln!(
            out,
            "{name}{} {}{} {:>3}% ({count})",
            " ".repeat(pad),
            "█".repeat(filled.min(BAR_WIDTH)),
            "░".repeat(BAR_WIDTH.saturating_sub(filled)),
            dist.rounded_percentage(label),
        );
    }

    if let Some(reported) = &set.reported_stats {
        let mismatched = dist.mismatches(reported);
        if !mismatched.is_empty() {
            let labels: Vec<&str> = mismatched.iter().map(|label| label.as_str()).collect();
            let _ = writeln!(
                out,
                "\nNote: server-reported totals differ for {}.",
                labels.join(", ")
            );
        }
    }
    out
}

pub fn page(page: &Page<'_>, view: &ViewState, width: usize) -> String {
    let width = if width == 0 { DEFAULT_WIDTH } else { width };
    let mut out = String::new();

    let shown_from = if page.items.is_empty() { 0 } else { page.offset + 1 };
    let shown_to = page.offset + page.items.len();
    let _ = writeln!(
        out,
        "{} comments · sort: {} · showing {}-{} of {} (total {}) · page {}/{}",
        title_case(view.filter().as_str()),
        view.sort(),
        shown_from,
        shown_to,
        page.filtered_count,
        page.total_count,
        page.page,
        page.total_pages,
    );
    out.push('\n');

    if page.items.is_empty() {
        out.push_str("No comments match this filter.\n");
        return out;
    }

    for (idx, comment) in page.items.iter().enumerate() {
        out.push_str(&comment_block(page.offset + idx + 1, comment, width));
        out.push('\n');
    }

    let mut hints = Vec::new();
    if page.has_prev() {
        hints.push("`prev` for earlier comments");
    }
    if page.has_next() {
        hints.push("`next` for more");
    }
    if !hints.is_empty() {
        let _ = writeln!(out, "Type {}.", hints.join(", "));
    }
    out
}

/// Chart series as JSON for an external chart renderer.
pub fn chart_json(dataset: &Dataset) -> String {
    serde_json::to_string_pretty(&dataset.distribution.chart()).unwrap_or_default()
}

fn comment_block(number: usize, comment: &Comment, width: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{number:>4}. {} [{}] · {} likes · {}",
        comment.author,
        comment.sentiment.display_name(),
        comment.like_count,
        comment.published_at.format("%Y-%m-%d"),
    );
    let options = WrapOptions::new(width.saturating_sub(6).max(20))
        .break_words(false)
        .initial_indent("      ")
        .subsequent_indent("      ");
    for line in wrap(&preview(&comment.text), options) {
        let _ = writeln!(out, "{line}");
    }
    out
}

/// Shortens long comment text to `PREVIEW_CHARS` characters plus an ellipsis.
pub fn preview(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= PREVIEW_CHARS {
        return trimmed.to_string();
    }
    let mut short: String = trimmed.chars().take(PREVIEW_CHARS).collect();
    short.push_str("...");
    short
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub const HELP: &str = "\
Commands:
  filter <all|positive|negative|neutral|mixed>
  sort <recent|likes|positive-score|negative-score|neutral-score>
  page <n>, next, prev
  stats        show the sentiment summary again
  chart        print the chart series as JSON
  refresh      fetch the current video again, skipping the cache
  retry        retry a failed fetch
  open <url>   analyze another video
  help, quit";
