//! Ariadne-based rendering of skipped-file warnings.
//!
//! Parse and build failures carry a span and render as labeled reports
//! over the file's source; read failures render as a single line. JSON
//! output is one object per warning.

use std::ops::Range;

use ariadne::{Color, Config, Label, Report, ReportKind, Source};

use crate::error::IndexError;
use crate::project::FileWarning;

/// How warnings are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiagnosticOptions {
    pub color: bool,
    pub json: bool,
}

/// Render `warning` for a terminal or, with `options.json`, as one JSON
/// line.
pub fn render_warning(warning: &FileWarning, options: &DiagnosticOptions) -> String {
    if options.json {
        return format!("{}\n", warning_json(warning));
    }
    let file_name = warning.path.display().to_string();
    let (Some(source), Some(span)) = (warning.source.as_deref(), error_span(&warning.error)) else {
        return format!("warning: skipped {file_name}: {}\n", warning.error);
    };
    let span = clamp(span, source.len());
    let code = warning.error.code().unwrap_or("");
    let label = match &warning.error {
        IndexError::Parse(err) => err.message.clone(),
        IndexError::Build(err) => err.to_string(),
        _ => String::new(),
    };

    let mut builder = Report::build(ReportKind::Warning, (file_name.clone(), span.clone()))
        .with_code(code)
        .with_message(format!("skipped {file_name}"))
        .with_config(Config::default().with_color(options.color))
        .with_label(
            Label::new((file_name.clone(), span))
                .with_message(label)
                .with_color(Color::Yellow),
        );
    if let IndexError::Parse(err) = &warning.error {
        if let Some((message, related)) = &err.related {
            builder.add_label(
                Label::new((file_name.clone(), clamp(related.start as usize..related.end as usize, source.len())))
                    .with_message(message)
                    .with_color(Color::Blue),
            );
        }
    }

    let mut out = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = builder
        .finish()
        .write((file_name, Source::from(source)), &mut out);
    String::from_utf8_lossy(&out).into_owned()
}

/// The machine-readable form of `warning`.
pub fn warning_json(warning: &FileWarning) -> serde_json::Value {
    let spans: Vec<serde_json::Value> = error_span(&warning.error)
        .map(|span| {
            vec![serde_json::json!({
                "start": span.start,
                "end": span.end,
            })]
        })
        .unwrap_or_default();
    serde_json::json!({
        "code": warning.error.code(),
        "severity": "warning",
        "message": warning.error.to_string(),
        "file": warning.path.display().to_string(),
        "spans": spans,
    })
}

fn error_span(error: &IndexError) -> Option<Range<usize>> {
    let span = match error {
        IndexError::Parse(err) => err.span,
        IndexError::Build(err) => err.span(),
        IndexError::Io { .. } | IndexError::Config(_) => return None,
    };
    Some(span.start as usize..span.end as usize)
}

/// Clamp a range into the source; ariadne needs at least one character
/// to point at.
fn clamp(range: Range<usize>, source_len: usize) -> Range<usize> {
    let start = range.start.min(source_len);
    let end = range.end.min(source_len).max(start);
    if start == end {
        start..(end + 1).min(source_len)
    } else {
        start..end
    }
}
