//! HTML views served to the browser.
//!
use common::LabelSummary;

/// Which pipeline the page belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Objects,
    Faces,
}

const TAG_STYLE: &str = "padding: 0.25rem 0.75rem; background-color: #3b82f6; color: white; \
                         border-radius: 9999px; font-size: 0.875rem";

/// The "Detected Objects" panel. Shows a placeholder instead of an empty tag
/// row.
pub fn render_labels_panel(summary: &LabelSummary) -> String {
    let body = if summary.is_empty() {
        r#"<p style="color: #9ca3af">No objects detected</p>"#.to_owned()
    } else {
        let tags: String = summary
            .labels()
            .iter()
            .map(|label| format!(r#"<span style="{TAG_STYLE}">{}</span>"#, escape_html(label)))
            .collect();
        format!(r#"<div style="display: flex; flex-wrap: wrap; gap: 0.5rem">{tags}</div>"#)
    };

    format!(
        r#"<div style="background-color: #1f2937; padding: 1rem; border-radius: 0.375rem">
<h2 style="font-size: 1.25rem; font-weight: 600; margin-bottom: 0.5rem; color: white">Detected Objects</h2>
{body}
</div>"#
    )
}

/// Index page: a loading notice until the model is loaded, then the live view.
pub fn render_index(kind: PageKind, model_loaded: bool, summary: &LabelSummary) -> String {
    let content = if !model_loaded {
        // Reload until the model is there
        r#"<meta http-equiv="refresh" content="1">
<div>Loading AI Model...</div>"#
            .to_owned()
    } else {
        match kind {
            PageKind::Objects => format!(
                r#"<div style="display: flex; flex-direction: column; gap: 1rem">
<div style="display: flex; justify-content: center; padding: 0.375rem; height: 30rem">
<img src="./overlay_stream" style="height: 30rem; border-radius: 0.375rem">
</div>
<div id="labels">{}</div>
</div>
<script>
setInterval(async () => {{
    const resp = await fetch("./labels");
    if (resp.ok) {{ document.getElementById("labels").innerHTML = await resp.text(); }}
}}, 500);
</script>"#,
                render_labels_panel(summary)
            ),
            PageKind::Faces => r#"<div style="display: grid; grid-template-columns: 1fr; gap: 1rem">
<img src="./video" width="640" height="480">
<img src="./overlay_stream" width="640" height="480" style="border: 1px solid red">
</div>"#
                .to_owned(),
        }
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Webcam detection overlay</title></head>
<body style="margin-top: 2rem">
{content}
</body>
</html>"#
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod test {
    use common::{BBox, DetectionBatch, ObjectDetection};

    use super::*;

    fn summary(labels: &[&str]) -> LabelSummary {
        let batch: DetectionBatch = labels
            .iter()
            .map(|label| ObjectDetection::new(*label, 0.8, BBox::default()))
            .collect();
        LabelSummary::from_batch(&batch)
    }

    #[test]
    fn test_empty_summary_shows_placeholder() {
        let html = render_labels_panel(&LabelSummary::default());
        assert!(html.contains("Detected Objects"));
        assert!(html.contains("No objects detected"));
        assert!(!html.contains("<span"));
    }

    #[test]
    fn test_one_tag_per_distinct_label() {
        let html = render_labels_panel(&summary(&["person", "person", "dog"]));
        assert_eq!(html.matches("<span").count(), 2);
        assert!(html.find(">person<").unwrap() < html.find(">dog<").unwrap());
        assert!(!html.contains("No objects detected"));
    }

    #[test]
    fn test_labels_are_escaped() {
        let html = render_labels_panel(&summary(&["<b>"]));
        assert!(html.contains("&lt;b&gt;"));
    }

    #[test]
    fn test_index_while_loading() {
        for kind in [PageKind::Objects, PageKind::Faces] {
            let html = render_index(kind, false, &LabelSummary::default());
            assert!(html.contains("Loading AI Model..."));
            assert!(!html.contains("overlay_stream"));
        }
    }

    #[test]
    fn test_index_when_loaded() {
        let html = render_index(PageKind::Objects, true, &summary(&["cup"]));
        assert!(html.contains("overlay_stream"));
        assert!(html.contains(">cup<"));
        assert!(!html.contains("Loading AI Model..."));

        let html = render_index(PageKind::Faces, true, &LabelSummary::default());
        assert!(html.contains("./video"));
        assert!(!html.contains("Detected Objects"));
    }
}
