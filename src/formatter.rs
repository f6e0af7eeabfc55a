//! Response formatter
//!
//! The canonical input is a list of tagged lines. `tag_lines` derives that
//! list from free text using the legacy convention (upper-case lines ending
//! in a colon are headers, `•`/`-` lines are bullets, everything else is a
//! paragraph) so plain model output still renders.

use serde::{Deserialize, Serialize};

pub const DECISION_TITLE: &str = "Bitcoin Decision Helper";
pub const ANALYSIS_TITLE: &str = "Bitcoin Market Analysis";

const ANSWER_MARKER: &str = "ANSWER:";

const SECTION_EMOJI: &[(&str, &str)] = &[
    ("ANSWER", "▶️"),
    ("KEY REASONS", "📝"),
    ("SUPPORTING EVIDENCE", "📊"),
    ("MARKET ASSESSMENT", "📈"),
    ("TECHNICAL ANALYSIS", "📊"),
    ("NEWS IMPACT", "📰"),
    ("SYNTHESIS", "💡"),
    ("CONFLICTS AND RESOLUTIONS", "⚖️"),
    ("RECOMMENDATION", "✅"),
    ("MONITORING POINTS", "👀"),
    ("SUMMARY", "📋"),
    ("RISK FACTORS", "⚠️"),
];

const STYLES: &str = r#"<style>
  .analysis-container { font-family: Arial, sans-serif; max-width: 800px; margin: 0 auto; padding: 20px; background: #f8f9fa; border-radius: 8px; box-shadow: 0 2px 4px rgba(0,0,0,0.1); }
  .title { text-align: center; font-size: 24px; font-weight: bold; color: #2c3e50; padding: 15px; margin-bottom: 20px; border-bottom: 2px solid #3498db; }
  .section-header { font-size: 18px; font-weight: bold; color: #2c3e50; margin: 20px 0 10px 0; padding: 8px; background: #e9ecef; border-radius: 4px; }
  .bullet-list { list-style-type: none; padding-left: 20px; margin: 10px 0; }
  .bullet-list li { position: relative; padding: 5px 0 5px 25px; line-height: 1.5; }
  .bullet-list li:before { content: "•"; position: absolute; left: 0; color: #3498db; font-weight: bold; }
  .content { line-height: 1.6; color: #34495e; margin: 10px 0; padding: 0 10px; }
  .separator { border-top: 1px solid #dee2e6; margin: 20px 0; }
</style>"#;

/// One classified line of a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum TaggedLine {
    Header(String),
    Bullet(String),
    Paragraph(String),
}

impl TaggedLine {
    /// Classify one line; blank lines yield `None`.
    pub fn classify(line: &str) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        if trimmed == trimmed.to_uppercase() && trimmed.ends_with(':') {
            let header = trimmed.trim_end_matches(':').trim_end();
            return Some(TaggedLine::Header(header.to_string()));
        }

        if let Some(rest) = trimmed.strip_prefix('•').or_else(|| trimmed.strip_prefix('-')) {
            return Some(TaggedLine::Bullet(rest.trim().to_string()));
        }

        Some(TaggedLine::Paragraph(trimmed.to_string()))
    }
}

/// Legacy heuristic: classify free text line by line
pub fn tag_lines(text: &str) -> Vec<TaggedLine> {
    text.lines().filter_map(TaggedLine::classify).collect()
}

pub fn section_emoji(header: &str) -> Option<&'static str> {
    SECTION_EMOJI
        .iter()
        .find(|(name, _)| *name == header)
        .map(|(_, emoji)| *emoji)
}

/// Escape the five HTML metacharacters
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn decorated_header(header: &str) -> String {
    match section_emoji(header) {
        Some(emoji) => format!("{} {}", emoji, header),
        None => header.to_string(),
    }
}

/// Rendered synthesis, ready for display or relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedResponse {
    pub title: String,
    pub lines: Vec<TaggedLine>,
    pub html: String,
    pub plain: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseFormatter;

impl ResponseFormatter {
    pub fn new() -> Self {
        Self
    }

    /// Format raw synthesis text through the legacy tagger
    pub fn format(&self, text: &str) -> FormattedResponse {
        let title = if text.contains(ANSWER_MARKER) {
            DECISION_TITLE
        } else {
            ANALYSIS_TITLE
        };

        self.format_tagged(tag_lines(text), title)
    }

    /// Format already-tagged lines
    pub fn format_tagged(&self, lines: Vec<TaggedLine>, title: &str) -> FormattedResponse {
        let body = render_body(&lines);
        let html = format!(
            "{}\n<div class=\"analysis-container\">\n<div class=\"title\">{}</div>\n{}\n<div class=\"separator\"></div>\n</div>",
            STYLES,
            escape_html(title),
            body
        );
        let plain = render_plain(&lines, title);

        FormattedResponse {
            title: title.to_string(),
            lines,
            html,
            plain,
        }
    }
}

/// Single left-to-right pass; the only state is whether a list is open.
fn render_body(lines: &[TaggedLine]) -> String {
    let mut out: Vec<String> = Vec::with_capacity(lines.len() + 4);
    let mut in_list = false;

    for line in lines {
        match line {
            TaggedLine::Header(text) => {
                if in_list {
                    out.push("</ul>".to_string());
                    in_list = false;
                }
                out.push(format!(
                    "<div class=\"section-header\">{}</div>",
                    escape_html(&decorated_header(text))
                ));
            }
            TaggedLine::Bullet(text) => {
                if !in_list {
                    out.push("<ul class=\"bullet-list\">".to_string());
                    in_list = true;
                }
                out.push(format!("<li>{}</li>", escape_html(text)));
            }
            TaggedLine::Paragraph(text) => {
                if in_list {
                    out.push("</ul>".to_string());
                    in_list = false;
                }
                out.push(format!("<p class=\"content\">{}</p>", escape_html(text)));
            }
        }
    }

    if in_list {
        out.push("</ul>".to_string());
    }

    out.join("\n")
}

fn render_plain(lines: &[TaggedLine], title: &str) -> String {
    let mut out = vec![title.to_string()];

    for line in lines {
        match line {
            TaggedLine::Header(text) => {
                out.push(String::new());
                out.push(decorated_header(text));
            }
            TaggedLine::Bullet(text) => out.push(format!("• {}", text)),
            TaggedLine::Paragraph(text) => out.push(text.clone()),
        }
    }

    out.join("\n")
}
