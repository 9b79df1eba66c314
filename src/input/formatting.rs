use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatCommand {
    Bold,
    Italic,
    Underline,
    StrikeThrough,
}

impl FormatCommand {
    pub fn tag(self) -> &'static str {
        match self {
            Self::Bold => "b",
            Self::Italic => "i",
            Self::Underline => "u",
            Self::StrikeThrough => "strike",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("Selection {start}..{end} is outside the content ({len} bytes)")]
    OutOfBounds { start: usize, end: usize, len: usize },
    #[error("Selection {start}..{end} splits a character")]
    NotCharBoundary { start: usize, end: usize },
}

/// Toggles `command` on the byte range `selection` of the markup.
///
/// A selection already wrapped in exactly this tag is unwrapped; anything else
/// is wrapped. A collapsed selection leaves the content unchanged.
pub fn apply_format(
    content: &str,
    selection: Range<usize>,
    command: FormatCommand,
) -> Result<String, FormatError> {
    let Range { start, end } = selection;
    if start > end || end > content.len() {
        return Err(FormatError::OutOfBounds {
            start,
            end,
            len: content.len(),
        });
    }
    if !content.is_char_boundary(start) || !content.is_char_boundary(end) {
        return Err(FormatError::NotCharBoundary { start, end });
    }
    if start == end {
        return Ok(content.to_string());
    }

    let open = format!("<{}>", command.tag());
    let close = format!("</{}>", command.tag());
    let before = &content[..start];
    let selected = &content[start..end];
    let after = &content[end..];

    if before.ends_with(&open) && after.starts_with(&close) {
        return Ok(format!(
            "{}{}{}",
            &before[..before.len() - open.len()],
            selected,
            &after[close.len()..]
        ));
    }

    if let Some(inner) = selected
        .strip_prefix(open.as_str())
        .and_then(|rest| rest.strip_suffix(close.as_str()))
    {
        return Ok(format!("{}{}{}", before, inner, after));
    }

    Ok(format!("{}{}{}{}{}", before, open, selected, close, after))
}

/// Plain-text rendering of memo markup, with links spelled out.
pub fn strip_html(html: &str) -> String {
    let normalized = expand_anchor_tags(html);
    html2text::from_read(normalized.as_bytes(), 1000)
}

fn expand_anchor_tags(html: &str) -> String {
    static LINK_RE: OnceLock<Regex> = OnceLock::new();
    let regex = LINK_RE.get_or_init(|| {
        Regex::new(r#"(?is)<a\s+[^>]*?href=["']([^"']+)["'][^>]*>(.*?)</a>"#)
            .expect("invalid anchor regex")
    });

    regex
        .replace_all(html, |caps: &regex::Captures| {
            let url = caps.get(1).map(|m| m.as_str()).unwrap_or_default().trim();
            let text = caps.get(2).map(|m| m.as_str()).unwrap_or_default().trim();

            if text.is_empty() || url.eq_ignore_ascii_case(text) {
                url.to_string()
            } else {
                format!("{text} ({url})")
            }
        })
        .into_owned()
}
