//! Output file naming
//!
//! Naming patterns are a closed set of placeholders validated when the
//! pattern is entered: `{n}` (crop ordinal), `{n:0W}` (ordinal zero-padded to
//! W digits) and `{doc}` (document stem). Everything else is literal text.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const DEFAULT_PATTERN: &str = "figure_{n:03}";

const MAX_NAME_LEN: usize = 200;
const MAX_PAD_WIDTH: usize = 9;

static INVALID_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F]"#).expect("valid regex"));
static RESERVED_NAMES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(CON|PRN|AUX|NUL|COM[1-9]|LPT[1-9])$").expect("valid regex")
});
static PADDED_ORDINAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^n:0([1-9])$").expect("valid regex"));

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum NamingError {
    #[error("naming pattern is empty")]
    Empty,
    #[error("unknown placeholder {{{0}}} (supported: {{n}}, {{n:0W}}, {{doc}})")]
    UnknownToken(String),
    #[error("unbalanced brace at position {0}")]
    UnbalancedBraces(usize),
    #[error("pattern must contain {{n}} or {{n:0W}} so names stay unique")]
    MissingOrdinal,
    #[error("character {0:?} is not allowed in file names")]
    InvalidCharacter(char),
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Ordinal { width: usize },
    Document,
}

/// Validated naming pattern
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamingPattern {
    source: String,
    segments: Vec<Segment>,
}

impl NamingPattern {
    pub fn parse(pattern: &str) -> Result<Self, NamingError> {
        if pattern.trim().is_empty() {
            return Err(NamingError::Empty);
        }

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = pattern.char_indices();

        while let Some((pos, c)) = chars.next() {
            match c {
                '{' => {
                    let mut token = String::new();
                    let mut closed = false;
                    for (inner_pos, inner) in chars.by_ref() {
                        match inner {
                            '}' => {
                                closed = true;
                                break;
                            }
                            '{' => return Err(NamingError::UnbalancedBraces(inner_pos)),
                            other => token.push(other),
                        }
                    }
                    if !closed {
                        return Err(NamingError::UnbalancedBraces(pos));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(parse_token(&token)?);
                }
                '}' => return Err(NamingError::UnbalancedBraces(pos)),
                c if INVALID_CHARS.is_match(c.encode_utf8(&mut [0; 4])) => {
                    return Err(NamingError::InvalidCharacter(c));
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        if !segments.iter().any(|s| matches!(s, Segment::Ordinal { .. })) {
            return Err(NamingError::MissingOrdinal);
        }

        Ok(Self {
            source: pattern.to_string(),
            segments,
        })
    }

    /// File stem for the crop with 1-based `ordinal` in document `doc`
    #[must_use]
    pub fn render(&self, ordinal: usize, doc: &str) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Ordinal { width } => out.push_str(&format!("{ordinal:0width$}")),
                Segment::Document => out.push_str(&sanitize_filename(doc)),
            }
        }
        sanitize_filename(&out)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl Default for NamingPattern {
    fn default() -> Self {
        Self {
            source: DEFAULT_PATTERN.to_string(),
            segments: vec![
                Segment::Literal("figure_".to_string()),
                Segment::Ordinal { width: 3 },
            ],
        }
    }
}

impl FromStr for NamingPattern {
    type Err = NamingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for NamingPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Serialize for NamingPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for NamingPattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

fn parse_token(token: &str) -> Result<Segment, NamingError> {
    match token {
        "n" => Ok(Segment::Ordinal { width: 0 }),
        "doc" => Ok(Segment::Document),
        other => PADDED_ORDINAL
            .captures(other)
            .and_then(|caps| caps[1].parse::<usize>().ok())
            .filter(|w| *w <= MAX_PAD_WIDTH)
            .map(|width| Segment::Ordinal { width })
            .ok_or_else(|| NamingError::UnknownToken(other.to_string())),
    }
}

/// Sanitize a filename for cross-platform compatibility
/// Removes/replaces characters that are invalid on Windows, macOS, or Linux
pub fn sanitize_filename(name: &str) -> String {
    let sanitized = INVALID_CHARS.replace_all(name, "_");
    let sanitized = sanitized.trim_matches(|c| c == ' ' || c == '.');

    if RESERVED_NAMES.is_match(sanitized) {
        return format!("_{sanitized}");
    }

    let sanitized: String = sanitized.chars().take(MAX_NAME_LEN).collect();
    if sanitized.is_empty() {
        "untitled".to_string()
    } else {
        sanitized
    }
}

/// `path` if unused, else the first free `<stem>_<k><ext>` for k = 2, 3, ...
#[must_use]
pub fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut counter = 2usize;
    loop {
        let candidate = parent.join(format!("{stem}_{counter}{suffix}"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Human readable byte count ("0 B", "1.5 MB")
#[must_use]
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{size:.1} {}", UNITS[unit])
}

/// Document stem used by `{doc}` and default labels
#[must_use]
pub fn document_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| sanitize_filename(&s.to_string_lossy()))
        .unwrap_or_else(|| "document".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pattern_pads_to_three() {
        let pattern = NamingPattern::default();
        assert_eq!(pattern.render(7, "paper"), "figure_007");
        assert_eq!(NamingPattern::parse(DEFAULT_PATTERN), Ok(pattern));
    }

    #[test]
    fn document_and_plain_ordinal() {
        let pattern = NamingPattern::parse("{doc}-crop{n}").expect("valid pattern");
        assert_eq!(pattern.render(12, "My: Paper"), "My_ Paper-crop12");
    }

    #[test]
    fn rejects_unknown_tokens() {
        assert_eq!(
            NamingPattern::parse("{date}_{n}"),
            Err(NamingError::UnknownToken("date".to_string()))
        );
        assert_eq!(
            NamingPattern::parse("x_{n:00}"),
            Err(NamingError::UnknownToken("n:00".to_string()))
        );
        assert_eq!(
            NamingPattern::parse("x_{n:3}"),
            Err(NamingError::UnknownToken("n:3".to_string()))
        );
    }

    #[test]
    fn rejects_unbalanced_braces() {
        assert_eq!(
            NamingPattern::parse("fig_{n"),
            Err(NamingError::UnbalancedBraces(4))
        );
        assert_eq!(
            NamingPattern::parse("fig_n}"),
            Err(NamingError::UnbalancedBraces(5))
        );
        assert_eq!(
            NamingPattern::parse("{{n}}"),
            Err(NamingError::UnbalancedBraces(1))
        );
    }

    #[test]
    fn requires_ordinal() {
        assert_eq!(
            NamingPattern::parse("{doc}_figure"),
            Err(NamingError::MissingOrdinal)
        );
        assert_eq!(NamingPattern::parse("  "), Err(NamingError::Empty));
    }

    #[test]
    fn rejects_path_separators() {
        assert_eq!(
            NamingPattern::parse("out/{n}"),
            Err(NamingError::InvalidCharacter('/'))
        );
    }

    #[test]
    fn test_sanitize_basic() {
        assert_eq!(sanitize_filename("Normal Book"), "Normal Book");
        assert_eq!(sanitize_filename("Book: A Tale"), "Book_ A Tale");
        assert_eq!(sanitize_filename("Book/Chapter"), "Book_Chapter");
        assert_eq!(sanitize_filename("CON"), "_CON");
        assert_eq!(sanitize_filename(" . "), "untitled");
        assert_eq!(sanitize_filename("..Book.."), "Book");
    }

    #[test]
    fn unique_path_appends_counter() {
        let dir = tempfile::tempdir().expect("temp dir");
        let target = dir.path().join("figure_001.png");
        assert_eq!(unique_path(&target), target);

        std::fs::write(&target, b"x").expect("write");
        assert_eq!(unique_path(&target), dir.path().join("figure_001_2.png"));

        std::fs::write(dir.path().join("figure_001_2.png"), b"x").expect("write");
        assert_eq!(unique_path(&target), dir.path().join("figure_001_3.png"));
    }

    #[test]
    fn file_sizes() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(512), "512.0 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(100 * 1024 * 1024), "100.0 MB");
    }

    #[test]
    fn serde_validates_pattern() {
        let parsed: NamingPattern = serde_yaml::from_str("\"{doc}_{n:02}\"").expect("valid yaml");
        assert_eq!(parsed.render(3, "a"), "a_03");
        assert!(serde_yaml::from_str::<NamingPattern>("\"{oops}\"").is_err());
    }
}
