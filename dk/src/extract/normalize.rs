//! TextNormalizer - bounds and cleans document text before extraction

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::NormalizeConfig;

const BOM: char = '\u{feff}';

/// Cleaned document text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedText {
    pub text: String,
    /// True when lines were dropped to fit the character budget
    pub truncated: bool,
    /// Character count after decoding, before cleanup
    pub original_chars: usize,
}

/// Repairs encoding damage and bounds document size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextNormalizer {
    max_chars: usize,
    drop_empty_lines: bool,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::from(&NormalizeConfig::default())
    }
}

impl From<&NormalizeConfig> for TextNormalizer {
    fn from(config: &NormalizeConfig) -> Self {
        Self::new(config.max_chars, config.drop_empty_lines)
    }
}

impl TextNormalizer {
    pub fn new(max_chars: usize, drop_empty_lines: bool) -> Self {
        Self {
            max_chars,
            drop_empty_lines,
        }
    }

    /// Decode raw file bytes, replacing invalid UTF-8, then normalize
    pub fn normalize_bytes(&self, bytes: &[u8]) -> NormalizedText {
        self.normalize(&String::from_utf8_lossy(bytes))
    }

    pub fn normalize(&self, raw: &str) -> NormalizedText {
        let original_chars = raw.chars().count();
        debug!(original_chars, max_chars = self.max_chars, "TextNormalizer::normalize: called");

        let unified = raw.replace("\r\n", "\n").replace('\r', "\n");
        let mut lines: Vec<String> = Vec::new();
        for line in unified.split('\n') {
            let cleaned = clean_line(line);
            if cleaned.is_empty() && (self.drop_empty_lines || lines.last().is_some_and(|l| l.is_empty())) {
                continue;
            }
            lines.push(cleaned);
        }
        while lines.first().is_some_and(|l| l.is_empty()) {
            lines.remove(0);
        }
        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }

        let (text, truncated) = self.fit_budget(&lines);
        if truncated {
            warn!(
                original_chars,
                kept_chars = text.chars().count(),
                "Document exceeds {} characters, truncated",
                self.max_chars
            );
        }

        NormalizedText {
            text,
            truncated,
            original_chars,
        }
    }

    /// Keep whole lines while they fit; a first line longer than the budget is cut
    fn fit_budget(&self, lines: &[String]) -> (String, bool) {
        let mut text = String::new();
        let mut used = 0usize;

        for line in lines {
            let separator = usize::from(!text.is_empty());
            let len = line.chars().count();
            if used + separator + len > self.max_chars {
                if text.is_empty() {
                    text = line.chars().take(self.max_chars).collect();
                }
                return (text, true);
            }
            if separator == 1 {
                text.push('\n');
            }
            text.push_str(line);
            used += separator + len;
        }
        (text, false)
    }
}

/// Strip BOMs, replacement and control characters; collapse inner whitespace
fn clean_line(line: &str) -> String {
    let filtered: String = line
        .chars()
        .filter(|c| *c != BOM && *c != char::REPLACEMENT_CHARACTER)
        .map(|c| if c == '\t' { ' ' } else { c })
        .filter(|c| !c.is_control())
        .collect();
    filtered.split_whitespace().collect::<Vec<_>>().join(" ")
}
