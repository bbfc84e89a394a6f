use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use encoding_rs::{Encoding, UTF_8};

/// Terminator that followed a line in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    Lf,
    CrLf,
    /// Last line of a file without a trailing newline.
    None,
}

impl LineEnding {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
            Self::None => "",
        }
    }
}

/// One physical line, split from its terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub content: String,
    pub ending: LineEnding,
}

impl Line {
    /// Section name if this line is a `[...]` header.
    ///
    /// Any trimmed line that starts with `[` and ends with `]` counts; the
    /// name is not validated.
    pub fn section_name(&self) -> Option<&str> {
        let trimmed = self.content.trim();
        trimmed
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
    }

    /// `(key, value)` split on the first `=`, both trimmed.
    pub fn entry(&self) -> Option<(&str, &str)> {
        let (key, value) = self.content.trim().split_once('=')?;
        Some((key.trim(), value.trim()))
    }

    /// True if the trimmed line starts with `<key>=`.
    pub fn has_key(&self, key: &str) -> bool {
        self.content
            .trim()
            .strip_prefix(key)
            .is_some_and(|rest| rest.starts_with('='))
    }
}

/// Decode raw file bytes as UTF-8 without ever failing.
///
/// Malformed sequences are dropped rather than replaced, and a leading BOM is
/// kept as-is so that an untouched file serializes back to the same bytes.
pub fn decode_lossy(bytes: &[u8]) -> Cow<'_, str> {
    let (text, had_errors) = UTF_8.decode_without_bom_handling(bytes);
    if !had_errors {
        return text;
    }
    let mut out = String::with_capacity(bytes.len());
    let mut rest = bytes;
    while !rest.is_empty() {
        let valid = Encoding::utf8_valid_up_to(rest);
        out.push_str(&UTF_8.decode_without_bom_handling(&rest[..valid]).0);
        // skip one malformed byte; a bad sequence is consumed a byte at a time
        rest = &rest[(valid + 1).min(rest.len())..];
    }
    Cow::Owned(out)
}

/// A line-oriented `[Section]` / `Key=Value` document.
///
/// Holds the raw lines plus the set of keys seen per section. Serializing an
/// unmodified document returns the input text (minus NUL bytes).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDocument {
    pub(crate) lines: Vec<Line>,
    sections: BTreeMap<String, BTreeSet<String>>,
}

impl ConfigDocument {
    pub fn parse(text: &str) -> Self {
        let text: Cow<'_, str> = if text.contains('\0') {
            Cow::Owned(text.replace('\0', ""))
        } else {
            Cow::Borrowed(text)
        };

        let lines: Vec<Line> = text.split_inclusive('\n').map(split_terminator).collect();

        let mut sections: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let mut current: Option<&str> = None;
        for line in &lines {
            if let Some(name) = line.section_name() {
                sections.entry(name.to_string()).or_default();
                current = Some(name);
                continue;
            }
            if let (Some(section), Some((key, _))) = (current, line.entry())
                && !key.is_empty()
            {
                sections
                    .entry(section.to_string())
                    .or_default()
                    .insert(key.to_string());
            }
        }

        Self { lines, sections }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::parse(&decode_lossy(bytes))
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Section names in sorted order.
    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    pub fn keys(&self, section: &str) -> Option<&BTreeSet<String>> {
        self.sections.get(section)
    }

    pub fn contains(&self, section: &str, key: &str) -> bool {
        self.keys(section).is_some_and(|keys| keys.contains(key))
    }

    /// First value of `key` inside `section`, trimmed.
    pub fn value(&self, section: &str, key: &str) -> Option<&str> {
        let mut current: Option<&str> = None;
        for line in &self.lines {
            if let Some(name) = line.section_name() {
                current = Some(name);
                continue;
            }
            if current == Some(section) && line.has_key(key) {
                return line.entry().map(|(_, value)| value);
            }
        }
        None
    }

    pub fn to_text(&self) -> String {
        self.to_string()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for ConfigDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.lines {
            f.write_str(&line.content)?;
            f.write_str(line.ending.as_str())?;
        }
        Ok(())
    }
}

fn split_terminator(raw: &str) -> Line {
    if let Some(content) = raw.strip_suffix("\r\n") {
        Line {
            content: content.to_string(),
            ending: LineEnding::CrLf,
        }
    } else if let Some(content) = raw.strip_suffix('\n') {
        Line {
            content: content.to_string(),
            ending: LineEnding::Lf,
        }
    } else {
        Line {
            content: raw.to_string(),
            ending: LineEnding::None,
        }
    }
}
