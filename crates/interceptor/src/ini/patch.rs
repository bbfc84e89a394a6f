use tracing::debug;

use super::document::{ConfigDocument, Line, LineEnding};

pub const DRIVER_SECTION: &str = "CAR_0";
pub const DRIVER_KEY: &str = "DRIVER_NAME";
pub const REMOTE_SECTION: &str = "REMOTE";
pub const REMOTE_KEY: &str = "NAME";

/// Replace `key` inside `section` with `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchTarget {
    pub section: String,
    pub key: String,
    pub value: String,
}

impl PatchTarget {
    pub fn new(
        section: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            section: section.into(),
            key: key.into(),
            value: value.into(),
        }
    }
}

/// The two fields the simulator shows as the player's name.
pub fn driver_name_targets(name: &str) -> Vec<PatchTarget> {
    vec![
        PatchTarget::new(DRIVER_SECTION, DRIVER_KEY, name),
        PatchTarget::new(REMOTE_SECTION, REMOTE_KEY, name),
    ]
}

/// One rewritten line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchChange {
    /// 1-based line number in the document.
    pub line: usize,
    pub section: String,
    pub key: String,
    pub old_value: String,
    pub new_value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchReport {
    pub changes: Vec<PatchChange>,
}

impl PatchReport {
    /// No line matched any target.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// At least one rewritten line now holds a different value.
    pub fn changed(&self) -> bool {
        self.changes.iter().any(|c| c.old_value != c.new_value)
    }

    /// Targets that did not match a single line.
    pub fn missing<'a>(&self, targets: &'a [PatchTarget]) -> Vec<&'a PatchTarget> {
        targets
            .iter()
            .filter(|t| {
                !self
                    .changes
                    .iter()
                    .any(|c| c.section == t.section && c.key == t.key)
            })
            .collect()
    }
}

impl ConfigDocument {
    /// Rewrite every line matching a target; leave all others untouched.
    ///
    /// Every occurrence is rewritten, not only the first. A rewritten line
    /// keeps a CRLF terminator if it had one and otherwise ends with LF.
    pub fn apply(&mut self, targets: &[PatchTarget]) -> PatchReport {
        let mut report = PatchReport::default();
        let mut current: Option<String> = None;

        for (index, line) in self.lines.iter_mut().enumerate() {
            if let Some(name) = line.section_name() {
                current = Some(name.to_string());
                continue;
            }
            let Some(section) = current.as_deref() else {
                continue;
            };
            let Some(target) = targets
                .iter()
                .find(|t| t.section == section && line.has_key(&t.key))
            else {
                continue;
            };

            let old_value = line
                .entry()
                .map(|(_, value)| value.to_string())
                .unwrap_or_default();
            debug!(
                "[{}] {}: '{}' -> '{}'",
                section, target.key, old_value, target.value
            );

            *line = Line {
                content: format!("{}={}", target.key, target.value),
                ending: match line.ending {
                    LineEnding::CrLf => LineEnding::CrLf,
                    LineEnding::Lf | LineEnding::None => LineEnding::Lf,
                },
            };
            report.changes.push(PatchChange {
                line: index + 1,
                section: section.to_string(),
                key: target.key.clone(),
                old_value,
                new_value: target.value.clone(),
            });
        }

        report
    }
}

/// Patch decoded text.
pub fn patch_text(input: &str, targets: &[PatchTarget]) -> (String, PatchReport) {
    let mut doc = ConfigDocument::parse(input);
    let report = doc.apply(targets);
    (doc.to_text(), report)
}

/// Patch raw file bytes, decoding them leniently first.
pub fn patch_bytes(input: &[u8], targets: &[PatchTarget]) -> (Vec<u8>, PatchReport) {
    let mut doc = ConfigDocument::from_bytes(input);
    let report = doc.apply(targets);
    (doc.into_bytes(), report)
}
