//! Multiple-choice items: the typed model, validation, prompt rendering and
//! JSON import.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One of the four option letters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OptionKey {
    A,
    B,
    C,
    D,
}

impl OptionKey {
    pub const ALL: [OptionKey; 4] = [OptionKey::A, OptionKey::B, OptionKey::C, OptionKey::D];

    pub fn as_str(&self) -> &'static str {
        match self {
            OptionKey::A => "A",
            OptionKey::B => "B",
            OptionKey::C => "C",
            OptionKey::D => "D",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            OptionKey::A => 0,
            OptionKey::B => 1,
            OptionKey::C => 2,
            OptionKey::D => 3,
        }
    }

    /// Case-insensitive single-letter parse.
    pub fn from_letter(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'A' => Some(OptionKey::A),
            'B' => Some(OptionKey::B),
            'C' => Some(OptionKey::C),
            'D' => Some(OptionKey::D),
            _ => None,
        }
    }
}

impl fmt::Display for OptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OptionKey {
    type Err = ItemError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => {
                OptionKey::from_letter(c).ok_or_else(|| ItemError::InvalidKey(s.to_string()))
            }
            _ => Err(ItemError::InvalidKey(s.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum ItemError {
    #[error("invalid option key: {0:?}")]
    InvalidKey(String),
    #[error("item has an empty id")]
    EmptyId,
    #[error("item {0} has an empty stem")]
    EmptyStem(String),
    #[error("item {id}: correct answer {key} names an empty option")]
    CorrectOptionEmpty { id: String, key: OptionKey },
    #[error("item {id}: missing field {field}")]
    MissingField { id: String, field: &'static str },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A four-option multiple-choice question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty_label: Option<String>,
    pub stem: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Option texts in A..D order. Any may be empty.
    pub options: [String; 4],
    pub correct: OptionKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl Item {
    pub fn new(
        id: impl Into<String>,
        stem: impl Into<String>,
        options: [&str; 4],
        correct: OptionKey,
    ) -> Self {
        Self {
            id: id.into(),
            source: None,
            topic: None,
            difficulty_label: None,
            stem: stem.into(),
            code: None,
            options: options.map(str::to_string),
            correct,
            explanation: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn option(&self, key: OptionKey) -> &str {
        &self.options[key.index()]
    }

    pub fn validate(&self) -> Result<(), ItemError> {
        if self.id.trim().is_empty() {
            return Err(ItemError::EmptyId);
        }
        if self.stem.trim().is_empty() {
            return Err(ItemError::EmptyStem(self.id.clone()));
        }
        if self.option(self.correct).trim().is_empty() {
            return Err(ItemError::CorrectOptionEmpty {
                id: self.id.clone(),
                key: self.correct,
            });
        }
        Ok(())
    }

    /// The user turn sent to the model: stem, optional fenced code, then the
    /// four lettered options.
    pub fn render_prompt(&self) -> String {
        let mut prompt = self.stem.clone();

        if let Some(code) = self.code.as_deref().filter(|c| !c.is_empty()) {
            prompt.push_str("\n\n```\n");
            prompt.push_str(code);
            prompt.push_str("\n```");
        }

        prompt.push('\n');
        for key in OptionKey::ALL {
            prompt.push('\n');
            prompt.push_str(key.as_str());
            prompt.push_str(") ");
            prompt.push_str(self.option(key));
        }

        prompt
    }

    /// Stable content fingerprint over stem, code and options.
    pub fn content_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.stem.as_bytes());
        hasher.update(&[0]);
        hasher.update(self.code.as_deref().unwrap_or("").as_bytes());
        for opt in &self.options {
            hasher.update(&[0]);
            hasher.update(opt.as_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }
}

// =============================================================================
// FILTER
// =============================================================================

/// Item selection for a calibration run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemFilter {
    /// Exact source match.
    pub source: Option<String>,
    /// Substring match on topic.
    pub topic: Option<String>,
    pub limit: Option<usize>,
}

impl ItemFilter {
    pub fn matches(&self, item: &Item) -> bool {
        if let Some(source) = &self.source {
            if item.source.as_deref() != Some(source.as_str()) {
                return false;
            }
        }
        if let Some(topic) = &self.topic {
            match &item.topic {
                Some(t) if t.contains(topic.as_str()) => {}
                _ => return false,
            }
        }
        true
    }

    pub fn apply<'a>(&self, items: impl IntoIterator<Item = &'a Item>) -> Vec<Item> {
        let it = items.into_iter().filter(|i| self.matches(i)).cloned();
        match self.limit {
            Some(n) => it.take(n).collect(),
            None => it.collect(),
        }
    }

    /// Human-readable description stored on the run, or `None` for "all items".
    pub fn describe(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(s) = &self.source {
            parts.push(format!("source={s}"));
        }
        if let Some(t) = &self.topic {
            parts.push(format!("topic~{t}"));
        }
        if let Some(n) = self.limit {
            parts.push(format!("limit={n}"));
        }
        (!parts.is_empty()).then(|| parts.join(","))
    }
}

// =============================================================================
// IMPORT
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ItemFile {
    List(Vec<serde_json::Value>),
    Wrapped {
        #[serde(default)]
        items: Vec<serde_json::Value>,
    },
}

#[derive(Debug, Default, Deserialize)]
struct RawOptions {
    #[serde(rename = "A")]
    a: Option<String>,
    #[serde(rename = "B")]
    b: Option<String>,
    #[serde(rename = "C")]
    c: Option<String>,
    #[serde(rename = "D")]
    d: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawFeedback {
    explanation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    topic: Option<String>,
    difficulty: Option<String>,
    stem: Option<String>,
    options: Option<RawOptions>,
    option_a: Option<String>,
    option_b: Option<String>,
    option_c: Option<String>,
    option_d: Option<String>,
    correct: Option<String>,
    explanation: Option<String>,
    feedback: Option<RawFeedback>,
    code: Option<String>,
}

impl RawItem {
    fn into_item(self, source: &str) -> Result<Item, ItemError> {
        let provisional_id = self.id.clone().unwrap_or_default();
        let stem = self.stem.ok_or_else(|| ItemError::MissingField {
            id: provisional_id.clone(),
            field: "stem",
        })?;
        let correct = self
            .correct
            .ok_or_else(|| ItemError::MissingField {
                id: provisional_id.clone(),
                field: "correct",
            })?
            .parse::<OptionKey>()?;

        let opts = self.options.unwrap_or_default();
        let options = [
            opts.a.or(self.option_a).unwrap_or_default(),
            opts.b.or(self.option_b).unwrap_or_default(),
            opts.c.or(self.option_c).unwrap_or_default(),
            opts.d.or(self.option_d).unwrap_or_default(),
        ];

        let mut item = Item {
            id: provisional_id,
            source: Some(source.to_string()),
            topic: self.topic,
            difficulty_label: self.difficulty,
            stem,
            code: self.code.filter(|c| !c.is_empty()),
            options,
            correct,
            explanation: self
                .explanation
                .or_else(|| self.feedback.and_then(|f| f.explanation)),
        };

        if item.id.trim().is_empty() {
            item.id = format!("item-{}", &item.content_hash()[..12]);
        }

        item.validate()?;
        Ok(item)
    }
}

/// Outcome of parsing an item file.
#[derive(Debug, Default)]
pub struct ImportReport {
    pub items: Vec<Item>,
    /// Entries with a `type` other than `multiple-choice`.
    pub skipped_non_mcq: usize,
    /// Entries that failed to parse or validate, with their position.
    pub invalid: Vec<(usize, ItemError)>,
}

/// Parse an item file: either a JSON array or `{"items": [...]}`.
///
/// Options may be given as an `options: {A..D}` map or as
/// `option_a..option_d`. Items without an id get a content-derived one.
pub fn parse_item_file(json: &str, source: &str) -> Result<ImportReport, ItemError> {
    let entries = match serde_json::from_str::<ItemFile>(json)? {
        ItemFile::List(v) => v,
        ItemFile::Wrapped { items } => items,
    };

    let mut report = ImportReport::default();
    for (idx, value) in entries.into_iter().enumerate() {
        let raw: RawItem = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(e) => {
                report.invalid.push((idx, ItemError::Json(e)));
                continue;
            }
        };

        if raw.kind.as_deref().is_some_and(|k| k != "multiple-choice") {
            report.skipped_non_mcq += 1;
            continue;
        }

        match raw.into_item(source) {
            Ok(item) => report.items.push(item),
            Err(e) => report.invalid.push((idx, e)),
        }
    }

    Ok(report)
}
