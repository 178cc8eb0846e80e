//! Vocabulary catalog: parsed once from the XML source, then shared read-only.
//!
//! Loading is soft-fail at the edge: `load_or_empty` and `from_path` log the
//! `ParseError` and hand back an empty catalog so every view can still render
//! its "no data" state. `load` is the strict variant used by tests and tools.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{compare_ids, WordEntry};

#[derive(Debug, Error)]
pub enum ParseError {
  #[error("malformed vocabulary document: {0}")]
  Xml(#[from] quick_xml::DeError),

  #[error("failed to read vocabulary source: {0}")]
  Io(#[from] std::io::Error),
}

/// Per-day overview used by the day picker.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DaySummary {
  pub day: u32,
  pub word_count: usize,
  pub skill: Option<String>,
}

#[derive(Debug, Default)]
pub struct VocabularyCatalog {
  /// Sorted by (day asc, id asc).
  entries: Vec<Arc<WordEntry>>,
  /// Lower-cased word -> entry. Later entries in source order win.
  by_word: HashMap<String, Arc<WordEntry>>,
}

impl VocabularyCatalog {
  pub fn empty() -> Self {
    Self::default()
  }

  /// Strict parse of the XML source.
  pub fn load(source: &str) -> Result<Self, ParseError> {
    let repaired = repair_sentences_tags(source);
    let doc: RawDocument = quick_xml::de::from_str(&repaired)?;
    Ok(Self::from_raw(doc.entries))
  }

  /// Parse, degrading to an empty catalog on malformed input.
  pub fn load_or_empty(source: &str) -> Self {
    match Self::load(source) {
      Ok(catalog) => catalog,
      Err(e) => {
        error!(target: "onestep", error = %e, "Vocabulary source is malformed; continuing with an empty catalog");
        Self::empty()
      }
    }
  }

  /// Read and parse the file at `path`, degrading to an empty catalog on any failure.
  #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
  pub fn from_path(path: impl AsRef<Path>) -> Self {
    let catalog = match std::fs::read_to_string(path.as_ref()) {
      Ok(source) => Self::load_or_empty(&source),
      Err(e) => {
        error!(target: "onestep", error = %ParseError::from(e), "Vocabulary source unavailable; continuing with an empty catalog");
        Self::empty()
      }
    };
    info!(target: "onestep", entries = catalog.len(), days = catalog.days().len(), "Vocabulary catalog loaded");
    catalog
  }

  /// Build from already-typed entries (synthetic catalogs in tests).
  pub fn from_entries(entries: Vec<WordEntry>) -> Self {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(entries.len());
    let mut by_word = HashMap::new();

    for entry in entries {
      if entry.day == 0 {
        warn!(target: "onestep", id = %entry.id, "Skipping entry with day 0");
        continue;
      }
      if !seen.insert((entry.day, entry.id.clone())) {
        warn!(target: "onestep", day = entry.day, id = %entry.id, "Duplicate (day, id); keeping the first occurrence");
        continue;
      }
      let entry = Arc::new(entry);
      if entry.has_word() {
        by_word.insert(entry.word.trim().to_lowercase(), entry.clone());
      }
      kept.push(entry);
    }

    kept.sort_by(|a, b| a.day.cmp(&b.day).then_with(|| compare_ids(&a.id, &b.id)));
    Self { entries: kept, by_word }
  }

  fn from_raw(raw: Vec<RawEntry>) -> Self {
    let mut entries = Vec::with_capacity(raw.len());
    for r in raw {
      let day = match r.day.first().map(|d| d.trim().parse::<u32>()) {
        Some(Ok(day)) if day >= 1 => day,
        _ => {
          warn!(target: "onestep", day = ?r.day, id = ?r.id, "Skipping entry without a usable day");
          continue;
        }
      };
      let Some(id) = first(r.id) else {
        warn!(target: "onestep", day, "Skipping entry without an id");
        continue;
      };
      entries.push(WordEntry {
        day,
        id,
        word: first(r.word).unwrap_or_default(),
        part_of_speech: first(r.part_of_speech),
        meaning: first(r.meaning),
        secondary_meaning: first(r.myanmar_meaning).or_else(|| first(r.secondary_meaning)),
        synonym: first(r.synonym),
        sentences: r
          .sentences
          .into_iter()
          .flat_map(|s| s.items)
          .filter_map(|s| clean(Some(s)))
          .collect(),
        skill: first(r.skill),
      });
    }
    debug!(target: "onestep", parsed = entries.len(), "Parsed vocabulary entries");
    Self::from_entries(entries)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// All entries, ordered by (day, id).
  pub fn entries(&self) -> &[Arc<WordEntry>] {
    &self.entries
  }

  /// Entries of one day in ascending numeric id order.
  pub fn entries_for_day(&self, day: u32) -> Vec<Arc<WordEntry>> {
    self.entries.iter().filter(|e| e.day == day).cloned().collect()
  }

  /// Case-insensitive exact match on the word.
  pub fn lookup_by_word(&self, word: &str) -> Option<Arc<WordEntry>> {
    self.by_word.get(&word.trim().to_lowercase()).cloned()
  }

  /// First non-empty skill label of the day (in id order).
  pub fn skill_for_day(&self, day: u32) -> Option<String> {
    self.entries
      .iter()
      .filter(|e| e.day == day)
      .find_map(|e| e.skill.clone())
  }

  pub fn days(&self) -> Vec<DaySummary> {
    let mut days: BTreeMap<u32, DaySummary> = BTreeMap::new();
    for e in &self.entries {
      let summary = days.entry(e.day).or_insert_with(|| DaySummary {
        day: e.day,
        word_count: 0,
        skill: None,
      });
      summary.word_count += 1;
      if summary.skill.is_none() {
        summary.skill = e.skill.clone();
      }
    }
    days.into_values().collect()
  }

  /// Lower-cased word -> entry, for recognizing catalog words in free text.
  pub fn word_index(&self) -> &HashMap<String, Arc<WordEntry>> {
    &self.by_word
  }
}

fn clean(value: Option<String>) -> Option<String> {
  value
    .map(|v| v.trim().to_string())
    .filter(|v| !v.is_empty())
}

/// Repeated elements resolve to their first occurrence.
fn first(values: Vec<String>) -> Option<String> {
  clean(values.into_iter().next())
}

/// Some authored files lose the `<` of `<sentences>` at the start of a line.
fn repair_sentences_tags(source: &str) -> std::borrow::Cow<'_, str> {
  static BROKEN_OPEN_TAG: OnceLock<Option<Regex>> = OnceLock::new();
  match BROKEN_OPEN_TAG.get_or_init(|| Regex::new(r"(?m)^(\s*)sentences>").ok()) {
    Some(re) => re.replace_all(source, "${1}<sentences>"),
    None => std::borrow::Cow::Borrowed(source),
  }
}

// --- Source DTOs ---

#[derive(Deserialize)]
struct RawDocument {
  #[serde(rename = "entry", default)]
  entries: Vec<RawEntry>,
}

/// Every child is a list so a repeated element never fails the whole document.
#[derive(Deserialize, Default)]
#[serde(default)]
struct RawEntry {
  day: Vec<String>,
  id: Vec<String>,
  word: Vec<String>,
  #[serde(rename = "partOfSpeech")]
  part_of_speech: Vec<String>,
  meaning: Vec<String>,
  #[serde(rename = "myanmarmeaning")]
  myanmar_meaning: Vec<String>,
  #[serde(rename = "secondaryMeaning")]
  secondary_meaning: Vec<String>,
  synonym: Vec<String>,
  skill: Vec<String>,
  sentences: Vec<RawSentences>,
}

#[derive(Deserialize, Default)]
struct RawSentences {
  #[serde(rename = "sentence", default)]
  items: Vec<String>,
}
