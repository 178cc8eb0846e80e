//! Domain models: vocabulary entries and the part-of-speech vocabulary used by Answer mode.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One vocabulary item as authored in the source data.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WordEntry {
  pub day: u32,
  pub id: String,
  /// Case preserved as authored. Empty when the source omitted it.
  pub word: String,
  #[serde(default)] pub part_of_speech: Option<String>,
  #[serde(default)] pub meaning: Option<String>,
  /// Translated gloss (the source's `myanmarmeaning`).
  #[serde(default)] pub secondary_meaning: Option<String>,
  #[serde(default)] pub synonym: Option<String>,
  #[serde(default)] pub sentences: Vec<String>,
  #[serde(default)] pub skill: Option<String>,
}

impl WordEntry {
  pub fn has_word(&self) -> bool {
    !self.word.trim().is_empty()
  }

  /// Images are keyed by entry id (`<id>.png`).
  pub fn image_key(&self) -> String {
    format!("{}.png", self.id)
  }
}

/// Orders ids numerically when both parse as integers.
/// Non-numeric ids sort after numeric ones, lexically among themselves.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
  match (a.parse::<u64>(), b.parse::<u64>()) {
    (Ok(x), Ok(y)) => x.cmp(&y),
    (Ok(_), Err(_)) => Ordering::Less,
    (Err(_), Ok(_)) => Ordering::Greater,
    (Err(_), Err(_)) => a.cmp(b),
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PartOfSpeech {
  Noun,
  Verb,
  Adjective,
  Adverb,
  Pronoun,
  Preposition,
  Conjunction,
  Interjection,
}

impl PartOfSpeech {
  pub const ALL: [PartOfSpeech; 8] = [
    PartOfSpeech::Noun,
    PartOfSpeech::Verb,
    PartOfSpeech::Adjective,
    PartOfSpeech::Adverb,
    PartOfSpeech::Pronoun,
    PartOfSpeech::Preposition,
    PartOfSpeech::Conjunction,
    PartOfSpeech::Interjection,
  ];

  /// Accepts full names and the usual dictionary abbreviations, any case,
  /// with or without a trailing period.
  pub fn parse(raw: &str) -> Option<Self> {
    let key = normalize_label(raw);
    let pos = match key.as_str() {
      "noun" | "n" => PartOfSpeech::Noun,
      "verb" | "v" => PartOfSpeech::Verb,
      "adjective" | "adj" => PartOfSpeech::Adjective,
      "adverb" | "adv" => PartOfSpeech::Adverb,
      "pronoun" | "pron" => PartOfSpeech::Pronoun,
      "preposition" | "prep" => PartOfSpeech::Preposition,
      "conjunction" | "conj" => PartOfSpeech::Conjunction,
      "interjection" | "interj" => PartOfSpeech::Interjection,
      _ => return None,
    };
    Some(pos)
  }

  pub fn label(self) -> &'static str {
    match self {
      PartOfSpeech::Noun => "Noun",
      PartOfSpeech::Verb => "Verb",
      PartOfSpeech::Adjective => "Adjective",
      PartOfSpeech::Adverb => "Adverb",
      PartOfSpeech::Pronoun => "Pronoun",
      PartOfSpeech::Preposition => "Preposition",
      PartOfSpeech::Conjunction => "Conjunction",
      PartOfSpeech::Interjection => "Interjection",
    }
  }

  /// True if `authored` (an entry's raw part of speech) names this choice.
  /// Labels outside the known set are compared as normalized text.
  pub fn matches(self, authored: &str) -> bool {
    match PartOfSpeech::parse(authored) {
      Some(pos) => pos == self,
      None => normalize_label(authored) == self.label().to_lowercase(),
    }
  }
}

impl fmt::Display for PartOfSpeech {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

fn normalize_label(raw: &str) -> String {
  raw.trim().trim_end_matches('.').trim().to_lowercase()
}
