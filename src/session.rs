//! Study session state machine.
//!
//! A session covers one day in one of two modes:
//!   - Learn: progressive reveal per word (word -> image -> details), gated navigation.
//!   - Answer: guess the word and its part of speech, check, move freely, running score.
//!
//! `LearnState` and `AnswerState` transitions are plain functions taking the
//! current state and returning the next one, so they are testable without any
//! transport in front of them. `StudySession` binds a state to the day's entries.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::catalog::VocabularyCatalog;
use crate::domain::{PartOfSpeech, WordEntry};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
  #[error("no vocabulary found for Day-{0:02}")]
  EmptyDay(u32),

  #[error("'{action}' is not available in {mode:?} mode")]
  UnsupportedAction { mode: StudyMode, action: &'static str },

  #[error("unknown part of speech: {0}")]
  UnknownPartOfSpeech(String),

  #[error("unknown session: {0}")]
  NotFound(String),
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StudyMode {
  Learn,
  Answer,
}

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RevealStep {
  Word,
  Image,
  Details,
}

impl RevealStep {
  pub fn index(self) -> u8 {
    match self {
      RevealStep::Word => 0,
      RevealStep::Image => 1,
      RevealStep::Details => 2,
    }
  }

  fn next(self) -> Option<Self> {
    match self {
      RevealStep::Word => Some(RevealStep::Image),
      RevealStep::Image => Some(RevealStep::Details),
      RevealStep::Details => None,
    }
  }

  fn prev(self) -> Option<Self> {
    match self {
      RevealStep::Word => None,
      RevealStep::Image => Some(RevealStep::Word),
      RevealStep::Details => Some(RevealStep::Image),
    }
  }
}

// ---------------- Learn mode ----------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LearnState {
  pub index: usize,
  pub reveal: RevealStep,
}

impl Default for LearnState {
  fn default() -> Self {
    Self { index: 0, reveal: RevealStep::Word }
  }
}

impl LearnState {
  /// Reveal more of the current word, or move to the next word once fully revealed.
  pub fn advance(self, word_count: usize) -> Self {
    if let Some(reveal) = self.reveal.next() {
      return Self { reveal, ..self };
    }
    if self.index + 1 < word_count {
      return Self { index: self.index + 1, reveal: RevealStep::Word };
    }
    self
  }

  /// Hide one step, or go back to the previous word shown complete.
  pub fn retreat(self) -> Self {
    if let Some(reveal) = self.reveal.prev() {
      return Self { reveal, ..self };
    }
    if self.index > 0 {
      return Self { index: self.index - 1, reveal: RevealStep::Details };
    }
    self
  }

  pub fn is_prev_disabled(&self) -> bool {
    self.index == 0 && self.reveal == RevealStep::Word
  }

  pub fn is_next_disabled(&self, word_count: usize) -> bool {
    self.index + 1 >= word_count && self.reveal == RevealStep::Details
  }
}

// ---------------- Answer mode ----------------

#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WordResult {
  pub word_correct: bool,
  pub pos_correct: bool,
}

impl WordResult {
  pub fn is_correct(&self) -> bool {
    self.word_correct && self.pos_correct
  }
}

/// Score a guess against an entry: trimmed, case-insensitive word; part of
/// speech compared after expanding abbreviations.
pub fn score_guess(entry: &WordEntry, guess: &str, choice: PartOfSpeech) -> WordResult {
  let word_correct = guess.trim().to_lowercase() == entry.word.trim().to_lowercase();
  let pos_correct = entry
    .part_of_speech
    .as_deref()
    .map(|authored| choice.matches(authored))
    .unwrap_or(false);
  WordResult { word_correct, pos_correct }
}

/// Running score, derived from the recorded results on every read.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScoreSummary {
  pub total: usize,
  pub completed: usize,
  pub correct: usize,
  pub wrong: usize,
  pub finished: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AnswerState {
  pub index: usize,
  pub guess: String,
  pub part_of_speech: Option<PartOfSpeech>,
  pub checked: bool,
  /// Grows as words are checked; survives navigation.
  pub results: BTreeMap<usize, WordResult>,
}

impl AnswerState {
  pub fn with_guess(self, guess: impl Into<String>) -> Self {
    Self { guess: guess.into(), ..self }
  }

  pub fn with_part_of_speech(self, choice: PartOfSpeech) -> Self {
    Self { part_of_speech: Some(choice), ..self }
  }

  pub fn can_check(&self) -> bool {
    !self.guess.trim().is_empty() && self.part_of_speech.is_some()
  }

  /// Score the current word. A no-op while the check action is disabled.
  /// Re-checking before navigating overwrites the previous result.
  pub fn check(mut self, entry: &WordEntry) -> Self {
    let Some(choice) = self.part_of_speech else { return self };
    if self.guess.trim().is_empty() {
      return self;
    }
    let result = score_guess(entry, &self.guess, choice);
    self.results.insert(self.index, result);
    self.checked = true;
    self
  }

  pub fn advance(self, word_count: usize) -> Self {
    if self.is_next_disabled(word_count) {
      return self;
    }
    let next = self.index + 1;
    self.move_to(next)
  }

  pub fn retreat(self) -> Self {
    if self.is_prev_disabled() {
      return self;
    }
    let prev = self.index - 1;
    self.move_to(prev)
  }

  fn move_to(self, index: usize) -> Self {
    Self {
      index,
      guess: String::new(),
      part_of_speech: None,
      checked: false,
      results: self.results,
    }
  }

  pub fn is_prev_disabled(&self) -> bool {
    self.index == 0
  }

  pub fn is_next_disabled(&self, word_count: usize) -> bool {
    self.index + 1 >= word_count
  }

  pub fn current_result(&self) -> Option<WordResult> {
    self.results.get(&self.index).copied()
  }

  pub fn summary(&self, word_count: usize) -> ScoreSummary {
    let completed = self.results.len();
    let correct = self.results.values().filter(|r| r.is_correct()).count();
    ScoreSummary {
      total: word_count,
      completed,
      correct,
      wrong: completed - correct,
      finished: word_count > 0 && (0..word_count).all(|i| self.results.contains_key(&i)),
    }
  }
}

// ---------------- Session ----------------

/// One discrete user action.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionAction {
  Advance,
  Retreat,
  SetGuess { word: String },
  SetPartOfSpeech { choice: String },
  Check,
}

impl SessionAction {
  pub fn name(&self) -> &'static str {
    match self {
      SessionAction::Advance => "advance",
      SessionAction::Retreat => "retreat",
      SessionAction::SetGuess { .. } => "set_guess",
      SessionAction::SetPartOfSpeech { .. } => "set_part_of_speech",
      SessionAction::Check => "check",
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
  Learn(LearnState),
  Answer(AnswerState),
}

#[derive(Clone, Debug)]
pub struct StudySession {
  day: u32,
  skill: Option<String>,
  entries: Vec<Arc<WordEntry>>,
  state: SessionState,
}

impl StudySession {
  /// Start a fresh session. Refused for a day without entries.
  pub fn start(catalog: &VocabularyCatalog, day: u32, mode: StudyMode) -> Result<Self, SessionError> {
    let entries = catalog.entries_for_day(day);
    if entries.is_empty() {
      return Err(SessionError::EmptyDay(day));
    }
    let state = match mode {
      StudyMode::Learn => SessionState::Learn(LearnState::default()),
      StudyMode::Answer => SessionState::Answer(AnswerState::default()),
    };
    Ok(Self { day, skill: catalog.skill_for_day(day), entries, state })
  }

  #[instrument(level = "debug", skip(self), fields(day = self.day, mode = ?self.mode(), action = action.name()))]
  pub fn apply(&mut self, action: SessionAction) -> Result<(), SessionError> {
    let word_count = self.entries.len();
    let mode = self.mode();
    match &mut self.state {
      SessionState::Learn(learn) => {
        *learn = match action {
          SessionAction::Advance => learn.advance(word_count),
          SessionAction::Retreat => learn.retreat(),
          other => return Err(SessionError::UnsupportedAction { mode, action: other.name() }),
        };
      }
      SessionState::Answer(answer) => {
        if let SessionAction::SetPartOfSpeech { choice } = &action {
          if PartOfSpeech::parse(choice).is_none() {
            return Err(SessionError::UnknownPartOfSpeech(choice.clone()));
          }
        }
        let current = std::mem::take(answer);
        *answer = match action {
          SessionAction::Advance => current.advance(word_count),
          SessionAction::Retreat => current.retreat(),
          SessionAction::SetGuess { word } => current.with_guess(word),
          SessionAction::SetPartOfSpeech { choice } => match PartOfSpeech::parse(&choice) {
            Some(pos) => current.with_part_of_speech(pos),
            None => current,
          },
          SessionAction::Check => {
            if !current.can_check() {
              debug!(target: "onestep", "Check ignored: guess or part of speech missing");
            }
            let entry = &self.entries[current.index];
            current.check(entry)
          }
        };
      }
    }
    Ok(())
  }

  pub fn day(&self) -> u32 {
    self.day
  }

  pub fn skill(&self) -> Option<&str> {
    self.skill.as_deref()
  }

  pub fn mode(&self) -> StudyMode {
    match self.state {
      SessionState::Learn(_) => StudyMode::Learn,
      SessionState::Answer(_) => StudyMode::Answer,
    }
  }

  pub fn state(&self) -> &SessionState {
    &self.state
  }

  pub fn word_count(&self) -> usize {
    self.entries.len()
  }

  pub fn current_index(&self) -> usize {
    match &self.state {
      SessionState::Learn(s) => s.index,
      SessionState::Answer(s) => s.index,
    }
  }

  pub fn current_entry(&self) -> &WordEntry {
    &self.entries[self.current_index()]
  }

  pub fn is_prev_disabled(&self) -> bool {
    match &self.state {
      SessionState::Learn(s) => s.is_prev_disabled(),
      SessionState::Answer(s) => s.is_prev_disabled(),
    }
  }

  pub fn is_next_disabled(&self) -> bool {
    match &self.state {
      SessionState::Learn(s) => s.is_next_disabled(self.entries.len()),
      SessionState::Answer(s) => s.is_next_disabled(self.entries.len()),
    }
  }

  /// Answer mode only.
  pub fn summary(&self) -> Option<ScoreSummary> {
    match &self.state {
      SessionState::Learn(_) => None,
      SessionState::Answer(s) => Some(s.summary(self.entries.len())),
    }
  }
}
