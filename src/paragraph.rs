//! Contextual paragraph generation.
//!
//! Flow:
//! 1) Catalog words are grouped by day (day asc, id asc) into `Day-NN: w1, w2` lines.
//! 2) The prompt asks for one paragraph per day, each word used once, casing kept.
//! 3) The text generator is called; its outcome lands on the `ParagraphBoard`
//!    only if no later generation was initiated meanwhile.
//! 4) Rendered text is split into segments, catalog words carrying their entry.

use std::collections::HashMap;
use std::sync::Arc;

use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn, Instrument};

use crate::catalog::VocabularyCatalog;
use crate::config::GenerationCfg;
use crate::domain::{compare_ids, WordEntry};
use crate::upstream::{GenerationError, TextGenerator};
use crate::util::fill_template;

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct DayGroup {
  pub day: u32,
  pub words: Vec<String>,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
  pub system: String,
  pub user: String,
  pub day_groups: Vec<DayGroup>,
}

/// Words with a day, ordered by (day, id), grouped in first-seen day order.
pub fn group_by_day(catalog: &VocabularyCatalog) -> Vec<DayGroup> {
  let mut ordered: Vec<&WordEntry> = catalog
    .entries()
    .iter()
    .map(Arc::as_ref)
    .filter(|e| e.has_word())
    .collect();
  ordered.sort_by(|a, b| a.day.cmp(&b.day).then_with(|| compare_ids(&a.id, &b.id)));

  let mut groups: Vec<DayGroup> = Vec::new();
  for entry in ordered {
    match groups.last_mut() {
      Some(group) if group.day == entry.day => group.words.push(entry.word.clone()),
      _ => groups.push(DayGroup { day: entry.day, words: vec![entry.word.clone()] }),
    }
  }
  groups
}

pub fn day_lines(groups: &[DayGroup]) -> String {
  groups
    .iter()
    .map(|g| format!("Day-{:02}: {}", g.day, g.words.join(", ")))
    .collect::<Vec<_>>()
    .join("\n")
}

// ---------------- Highlighting ----------------

/// Highlight colour per day; days outside the palette reuse day 1's.
pub fn day_color(day: u32) -> &'static str {
  match day {
    1 => "#fef08a",
    2 => "#bbf7d0",
    3 => "#bfdbfe",
    4 => "#fecaca",
    5 => "#fde68a",
    6 => "#e9d5ff",
    _ => "#fef08a",
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Segment<'a> {
  pub text: &'a str,
  pub entry: Option<&'a WordEntry>,
}

/// Lower-cased word -> entry, with its whole-word pattern compiled once.
#[derive(Debug)]
pub struct HighlightIndex {
  words: HashMap<String, Arc<WordEntry>>,
  pattern: Option<Regex>,
}

impl HighlightIndex {
  pub fn new(words: HashMap<String, Arc<WordEntry>>) -> Self {
    let pattern = compile_pattern(words.keys());
    Self { words, pattern }
  }

  pub fn from_catalog(catalog: &VocabularyCatalog) -> Self {
    Self::new(catalog.word_index().clone())
  }

  pub fn len(&self) -> usize {
    self.words.len()
  }

  pub fn is_empty(&self) -> bool {
    self.words.is_empty()
  }

  pub fn get(&self, word: &str) -> Option<&WordEntry> {
    self.words.get(&word.to_lowercase()).map(Arc::as_ref)
  }

  /// Split `text` into plain and matched segments. Matches are whole words,
  /// case-insensitive; concatenating the segments reproduces `text`.
  pub fn highlight<'a>(&'a self, text: &'a str) -> Vec<Segment<'a>> {
    let mut out = Vec::new();
    let Some(pattern) = &self.pattern else {
      if !text.is_empty() {
        out.push(Segment { text, entry: None });
      }
      return out;
    };

    let mut cursor = 0;
    for m in pattern.find_iter(text) {
      let Some(entry) = self.get(m.as_str()) else { continue };
      if m.start() > cursor {
        out.push(Segment { text: &text[cursor..m.start()], entry: None });
      }
      out.push(Segment { text: m.as_str(), entry: Some(entry) });
      cursor = m.end();
    }
    if cursor < text.len() {
      out.push(Segment { text: &text[cursor..], entry: None });
    }
    out
  }
}

fn compile_pattern<'a>(keys: impl Iterator<Item = &'a String>) -> Option<Regex> {
  let mut keys: Vec<&String> = keys.filter(|k| !k.is_empty()).collect();
  if keys.is_empty() {
    return None;
  }
  // Longest first so multi-word entries win over their prefixes.
  keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
  let alternation = keys.iter().map(|k| regex::escape(k)).collect::<Vec<_>>().join("|");
  match RegexBuilder::new(&format!(r"\b(?:{alternation})\b"))
    .case_insensitive(true)
    .build()
  {
    Ok(re) => Some(re),
    Err(e) => {
      error!(target: "onestep", error = %e, words = keys.len(), "Failed to compile highlight pattern; highlighting disabled");
      None
    }
  }
}

/// Free-function form of `HighlightIndex::highlight`.
pub fn highlight<'a>(text: &'a str, index: &'a HighlightIndex) -> Vec<Segment<'a>> {
  index.highlight(text)
}

// ---------------- Result board ----------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParagraphStatus {
  /// Nothing requested yet.
  Idle,
  Pending,
  Ready(String),
  /// The catalog has no words to write about.
  Empty,
  Failed(GenerationError),
}

/// Identifies one generation in initiation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Ticket(u64);

#[derive(Debug)]
struct Slot {
  active: u64,
  status: ParagraphStatus,
}

/// Holds the one visible paragraph. Only the most recently initiated
/// generation may land; results of superseded tickets are dropped.
#[derive(Debug)]
pub struct ParagraphBoard {
  slot: RwLock<Slot>,
}

impl Default for ParagraphBoard {
  fn default() -> Self {
    Self { slot: RwLock::new(Slot { active: 0, status: ParagraphStatus::Idle }) }
  }
}

impl ParagraphBoard {
  pub async fn begin(&self) -> Ticket {
    let mut slot = self.slot.write().await;
    slot.active += 1;
    slot.status = ParagraphStatus::Pending;
    Ticket(slot.active)
  }

  /// Returns false (and drops the outcome) if `ticket` was superseded.
  pub async fn land(&self, ticket: Ticket, outcome: Result<String, GenerationError>) -> bool {
    let mut slot = self.slot.write().await;
    if ticket.0 != slot.active {
      debug!(target: "onestep", ticket = ticket.0, active = slot.active, "Dropping superseded paragraph result");
      return false;
    }
    slot.status = match outcome {
      Ok(text) if text.is_empty() => ParagraphStatus::Empty,
      Ok(text) => ParagraphStatus::Ready(text),
      Err(e) => ParagraphStatus::Failed(e),
    };
    true
  }

  pub async fn status(&self) -> ParagraphStatus {
    self.slot.read().await.status.clone()
  }
}

// ---------------- Generator ----------------

/// One remote call for `prompt`. An empty prompt yields empty text without calling out.
#[instrument(level = "info", skip_all, fields(days = prompt.day_groups.len()))]
pub async fn generate(generator: &dyn TextGenerator, prompt: &Prompt) -> Result<String, GenerationError> {
  if prompt.day_groups.is_empty() {
    warn!(target: "onestep", "No words to write about; skipping generation");
    return Ok(String::new());
  }
  generator.complete(&prompt.system, &prompt.user).await
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerateOutcome {
  /// False when a later generation was initiated before this one finished.
  pub landed: bool,
  pub status: ParagraphStatus,
}

pub struct ParagraphGenerator {
  catalog: Arc<VocabularyCatalog>,
  generator: Arc<dyn TextGenerator>,
  system_prompt: String,
  user_prompt_template: String,
  index: HighlightIndex,
  board: Arc<ParagraphBoard>,
}

impl ParagraphGenerator {
  pub fn new(catalog: Arc<VocabularyCatalog>, generator: Arc<dyn TextGenerator>, cfg: &GenerationCfg) -> Self {
    let index = HighlightIndex::from_catalog(&catalog);
    if index.is_empty() {
      warn!(target: "onestep", "No catalog words to highlight");
    }
    info!(target: "onestep", highlight_words = index.len(), "Paragraph generator ready");
    Self {
      catalog,
      generator,
      system_prompt: cfg.system_prompt.clone(),
      user_prompt_template: cfg.user_prompt_template.clone(),
      index,
      board: Arc::new(ParagraphBoard::default()),
    }
  }

  pub fn build_prompt(&self) -> Prompt {
    let day_groups = group_by_day(&self.catalog);
    let user = fill_template(&self.user_prompt_template, &[("day_lines", &day_lines(&day_groups))]);
    Prompt { system: self.system_prompt.clone(), user, day_groups }
  }

  /// Initiate a generation and land its result unless superseded meanwhile.
  ///
  /// The call and the landing run on their own task, so a caller that goes
  /// away mid-flight still leaves the board with a settled result.
  #[instrument(level = "info", skip(self))]
  pub async fn regenerate(&self) -> GenerateOutcome {
    let ticket = self.board.begin().await;
    let prompt = self.build_prompt();
    let generator = self.generator.clone();
    let board = self.board.clone();
    let task = tokio::spawn(
      async move {
        let outcome = generate(generator.as_ref(), &prompt).await;
        board.land(ticket, outcome).await
      }
      .in_current_span(),
    );

    let landed = match task.await {
      Ok(landed) => landed,
      Err(e) => {
        error!(target: "onestep", ticket = ticket.0, error = %e, "Paragraph generation task failed");
        let failure = GenerationError::Transport(format!("generation task failed: {}", e));
        self.board.land(ticket, Err(failure)).await
      }
    };
    info!(target: "onestep", ticket = ticket.0, landed, "Paragraph generation finished");
    GenerateOutcome { landed, status: self.board.status().await }
  }

  pub async fn status(&self) -> ParagraphStatus {
    self.board.status().await
  }

  pub fn index(&self) -> &HighlightIndex {
    &self.index
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use crate::catalog::tests::sample_catalog;
  use async_trait::async_trait;
  use std::collections::VecDeque;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;
  use tokio::sync::oneshot;

  fn entry(day: u32, id: &str, word: &str) -> WordEntry {
    WordEntry {
      day,
      id: id.into(),
      word: word.into(),
      part_of_speech: None,
      meaning: None,
      secondary_meaning: None,
      synonym: None,
      sentences: vec![],
      skill: None,
    }
  }

  /// Replies with fixed text for every call.
  pub(crate) struct CannedGenerator(pub(crate) Result<String, GenerationError>);

  #[async_trait]
  impl TextGenerator for CannedGenerator {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, GenerationError> {
      self.0.clone()
    }
  }

  /// Each call waits on the next scripted channel, so tests decide completion order.
  struct ScriptedGenerator {
    replies: Mutex<VecDeque<oneshot::Receiver<Result<String, GenerationError>>>>,
    calls: AtomicUsize,
  }

  #[async_trait]
  impl TextGenerator for ScriptedGenerator {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, GenerationError> {
      let rx = self.replies.lock().unwrap().pop_front().expect("scripted reply");
      self.calls.fetch_add(1, Ordering::SeqCst);
      rx.await.unwrap_or(Err(GenerationError::Transport("dropped".into())))
    }
  }

  #[test]
  fn prompt_groups_words_by_day_in_id_order() {
    let catalog = Arc::new(sample_catalog());
    let gen = ParagraphGenerator::new(catalog, Arc::new(CannedGenerator(Ok(String::new()))), &GenerationCfg::default());
    let prompt = gen.build_prompt();
    assert_eq!(
      prompt.day_groups,
      vec![
        DayGroup { day: 1, words: vec!["Run".into(), "Calm".into(), "Rapid".into()] },
        DayGroup { day: 2, words: vec!["Quietly".into()] },
      ]
    );
    assert!(prompt.user.ends_with("Words by day:\nDay-01: Run, Calm, Rapid\nDay-02: Quietly"));
    assert!(prompt.user.contains("exactly once"));
  }

  #[test]
  fn entries_without_word_are_left_out() {
    let catalog = VocabularyCatalog::from_entries(vec![entry(12, "1", "Alpha"), entry(12, "2", ""), entry(3, "9", "Beta")]);
    let groups = group_by_day(&catalog);
    assert_eq!(day_lines(&groups), "Day-03: Beta\nDay-12: Alpha");
    assert!(catalog.word_index().get("").is_none());
  }

  #[test]
  fn highlight_matches_whole_words_only() {
    let words = HashMap::from([("run".to_string(), Arc::new(entry(1, "1", "Run")))]);
    let index = HighlightIndex::new(words);
    let segments = highlight("He will run fast, rerun it", &index);
    let matched: Vec<_> = segments.iter().filter(|s| s.entry.is_some()).map(|s| s.text).collect();
    assert_eq!(matched, vec!["run"]);
    let rebuilt: String = segments.iter().map(|s| s.text).collect();
    assert_eq!(rebuilt, "He will run fast, rerun it");
  }

  #[test]
  fn highlight_is_case_insensitive_and_keeps_text_casing() {
    let catalog = sample_catalog();
    let index = HighlightIndex::from_catalog(&catalog);
    let segments = index.highlight("RUN calmly, stay Calm.");
    let matched: Vec<_> = segments
      .iter()
      .filter_map(|s| s.entry.map(|e| (s.text, e.word.as_str())))
      .collect();
    assert_eq!(matched, vec![("RUN", "Run"), ("Calm", "Calm")]);
  }

  #[test]
  fn highlight_prefers_longer_entries() {
    let words = HashMap::from([
      ("run".to_string(), Arc::new(entry(1, "1", "run"))),
      ("run out".to_string(), Arc::new(entry(2, "2", "run out"))),
    ]);
    let index = HighlightIndex::new(words);
    let segments = index.highlight("We run out of time");
    assert_eq!(segments[1].text, "run out");
    assert_eq!(segments[1].entry.map(|e| e.day), Some(2));
  }

  #[test]
  fn empty_index_passes_text_through() {
    let index = HighlightIndex::new(HashMap::new());
    assert_eq!(index.highlight("plain"), vec![Segment { text: "plain", entry: None }]);
    assert!(index.highlight("").is_empty());
  }

  #[test]
  fn palette_falls_back_to_day_one() {
    assert_eq!(day_color(3), "#bfdbfe");
    assert_eq!(day_color(7), day_color(1));
    assert_eq!(day_color(0), day_color(1));
  }

  #[tokio::test]
  async fn later_generation_wins_even_if_it_finishes_first() {
    let (tx_a, rx_a) = oneshot::channel();
    let (tx_b, rx_b) = oneshot::channel();
    let scripted = Arc::new(ScriptedGenerator {
      replies: Mutex::new(VecDeque::from([rx_a, rx_b])),
      calls: AtomicUsize::new(0),
    });
    let gen = Arc::new(ParagraphGenerator::new(
      Arc::new(sample_catalog()),
      scripted.clone(),
      &GenerationCfg::default(),
    ));

    let a = tokio::spawn({
      let gen = gen.clone();
      async move { gen.regenerate().await }
    });
    while scripted.calls.load(Ordering::SeqCst) < 1 {
      tokio::task::yield_now().await;
    }
    let b = tokio::spawn({
      let gen = gen.clone();
      async move { gen.regenerate().await }
    });
    while scripted.calls.load(Ordering::SeqCst) < 2 {
      tokio::task::yield_now().await;
    }

    tx_b.send(Ok("paragraph B".into())).unwrap();
    let b_out = b.await.unwrap();
    assert!(b_out.landed);

    tx_a.send(Ok("paragraph A".into())).unwrap();
    let a_out = a.await.unwrap();
    assert!(!a_out.landed);
    assert_eq!(gen.status().await, ParagraphStatus::Ready("paragraph B".into()));
  }

  #[tokio::test]
  async fn abandoned_request_still_lands_its_result() {
    let (tx, rx) = oneshot::channel();
    let scripted = Arc::new(ScriptedGenerator {
      replies: Mutex::new(VecDeque::from([rx])),
      calls: AtomicUsize::new(0),
    });
    let gen = Arc::new(ParagraphGenerator::new(
      Arc::new(sample_catalog()),
      scripted.clone(),
      &GenerationCfg::default(),
    ));

    let request = tokio::spawn({
      let gen = gen.clone();
      async move { gen.regenerate().await }
    });
    while scripted.calls.load(Ordering::SeqCst) < 1 {
      tokio::task::yield_now().await;
    }
    request.abort();
    assert!(request.await.unwrap_err().is_cancelled());
    assert_eq!(gen.status().await, ParagraphStatus::Pending);

    tx.send(Ok("late paragraph".into())).unwrap();
    for _ in 0..1_000 {
      if gen.status().await != ParagraphStatus::Pending {
        break;
      }
      tokio::task::yield_now().await;
    }
    assert_eq!(gen.status().await, ParagraphStatus::Ready("late paragraph".into()));
  }

  #[tokio::test]
  async fn failure_is_surfaced_and_recoverable() {
    let gen = ParagraphGenerator::new(
      Arc::new(sample_catalog()),
      Arc::new(CannedGenerator(Err(GenerationError::MissingText))),
      &GenerationCfg::default(),
    );
    let out = gen.regenerate().await;
    assert!(out.landed);
    assert_eq!(out.status, ParagraphStatus::Failed(GenerationError::MissingText));
  }

  #[tokio::test]
  async fn empty_catalog_short_circuits() {
    let gen = ParagraphGenerator::new(
      Arc::new(VocabularyCatalog::empty()),
      Arc::new(CannedGenerator(Err(GenerationError::Transport("must not be called".into())))),
      &GenerationCfg::default(),
    );
    assert_eq!(gen.status().await, ParagraphStatus::Idle);
    assert_eq!(gen.regenerate().await.status, ParagraphStatus::Empty);
  }

  #[tokio::test]
  async fn board_drops_stale_tickets() {
    let board = ParagraphBoard::default();
    let a = board.begin().await;
    let b = board.begin().await;
    assert!(a < b);
    assert!(board.land(b, Ok("B".into())).await);
    assert!(!board.land(a, Ok("A".into())).await);
    assert_eq!(board.status().await, ParagraphStatus::Ready("B".into()));
  }
}
