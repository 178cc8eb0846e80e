//! Public protocol structs for the HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{PartOfSpeech, WordEntry};
use crate::paragraph::{day_color, ParagraphStatus, Segment};
use crate::session::{
    RevealStep, ScoreSummary, SessionState, StudyMode, StudySession, WordResult,
};

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

//
// Catalog
//

#[derive(Debug, Serialize)]
pub struct DayOut {
    pub day: u32,
    pub skill: Option<String>,
    pub empty: bool,
    pub entries: Vec<WordEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PartOfSpeechOut {
    pub value: PartOfSpeech,
    pub label: &'static str,
}

pub fn parts_of_speech_out() -> Vec<PartOfSpeechOut> {
    PartOfSpeech::ALL
        .iter()
        .map(|p| PartOfSpeechOut { value: *p, label: p.label() })
        .collect()
}

//
// Study sessions
//

#[derive(Debug, Deserialize)]
pub struct StartSessionIn {
    pub day: u32,
    pub mode: StudyMode,
}

/// What the card shows for the current word. Hidden fields are omitted.
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CardOut {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub word: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_of_speech: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meaning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_meaning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synonym: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sentences: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionOut {
    pub id: Uuid,
    pub day: u32,
    pub mode: StudyMode,
    pub skill: Option<String>,
    pub index: usize,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reveal_step: Option<u8>,
    pub card: CardOut,
    pub is_prev_disabled: bool,
    pub is_next_disabled: bool,
    pub can_check: bool,
    pub checked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guess: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_of_speech: Option<PartOfSpeech>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<WordResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ScoreSummary>,
}

fn learn_card(entry: &WordEntry, reveal: RevealStep) -> CardOut {
    let mut card = CardOut { word: Some(entry.word.clone()), ..CardOut::default() };
    if reveal >= RevealStep::Image {
        card.image = Some(entry.image_key());
    }
    if reveal >= RevealStep::Details {
        card.part_of_speech = entry.part_of_speech.clone();
        card.meaning = entry.meaning.clone();
        card.secondary_meaning = entry.secondary_meaning.clone();
        card.synonym = entry.synonym.clone();
        card.sentences = entry.sentences.clone();
    }
    card
}

/// Before checking the learner sees the clues; after checking, the answer too.
fn answer_card(entry: &WordEntry, checked: bool) -> CardOut {
    let mut card = CardOut {
        image: Some(entry.image_key()),
        meaning: entry.meaning.clone(),
        secondary_meaning: entry.secondary_meaning.clone(),
        ..CardOut::default()
    };
    if checked {
        card.word = Some(entry.word.clone());
        card.part_of_speech = entry.part_of_speech.clone();
        card.synonym = entry.synonym.clone();
        card.sentences = entry.sentences.clone();
    }
    card
}

/// Convert a session (internal) to the public DTO.
pub fn session_out(id: Uuid, s: &StudySession) -> SessionOut {
    let entry = s.current_entry();
    let base = SessionOut {
        id,
        day: s.day(),
        mode: s.mode(),
        skill: s.skill().map(str::to_string),
        index: s.current_index(),
        total: s.word_count(),
        reveal_step: None,
        card: CardOut::default(),
        is_prev_disabled: s.is_prev_disabled(),
        is_next_disabled: s.is_next_disabled(),
        can_check: false,
        checked: false,
        guess: None,
        part_of_speech: None,
        result: None,
        summary: s.summary(),
    };

    match s.state() {
        SessionState::Learn(learn) => SessionOut {
            reveal_step: Some(learn.reveal.index()),
            card: learn_card(entry, learn.reveal),
            ..base
        },
        SessionState::Answer(answer) => SessionOut {
            card: answer_card(entry, answer.checked),
            can_check: answer.can_check(),
            checked: answer.checked,
            guess: Some(answer.guess.clone()),
            part_of_speech: answer.part_of_speech,
            result: answer.current_result(),
            ..base
        },
    }
}

//
// Paragraph
//

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SegmentOut {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry: Option<WordEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<&'static str>,
}

impl From<&Segment<'_>> for SegmentOut {
    fn from(s: &Segment<'_>) -> Self {
        SegmentOut {
            text: s.text.to_string(),
            entry: s.entry.cloned(),
            color: s.entry.map(|e| day_color(e.day)),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagraphOut {
    /// idle | pending | ready | empty | failed
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// User-facing notice: progress, empty state or the failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub segments: Vec<SegmentOut>,
    pub superseded: bool,
}

pub fn paragraph_out(status: &ParagraphStatus, segments: Vec<SegmentOut>, superseded: bool) -> ParagraphOut {
    let (label, text, message) = match status {
        ParagraphStatus::Idle => ("idle", None, None),
        ParagraphStatus::Pending => ("pending", None, Some("Generating paragraph...".to_string())),
        ParagraphStatus::Ready(text) => ("ready", Some(text.clone()), None),
        ParagraphStatus::Empty => ("empty", None, Some("No words found.".to_string())),
        ParagraphStatus::Failed(e) => ("failed", None, Some(e.to_string())),
    };
    ParagraphOut { status: label, text, message, segments, superseded }
}
