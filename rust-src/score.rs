// score.rs - 🚀 Blazingly Fast Answer Scoring with Memory Safety 🚀

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::resolve::{choice_letter, MarkOutcome};

/// Reported image quality; deeper quality grading is a collaborator concern.
const IMAGE_QUALITY: &str = "good";

/// Validated answer key: one correct choice index per question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerKey(Vec<usize>);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnswerKeyError {
    #[error("answer key is empty")]
    Empty,
    #[error("answer key letter {0:?} is outside A..{1}")]
    InvalidLetter(char, char),
}

impl AnswerKey {
    /// Parse a run of uppercase letters such as `"ABCDE"`, one per question.
    pub fn parse(letters: &str, num_choices: usize) -> Result<Self, AnswerKeyError> {
        let choices: Result<Vec<usize>, AnswerKeyError> = letters
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| Self::index_of(c, num_choices))
            .collect();
        let choices = choices?;
        if choices.is_empty() {
            return Err(AnswerKeyError::Empty);
        }
        Ok(Self(choices))
    }

    /// Build from individual letters, e.g. loaded from a key file.
    pub fn from_letters<I: IntoIterator<Item = char>>(
        letters: I,
        num_choices: usize,
    ) -> Result<Self, AnswerKeyError> {
        let choices: Result<Vec<usize>, AnswerKeyError> = letters
            .into_iter()
            .map(|c| Self::index_of(c, num_choices))
            .collect();
        let choices = choices?;
        if choices.is_empty() {
            return Err(AnswerKeyError::Empty);
        }
        Ok(Self(choices))
    }

    fn index_of(letter: char, num_choices: usize) -> Result<usize, AnswerKeyError> {
        let last = choice_letter(num_choices.saturating_sub(1));
        if !letter.is_ascii_uppercase() || letter > last {
            return Err(AnswerKeyError::InvalidLetter(letter, last));
        }
        Ok((letter as u8 - b'A') as usize)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn correct_index(&self, question: usize) -> usize {
        self.0[question]
    }

    pub fn correct_letter(&self, question: usize) -> char {
        choice_letter(self.0[question])
    }
}

/// Per-question verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Correct,
    Wrong,
    Blank,
    Multiple,
    Partial,
    Invalid,
}

/// One scored question as exposed to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionResponse {
    pub question: usize,
    pub marked: Option<char>,
    pub correct: char,
    pub is_correct: bool,
    pub status: ResponseStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    pub confidence: f64,
    pub bubbles_detected: bool,
    pub image_quality: String,
}

/// Aggregate report for one decoded sheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetReport {
    pub student_id: String,
    pub score: usize,
    pub total_questions: usize,
    pub attempted: usize,
    pub correct_answers: usize,
    pub incorrect_answers: usize,
    pub blank_answers: usize,
    pub multiple_marks: usize,
    pub partial_marks: usize,
    pub invalid_answers: usize,
    pub accuracy: f64,
    pub responses: Vec<Option<char>>,
    pub detailed_responses: Vec<QuestionResponse>,
    pub processing_metadata: ProcessingMetadata,
}

/// Score resolved marks against the answer key.
///
/// `invalid_answers` counts questions thrown out for conflicting marks
/// (multiple fills or ambiguous partials); both count as attempted.
pub fn score_answers(outcomes: &[MarkOutcome], key: &AnswerKey, student_id: &str) -> SheetReport {
    let num_questions = key.len();
    info!("Scoring {} answers against answer key", num_questions);

    let mut score = 0;
    let mut attempted = 0;
    let mut multiple_marks = 0;
    let mut partial_marks = 0;
    let mut wrong_answers = 0;
    let mut blank_answers = 0;

    let mut detailed_responses = Vec::with_capacity(num_questions);
    for i in 0..num_questions {
        let outcome = outcomes.get(i).copied().unwrap_or(MarkOutcome::Blank);
        let correct_index = key.correct_index(i);

        let (marked, is_correct, status) = match outcome {
            MarkOutcome::Choice(index) if index == correct_index => {
                score += 1;
                attempted += 1;
                (Some(choice_letter(index)), true, ResponseStatus::Correct)
            }
            MarkOutcome::Choice(index) => {
                wrong_answers += 1;
                attempted += 1;
                (Some(choice_letter(index)), false, ResponseStatus::Wrong)
            }
            MarkOutcome::Multiple => {
                multiple_marks += 1;
                attempted += 1;
                (None, false, ResponseStatus::Multiple)
            }
            MarkOutcome::AmbiguousPartial => {
                partial_marks += 1;
                attempted += 1;
                (None, false, ResponseStatus::Partial)
            }
            MarkOutcome::Blank => {
                blank_answers += 1;
                (None, false, ResponseStatus::Blank)
            }
        };

        detailed_responses.push(QuestionResponse {
            question: i + 1,
            marked,
            correct: key.correct_letter(i),
            is_correct,
            status,
        });
    }

    let invalid_answers = multiple_marks + partial_marks;
    let accuracy = if attempted > 0 {
        score as f64 / attempted as f64 * 100.0
    } else {
        0.0
    };
    let confidence = confidence_heuristic(accuracy, multiple_marks, partial_marks, num_questions);

    info!(
        "Scoring complete: {}/{} ({:.1}%)",
        score, num_questions, accuracy
    );

    SheetReport {
        student_id: student_id.to_string(),
        score,
        total_questions: num_questions,
        attempted,
        correct_answers: score,
        incorrect_answers: wrong_answers,
        blank_answers,
        multiple_marks,
        partial_marks,
        invalid_answers,
        accuracy,
        responses: detailed_responses.iter().map(|r| r.marked).collect(),
        detailed_responses,
        processing_metadata: ProcessingMetadata {
            confidence,
            bubbles_detected: true,
            image_quality: IMAGE_QUALITY.to_string(),
        },
    }
}

/// Accuracy-anchored confidence, penalized by the share of thrown-out
/// questions and floored at 30.
fn confidence_heuristic(
    accuracy: f64,
    multiple_marks: usize,
    partial_marks: usize,
    num_questions: usize,
) -> f64 {
    let base = (70.0 + (accuracy - 50.0) * 0.3).clamp(50.0, 95.0);
    let invalid_penalty = (multiple_marks + partial_marks) as f64 / num_questions as f64 * 20.0;
    (base - invalid_penalty).max(30.0)
}
