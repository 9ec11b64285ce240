// resolve.rs - 🚀 Blazingly Fast Mark Resolution 🚀

use image::GrayImage;
use tracing::{debug, info, warn};

use crate::config::DetectionConfig;
use crate::fill::{analyze_fill, BubbleState};
use crate::group::Row;

/// What a question row resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// Exactly one confident mark at this choice index.
    Choice(usize),
    /// No mark at all.
    Blank,
    /// Two or more full fills.
    Multiple,
    /// Two or more partial fills and no full fill.
    AmbiguousPartial,
}

/// Resolve one row of `(state, fill_ratio)` classifications to an outcome.
///
/// Rows shorter than the choice count are treated as if the missing
/// positions were blank. A lone partial fill counts as the candidate's
/// pick; conflicting partial fills are ambiguous.
pub fn resolve_row(states: &[(BubbleState, f64)], num_choices: usize) -> MarkOutcome {
    let filled: Vec<usize> = states
        .iter()
        .take(num_choices)
        .enumerate()
        .filter(|(_, (s, _))| *s == BubbleState::Filled)
        .map(|(i, _)| i)
        .collect();
    let partial: Vec<usize> = states
        .iter()
        .take(num_choices)
        .enumerate()
        .filter(|(_, (s, _))| *s == BubbleState::Partial)
        .map(|(i, _)| i)
        .collect();

    match (filled.as_slice(), partial.as_slice()) {
        ([only], _) => MarkOutcome::Choice(*only),
        ([_, _, ..], _) => MarkOutcome::Multiple,
        ([], [only]) => MarkOutcome::Choice(*only),
        ([], [_, _, ..]) => MarkOutcome::AmbiguousPartial,
        ([], []) => MarkOutcome::Blank,
    }
}

/// Classify every bubble in every row and resolve each question.
/// Always returns exactly `num_questions` outcomes.
pub fn detect_marked_bubbles(
    gray: &GrayImage,
    rows: &[Row],
    num_questions: usize,
    config: &DetectionConfig,
) -> Vec<MarkOutcome> {
    info!("Detecting marked bubbles for {} questions", num_questions);
    let num_choices = config.sheet.num_choices;
    let mut outcomes = Vec::with_capacity(num_questions);

    for (i, row) in rows.iter().take(num_questions).enumerate() {
        let question = i + 1;
        if row.bubbles.is_empty() {
            warn!("Question {}: No bubbles found", question);
            outcomes.push(MarkOutcome::Blank);
            continue;
        }

        let states: Vec<(BubbleState, f64)> = row
            .bubbles
            .iter()
            .take(num_choices)
            .enumerate()
            .map(|(j, bubble)| {
                let (state, ratio) = analyze_fill(gray, bubble, &config.fill);
                debug!(
                    "Q{} {}: {:?} (ratio: {:.3})",
                    question,
                    choice_letter(j),
                    state,
                    ratio
                );
                (state, ratio)
            })
            .collect();

        let outcome = resolve_row(&states, num_choices);
        match outcome {
            MarkOutcome::Choice(index) => {
                info!("Q{}: Answer {}", question, choice_letter(index))
            }
            MarkOutcome::Multiple => info!("Q{}: Multiple answers marked - Invalid", question),
            MarkOutcome::AmbiguousPartial => {
                info!("Q{}: Multiple partial fills - Invalid", question)
            }
            MarkOutcome::Blank => info!("Q{}: No marks detected - Blank", question),
        }
        outcomes.push(outcome);
    }

    while outcomes.len() < num_questions {
        outcomes.push(MarkOutcome::Blank);
    }
    outcomes
}

/// 'A' for index 0, 'B' for 1, and so on.
pub fn choice_letter(index: usize) -> char {
    (b'A' + index as u8) as char
}
