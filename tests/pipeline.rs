// End-to-end pipeline tests over synthetic rendered sheets.

mod common;

use common::{flat_page, Mark, SheetBuilder};
use std::sync::OnceLock;
use truad_dee_na::score::ResponseStatus;
use truad_dee_na::{decode_sheet, AnswerKey, OmrError, SheetReport};

fn key(letters: &str) -> AnswerKey {
    AnswerKey::parse(letters, 5).unwrap()
}

fn abcde_key(n: usize) -> AnswerKey {
    let letters: String = (0..n).map(|i| (b'A' + (i % 5) as u8) as char).collect();
    key(&letters)
}

/// Pristine 20-question sheet where every marked answer matches ABCDE
/// repeated; shared across tests that only read it.
fn perfect_sheet() -> &'static Vec<u8> {
    static SHEET: OnceLock<Vec<u8>> = OnceLock::new();
    SHEET.get_or_init(|| {
        SheetBuilder::new(20)
            .mark_all(|q| Mark::Fill(q % 5))
            .png()
    })
}

fn assert_count_invariants(report: &SheetReport) {
    assert_eq!(
        report.correct_answers
            + report.incorrect_answers
            + report.blank_answers
            + report.multiple_marks
            + report.partial_marks,
        report.total_questions
    );
    assert_eq!(report.attempted + report.blank_answers, report.total_questions);
    assert_eq!(report.invalid_answers, report.multiple_marks + report.partial_marks);
    assert_eq!(report.responses.len(), report.total_questions);
    assert_eq!(report.detailed_responses.len(), report.total_questions);
    for (i, detail) in report.detailed_responses.iter().enumerate() {
        assert_eq!(detail.question, i + 1);
        assert_eq!(detail.is_correct, detail.status == ResponseStatus::Correct);
        if let Some(letter) = detail.marked {
            assert!(('A'..='E').contains(&letter));
        }
        assert_eq!(detail.marked, report.responses[i]);
    }
}

#[test]
fn pristine_sheet_scores_every_question() {
    let report = decode_sheet(perfect_sheet(), &abcde_key(20), "STUDENT_001").unwrap();

    assert_count_invariants(&report);
    assert_eq!(report.score, 20);
    assert_eq!(report.correct_answers, 20);
    assert_eq!(report.attempted, 20);
    assert_eq!(report.accuracy, 100.0);
    assert_eq!(report.processing_metadata.confidence, 85.0);
    assert!(report.processing_metadata.confidence <= 95.0);
    assert!(report.detailed_responses.iter().all(|r| r.is_correct));
    assert_eq!(report.student_id, "STUDENT_001");
}

#[test]
fn wrong_marks_score_zero_but_count_as_attempted() {
    let sheet = SheetBuilder::new(20).mark_all(|_| Mark::Fill(1)).png();
    let report = decode_sheet(&sheet, &key(&"A".repeat(20)), "STUDENT_002").unwrap();

    assert_count_invariants(&report);
    assert_eq!(report.score, 0);
    assert_eq!(report.incorrect_answers, 20);
    assert_eq!(report.blank_answers, 0);
    assert_eq!(report.attempted, 20);
    assert_eq!(report.accuracy, 0.0);
    assert!(report.responses.iter().all(|r| *r == Some('B')));
}

#[test]
fn unmarked_sheet_is_all_blank() {
    let sheet = SheetBuilder::new(20).png();
    let report = decode_sheet(&sheet, &key(&"A".repeat(20)), "STUDENT_003").unwrap();

    assert_count_invariants(&report);
    assert_eq!(report.score, 0);
    assert_eq!(report.blank_answers, 20);
    assert_eq!(report.attempted, 0);
    assert_eq!(report.accuracy, 0.0);
    assert!(report.responses.iter().all(|r| r.is_none()));
    assert!(report
        .detailed_responses
        .iter()
        .all(|r| r.status == ResponseStatus::Blank));
}

#[test]
fn double_marks_are_counted_as_multiple() {
    let sheet = SheetBuilder::new(20)
        .mark_all(|q| if q < 10 { Mark::Double(0, 1) } else { Mark::None })
        .png();
    let report = decode_sheet(&sheet, &key(&"A".repeat(20)), "STUDENT_004").unwrap();

    assert_count_invariants(&report);
    assert_eq!(report.multiple_marks, 10);
    assert_eq!(report.invalid_answers, 10);
    assert_eq!(report.blank_answers, 10);
    assert_eq!(report.attempted, 10);
    assert_eq!(report.score, 0);
    for detail in &report.detailed_responses[..10] {
        assert_eq!(detail.status, ResponseStatus::Multiple);
    }
    for detail in &report.detailed_responses[10..] {
        assert_eq!(detail.status, ResponseStatus::Blank);
    }
}

/// A lone hesitant (partial) mark resolves to its choice and is scored like
/// a full fill; the partial counter is reserved for conflicting partials.
#[test]
fn lone_partial_marks_resolve_to_their_choice() {
    let sheet = SheetBuilder::new(20)
        .mark_all(|q| if q < 5 { Mark::Half(2) } else { Mark::None })
        .png();
    let report = decode_sheet(&sheet, &key(&"C".repeat(20)), "STUDENT_005").unwrap();

    assert_count_invariants(&report);
    assert_eq!(report.score, 5);
    assert_eq!(report.attempted, 5);
    assert_eq!(report.partial_marks, 0);
    assert_eq!(report.invalid_answers, 0);
    for detail in &report.detailed_responses[..5] {
        assert_eq!(detail.status, ResponseStatus::Correct);
        assert_eq!(detail.marked, Some('C'));
        assert!(detail.is_correct);
    }
    for detail in &report.detailed_responses[5..] {
        assert_eq!(detail.status, ResponseStatus::Blank);
    }
}

#[test]
fn conflicting_partial_marks_are_ambiguous() {
    let sheet = SheetBuilder::new(20)
        .mark(0, Mark::DoubleHalf(0, 3))
        .png();
    let report = decode_sheet(&sheet, &key(&"A".repeat(20)), "STUDENT_006").unwrap();

    assert_count_invariants(&report);
    assert_eq!(report.partial_marks, 1);
    assert_eq!(report.invalid_answers, 1);
    assert_eq!(report.attempted, 1);
    assert_eq!(report.score, 0);
    assert_eq!(report.detailed_responses[0].status, ResponseStatus::Partial);
    assert_eq!(report.detailed_responses[0].marked, None);
}

#[test]
fn missing_question_row_comes_back_blank() {
    let sheet = SheetBuilder::new(40)
        .mark_all(|q| Mark::Fill(q % 5))
        .omit_question(29)
        .png();
    let report = decode_sheet(&sheet, &abcde_key(40), "STUDENT_007").unwrap();

    assert_count_invariants(&report);
    assert_eq!(report.total_questions, 40);
    assert_eq!(report.score, 39);
    assert_eq!(report.blank_answers, 1);
    assert_eq!(report.detailed_responses[29].status, ResponseStatus::Blank);
    assert_eq!(report.responses[29], None);
}

#[test]
fn single_question_sheet_decodes() {
    let sheet = SheetBuilder::new(1).mark(0, Mark::Fill(0)).png();
    let report = decode_sheet(&sheet, &key("A"), "STUDENT_008").unwrap();

    assert_count_invariants(&report);
    assert_eq!(report.total_questions, 1);
    assert_eq!(report.score, 1);
    assert_eq!(report.responses, vec![Some('A')]);
}

#[test]
fn decoding_is_deterministic() {
    let first = decode_sheet(perfect_sheet(), &abcde_key(20), "STUDENT_001").unwrap();
    let second = decode_sheet(perfect_sheet(), &abcde_key(20), "STUDENT_001").unwrap();
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn permuting_the_key_never_changes_the_marks() {
    let with_original = decode_sheet(perfect_sheet(), &abcde_key(20), "S").unwrap();
    let permuted: String = (0..20).map(|i| (b'A' + ((i + 2) % 5) as u8) as char).collect();
    let with_permuted = decode_sheet(perfect_sheet(), &key(&permuted), "S").unwrap();

    assert_eq!(with_original.responses, with_permuted.responses);
    assert_eq!(with_original.attempted, with_permuted.attempted);
    assert_ne!(with_original.score, with_permuted.score);
}

#[test]
fn report_serializes_with_the_exposed_field_names() {
    let report = decode_sheet(perfect_sheet(), &abcde_key(20), "STUDENT_001").unwrap();
    let json: serde_json::Value = serde_json::from_str(&serde_json::to_string(&report).unwrap()).unwrap();

    for field in [
        "score",
        "total_questions",
        "attempted",
        "correct_answers",
        "incorrect_answers",
        "blank_answers",
        "multiple_marks",
        "partial_marks",
        "invalid_answers",
        "accuracy",
        "responses",
        "detailed_responses",
        "processing_metadata",
        "student_id",
    ] {
        assert!(json.get(field).is_some(), "missing field {field}");
    }
    assert_eq!(json["processing_metadata"]["image_quality"], "good");
    assert_eq!(json["processing_metadata"]["bubbles_detected"], true);
    assert_eq!(json["detailed_responses"][0]["status"], "correct");
}

#[test]
fn blank_page_has_no_bubbles() {
    let result = decode_sheet(&flat_page(400, 300, 255), &key(&"A".repeat(20)), "S");
    assert!(matches!(result, Err(OmrError::NoBubblesDetected)));
}

#[test]
fn black_page_never_scores() {
    match decode_sheet(&flat_page(400, 300, 0), &key(&"A".repeat(20)), "S") {
        Err(OmrError::NoBubblesDetected) | Err(OmrError::NoRowsDetected) => {}
        Ok(report) => {
            assert_eq!(report.correct_answers, 0);
        }
        Err(other) => panic!("unexpected error: {other}"),
    }
}

#[test]
fn garbage_bytes_are_an_invalid_image() {
    let result = decode_sheet(b"definitely not a png", &key("ABC"), "S");
    assert!(matches!(result, Err(OmrError::InvalidImage(_))));
}
