// group.rs - 🚀 Blazingly Fast Bubble Grouping with Memory Safety 🚀
//
// Turns a flat bag of bubble contours into the question lattice: columns of
// question rows, each row holding the answer choices left to right.

use tracing::{info, warn};

use crate::config::DetectionConfig;
use crate::detect::Candidate;

/// One question row. `bubbles` is ordered by x and holds at most
/// `num_choices` entries; missing bubbles are simply absent.
#[derive(Debug)]
pub struct Row {
    pub center_y: f64,
    pub bubbles: Vec<Candidate>,
    pub column_index: usize,
}

/// Running cluster used during column assignment.
struct Column {
    center_x: f64,
    bubbles: Vec<Candidate>,
}

/// Group candidates into exactly `num_questions` rows ordered by
/// `(column_index, center_y)`.
///
/// Clustering is tolerance-based with running-mean centers; the row
/// tolerance widens slightly as rows accumulate to absorb vertical drift
/// down the page. Columns beyond the expected count are dropped by
/// population, under-populated columns are padded with placeholder rows so
/// the row count always matches the question count.
pub fn group_bubbles(
    candidates: Vec<Candidate>,
    num_questions: usize,
    config: &DetectionConfig,
) -> Vec<Row> {
    info!("Grouping bubbles for {} questions", num_questions);
    if candidates.is_empty() || num_questions == 0 {
        return Vec::new();
    }

    let num_columns = config.sheet.num_columns;
    let num_choices = config.sheet.num_choices;
    let questions_per_column = (num_questions + num_columns - 1) / num_columns;
    info!("Expected {} questions per column", questions_per_column);

    let columns = cluster_columns(candidates, num_columns, config.grouping.column_tolerance);
    info!(
        "Found {} columns with bubbles: {:?}",
        columns.len(),
        columns.iter().map(|c| c.bubbles.len()).collect::<Vec<_>>()
    );

    let mut all_rows = Vec::new();
    let mut columns = columns.into_iter();
    for column_index in 0..num_columns {
        // Budget for this column slot; the tail slots absorb the remainder
        // and the sum over all slots is always num_questions.
        let assigned = num_questions.saturating_sub(column_index * questions_per_column);
        let target_rows = questions_per_column.min(assigned);

        let bubbles = columns.next().map(|c| c.bubbles).unwrap_or_default();
        info!(
            "Processing column {} with {} bubbles",
            column_index + 1,
            bubbles.len()
        );

        let mut rows = cluster_rows(
            bubbles,
            column_index,
            questions_per_column,
            config.grouping.row_tolerance,
        );
        apply_row_budget(&mut rows, target_rows, column_index);
        normalize_rows(&mut rows, num_choices, column_index, config.grouping.overlap_fraction);
        all_rows.extend(rows);
    }

    all_rows.sort_by(|a, b| {
        a.column_index
            .cmp(&b.column_index)
            .then(a.center_y.total_cmp(&b.center_y))
    });
    info!("Total rows found: {}", all_rows.len());
    all_rows
}

/// Phase 1: cluster candidates into vertical columns by x position, keep
/// the most-populated clusters, order them left to right.
fn cluster_columns(
    mut candidates: Vec<Candidate>,
    num_columns: usize,
    tolerance: f64,
) -> Vec<Column> {
    candidates.sort_by_key(|c| c.bbox.x);

    let mut columns: Vec<Column> = Vec::new();
    for candidate in candidates {
        let center_x = candidate.center_x() as f64;

        let mut best_match = None;
        let mut min_distance = f64::INFINITY;
        for (i, column) in columns.iter().enumerate() {
            let distance = (center_x - column.center_x).abs();
            if distance < tolerance && distance < min_distance {
                min_distance = distance;
                best_match = Some(i);
            }
        }

        match best_match {
            Some(i) => {
                let column = &mut columns[i];
                column.bubbles.push(candidate);
                column.center_x = mean(column.bubbles.iter().map(|b| b.center_x() as f64));
            }
            None => columns.push(Column {
                center_x,
                bubbles: vec![candidate],
            }),
        }
    }

    columns.sort_by(|a, b| b.bubbles.len().cmp(&a.bubbles.len()));
    columns.truncate(num_columns);
    columns.sort_by(|a, b| a.center_x.total_cmp(&b.center_x));
    columns
}

/// Phase 2: cluster one column's bubbles into rows by y position. The
/// tolerance grows as rows accumulate, tracking slight vertical drift.
fn cluster_rows(
    mut bubbles: Vec<Candidate>,
    column_index: usize,
    questions_per_column: usize,
    row_tolerance: f64,
) -> Vec<Row> {
    bubbles.sort_by_key(|b| b.bbox.y);

    let mut rows: Vec<Row> = Vec::new();
    for bubble in bubbles {
        let center_y = bubble.center_y() as f64;
        let adaptive_tolerance =
            row_tolerance * (1.0 + 0.1 * rows.len() as f64 / questions_per_column as f64);

        let mut best_row = None;
        let mut min_distance = f64::INFINITY;
        for (i, row) in rows.iter().enumerate() {
            let distance = (center_y - row.center_y).abs();
            if distance < adaptive_tolerance && distance < min_distance {
                min_distance = distance;
                best_row = Some(i);
            }
        }

        match best_row {
            Some(i) => {
                let row = &mut rows[i];
                row.bubbles.push(bubble);
                row.center_y = mean(row.bubbles.iter().map(|b| b.center_y() as f64));
            }
            None => rows.push(Row {
                center_y,
                bubbles: vec![bubble],
                column_index,
            }),
        }
    }

    rows.sort_by(|a, b| a.center_y.total_cmp(&b.center_y));
    rows
}

/// Phase 3: force the row count to the column's budget. Overflow keeps the
/// most-populated rows; shortfall appends placeholder rows spaced by the
/// observed inter-row gap.
fn apply_row_budget(rows: &mut Vec<Row>, target_rows: usize, column_index: usize) {
    if rows.len() > target_rows {
        warn!(
            "Column {} has {} rows, trimming to {}",
            column_index + 1,
            rows.len(),
            target_rows
        );
        rows.sort_by(|a, b| b.bubbles.len().cmp(&a.bubbles.len()));
        rows.truncate(target_rows);
        rows.sort_by(|a, b| a.center_y.total_cmp(&b.center_y));
    }

    while rows.len() < target_rows {
        let estimated_y = match rows.last() {
            Some(last) => {
                let gap = if rows.len() > 1 {
                    (last.center_y - rows[0].center_y) / (rows.len() - 1) as f64
                } else {
                    30.0
                };
                last.center_y + gap
            }
            None => 100.0,
        };
        warn!(
            "Added placeholder for missing row in column {}",
            column_index + 1
        );
        rows.push(Row {
            center_y: estimated_y,
            bubbles: Vec::new(),
            column_index,
        });
    }
}

/// Phase 4: order each row's bubbles by x and drop overlapping duplicates
/// when the row holds more bubbles than there are choices.
fn normalize_rows(
    rows: &mut [Row],
    num_choices: usize,
    column_index: usize,
    overlap_fraction: f64,
) {
    for (row_index, row) in rows.iter_mut().enumerate() {
        row.bubbles.sort_by_key(|b| b.bbox.x);
        if row.bubbles.len() != num_choices {
            warn!(
                "Column {}, Row {} has {} bubbles, expected {}",
                column_index + 1,
                row_index + 1,
                row.bubbles.len(),
                num_choices
            );
            if row.bubbles.len() > num_choices {
                filter_overlapping_bubbles(&mut row.bubbles, num_choices, overlap_fraction);
            }
        }
    }
}

/// Greedy duplicate suppression: score every bubble by how circular and
/// square it is, then keep the best-scoring non-overlapping ones.
fn filter_overlapping_bubbles(bubbles: &mut Vec<Candidate>, num_choices: usize, overlap_fraction: f64) {
    if bubbles.len() <= num_choices {
        return;
    }

    let mut scored: Vec<(Candidate, f64)> = bubbles
        .drain(..)
        .map(|bubble| {
            let score = if bubble.perimeter > 0.0 {
                bubble.circularity() * (1.0 / ((bubble.aspect_ratio() - 1.0).abs() + 0.1))
            } else {
                0.0
            };
            (bubble, score)
        })
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut filtered: Vec<Candidate> = Vec::with_capacity(num_choices);
    for (bubble, _) in scored {
        if filtered.len() >= num_choices {
            break;
        }
        let smaller = |other: &Candidate| bubble.bbox.area().min(other.bbox.area());
        let overlapping = filtered.iter().any(|picked| {
            bubble.bbox.overlap_area(&picked.bbox) as f64 > overlap_fraction * smaller(picked) as f64
        });
        if !overlapping {
            filtered.push(bubble);
        }
    }

    filtered.sort_by_key(|b| b.bbox.x);
    *bubbles = filtered;
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}
