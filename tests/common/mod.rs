// Synthetic answer-sheet rendering for end-to-end pipeline tests.
//
// Sheets follow the physical layout the decoder expects: four columns of
// question rows in the lower 60% of the page, five printed bubble outlines
// per question, marks drawn over the outlines the way a candidate would.

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut};
use std::io::Cursor;

pub const SHEET_W: u32 = 1280;
pub const SHEET_H: u32 = 1100;

const COLUMN_BASE_X: i32 = 150;
const COLUMN_PITCH: i32 = 300;
const CHOICE_PITCH: i32 = 45;
const ROW_BASE_Y: i32 = 470;
const ROW_PITCH: i32 = 58;
const OUTLINE_RADIUS: i32 = 13;
const MARK_RADIUS: i32 = 14;
const NUM_COLUMNS: usize = 4;
const NUM_CHOICES: usize = 5;

const PAPER: Rgb<u8> = Rgb([255, 255, 255]);
const OUTLINE: Rgb<u8> = Rgb([140, 140, 140]);
const INK: Rgb<u8> = Rgb([0, 0, 0]);

/// How a candidate marked one question.
#[derive(Debug, Clone, Copy)]
pub enum Mark {
    None,
    /// Solid fill over the given choice.
    Fill(usize),
    /// Half-filled bubble (light, hesitant mark).
    Half(usize),
    /// Two solid fills.
    Double(usize, usize),
    /// Two half-filled bubbles in the same row.
    DoubleHalf(usize, usize),
}

pub struct SheetBuilder {
    num_questions: usize,
    marks: Vec<Mark>,
    omitted: Vec<usize>,
}

impl SheetBuilder {
    pub fn new(num_questions: usize) -> Self {
        Self {
            num_questions,
            marks: vec![Mark::None; num_questions],
            omitted: Vec::new(),
        }
    }

    pub fn mark(mut self, question: usize, mark: Mark) -> Self {
        self.marks[question] = mark;
        self
    }

    pub fn mark_all(mut self, f: impl Fn(usize) -> Mark) -> Self {
        for q in 0..self.num_questions {
            self.marks[q] = f(q);
        }
        self
    }

    /// Leave this question's printed outlines off the sheet entirely,
    /// simulating a print defect or damaged row.
    pub fn omit_question(mut self, question: usize) -> Self {
        self.omitted.push(question);
        self
    }

    pub fn png(self) -> Vec<u8> {
        let mut img = RgbImage::from_pixel(SHEET_W, SHEET_H, PAPER);
        let per_column = (self.num_questions + NUM_COLUMNS - 1) / NUM_COLUMNS;

        for q in 0..self.num_questions {
            if self.omitted.contains(&q) {
                continue;
            }
            for choice in 0..NUM_CHOICES {
                let (cx, cy) = bubble_center(q, choice, per_column);
                // Printed outlines are two pixels wide so they binarize
                // reliably across the thresholding strategies.
                draw_hollow_circle_mut(&mut img, (cx, cy), OUTLINE_RADIUS, OUTLINE);
                draw_hollow_circle_mut(&mut img, (cx, cy), OUTLINE_RADIUS - 1, OUTLINE);
            }
            match self.marks[q] {
                Mark::None => {}
                Mark::Fill(choice) => {
                    let (cx, cy) = bubble_center(q, choice, per_column);
                    draw_filled_circle_mut(&mut img, (cx, cy), MARK_RADIUS, INK);
                }
                Mark::Half(choice) => {
                    let (cx, cy) = bubble_center(q, choice, per_column);
                    draw_half_disk(&mut img, cx, cy, MARK_RADIUS);
                }
                Mark::Double(first, second) => {
                    for choice in [first, second] {
                        let (cx, cy) = bubble_center(q, choice, per_column);
                        draw_filled_circle_mut(&mut img, (cx, cy), MARK_RADIUS, INK);
                    }
                }
                Mark::DoubleHalf(first, second) => {
                    for choice in [first, second] {
                        let (cx, cy) = bubble_center(q, choice, per_column);
                        draw_half_disk(&mut img, cx, cy, MARK_RADIUS);
                    }
                }
            }
        }

        encode_png(img)
    }
}

fn bubble_center(question: usize, choice: usize, per_column: usize) -> (i32, i32) {
    let column = (question / per_column) as i32;
    let row = (question % per_column) as i32;
    (
        COLUMN_BASE_X + column * COLUMN_PITCH + choice as i32 * CHOICE_PITCH,
        ROW_BASE_Y + row * ROW_PITCH,
    )
}

/// Bottom half of the bubble filled, outline left visible on top.
fn draw_half_disk(img: &mut RgbImage, cx: i32, cy: i32, r: i32) {
    for dy in 0..=r {
        for dx in -r..=r {
            if dx * dx + dy * dy <= r * r {
                let x = cx + dx;
                let y = cy + dy;
                if x >= 0 && y >= 0 && (x as u32) < SHEET_W && (y as u32) < SHEET_H {
                    img.put_pixel(x as u32, y as u32, INK);
                }
            }
        }
    }
}

/// Uniformly colored page with no structure at all.
pub fn flat_page(width: u32, height: u32, value: u8) -> Vec<u8> {
    encode_png(RgbImage::from_pixel(width, height, Rgb([value, value, value])))
}

fn encode_png(img: RgbImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
        .expect("in-memory PNG encoding cannot fail");
    bytes
}
