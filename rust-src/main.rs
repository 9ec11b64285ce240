use anyhow::{bail, Context, Result};
use clap::{Arg, Command};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use truad_dee_na::{decode_sheet_with_config, AnswerKey, DetectionConfig, SheetReport};

fn main() -> Result<()> {
    // 🚀 Blazingly Fast Memory Safe 🚀 batch decoding of scanned answer sheets

    let matches = Command::new("truad-dee-na")
        .version("0.1.0")
        .author("Zipherfox, NessShadow, Film")
        .about("🚀 Blazingly Fast Memory Safe OMR Answer Sheet Decoder 🚀")
        .arg(
            Arg::new("input_paths")
                .short('i')
                .long("inputDir")
                .value_name("INPUT_DIR")
                .help("Specify input directories or files")
                .action(clap::ArgAction::Append)
                .default_values(["inputs"]),
        )
        .arg(
            Arg::new("output_dir")
                .short('o')
                .long("outputDir")
                .value_name("OUTPUT_DIR")
                .help("Specify output directory")
                .default_value("outputs"),
        )
        .arg(
            Arg::new("key")
                .short('k')
                .long("key")
                .value_name("KEY_FILE")
                .help("Answer key file (JSON array or CSV)")
                .required(true),
        )
        .arg(
            Arg::new("questions")
                .short('n')
                .long("questions")
                .value_name("N")
                .help("Number of questions on the sheet")
                .required(true),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("CONFIG_FILE")
                .help("Detection parameter overrides (YAML)"),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .help("Enable debugging mode for detailed output")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let debug = matches.get_flag("debug");
    let filter = if debug {
        "truad_dee_na=debug"
    } else {
        "truad_dee_na=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    println!("🚀 Starting Blazingly Fast Memory Safe OMR Processing... 🚀");

    let input_paths: Vec<PathBuf> = matches
        .get_many::<String>("input_paths")
        .into_iter()
        .flatten()
        .map(PathBuf::from)
        .collect();
    let output_dir = PathBuf::from(
        matches
            .get_one::<String>("output_dir")
            .map(String::as_str)
            .unwrap_or("outputs"),
    );

    let num_questions: usize = matches
        .get_one::<String>("questions")
        .context("question count is required")?
        .parse()
        .context("question count must be a positive integer")?;
    if num_questions == 0 {
        bail!("question count must be at least 1");
    }

    let config = match matches.get_one::<String>("config") {
        Some(path) => DetectionConfig::load(path)?,
        None => DetectionConfig::default(),
    };

    let key_path = matches.get_one::<String>("key").context("key file is required")?;
    let key = load_answer_key(Path::new(key_path), config.sheet.num_choices)?;
    if key.len() != num_questions {
        bail!(
            "Answer key length ({}) doesn't match exam questions ({})",
            key.len(),
            num_questions
        );
    }

    let sheets = collect_sheets(&input_paths)?;
    if sheets.is_empty() {
        bail!("no image files found under {:?}", input_paths);
    }
    info!("Found {} sheet(s) to process", sheets.len());

    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;

    let results: Vec<(PathBuf, Result<SheetReport>)> = sheets
        .par_iter()
        .map(|path| {
            let report = process_sheet(path, &key, &config);
            (path.clone(), report)
        })
        .collect();

    let mut summary = csv::Writer::from_path(output_dir.join("summary.csv"))
        .context("Failed to create summary.csv")?;
    summary.write_record([
        "file",
        "student_id",
        "score",
        "total_questions",
        "accuracy",
        "confidence",
        "status",
    ])?;

    let mut failures = 0usize;
    for (path, result) in &results {
        match result {
            Ok(report) => {
                let report_path = output_dir.join(format!("{}.json", report.student_id));
                std::fs::write(&report_path, serde_json::to_string_pretty(report)?)
                    .with_context(|| format!("Failed to write {}", report_path.display()))?;
                summary.write_record([
                    path.display().to_string(),
                    report.student_id.clone(),
                    report.score.to_string(),
                    report.total_questions.to_string(),
                    format!("{:.1}", report.accuracy),
                    format!("{:.1}", report.processing_metadata.confidence),
                    "ok".to_string(),
                ])?;
                println!(
                    "  📄 {}: {}/{} ({:.1}%), confidence {:.1}%",
                    path.display(),
                    report.score,
                    report.total_questions,
                    report.accuracy,
                    report.processing_metadata.confidence
                );
            }
            Err(e) => {
                failures += 1;
                warn!("Failed to process {}: {:#}", path.display(), e);
                summary.write_record([
                    path.display().to_string(),
                    String::new(),
                    String::new(),
                    String::new(),
                    String::new(),
                    String::new(),
                    format!("error: {e:#}"),
                ])?;
                eprintln!("  ❌ {}: {e:#}", path.display());
            }
        }
    }
    summary.flush()?;

    if failures == 0 {
        println!("🚀 All {} sheet(s) processed successfully with memory safety! 🚀", results.len());
        Ok(())
    } else {
        eprintln!(
            "❌ {} of {} sheet(s) failed to process",
            failures,
            results.len()
        );
        std::process::exit(1);
    }
}

/// Walk the input paths and keep everything that looks like an image.
fn collect_sheets(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut sheets = Vec::new();
    for input in inputs {
        if input.is_file() {
            sheets.push(input.clone());
            continue;
        }
        for entry in walkdir::WalkDir::new(input).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk {}", input.display()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let mime = mime_guess::from_path(entry.path()).first_or_octet_stream();
            if mime.type_() == mime_guess::mime::IMAGE {
                sheets.push(entry.into_path());
            } else {
                warn!("Skipping non-image file {}", entry.path().display());
            }
        }
    }
    Ok(sheets)
}

fn process_sheet(path: &Path, key: &AnswerKey, config: &DetectionConfig) -> Result<SheetReport> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let student_id = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "UNKNOWN".to_string());
    let report = decode_sheet_with_config(&bytes, key, &student_id, config)?;
    Ok(report)
}

/// Load an answer key from a JSON array of letters or a CSV of
/// `question,letter` rows (sorted by question number).
fn load_answer_key(path: &Path, num_choices: usize) -> Result<AnswerKey> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read answer key: {}", path.display()))?;

    let letters: Vec<char> = if path.extension().and_then(|s| s.to_str()) == Some("json") {
        let entries: Vec<String> =
            serde_json::from_str(&content).context("Failed to parse JSON answer key")?;
        entries
            .iter()
            .map(|s| single_letter(s))
            .collect::<Result<_>>()?
    } else {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(content.as_bytes());
        let mut rows: Vec<(usize, char)> = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.context("Failed to read CSV record")?;
            match record.len() {
                0 => continue,
                1 => rows.push((line + 1, single_letter(&record[0])?)),
                _ => {
                    let question: usize = record[0]
                        .trim()
                        .parse()
                        .with_context(|| format!("Bad question number {:?}", &record[0]))?;
                    rows.push((question, single_letter(&record[1])?));
                }
            }
        }
        rows.sort_by_key(|(question, _)| *question);
        rows.into_iter().map(|(_, letter)| letter).collect()
    };

    AnswerKey::from_letters(letters, num_choices).context("Invalid answer key")
}

fn single_letter(entry: &str) -> Result<char> {
    let trimmed = entry.trim();
    let mut chars = trimmed.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c.to_ascii_uppercase()),
        _ => bail!("Answer key entry {trimmed:?} is not a single letter"),
    }
}
