// web_main.rs - 🚀 Blazingly Fast Memory Safe OMR Web Interface 🚀
//! Stateless web front end for the answer-sheet decoding pipeline: upload a
//! scanned sheet plus its answer key, get the scored report back as JSON.

use anyhow::Result;
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use truad_dee_na::{decode_sheet_with_config, AnswerKey, DetectionConfig, OmrError};
use uuid::Uuid;

#[derive(Clone)]
struct AppState {
    config: Arc<DetectionConfig>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    kind: &'static str,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("truad_dee_na=info,tower_http=debug")
            }),
        )
        .init();

    info!("🚀 Starting Blazingly Fast Memory Safe OMR Web Interface... 🚀");

    let state = AppState {
        config: Arc::new(DetectionConfig::default()),
    };

    let app = Router::new()
        .route("/", get(serve_index))
        .route("/process", post(process_sheet))
        .route("/api/health", get(health_check))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    info!("🚀 Web interface running at http://0.0.0.0:3000 🚀");
    axum::serve(listener, app).await?;

    Ok(())
}

async fn serve_index() -> impl IntoResponse {
    Html(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>🚀 TruadDeeNa - Blazingly Fast OMR Decoding 🚀</title>
    <style>
        body { font-family: 'Segoe UI', sans-serif; max-width: 640px; margin: 40px auto; color: #333; }
        h1 { background: linear-gradient(45deg, #667eea, #764ba2); -webkit-background-clip: text; -webkit-text-fill-color: transparent; }
        form { border: 3px dashed #667eea; border-radius: 10px; padding: 24px; background: #f8f9ff; }
        label { display: block; margin: 12px 0 4px; font-weight: bold; }
        button { background: linear-gradient(45deg, #667eea, #764ba2); color: white; border: none; padding: 12px 24px; border-radius: 8px; font-weight: bold; cursor: pointer; margin-top: 16px; }
        pre { background: #f8f9fa; padding: 16px; border-radius: 8px; overflow-x: auto; }
    </style>
</head>
<body>
    <h1>🚀 TruadDeeNa OMR Decoder 🚀</h1>
    <p>Upload a scanned answer sheet and score it with blazing speed.</p>
    <form id="form">
        <label>Answer sheet image</label>
        <input type="file" name="image" accept="image/*" required>
        <label>Student ID</label>
        <input type="text" name="studentId" value="STUDENT_001" required>
        <label>Answer key (letters, e.g. ABCDEABCDE)</label>
        <input type="text" name="answerKey" required>
        <label>Number of questions</label>
        <input type="number" name="numQuestions" min="1" required>
        <button type="submit">🚀 Decode 🚀</button>
    </form>
    <pre id="result" style="display:none"></pre>
    <script>
        document.getElementById('form').addEventListener('submit', async (e) => {
            e.preventDefault();
            const result = document.getElementById('result');
            result.style.display = 'block';
            result.textContent = 'Processing with blazing speed...';
            const response = await fetch('/process', { method: 'POST', body: new FormData(e.target) });
            result.textContent = JSON.stringify(await response.json(), null, 2);
        });
    </script>
</body>
</html>"#,
    )
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "🚀 Blazingly Fast and Memory Safe! 🚀",
        "version": "0.1.0"
    }))
}

/// Decode one uploaded sheet. All caller-side validation (content type,
/// key letters, key length vs question count) happens here before the
/// pipeline runs.
async fn process_sheet(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let request_id = Uuid::new_v4();

    let mut image_bytes: Option<Vec<u8>> = None;
    let mut image_name = String::new();
    let mut student_id = None;
    let mut answer_key_text = None;
    let mut num_questions_text = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return bad_request(format!("Malformed multipart request: {e}")),
        };
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => {
                let content_type = field.content_type().map(str::to_string);
                image_name = field.file_name().unwrap_or_default().to_string();
                let looks_like_image = content_type
                    .as_deref()
                    .map(|t| t.starts_with("image/"))
                    .unwrap_or_else(|| {
                        mime_guess::from_path(&image_name).first_or_octet_stream().type_()
                            == mime_guess::mime::IMAGE
                    });
                if !looks_like_image {
                    return bad_request("File must be an image".to_string());
                }
                match field.bytes().await {
                    Ok(bytes) => image_bytes = Some(bytes.to_vec()),
                    Err(e) => return bad_request(format!("Failed to read upload: {e}")),
                }
            }
            "studentId" => student_id = field.text().await.ok(),
            "answerKey" => answer_key_text = field.text().await.ok(),
            "numQuestions" => num_questions_text = field.text().await.ok(),
            other => warn!(%request_id, "Ignoring unexpected field {other:?}"),
        }
    }

    let Some(image_bytes) = image_bytes else {
        return bad_request("Missing image upload".to_string());
    };
    let Some(student_id) = student_id.filter(|s| !s.is_empty()) else {
        return bad_request("Missing studentId".to_string());
    };
    let Some(answer_key_text) = answer_key_text else {
        return bad_request("Missing answerKey".to_string());
    };
    let num_questions: usize = match num_questions_text.as_deref().map(str::parse) {
        Some(Ok(n)) if n > 0 => n,
        _ => return bad_request("numQuestions must be a positive integer".to_string()),
    };

    let key = match AnswerKey::parse(&answer_key_text, state.config.sheet.num_choices) {
        Ok(key) => key,
        Err(e) => return bad_request(format!("Invalid answer key: {e}")),
    };
    if key.len() != num_questions {
        return bad_request(format!(
            "Answer key length ({}) doesn't match exam questions ({})",
            key.len(),
            num_questions
        ));
    }

    info!(
        %request_id,
        "Processing answer sheet {:?} for student {} ({} bytes)",
        image_name,
        student_id,
        image_bytes.len()
    );

    let config = Arc::clone(&state.config);
    let result = tokio::task::spawn_blocking(move || {
        decode_sheet_with_config(&image_bytes, &key, &student_id, &config)
    })
    .await;

    match result {
        Ok(Ok(report)) => {
            info!(
                %request_id,
                "Scored {}/{} with confidence {:.1}",
                report.score,
                report.total_questions,
                report.processing_metadata.confidence
            );
            Json(report).into_response()
        }
        Ok(Err(e)) => {
            warn!(%request_id, "Decoding failed: {e}");
            let (status, kind) = match &e {
                OmrError::InvalidImage(_) => (StatusCode::BAD_REQUEST, "invalid_image"),
                OmrError::NoBubblesDetected => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "no_bubbles_detected")
                }
                OmrError::NoRowsDetected => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "no_rows_detected")
                }
                OmrError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
            };
            (
                status,
                Json(ErrorResponse {
                    error: e.to_string(),
                    kind,
                }),
            )
                .into_response()
        }
        Err(e) => {
            warn!(%request_id, "Decoding task failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Task join error: {e}"),
                    kind: "internal",
                }),
            )
                .into_response()
        }
    }
}

fn bad_request(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message,
            kind: "bad_request",
        }),
    )
        .into_response()
}
