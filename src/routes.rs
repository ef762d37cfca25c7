use crate::error::ImportError;
use crate::models::SessionView;
use crate::services::importer::{BulkImporter, run_import};
use crate::services::session::{ImportSession, SessionStore};
use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post, put},
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionStore,
    pub importer: Arc<dyn BulkImporter>,
}

#[derive(Debug)]
pub enum ApiError {
    Import(ImportError),
    BadRequest(String),
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        ApiError::Import(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Import(err) => {
                let status = match &err {
                    ImportError::UnsupportedFileType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    ImportError::ParseFailure { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                    ImportError::AllChaptersConflict => StatusCode::CONFLICT,
                    ImportError::ImportFailure { .. } => StatusCode::BAD_GATEWAY,
                    ImportError::NothingSelected => StatusCode::BAD_REQUEST,
                    ImportError::NoSuchChapter { .. } | ImportError::SessionNotFound => {
                        StatusCode::NOT_FOUND
                    }
                    ImportError::InvalidTransition { .. } => StatusCode::CONFLICT,
                };
                (status, err.to_string())
            }
        };
        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest {
    project_id: String,
    #[serde(default)]
    existing_chapter_numbers: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct RangeRequest {
    start: Value,
    end: Value,
}

#[derive(Debug, Deserialize)]
struct TitleRequest {
    title: String,
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/sessions", post(create_session))
        .route("/sessions/:id", get(get_session).delete(close_session))
        .route("/sessions/:id/file", post(upload_file))
        .route("/sessions/:id/reset", post(reset_session))
        .route("/sessions/:id/toggle-all", post(toggle_all))
        .route("/sessions/:id/range", post(select_range))
        .route("/sessions/:id/chapters/:index/toggle", post(toggle_chapter))
        .route("/sessions/:id/chapters/:index/title", put(edit_title))
        .route("/sessions/:id/import", post(import_chapters))
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::AllowMethods::any())
                .allow_headers(tower_http::cors::AllowHeaders::any()),
        )
}

async fn index() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Chapter Import Service</title>
    <meta charset="utf-8">
    <style>
        body { font-family: Arial, sans-serif; margin: 40px; }
        .endpoint { background-color: #f5f5f5; padding: 10px; margin: 10px 0; border-radius: 4px; font-family: monospace; }
    </style>
</head>
<body>
    <h1>Chapter Import Service</h1>
    <p>Splits EPUB and TXT files into chapters, lets you review them, and imports the selection into a project.</p>

    <h2>Available Endpoints:</h2>
    <div class="endpoint">GET /health - Health check</div>
    <div class="endpoint">POST /sessions - Open a session: {"projectId", "existingChapterNumbers"}</div>
    <div class="endpoint">GET /sessions/:id - Current session state</div>
    <div class="endpoint">DELETE /sessions/:id - Close a session</div>
    <div class="endpoint">POST /sessions/:id/file - Upload an .epub or .txt file (multipart field 'file')</div>
    <div class="endpoint">POST /sessions/:id/reset - Clear an error and pick a new file</div>
    <div class="endpoint">POST /sessions/:id/chapters/:index/toggle - Toggle one chapter</div>
    <div class="endpoint">POST /sessions/:id/toggle-all - Select or deselect all chapters</div>
    <div class="endpoint">POST /sessions/:id/range - Select chapters {"start", "end"} (1-based)</div>
    <div class="endpoint">PUT /sessions/:id/chapters/:index/title - Rename a chapter {"title"}</div>
    <div class="endpoint">POST /sessions/:id/import - Import the selected chapters</div>
</body>
</html>
"#,
    )
}

async fn health_check() -> &'static str {
    "OK"
}

async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.project_id.trim().is_empty() {
        return Err(ApiError::BadRequest("projectId is required".to_string()));
    }
    let existing: HashSet<u32> = request.existing_chapter_numbers.into_iter().collect();
    let id = state
        .sessions
        .open(ImportSession::new(request.project_id, existing));
    Ok(Json(json!({ "success": true, "sessionId": id })))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    Ok(Json(state.sessions.with_session(id, |s| s.view())?))
}

async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    state.sessions.close(id).ok_or(ImportError::SessionNotFound)?;
    Ok(Json(json!({ "success": true })))
}

async fn upload_file(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();

        let data = match field.bytes().await {
            Ok(data) => data,
            Err(e) => {
                let err = ImportError::parse(format!("Failed to read upload: {e}"));
                state.sessions.with_session(id, |s| {
                    s.begin_loading(&file_name)?;
                    s.finish_loading(Err(err.clone()))
                })??;
                return Err(err.into());
            }
        };

        let (count, view) = state
            .sessions
            .load_upload(id, file_name, data.to_vec())
            .await?;
        return Ok(Json(json!({
            "success": true,
            "chapterCount": count,
            "session": view,
        })));
    }

    Err(ApiError::BadRequest("Missing 'file' field".to_string()))
}

async fn reset_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    apply(&state, id, |s| s.reset())
}

async fn toggle_chapter(
    State(state): State<AppState>,
    Path((id, index)): Path<(Uuid, usize)>,
) -> Result<Json<SessionView>, ApiError> {
    apply(&state, id, |s| s.toggle(index))
}

async fn toggle_all(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    apply(&state, id, |s| s.toggle_all())
}

async fn select_range(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RangeRequest>,
) -> Result<Json<SessionView>, ApiError> {
    let start = bound_text(&request.start);
    let end = bound_text(&request.end);
    apply(&state, id, |s| s.select_range(&start, &end))
}

async fn edit_title(
    State(state): State<AppState>,
    Path((id, index)): Path<(Uuid, usize)>,
    Json(request): Json<TitleRequest>,
) -> Result<Json<SessionView>, ApiError> {
    apply(&state, id, |s| s.edit_title(index, request.title))
}

async fn import_chapters(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let summary = run_import(&state.sessions, id, state.importer.clone()).await?;
    Ok(Json(json!({
        "success": true,
        "closed": true,
        "imported": summary.imported,
        "skippedCount": summary.skipped_count,
    })))
}

fn apply(
    state: &AppState,
    id: Uuid,
    action: impl FnOnce(&mut ImportSession) -> Result<(), ImportError>,
) -> Result<Json<SessionView>, ApiError> {
    let view = state
        .sessions
        .with_session(id, |s| action(&mut *s).map(|()| s.view()))??;
    Ok(Json(view))
}

/// Range bounds arrive as form text; numbers are accepted too.
fn bound_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        _ => String::new(),
    }
}
