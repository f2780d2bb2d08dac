use crate::ai::{AiError, GenerativeModel, InlineImage};
use crate::db::ProductRecord;
use crate::metrics::inc_requests;
use crate::models::{
    ApiMessage, DescribeRequest, EditRequest, SaveResponse, SessionSaveRequest,
};
use crate::products::{ImageUpload, ProductService, ProductSummary, UpdateError, UpdateRequest};
use crate::session::{Artifact, ImageView, Navigation, SelectionUpdate, SessionError, SessionRegistry, SessionView};
use crate::storage::MemoryObjectStore;
use crate::targets::{SaveTarget, TargetInfo, vocabulary};
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub products: ProductService,
    pub sessions: SessionRegistry,
    pub model: Arc<dyn GenerativeModel>,
    /// Set when uploads go to the in-process store; serves `/assets/*`.
    pub assets: Option<MemoryObjectStore>,
    pub prometheus: Option<PrometheusHandle>,
    pub metrics_key: Option<String>,
}

pub fn router(state: AppState, body_limit: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods(Any)
        .allow_origin(Any);

    let images = Router::new()
        .route("/", post(add_image))
        .route("/{image_id}", delete(remove_image))
        .route("/{image_id}/edit", post(edit_image))
        .route("/{image_id}/describe", post(describe_image))
        .route("/{image_id}/undo", post(undo))
        .route("/{image_id}/redo", post(redo))
        .route("/{image_id}/reset", post(reset))
        .route("/{image_id}/current", get(current_artifact))
        .route("/{image_id}/original", get(original_artifact))
        .route("/{image_id}/save", post(save_from_session));

    let sessions = Router::new()
        .route("/", post(create_session))
        .route("/{session_id}", get(get_session).delete(delete_session))
        .route("/{session_id}/selection", put(update_selection))
        .nest("/{session_id}/images", images);

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/targets", get(list_targets))
        .route("/products", get(list_products))
        .route("/products/{sku}", get(get_product).patch(update_product))
        .route("/assets/{*key}", get(get_asset))
        .nest("/sessions", sessions)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(body_limit))
}

#[derive(Debug)]
pub enum AppError {
    Update(UpdateError),
    Ai(AiError),
    Session(SessionError),
    BadRequest(String),
}

impl From<UpdateError> for AppError {
    fn from(value: UpdateError) -> Self {
        Self::Update(value)
    }
}

impl From<AiError> for AppError {
    fn from(value: AiError) -> Self {
        Self::Ai(value)
    }
}

impl From<SessionError> for AppError {
    fn from(value: SessionError) -> Self {
        Self::Session(value)
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Update(err) => match err {
                UpdateError::NotFound { .. } => StatusCode::NOT_FOUND,
                UpdateError::PreconditionFailed(_)
                | UpdateError::InvalidTarget(_)
                | UpdateError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                UpdateError::Storage(_) | UpdateError::Unexpected(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            AppError::Ai(err) => match err {
                AiError::MissingApiKey => StatusCode::SERVICE_UNAVAILABLE,
                AiError::Network(_) | AiError::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
                AiError::Blocked { .. }
                | AiError::GenerationStopped { .. }
                | AiError::EmptyResult { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            },
            AppError::Session(err) => match err {
                SessionError::SessionNotFound(_) | SessionError::ImageNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                SessionError::Busy | SessionError::NothingToUndo | SessionError::NothingToRedo => {
                    StatusCode::CONFLICT
                }
                SessionError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            },
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::Update(err) => err.to_string(),
            AppError::Ai(err) => err.to_string(),
            AppError::Session(err) => err.to_string(),
            AppError::BadRequest(message) => message.clone(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        if status.is_server_error() {
            error!(target = "studio.api", %status, "{message}");
        } else {
            warn!(target = "studio.api", %status, "{message}");
        }
        (status, Json(ApiMessage::failed(message))).into_response()
    }
}

/// Health and readiness check.
async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "jewel-studio-api",
    }))
}

async fn metrics_endpoint(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(secret) = &state.metrics_key {
        let presented = headers
            .get("X-Metrics-Key")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");
        if presented != secret {
            return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
        }
    }
    let body = state
        .prometheus
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default();
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
        .into_response()
}

/// Save-target vocabulary offered by the UI.
async fn list_targets() -> Json<Vec<TargetInfo>> {
    Json(vocabulary())
}

/// All products with their completeness indicator.
///
/// - Method: `GET`
/// - Path: `/products`
async fn list_products(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProductSummary>>, AppError> {
    inc_requests("/products");
    Ok(Json(state.products.list().await?))
}

async fn get_product(
    State(state): State<AppState>,
    Path(sku): Path<String>,
) -> Result<Json<ProductRecord>, AppError> {
    inc_requests("/products/{sku}");
    Ok(Json(state.products.get(&sku).await?))
}

/// Persist one save target for a product.
///
/// - Method: `PATCH`
/// - Path: `/products/{sku}`
/// - Body: multipart with `type`, `dataType` and either `image`
///   (plus optional `originalImage`) or `description`
/// - Response: `{success, message, column, url?, original_url?}`
async fn update_product(
    State(state): State<AppState>,
    Path(sku): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<SaveResponse>, AppError> {
    inc_requests("/products/{sku}:patch");
    let mut target = None;
    let mut data_type = None;
    let mut image = None;
    let mut original = None;
    let mut description = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::BadRequest(format!("multipart error: {err}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "type" => target = Some(read_text(field).await?),
            "dataType" => data_type = Some(read_text(field).await?),
            "description" => description = Some(read_text(field).await?),
            "image" => image = Some(read_upload(field).await?),
            "originalImage" => original = Some(read_upload(field).await?),
            _ => {}
        }
    }

    let target = target.ok_or_else(|| AppError::BadRequest("`type` is required".into()))?;
    let data_type =
        data_type.ok_or_else(|| AppError::BadRequest("`dataType` is required".into()))?;
    let request = UpdateRequest::from_form(&target, &data_type, image, original, description)?;
    let outcome = state.products.update(&sku, request).await?;
    Ok(Json(SaveResponse::from(outcome)))
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|err| AppError::BadRequest(format!("unreadable form field: {err}")))
}

async fn read_upload(field: axum::extract::multipart::Field<'_>) -> Result<ImageUpload, AppError> {
    let content_type = field
        .content_type()
        .filter(|value| value.starts_with("image/"))
        .unwrap_or("image/jpeg")
        .to_string();
    let bytes = field
        .bytes()
        .await
        .map_err(|err| AppError::BadRequest(format!("unreadable file: {err}")))?;
    Ok(ImageUpload {
        bytes: bytes.to_vec(),
        content_type,
    })
}

async fn get_asset(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    let Some(assets) = &state.assets else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match assets.get(&key).await {
        Some(object) => (
            [(header::CONTENT_TYPE, object.content_type)],
            object.body,
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

// -------- Editing sessions --------

async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionView>) {
    inc_requests("/sessions");
    (StatusCode::CREATED, Json(state.sessions.create().await))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(state.sessions.view(session_id).await?))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<ApiMessage>, AppError> {
    state.sessions.remove(session_id).await?;
    Ok(Json(ApiMessage::ok("session closed")))
}

async fn update_selection(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(update): Json<SelectionUpdate>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(
        state.sessions.update_selection(session_id, update).await?,
    ))
}

/// Upload an image into a session (multipart field `image`).
async fn add_image(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<ImageView>), AppError> {
    inc_requests("/sessions/{id}/images");
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::BadRequest(format!("multipart error: {err}")))?
    {
        if field.name() != Some("image") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let upload = read_upload(field).await?;
        let view = state
            .sessions
            .add_image(session_id, file_name, upload.bytes, upload.content_type)
            .await?;
        info!(target = "studio.session", session = %session_id, image = %view.id, "image added");
        return Ok((StatusCode::CREATED, Json(view)));
    }
    Err(AppError::BadRequest("`image` file is required".into()))
}

async fn remove_image(
    State(state): State<AppState>,
    Path((session_id, image_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ApiMessage>, AppError> {
    state.sessions.remove_image(session_id, image_id).await?;
    Ok(Json(ApiMessage::ok("image removed")))
}

/// Run an AI edit on the image's current artifact and append the result to
/// its history. Uses the session hotspot unless the body carries `focus`.
async fn edit_image(
    State(state): State<AppState>,
    Path((session_id, image_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<EditRequest>,
) -> Result<Json<ImageView>, AppError> {
    inc_requests("/sessions/{id}/images/{image}/edit");
    let instruction = request
        .resolved_instruction()
        .ok_or_else(|| AppError::BadRequest("an instruction or preset is required".into()))?;
    let ticket = state.sessions.begin_work(session_id, image_id).await?;
    let focus = request.focus.or(ticket.hotspot);
    let image = InlineImage {
        data: &ticket.current.bytes,
        mime_type: &ticket.current.content_type,
    };
    // An early return or a cancelled request drops the ticket, clearing the busy flag.
    let generated = state.model.edit_image(image, &instruction, focus).await?;
    let artifact = Artifact::new(generated.data, generated.mime_type);
    Ok(Json(state.sessions.complete_edit(ticket, artifact).await?))
}

/// Generate marketing text for the image's current artifact.
async fn describe_image(
    State(state): State<AppState>,
    Path((session_id, image_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<DescribeRequest>,
) -> Result<Json<ImageView>, AppError> {
    inc_requests("/sessions/{id}/images/{image}/describe");
    let instruction = request.resolved_instruction();
    let ticket = state.sessions.begin_work(session_id, image_id).await?;
    let image = InlineImage {
        data: &ticket.current.bytes,
        mime_type: &ticket.current.content_type,
    };
    let text = state.model.describe(image, &instruction).await?;
    Ok(Json(state.sessions.complete_text(ticket, text).await?))
}

async fn undo(
    State(state): State<AppState>,
    Path((session_id, image_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ImageView>, AppError> {
    navigate(&state, session_id, image_id, Navigation::Undo).await
}

async fn redo(
    State(state): State<AppState>,
    Path((session_id, image_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ImageView>, AppError> {
    navigate(&state, session_id, image_id, Navigation::Redo).await
}

async fn reset(
    State(state): State<AppState>,
    Path((session_id, image_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ImageView>, AppError> {
    navigate(&state, session_id, image_id, Navigation::Reset).await
}

async fn navigate(
    state: &AppState,
    session_id: Uuid,
    image_id: Uuid,
    step: Navigation,
) -> Result<Json<ImageView>, AppError> {
    Ok(Json(
        state.sessions.navigate(session_id, image_id, step).await?,
    ))
}

async fn current_artifact(
    State(state): State<AppState>,
    Path((session_id, image_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, AppError> {
    let artifact = state.sessions.current(session_id, image_id).await?;
    Ok(artifact_response(&artifact))
}

async fn original_artifact(
    State(state): State<AppState>,
    Path((session_id, image_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, AppError> {
    let artifact = state.sessions.original(session_id, image_id).await?;
    Ok(artifact_response(&artifact))
}

fn artifact_response(artifact: &Artifact) -> Response {
    (
        [
            (header::CONTENT_TYPE, artifact.content_type.clone()),
            (header::ETAG, format!("\"{}\"", artifact.digest)),
        ],
        artifact.bytes.clone(),
    )
        .into_response()
}

/// Persist a session image's current artifact or generated text to a product.
async fn save_from_session(
    State(state): State<AppState>,
    Path((session_id, image_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<SessionSaveRequest>,
) -> Result<Json<SaveResponse>, AppError> {
    inc_requests("/sessions/{id}/images/{image}/save");
    let (current, original, generated_text) =
        state.sessions.snapshot(session_id, image_id).await?;
    let target = SaveTarget::from_wire(&request.target)
        .ok_or_else(|| UpdateError::InvalidTarget(request.target.trim().to_string()))?;

    let update = match target {
        SaveTarget::Image(slot) => {
            let source = if slot.is_original() { &original } else { &current };
            UpdateRequest::Image {
                slot,
                image: upload_of(source),
                original: (!slot.is_original()).then(|| upload_of(&original)),
            }
        }
        SaveTarget::Text(target) => {
            let text = request
                .text
                .or(generated_text)
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty())
                .ok_or_else(|| {
                    UpdateError::InvalidInput("no text to save: generate or enter one first".into())
                })?;
            UpdateRequest::Text { target, text }
        }
    };

    let outcome = state.products.update(request.sku.trim(), update).await?;
    state.sessions.mark_saved(session_id, image_id).await?;
    Ok(Json(SaveResponse::from(outcome)))
}

fn upload_of(artifact: &Artifact) -> ImageUpload {
    ImageUpload {
        bytes: artifact.bytes.clone(),
        content_type: artifact.content_type.clone(),
    }
}
