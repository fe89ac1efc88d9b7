// THEORY:
// The HTTP front door exposes the pipeline executor synchronously: one POST carries
// the image and the ordered operation list, and the response lists every frame the
// run produced. Unlike the datagram dispatcher it reports failures explicitly with
// status codes.
//
// Routes:
//   POST /visualize?operation=<name>[&operation=<name>...][&angle=<deg>]   body = image
//   GET  /output/{request_id}/{file}                 stored frame or datagram result
//   GET  /healthz                                                           "ok"

use std::future::Future;
use std::io;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info};
use serde::Serialize;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::core_modules::utils::image_helper::{self, OutputFormat};
use crate::error::{CodecError, OutputError};
use crate::output::OutputStore;
use crate::pipeline::Pipeline;

/// Angle applied to rotation steps when the query carries none (or an unparsable one).
pub const DEFAULT_HTTP_ANGLE: f64 = 0.0;

#[derive(Clone)]
pub struct HttpState {
    pub store: Arc<OutputStore>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisualizeResponse {
    pub request_id: String,
    /// URLs of every stored frame, original first.
    pub images: Vec<String>,
    /// Operation names as requested, unknown ones included.
    pub operations: Vec<String>,
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("internal server error")]
    Internal,
}

impl HttpError {
    pub fn status(&self) -> StatusCode {
        match self {
            HttpError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HttpError::NotFound(_) => StatusCode::NOT_FOUND,
            HttpError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

impl From<CodecError> for HttpError {
    fn from(err: CodecError) -> Self {
        HttpError::BadRequest(format!("could not decode image: {err}"))
    }
}

impl From<OutputError> for HttpError {
    fn from(err: OutputError) -> Self {
        match err {
            OutputError::InvalidName(name) => HttpError::BadRequest(format!("invalid path segment {name:?}")),
            OutputError::NotFound(_) => HttpError::NotFound("no such output".to_string()),
            other => {
                error!("output store failure: {other}");
                HttpError::Internal
            }
        }
    }
}

pub fn router(store: Arc<OutputStore>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/visualize", post(visualize))
        .route("/output/:request_id/:file", get(output_file))
        .route("/healthz", get(healthz))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(HttpState { store })
}

/// Serves `app` on `listener` until `shutdown` resolves, then drains open connections.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("http front door listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await
}

pub async fn healthz() -> &'static str {
    "ok"
}

/// Splits the query into operation names (in order) and the rotation angle.
fn pipeline_params(params: &[(String, String)]) -> (Vec<String>, f64) {
    let operations = params
        .iter()
        .filter(|(key, _)| key == "operation")
        .map(|(_, value)| value.clone())
        .collect();
    let angle = params
        .iter()
        .rev()
        .find(|(key, _)| key == "angle")
        .and_then(|(_, value)| value.trim().parse::<f64>().ok())
        .filter(|angle| angle.is_finite())
        .unwrap_or(DEFAULT_HTTP_ANGLE);
    (operations, angle)
}

pub async fn visualize(
    State(state): State<HttpState>,
    Query(params): Query<Vec<(String, String)>>,
    body: Bytes,
) -> Result<Json<VisualizeResponse>, HttpError> {
    if body.is_empty() {
        return Err(HttpError::BadRequest("request body must contain an image".to_string()));
    }
    let (operations, angle) = pipeline_params(&params);
    let pipeline = Pipeline::from_names(operations.iter().map(String::as_str), angle);

    let run = tokio::task::spawn_blocking(move || -> Result<_, CodecError> {
        let buffer = image_helper::decode(&body)?;
        Ok(pipeline.run(buffer))
    })
    .await
    .map_err(|err| {
        error!("pipeline task failed: {err}");
        HttpError::Internal
    })??;

    let request_id = state.store.allocate_request_id();
    let stored = state.store.persist_run(&request_id, run).await?;
    info!(
        "visualize {request_id}: {} step(s), {} frame(s) stored",
        operations.len(),
        stored.len()
    );

    let images = stored
        .iter()
        .map(|frame| format!("/output/{request_id}/{}", frame.file_name))
        .collect();
    Ok(Json(VisualizeResponse {
        request_id: request_id.to_string(),
        images,
        operations,
    }))
}

pub async fn output_file(
    State(state): State<HttpState>,
    Path((request_id, file)): Path<(String, String)>,
) -> Result<Response, HttpError> {
    let bytes = state.store.load(&request_id, &file).await?;
    let content_type = match file.rsplit_once('.').map(|(_, ext)| ext.parse::<OutputFormat>()) {
        Some(Ok(format)) => format.content_type(),
        _ => "application/octet-stream",
    };
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}
