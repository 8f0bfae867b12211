use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use tg_core::domain::error::{AppError, ErrorCode};
use tg_core::domain::job::JobMode;
use tg_core::usecase::app_service::DownloadService;

/// ルートエラー型（HTTP レスポンスへの変換を担う）
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("{0}")]
    App(#[from] AppError),
}

impl IntoResponse for RouteError {
    fn into_response(self) -> Response {
        let RouteError::App(err) = self;
        // 入力検証エラーも未知の job_id も 400 を返す
        let status = match err.code {
            ErrorCode::InvalidInput | ErrorCode::NotFound => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({
            "success": false,
            "error": err.message,
            "code": err.code,
        }));
        (status, body).into_response()
    }
}

type RouteResult<T> = Result<T, RouteError>;

pub type SharedService = Arc<DownloadService>;

// --- Handlers ---

#[derive(Debug, Deserialize)]
pub struct DownloadArgs {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    mode: Option<String>,
}

/// mode 文字列の解釈。"audio" 以外はすべて video 扱い
fn parse_mode(mode: Option<&str>) -> JobMode {
    match mode {
        Some("audio") => JobMode::Audio,
        _ => JobMode::Video,
    }
}

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    success: bool,
    job_id: String,
}

pub async fn download(
    State(service): State<SharedService>,
    Json(args): Json<DownloadArgs>,
) -> RouteResult<Json<DownloadResponse>> {
    let url = args.url.unwrap_or_default();
    let mode = parse_mode(args.mode.as_deref());
    let job_id = service.create_job(&url, Some(mode)).await?;
    Ok(Json(DownloadResponse {
        success: true,
        job_id,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ProgressArgs {
    #[serde(default)]
    job_id: Option<String>,
}

pub async fn progress(
    State(service): State<SharedService>,
    Query(args): Query<ProgressArgs>,
) -> RouteResult<Json<serde_json::Value>> {
    let job_id = args.job_id.unwrap_or_default();
    let job = service.get_progress(&job_id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "progress": job,
    })))
}

#[derive(Debug, Deserialize)]
pub struct CancelArgs {
    #[serde(default)]
    job_id: Option<String>,
}

pub async fn cancel(
    State(service): State<SharedService>,
    Json(args): Json<CancelArgs>,
) -> RouteResult<Json<serde_json::Value>> {
    let job_id = args.job_id.unwrap_or_default();
    service.cancel_job(&job_id).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Cancellation requested.",
    })))
}

#[derive(Debug, Deserialize)]
pub struct VideoInfoArgs {
    #[serde(default)]
    url: Option<String>,
}

pub async fn get_video_info(
    State(service): State<SharedService>,
    Json(args): Json<VideoInfoArgs>,
) -> RouteResult<Json<serde_json::Value>> {
    let url = args.url.unwrap_or_default();
    let info = service.probe_video(&url).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "title": info.title,
        "thumbnail": info.thumbnail,
    })))
}

pub async fn metrics(State(service): State<SharedService>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "metrics": service.metrics_summary(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode(Some("audio")), JobMode::Audio);
        assert_eq!(parse_mode(Some("video")), JobMode::Video);
        assert_eq!(parse_mode(Some("unknown")), JobMode::Video);
        assert_eq!(parse_mode(None), JobMode::Video);
    }
}
