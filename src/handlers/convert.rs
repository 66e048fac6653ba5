use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Query, Request, State},
    http::{header, StatusCode},
    response::Json,
};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{AppError, AppResult};
use crate::handlers::AppState;
use crate::middleware::current_request_id;
use crate::models::{ConversionRequest, ConversionResult, ConvertParams};
use crate::routing::content_type_for_file_name;

/// `POST /convert`: raw body with a `Content-Type`, or a multipart form
/// carrying a `file` field.
pub async fn convert_handler(
    State(state): State<AppState>,
    Query(params): Query<ConvertParams>,
    request: Request,
) -> AppResult<Json<ConversionResult>> {
    let start = Instant::now();
    let request_id = current_request_id().unwrap_or_default();

    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|ct| ct.to_str().ok())
        .unwrap_or("")
        .to_string();
    let ocr_requested = params.ocr_requested();

    info!(
        request_id = %request_id,
        content_type = %content_type,
        ocr = ocr_requested,
        "Starting conversion request"
    );

    let conversion = if content_type
        .to_ascii_lowercase()
        .starts_with("multipart/form-data")
    {
        let multipart = Multipart::from_request(request, &state)
            .await
            .map_err(|e| reject(e.status(), e.body_text(), state.max_file_size_mb))?;
        conversion_from_multipart(multipart, state.max_file_size_mb).await?
    } else {
        let body = Bytes::from_request(request, &state)
            .await
            .map_err(|e| reject(e.status(), e.body_text(), state.max_file_size_mb))?;
        ConversionRequest::new(content_type, body)
    };
    let conversion = conversion.with_ocr(ocr_requested);

    debug!(
        request_id = %request_id,
        content_type = %conversion.content_type,
        file_name = ?conversion.file_name,
        size = conversion.size(),
        "Upload received"
    );

    let result = match state.service.convert(conversion).await {
        Ok(result) => result,
        Err(e) => {
            if e.is_client_error() {
                warn!(request_id = %request_id, error = %e, "Conversion request rejected");
            } else {
                error!(request_id = %request_id, error = %e, "Conversion failed");
            }
            return Err(e);
        }
    };

    info!(
        request_id = %request_id,
        format = %result.format,
        ocr = result.ocr_used(),
        total_time_ms = start.elapsed().as_millis() as u64,
        "Request completed successfully"
    );

    Ok(Json(result))
}

fn reject(status: StatusCode, detail: String, limit_mb: usize) -> AppError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::FileTooLarge { limit_mb }
    } else {
        AppError::invalid_request(detail)
    }
}

async fn conversion_from_multipart(
    mut multipart: Multipart,
    limit_mb: usize,
) -> AppResult<ConversionRequest> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| reject(e.status(), e.body_text(), limit_mb))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("").to_string();
        if file_name.is_empty() {
            return Err(AppError::missing_file("No selected file"));
        }

        // a generic part type carries no information; fall back to the name
        let content_type = field
            .content_type()
            .filter(|ct| !ct.eq_ignore_ascii_case("application/octet-stream"))
            .map(str::to_string)
            .or_else(|| content_type_for_file_name(&file_name).map(str::to_string))
            .unwrap_or_default();

        let data = field
            .bytes()
            .await
            .map_err(|e| reject(e.status(), e.body_text(), limit_mb))?;

        debug!(
            file_name = %file_name,
            content_type = %content_type,
            size = data.len(),
            "Extracted file from multipart form"
        );

        return Ok(ConversionRequest::new(content_type, data).with_file_name(file_name));
    }

    Err(AppError::missing_file("No file part in the request"))
}
