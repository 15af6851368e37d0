use super::{ApiError, AppState, AuthenticatedUser};
use crate::files::{SaveUploadInput, StoredAttachment};
use anyhow::Context;
use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use axum::Json;
use tokio::fs::File as TokioFile;
use tokio_util::io::ReaderStream;

pub(crate) async fn upload_file(
    State(state): State<AppState>,
    AuthenticatedUser(caller): AuthenticatedUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<StoredAttachment>), ApiError> {
    let mut file_bytes = None;
    let mut filename = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::BadRequest(format!("invalid multipart body: {err}")))?
    {
        if field.name() == Some("file") {
            filename = field.file_name().map(|s| s.to_string());
            let bytes = field
                .bytes()
                .await
                .map_err(|err| ApiError::BadRequest(format!("failed to read upload: {err}")))?;
            file_bytes = Some(bytes.to_vec());
            break;
        }
    }

    let data = file_bytes.ok_or_else(|| ApiError::BadRequest("missing file field".into()))?;
    let stored = state
        .attachments
        .save_upload(SaveUploadInput {
            original_name: filename,
            data,
        })
        .await?;
    tracing::debug!(user_id = caller.id, stored_ref = %stored.stored_ref, "upload accepted");
    Ok((StatusCode::CREATED, Json(stored)))
}

pub(crate) async fn download_file(
    State(state): State<AppState>,
    Path(stored_ref): Path<String>,
) -> Result<Response, ApiError> {
    let download = state.attachments.open(&stored_ref).await?;
    let file = TokioFile::open(&download.absolute_path)
        .await
        .with_context(|| format!("unable to open {}", download.absolute_path.display()))?;
    let mut response = Response::new(Body::from_stream(ReaderStream::new(file)));
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&download.mime) {
        headers.insert(CONTENT_TYPE, value);
    }
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );
    Ok(response)
}
