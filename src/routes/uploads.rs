use std::sync::Arc;
use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;
use crate::{
    error::AppError,
    models::{Page, PageQuery, Pagination, Upload, UploadStatus},
    routes::identity::CurrentUser,
    services::excel::{self, utils::is_excel_upload},
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_uploads).post(upload_file))
        .route("/:upload_id", get(get_upload).delete(delete_upload))
}

struct IncomingFile {
    original_name: String,
    mime_type: String,
    data: Bytes,
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(err.body_text())
    } else {
        AppError::InvalidInput(err.body_text())
    }
}

async fn read_file_field(multipart: &mut Multipart) -> Result<Option<IncomingFile>, AppError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let original_name = field.file_name().unwrap_or("upload").to_string();
        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field.bytes().await.map_err(multipart_error)?;
        return Ok(Some(IncomingFile { original_name, mime_type, data }));
    }
    Ok(None)
}

async fn upload_file(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let start = std::time::Instant::now();

    let file = read_file_field(&mut multipart)
        .await?
        .ok_or_else(|| AppError::InvalidInput("No file uploaded".to_string()))?;

    tracing::info!(
        "Upload from user {}: {} ({}, {}KB)",
        user.id,
        file.original_name,
        file.mime_type,
        file.data.len() / 1024
    );

    if !is_excel_upload(&file.original_name, &file.mime_type) {
        return Err(AppError::InvalidInput(
            "Only Excel files (.xls, .xlsx) are allowed".to_string(),
        ));
    }
    if file.data.len() > state.config.max_file_size {
        return Err(AppError::PayloadTooLarge(format!(
            "limit is {} bytes",
            state.config.max_file_size
        )));
    }

    let stored = state.files.save(&file.original_name, &file.data).await?;
    let file_size = file.data.len() as u64;
    let data = file.data;

    let ingested = tokio::task::spawn_blocking(move || excel::ingest(data))
        .await
        .map_err(|e| AppError::Internal(format!("ingestion task failed: {}", e)))
        .and_then(|result| result);

    let sheets = match ingested {
        Ok(sheets) => sheets,
        Err(e) => {
            // The upload is rejected as a whole; drop the file we just wrote.
            state.files.remove(&stored.path).await;
            return Err(e);
        }
    };

    let upload = Upload {
        id: Uuid::new_v4().to_string(),
        user_id: user.id.clone(),
        filename: stored.filename.clone(),
        original_name: file.original_name,
        file_path: stored.path.to_string_lossy().into_owned(),
        file_size,
        mime_type: file.mime_type,
        status: UploadStatus::Processed,
        sheets,
        error_message: None,
        upload_date: Utc::now(),
    };

    if let Err(e) = state.store.insert_upload(&upload) {
        state.files.remove(&stored.path).await;
        return Err(e);
    }

    tracing::info!(
        "Upload {} processed with {} sheets in {:?}",
        upload.id,
        upload.sheets.len(),
        start.elapsed()
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "File uploaded and processed successfully",
            "upload": upload,
        })),
    ))
}

async fn list_uploads(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, AppError> {
    let page = Page::from_query(query);
    let (uploads, total) = state.store.list_uploads(Some(&user.id), page)?;
    Ok(Json(json!({
        "uploads": uploads,
        "pagination": Pagination::new(page, total),
    })))
}

async fn get_upload(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(upload_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let upload = state
        .store
        .get_upload(&upload_id, Some(&user.id))?
        .ok_or_else(|| AppError::NotFound("Upload".to_string()))?;
    Ok(Json(json!({ "upload": upload })))
}

async fn delete_upload(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(upload_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let upload = state
        .store
        .delete_upload(&upload_id, Some(&user.id))?
        .ok_or_else(|| AppError::NotFound("Upload".to_string()))?;
    state.files.remove(&upload.file_path).await;

    tracing::info!("User {} deleted upload {}", user.id, upload_id);
    Ok(Json(json!({ "message": "Upload deleted successfully" })))
}

#[cfg(test)]
mod tests {
    use crate::models::Role;
    use crate::routes::test_support::{workbook, TestApp, XLSX_MIME};
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    #[tokio::test]
    async fn upload_builds_sheet_previews() {
        let app = TestApp::new().await;
        let user = app.user("Ann", Role::User);
        let data = workbook(&[("Sheet1", vec![
            vec![json!("Month"), json!("Sales")],
            vec![json!("Jan"), json!(10)],
            vec![json!("Feb"), json!(20)],
            vec![json!("Mar"), json!("bad")],
        ])]);

        let (status, body) = app.upload(&user, "sales.xlsx", XLSX_MIME, &data).await;
        assert_eq!(status, StatusCode::CREATED);
        let sheet = &body["upload"]["sheets"][0];
        assert_eq!(sheet["rowCount"], 3);
        assert_eq!(sheet["columnCount"], 2);
        assert_eq!(sheet["headers"], json!(["Month", "Sales"]));
        assert_eq!(body["upload"]["status"], "processed");
        assert!(body["upload"].get("filePath").is_none());
        assert_eq!(app.stored_files(), 1);

        let owner = app.state.store.get_user(&user.id).unwrap().unwrap();
        assert_eq!(owner.upload_count, 1);
        assert_eq!(owner.total_storage_used, data.len() as i64);
    }

    #[tokio::test]
    async fn long_sheet_stores_first_hundred_rows() {
        let app = TestApp::new().await;
        let user = app.user("Ann", Role::User);
        let mut rows = vec![vec![json!("Row"), json!("Value")]];
        rows.extend((1..=150).map(|i| vec![json!(format!("r{i}")), json!(i)]));

        let (status, body) = app
            .upload(&user, "long.xlsx", XLSX_MIME, &workbook(&[("Long", rows)]))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let sheet = &body["upload"]["sheets"][0];
        assert_eq!(sheet["rowCount"], 150);
        assert_eq!(sheet["data"].as_array().unwrap().len(), 100);
    }

    #[tokio::test]
    async fn all_empty_workbook_is_rejected_and_file_removed() {
        let app = TestApp::new().await;
        let user = app.user("Ann", Role::User);
        let data = workbook(&[("A", vec![]), ("B", vec![])]);

        let (status, body) = app.upload(&user, "empty.xlsx", XLSX_MIME, &data).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No valid data found in Excel file");
        assert_eq!(app.stored_files(), 0);
        assert_eq!(app.state.store.get_user(&user.id).unwrap().unwrap().upload_count, 0);
    }

    #[tokio::test]
    async fn corrupt_workbook_is_rejected_and_file_removed() {
        let app = TestApp::new().await;
        let user = app.user("Ann", Role::User);

        let (status, body) = app.upload(&user, "broken.xlsx", XLSX_MIME, b"not a zip").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid Excel file format"));
        assert_eq!(app.stored_files(), 0);
    }

    #[tokio::test]
    async fn non_excel_files_are_refused() {
        let app = TestApp::new().await;
        let user = app.user("Ann", Role::User);

        let (status, _) = app.upload(&user, "notes.txt", "text/plain", b"hello").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(app.stored_files(), 0);
    }

    #[tokio::test]
    async fn uploads_are_private_and_deletable() {
        let app = TestApp::new().await;
        let ann = app.user("Ann", Role::User);
        let bob = app.user("Bob", Role::User);
        let data = workbook(&[("S", vec![vec![json!("A")], vec![json!(1)]])]);
        let (_, body) = app.upload(&ann, "a.xlsx", XLSX_MIME, &data).await;
        let id = body["upload"]["id"].as_str().unwrap().to_string();

        let (status, _) = app.get(&format!("/api/upload/{id}"), &bob).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, list) = app.get("/api/upload?page=1&limit=5", &ann).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list["pagination"]["total"], 1);
        assert_eq!(list["uploads"][0]["id"], Value::String(id.clone()));
        assert_eq!(list["uploads"][0]["user"]["name"], "Ann");

        let (status, _) = app.delete(&format!("/api/upload/{id}"), &ann).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(app.stored_files(), 0);
        let (status, _) = app.delete(&format!("/api/upload/{id}"), &ann).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn page_past_the_end_is_empty() {
        let app = TestApp::new().await;
        let user = app.user("Ann", Role::User);
        let data = workbook(&[("S", vec![vec![json!("A")], vec![json!(1)]])]);
        app.upload(&user, "a.xlsx", XLSX_MIME, &data).await;

        let (status, list) = app.get("/api/upload?page=4294967295&limit=10", &user).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list["uploads"], json!([]));
        assert_eq!(list["pagination"]["total"], 1);
        assert_eq!(list["pagination"]["page"], 4294967295u64);
    }

    #[tokio::test]
    async fn missing_identity_is_unauthorized() {
        let app = TestApp::new().await;
        let (status, body) = app.send_json("GET", "/api/upload", None, Value::Null).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());
    }
}
