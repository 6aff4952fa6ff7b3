use std::sync::Arc;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    routing::{delete, get, patch},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use crate::{
    error::AppError,
    models::{Page, PageQuery, Pagination, Role},
    routes::identity::AdminUser,
    AppState,
};

const RECENT_UPLOADS: u32 = 5;
const USER_ACTIVITY_LIMIT: u32 = 10;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/stats", get(platform_stats))
        .route("/users", get(list_users))
        .route("/users/:user_id", get(user_details).delete(delete_user))
        .route("/users/:user_id/status", patch(update_user_status))
        .route("/users/:user_id/role", patch(update_user_role))
        .route("/uploads", get(list_uploads))
        .route("/uploads/:upload_id", delete(delete_upload))
        .route("/analyses", get(list_analyses))
}

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    page: Option<u32>,
    limit: Option<u32>,
    search: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct RoleRequest {
    role: String,
}

fn bytes_to_mb(bytes: i64) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
}

async fn platform_stats(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
) -> Result<Json<Value>, AppError> {
    tracing::info!("Admin {} requested platform stats", admin.id);
    // Several full-table aggregates; keep them off the async workers.
    let store_state = state.clone();
    let stats = tokio::task::spawn_blocking(move || store_state.store.platform_stats(RECENT_UPLOADS))
        .await
        .map_err(|e| AppError::Internal(format!("stats task failed: {}", e)))??;

    Ok(Json(json!({
        "platform": {
            "totalUsers": stats.total_users,
            "activeUsers": stats.active_users,
            "totalUploads": stats.total_uploads,
            "totalAnalyses": stats.total_analyses,
            "storageUsedMB": bytes_to_mb(stats.storage_used_bytes),
        },
        "recentActivity": {
            "recentUploads": stats.recent_uploads,
        },
        "analytics": {
            "chartTypeStats": stats.chart_type_stats,
        },
    })))
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    AdminUser(_): AdminUser,
    Query(query): Query<UserListQuery>,
) -> Result<Json<Value>, AppError> {
    let page = Page::from_query(PageQuery { page: query.page, limit: query.limit });
    let (users, total) = state.store.list_users(query.search.as_deref(), page)?;
    Ok(Json(json!({
        "users": users,
        "pagination": Pagination::new(page, total),
    })))
}

async fn user_details(
    State(state): State<Arc<AppState>>,
    AdminUser(_): AdminUser,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let user = state
        .store
        .get_user(&user_id)?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;

    let recent = Page { page: 1, limit: USER_ACTIVITY_LIMIT };
    let (uploads, _) = state.store.list_uploads(Some(&user_id), recent)?;
    let (analyses, _) = state.store.list_analyses(Some(&user_id), recent)?;

    Ok(Json(json!({
        "user": user,
        "activity": {
            "uploads": uploads,
            "analyses": analyses,
        },
    })))
}

async fn update_user_status(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<String>,
    payload: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(request) = payload?;
    let user = state
        .store
        .set_user_active(&user_id, request.is_active)?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;

    let verb = if request.is_active { "activated" } else { "deactivated" };
    tracing::info!("Admin {} {} user {}", admin.id, verb, user_id);
    Ok(Json(json!({
        "message": format!("User {verb} successfully"),
        "user": user,
    })))
}

async fn update_user_role(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<String>,
    payload: Result<Json<RoleRequest>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(request) = payload?;
    let role = Role::parse(&request.role)
        .ok_or_else(|| AppError::InvalidInput("Invalid role".to_string()))?;
    let user = state
        .store
        .set_user_role(&user_id, role)?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;

    tracing::info!("Admin {} set role of {} to {}", admin.id, user_id, role.as_str());
    Ok(Json(json!({
        "message": "User role updated successfully",
        "user": user,
    })))
}

async fn delete_user(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let paths = state
        .store
        .delete_user(&user_id)?
        .ok_or_else(|| AppError::NotFound("User".to_string()))?;
    for path in &paths {
        state.files.remove(path).await;
    }

    tracing::info!("Admin {} deleted user {} and {} files", admin.id, user_id, paths.len());
    Ok(Json(json!({ "message": "User and all associated data deleted successfully" })))
}

async fn list_uploads(
    State(state): State<Arc<AppState>>,
    AdminUser(_): AdminUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, AppError> {
    let page = Page::from_query(query);
    let (uploads, total) = state.store.list_uploads(None, page)?;
    Ok(Json(json!({
        "uploads": uploads,
        "pagination": Pagination::new(page, total),
    })))
}

async fn list_analyses(
    State(state): State<Arc<AppState>>,
    AdminUser(_): AdminUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, AppError> {
    let page = Page::from_query(query);
    let (analyses, total) = state.store.list_analyses(None, page)?;
    Ok(Json(json!({
        "analyses": analyses,
        "pagination": Pagination::new(page, total),
    })))
}

async fn delete_upload(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(upload_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let upload = state
        .store
        .delete_upload(&upload_id, None)?
        .ok_or_else(|| AppError::NotFound("Upload".to_string()))?;
    state.files.remove(&upload.file_path).await;

    tracing::info!("Admin {} deleted upload {} of user {}", admin.id, upload_id, upload.user_id);
    Ok(Json(json!({ "message": "Upload and related data deleted successfully" })))
}
