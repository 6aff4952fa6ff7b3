use std::sync::Arc;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use crate::{
    error::AppError,
    models::Role,
    routes::identity::CurrentUser,
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(register))
        .route("/me", get(me))
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    name: String,
    email: String,
}

async fn register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let Json(request) = payload?;
    let name = request.name.trim();
    let email = request.email.trim().to_lowercase();
    if name.is_empty() {
        return Err(AppError::InvalidInput("name is required".to_string()));
    }
    if !email.contains('@') {
        return Err(AppError::InvalidInput("a valid email is required".to_string()));
    }

    let role = if state.config.admin_email.as_deref() == Some(email.as_str()) {
        Role::Admin
    } else {
        Role::User
    };
    let user = state.store.create_user(name, &email, role)?;
    tracing::info!("Registered user {} as {}", user.id, role.as_str());

    Ok((StatusCode::CREATED, Json(json!({ "user": user }))))
}

async fn me(CurrentUser(user): CurrentUser) -> Json<Value> {
    Json(json!({ "user": user }))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::TestApp;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn register_then_fetch_profile() {
        let app = TestApp::new().await;
        let (status, body) = app
            .send_json("POST", "/api/users", None, json!({"name": "Ann", "email": "Ann@Example.org"}))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user"]["email"], "ann@example.org");
        assert_eq!(body["user"]["role"], "user");

        let id = body["user"]["id"].as_str().unwrap();
        let user = app.state.store.get_user(id).unwrap().unwrap();
        let (status, me) = app.get("/api/users/me", &user).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["user"]["name"], "Ann");

        let (status, _) = app
            .send_json("POST", "/api/users", None, json!({"name": "Ann", "email": "ann@example.org"}))
            .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn configured_admin_email_gets_admin_role() {
        let app = TestApp::new().await;
        let (_, body) = app
            .send_json("POST", "/api/users", None, json!({"name": "Root", "email": "admin@example.com"}))
            .await;
        assert_eq!(body["user"]["role"], "admin");
    }

    #[tokio::test]
    async fn invalid_registration_is_rejected() {
        let app = TestApp::new().await;
        let (status, _) = app
            .send_json("POST", "/api/users", None, json!({"name": " ", "email": "x@y"}))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
