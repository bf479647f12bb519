use super::state::AppState;
use crate::host::Locale;
use crate::notify::{MediaForward, NotifyRequest, NotifyResponse};
use crate::review::group_by_subject;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> axum::response::Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

/// POST /api/notify
/// Send a templated message to a user, or forward media to the admin chat
pub async fn notify(
    State(state): State<AppState>,
    Json(req): Json<NotifyRequest>,
) -> impl IntoResponse {
    let Some(notifier) = state.notifier.clone() else {
        error!("Notify request received but no delivery backend is configured");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "notification delivery is not configured",
        );
    };

    let locale = match req.language_code.as_deref() {
        Some(code) if !code.trim().is_empty() => Locale::from_language_code(Some(code)),
        _ => state.default_locale,
    };
    let notification = req.notification();
    let text = notification.render(locale);

    if req.send_media {
        let Some(admin) = req.admin_chat_id().or_else(|| state.admin_chat_id.clone()) else {
            return error_response(
                StatusCode::BAD_REQUEST,
                "admin_chat_id required for send_media",
            );
        };

        let media = MediaForward {
            photo_url: req.photo_url.clone(),
            video_url: req.video_url.clone(),
            caption: notification,
        };

        return match notifier.forward_media(&admin, &media, locale).await {
            Ok(()) => {
                info!("Forwarded media to {}", admin);
                (
                    StatusCode::OK,
                    Json(NotifyResponse {
                        ok: true,
                        mode: Some("media".to_string()),
                        text: None,
                    }),
                )
                    .into_response()
            }
            Err(e) => {
                error!("Media forward to {} failed: {}", admin, e);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };
    }

    let Some(user_id) = req.user_id() else {
        return error_response(StatusCode::BAD_REQUEST, "user_id required");
    };

    match notifier.notify(&user_id, &notification, locale).await {
        Ok(()) => {
            info!("Notified {} [{}]", user_id, locale);
            (
                StatusCode::OK,
                Json(NotifyResponse {
                    ok: true,
                    mode: None,
                    text: Some(text),
                }),
            )
                .into_response()
        }
        Err(e) => {
            error!("Notification to {} failed: {}", user_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /admin/submissions
/// Stored submissions, normalized and grouped by subject, newest first
pub async fn list_submissions(State(state): State<AppState>) -> impl IntoResponse {
    match state.reader.list_records().await {
        Ok(rows) => (StatusCode::OK, Json(group_by_subject(&rows))).into_response(),
        Err(e) => {
            warn!("Failed to list submissions: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
