//! Request handlers.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::AppState;
use crate::connection::ConnectionStatus;
use crate::error::GatewayError;
use crate::qr;

const LOGIN_HTML: &str = include_str!("login.html");

const NOT_CONNECTED: &str = "Bot belum terhubung atau QR belum dipindai.";
const LOGGED_OUT: &str = "Sesi WhatsApp sudah logout. Perbarui QR code lalu pindai ulang.";

/// JSON failure body: `{success: false, status: false, message, error, code}`.
pub struct ApiError {
    message: String,
    error: GatewayError,
}

impl ApiError {
    /// `fallback` is shown for provider and internal failures; client errors
    /// carry their own text.
    fn new(fallback: &str, error: GatewayError) -> Self {
        let message = match &error {
            GatewayError::NotConnected => NOT_CONNECTED.to_string(),
            GatewayError::Terminal => LOGGED_OUT.to_string(),
            GatewayError::InvalidArgument(msg) => msg.clone(),
            GatewayError::NotFound(path) => format!("File tidak ditemukan: {}", path),
            _ => fallback.to_string(),
        };
        Self { message, error }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.error.code();
        let status =
            StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (
            status,
            Json(json!({
                "success": false,
                "status": false,
                "message": self.message,
                "error": self.error.to_string(),
                "code": code,
            })),
        )
            .into_response()
    }
}

fn bad_body(rejection: JsonRejection) -> ApiError {
    ApiError::new(
        "",
        GatewayError::invalid(format!("invalid JSON body: {}", rejection.body_text())),
    )
}

pub async fn index() -> Redirect {
    Redirect::temporary("/login")
}

pub async fn login_page() -> Html<&'static str> {
    Html(LOGIN_HTML)
}

pub async fn liveness() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Serialize)]
pub struct QrCodeResponse {
    pub status: ConnectionStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qrcode: Option<String>,
}

pub async fn api_qrcode(State(state): State<AppState>) -> Json<QrCodeResponse> {
    let snapshot = state.supervisor.status().snapshot().await;
    Json(QrCodeResponse {
        status: snapshot.status,
        message: snapshot.message().to_string(),
        qrcode: snapshot.qr.map(|qr| qr.data_url),
    })
}

pub async fn api_status(State(state): State<AppState>) -> Json<Value> {
    let snapshot = state.supervisor.status().snapshot().await;
    Json(json!({
        "status": snapshot.status,
        "message": snapshot.message(),
    }))
}

pub async fn qr_png(State(state): State<AppState>) -> Response {
    let snapshot = state.supervisor.status().snapshot().await;
    let Some(payload) = snapshot.qr else {
        let text = if snapshot.status.is_online() {
            "Koneksi berhasil. QR code tidak diperlukan.".to_string()
        } else {
            format!("QR code belum tersedia: {}", snapshot.message())
        };
        return (StatusCode::OK, text).into_response();
    };

    match qr::encode_png(&payload.raw) {
        Ok(png) => ([(header::CONTENT_TYPE, "image/png")], png).into_response(),
        Err(e) => {
            tracing::error!("Failed to render /qr: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Gagal membuat QR code").into_response()
        }
    }
}

pub async fn refresh_qr(State(state): State<AppState>) -> Json<Value> {
    if state.supervisor.refresh() {
        Json(json!({ "status": true, "message": "Sesi dimulai ulang, tunggu QR code baru." }))
    } else {
        Json(json!({ "status": false, "message": "Supervisor koneksi tidak berjalan." }))
    }
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub jid: Option<String>,
    /// Phone number; clients send it as a string or a bare JSON number
    pub number: Option<Value>,
    pub message: Option<String>,
}

impl SendMessageRequest {
    fn recipient(&self) -> Option<String> {
        if let Some(jid) = self.jid.as_deref().filter(|j| !j.trim().is_empty()) {
            return Some(jid.to_string());
        }
        match self.number.as_ref()? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

pub async fn send_message(
    State(state): State<AppState>,
    body: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = body.map_err(bad_body)?;
    tracing::info!(
        "[send-message] request received: jid={:?} number={:?}",
        request.jid,
        request.number
    );

    if let Err(e) = state.gateway.ensure_online().await {
        tracing::warn!("[send-message] rejected: {}", e);
        return Err(ApiError::new("", e));
    }
    let (Some(recipient), Some(message)) = (request.recipient(), request.message.as_deref())
    else {
        return Err(ApiError::new(
            "",
            GatewayError::invalid("Harap sediakan jid (atau number) dan message."),
        ));
    };

    let receipt = state
        .gateway
        .send_text(&recipient, message)
        .await
        .map_err(|e| ApiError::new("Gagal mengirim pesan.", e))?;

    Ok(Json(json!({
        "success": true,
        "status": true,
        "message": "Pesan berhasil dikirim.",
        "data": receipt,
    })))
}

#[derive(Debug, Deserialize)]
pub struct SendImageRequest {
    pub jid: Option<String>,
    pub caption: Option<String>,
    pub file_path: Option<String>,
}

pub async fn send_local_image(
    State(state): State<AppState>,
    body: Result<Json<SendImageRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(request) = body.map_err(bad_body)?;
    tracing::info!(
        "[send-local-image] request received: jid={:?} file_path={:?}",
        request.jid,
        request.file_path
    );

    if let Err(e) = state.gateway.ensure_online().await {
        tracing::warn!("[send-local-image] rejected: {}", e);
        return Err(ApiError::new("", e));
    }
    let (Some(jid), Some(file_path)) = (request.jid.as_deref(), request.file_path.as_deref())
    else {
        return Err(ApiError::new(
            "",
            GatewayError::invalid("Harap sediakan jid dan file_path."),
        ));
    };

    let receipt = state
        .gateway
        .send_image(jid, file_path, request.caption.as_deref())
        .await
        .map_err(|e| ApiError::new("Gagal mengirim gambar.", e))?;

    Ok(Json(json!({
        "success": true,
        "status": true,
        "message": "Gambar berhasil dikirim.",
        "data": receipt,
    })))
}

pub async fn get_groups(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let groups = state
        .gateway
        .list_groups()
        .await
        .map_err(|e| ApiError::new("Gagal mendapatkan daftar grup.", e))?;
    Ok(Json(json!({ "success": true, "groups": groups })))
}
