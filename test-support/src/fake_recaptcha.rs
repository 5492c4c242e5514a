use axum::{
    extract::{Form, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use tokio::net::TcpListener;

const VERIFY_PATH: &str = "/recaptcha/api/siteverify";

/// An in-process stand-in for Google's reCAPTCHA `siteverify` endpoint.
#[derive(Clone)]
pub struct FakeRecaptcha {
    required_secret: Cow<'static, str>,
    required_response: Option<String>,
    return_invalid_response: bool,
    return_server_error: bool,
}

#[derive(Deserialize)]
struct VerifyRequestPayload {
    secret: String,
    #[serde(default)]
    response: String,
    #[allow(unused)]
    remoteip: Option<String>,
}

#[derive(Serialize)]
struct VerifyResponsePayload {
    success: bool,
    #[serde(rename = "error-codes")]
    error_codes: Vec<String>,
}

impl FakeRecaptcha {
    pub fn new(required_secret: impl Into<Cow<'static, str>>) -> Self {
        Self {
            required_secret: required_secret.into(),
            required_response: None,
            return_invalid_response: false,
            return_server_error: false,
        }
    }

    pub fn require_response(self, required_response: impl AsRef<str>) -> Self {
        Self {
            required_response: Some(required_response.as_ref().into()),
            ..self
        }
    }

    pub fn return_invalid_response(self) -> Self {
        Self {
            return_invalid_response: true,
            ..self
        }
    }

    pub fn return_server_error(self) -> Self {
        Self {
            return_server_error: true,
            ..self
        }
    }

    /// Serves on an ephemeral local port and returns the verification URL.
    pub async fn start(self) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let app = Router::new()
            .route(VERIFY_PATH, post(verify))
            .with_state(self);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{address}{VERIFY_PATH}")
    }
}

async fn verify(
    State(state): State<FakeRecaptcha>,
    Form(payload): Form<VerifyRequestPayload>,
) -> Response {
    if state.return_server_error {
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    } else if state.return_invalid_response {
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain")],
            "Invalid response",
        )
            .into_response()
    } else if payload.secret != state.required_secret {
        rejection("invalid-input-secret")
    } else if payload.response.is_empty() {
        rejection("missing-input-response")
    } else if state.required_response.is_some()
        && Some(&payload.response) != state.required_response.as_ref()
    {
        rejection("invalid-input-response")
    } else {
        Json(VerifyResponsePayload {
            success: true,
            error_codes: vec![],
        })
        .into_response()
    }
}

fn rejection(error_code: &str) -> Response {
    Json(VerifyResponsePayload {
        success: false,
        error_codes: vec![error_code.into()],
    })
    .into_response()
}
