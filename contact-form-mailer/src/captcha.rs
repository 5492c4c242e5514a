use crate::{contact::ContactForm, environment::Environment};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::borrow::Cow;
use tracing::{error, warn};

pub const CAPTCHA_SECRET_VARIABLE: &str = "CAPTCHA_SECRET";
const RECAPTCHA_VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

pub struct CaptchaChallenge {
    pub secret: Secret<String>,
    pub response: String,
    pub client_ip: Option<String>,
}

#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    /// Asks the verification service whether the response token is valid. Makes exactly one call.
    async fn confirm(&self, challenge: &CaptchaChallenge) -> Result<bool, CaptchaServiceError>;
}

/// The CAPTCHA secret, or `None` when `CAPTCHA_SECRET` is unset or empty.
pub fn captcha_secret(environment: &impl Environment) -> Option<Secret<String>> {
    environment
        .non_empty_var(CAPTCHA_SECRET_VARIABLE)
        .map(Secret::new)
}

/// Decides whether the submission passes the CAPTCHA gate.
///
/// Without a secret, verification is switched off and every submission passes, whatever token it
/// carries. Deployments which want CAPTCHA protection must set `CAPTCHA_SECRET`.
///
/// When verification is on, the gate fails closed: an error talking to the verification service
/// rejects the submission just as an invalid token does.
pub async fn is_captcha_valid(
    verifier: &impl CaptchaVerifier,
    secret: Option<Secret<String>>,
    form: &ContactForm,
    client_ip: Option<String>,
) -> bool {
    let Some(secret) = secret else {
        warn!("{CAPTCHA_SECRET_VARIABLE} is not set; accepting submission without CAPTCHA verification.");
        return true;
    };
    let challenge = CaptchaChallenge {
        secret,
        response: form.captcha_response().into(),
        client_ip,
    };
    match verifier.confirm(&challenge).await {
        Ok(valid) => valid,
        Err(error) => {
            error!("Error verifying CAPTCHA response: {error}");
            error!("Rejecting request since it could not be verified.");
            false
        }
    }
}

/// Verifies responses against Google reCAPTCHA's `siteverify` endpoint.
pub struct RecaptchaVerifier {
    client: Client,
    verify_url: Cow<'static, str>,
}

impl RecaptchaVerifier {
    pub fn new(verify_url: impl Into<Cow<'static, str>>) -> Self {
        Self {
            client: Client::new(),
            verify_url: verify_url.into(),
        }
    }

    pub fn from_environment(environment: &impl Environment) -> Self {
        Self::new(
            environment
                .non_empty_var("RECAPTCHA_VERIFY_URL")
                .map(Cow::Owned)
                .unwrap_or(RECAPTCHA_VERIFY_URL.into()),
        )
    }
}

#[async_trait]
impl CaptchaVerifier for RecaptchaVerifier {
    async fn confirm(&self, challenge: &CaptchaChallenge) -> Result<bool, CaptchaServiceError> {
        let mut form = vec![
            ("secret", challenge.secret.expose_secret().as_str()),
            ("response", challenge.response.as_str()),
        ];
        if let Some(client_ip) = challenge.client_ip.as_deref() {
            form.push(("remoteip", client_ip));
        }
        let response = self
            .client
            .post(self.verify_url.as_ref())
            .form(&form)
            .send()
            .await
            .map_err(CaptchaServiceError::Request)?;
        if !response.status().is_success() {
            return Err(CaptchaServiceError::Status(response.status()));
        }
        let response_body: RecaptchaResponse = response
            .json()
            .await
            .map_err(CaptchaServiceError::Request)?;
        if !response_body.success {
            warn!(
                "reCAPTCHA rejected response: {:?}",
                response_body.error_codes
            );
        }
        Ok(response_body.success)
    }
}

#[derive(Deserialize)]
struct RecaptchaResponse {
    success: bool,
    #[serde(rename = "error-codes", default)]
    error_codes: Vec<String>,
}

#[derive(Debug)]
pub enum CaptchaServiceError {
    Request(reqwest::Error),
    Status(StatusCode),
}

impl std::fmt::Display for CaptchaServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptchaServiceError::Request(error) => write!(f, "Request error: {error}"),
            CaptchaServiceError::Status(status) => {
                write!(f, "Verification service returned status {status}")
            }
        }
    }
}

impl std::error::Error for CaptchaServiceError {}
