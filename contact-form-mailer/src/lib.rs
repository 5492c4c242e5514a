pub mod captcha;
pub mod configuration;
pub mod contact;
pub mod environment;
pub mod mailer;
pub mod message;

use captcha::{captcha_secret, is_captcha_valid, CaptchaVerifier};
use configuration::{ConfigurationError, MailConfiguration};
use contact::ContactForm;
use environment::Environment;
use lambda_http::{
    http::{header, StatusCode},
    request::RequestContext,
    Body, Error, Request, RequestExt, Response,
};
use mailer::{DeliveryError, Mailer};
use message::compose_message;
use serde::Serialize;
use tracing::{error, info};

const SUCCESS_MESSAGE: &str = "Message sent successfully";
const MISSING_FIELDS_MESSAGE: &str = "Missing required contact form fields.";
const CAPTCHA_FAILED_MESSAGE: &str = "Failed reCAPTCHA verification";
const SEND_FAILED_MESSAGE: &str = "Failed to send message.";

/// Runs one contact form submission through parsing, CAPTCHA verification, configuration,
/// composition and delivery, and turns the outcome into exactly one response.
pub struct ContactFormMessageHandler<EnvironmentT, CaptchaVerifierT, MailerT> {
    environment: EnvironmentT,
    captcha_verifier: CaptchaVerifierT,
    mailer: MailerT,
}

impl<EnvironmentT, CaptchaVerifierT, MailerT>
    ContactFormMessageHandler<EnvironmentT, CaptchaVerifierT, MailerT>
where
    EnvironmentT: Environment,
    CaptchaVerifierT: CaptchaVerifier,
    MailerT: Mailer,
{
    pub fn new(
        environment: EnvironmentT,
        captcha_verifier: CaptchaVerifierT,
        mailer: MailerT,
    ) -> Self {
        Self {
            environment,
            captcha_verifier,
            mailer,
        }
    }

    pub async fn handle(&self, event: Request) -> Result<Response<Body>, Error> {
        match self.process_message(&event).await {
            Ok(()) => build_response(StatusCode::OK, SUCCESS_MESSAGE, true),
            Err(error) => {
                error.log();
                error.into_response()
            }
        }
    }

    async fn process_message(&self, event: &Request) -> Result<(), ContactFormError> {
        let secret = captcha_secret(&self.environment);
        let form = ContactForm::parse(event)?;
        let contact = form.validate()?;
        if !is_captcha_valid(&self.captcha_verifier, secret, &form, source_ip(event)).await {
            return Err(ContactFormError::CaptchaFailed);
        }
        let configuration =
            MailConfiguration::load(&self.environment).map_err(ContactFormError::Configuration)?;
        let message = compose_message(&contact, &configuration);
        self.mailer
            .send(&message, &contact, &configuration)
            .await
            .map_err(ContactFormError::Delivery)?;
        info!("{}", delivery_summary(&configuration));
        Ok(())
    }
}

fn delivery_summary(configuration: &MailConfiguration) -> String {
    format!(
        "Delivered contact form message to {} recipient(s)",
        configuration.recipients.len()
    )
}

/// The caller's address as reported by API Gateway, falling back to `X-Forwarded-For`.
fn source_ip(event: &Request) -> Option<String> {
    let from_context = match event.request_context_ref() {
        Some(RequestContext::ApiGatewayV1(context)) => context.identity.source_ip.clone(),
        Some(RequestContext::ApiGatewayV2(context)) => context.http.source_ip.clone(),
        _ => None,
    };
    from_context.or_else(|| {
        event
            .headers()
            .get("X-Forwarded-For")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

#[derive(Serialize)]
struct ResponsePayload<'a> {
    message: &'a str,
    ok: bool,
}

fn build_response(status: StatusCode, message: &str, ok: bool) -> Result<Response<Body>, Error> {
    let payload = serde_json::to_string(&ResponsePayload { message, ok })?;
    Ok(Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .body(payload.into())?)
}

#[derive(Debug)]
pub enum ContactFormError {
    MalformedRequest(String),
    MissingField(&'static str),
    CaptchaFailed,
    Configuration(ConfigurationError),
    Delivery(DeliveryError),
}

impl ContactFormError {
    fn log(&self) {
        match self {
            ContactFormError::MalformedRequest(_)
            | ContactFormError::MissingField(_)
            | ContactFormError::CaptchaFailed => {
                error!("Client error sending contact form email: {self}");
            }
            ContactFormError::Configuration(_) | ContactFormError::Delivery(_) => {
                error!("Internal error sending contact form email: {self}");
            }
        }
    }

    fn into_response(self) -> Result<Response<Body>, Error> {
        match self {
            ContactFormError::MalformedRequest(description) => {
                build_response(StatusCode::BAD_REQUEST, &description, false)
            }
            ContactFormError::MissingField(_) => {
                build_response(StatusCode::BAD_REQUEST, MISSING_FIELDS_MESSAGE, false)
            }
            ContactFormError::CaptchaFailed => {
                build_response(StatusCode::BAD_REQUEST, CAPTCHA_FAILED_MESSAGE, false)
            }
            ContactFormError::Configuration(_) | ContactFormError::Delivery(_) => build_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                SEND_FAILED_MESSAGE,
                false,
            ),
        }
    }
}

impl std::fmt::Display for ContactFormError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContactFormError::MalformedRequest(description) => {
                write!(f, "Malformed request: {description}")
            }
            ContactFormError::MissingField(field) => write!(f, "Missing field {field}"),
            ContactFormError::CaptchaFailed => write!(f, "{CAPTCHA_FAILED_MESSAGE}"),
            ContactFormError::Configuration(error) => write!(f, "{error}"),
            ContactFormError::Delivery(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for ContactFormError {}
