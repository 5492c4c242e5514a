use contact_form_mailer::{
    captcha::RecaptchaVerifier, environment::Environment, mailer::SmtpMailer,
    ContactFormMessageHandler,
};
use googletest::prelude::*;
use lambda_http::{http::HeaderValue, Body, Request};
use serde::Deserialize;
use serial_test::serial;
use std::{collections::HashMap, sync::OnceLock, time::Duration};
use test_support::{
    fake_recaptcha::FakeRecaptcha,
    fake_smtp::{start_poisoned_smtp_server, FakeSmtpServer},
    setup_logging,
};
use tokio::time::timeout;

const FAKE_RECAPTCHA_SECRET: &str = "arbitrary secret";
const CORRECT_CAPTCHA_RESPONSE: &str = "correct captcha response";
const VALID_BODY: &str = "name=Ada&email=a%40x.com&phone=555&message=hi";

#[derive(Deserialize, Debug)]
struct ResponsePayload {
    message: String,
    ok: bool,
}

#[derive(Default)]
struct TestEnvironment(HashMap<&'static str, String>);

impl TestEnvironment {
    fn with_mail_configuration() -> Self {
        Self(HashMap::from([
            ("CONTACT_EMAIL_SUBJECT", "Website contact".into()),
            (
                "CONTACT_EMAIL_RECIPIENTS",
                "owner@example.com,sales@example.com".into(),
            ),
            ("CONTACT_EMAIL_USER", "noreply@example.com".into()),
            ("CONTACT_EMAIL_PASSWORD", "fake SMTP password".into()),
        ]))
    }

    fn with_captcha_secret(mut self) -> Self {
        self.0.insert("CAPTCHA_SECRET", FAKE_RECAPTCHA_SECRET.into());
        self
    }

    fn without(mut self, key: &'static str) -> Self {
        self.0.remove(key);
        self
    }
}

impl Environment for TestEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }
}

type Handler = ContactFormMessageHandler<TestEnvironment, RecaptchaVerifier, SmtpMailer>;

async fn handler(environment: TestEnvironment, recaptcha: FakeRecaptcha) -> Handler {
    ContactFormMessageHandler::new(
        environment,
        RecaptchaVerifier::new(recaptcha.start().await),
        SmtpMailer::new(FakeSmtpServer::url()),
    )
}

fn event(body: impl Into<String>) -> Request {
    let mut event = Request::new(Body::Text(body.into()));
    event.headers_mut().append(
        "Content-Type",
        HeaderValue::from_static("application/x-www-form-urlencoded"),
    );
    event
}

fn payload(body: &Body) -> ResponsePayload {
    serde_json::from_slice(body).unwrap()
}

#[googletest::test]
#[tokio::test]
#[serial]
async fn delivers_submission_when_captcha_is_disabled() {
    init().await;
    let subject = handler(
        TestEnvironment::with_mail_configuration(),
        FakeRecaptcha::new(FAKE_RECAPTCHA_SECRET).return_server_error(),
    )
    .await;

    let response = subject.handle(event(VALID_BODY)).await.unwrap();

    expect_that!(response.status().as_u16(), eq(200));
    expect_that!(
        payload(response.body()),
        matches_pattern!(ResponsePayload {
            message: eq("Message sent successfully"),
            ok: eq(true),
        })
    );
    expect_that!(
        timeout(Duration::from_secs(10), fake_smtp().last_mail_content()).await,
        ok(ok(all!(
            contains_substring("From: noreply@example.com"),
            contains_substring("owner@example.com"),
            contains_substring("sales@example.com"),
            contains_substring("Reply-To: a@x.com"),
            contains_substring("Subject: Website contact: [[Ada]]"),
            contains_substring("Name: Ada"),
            contains_substring("Email: a@x.com"),
            contains_substring("Phone: 555"),
            contains_substring("hi")
        )))
    );
}

#[googletest::test]
#[tokio::test]
#[serial]
async fn returns_400_without_delivery_when_phone_is_missing() {
    init().await;
    let subject = handler(
        TestEnvironment::with_mail_configuration(),
        FakeRecaptcha::new(FAKE_RECAPTCHA_SECRET),
    )
    .await;

    let response = subject
        .handle(event("name=Ada&email=a%40x.com&message=hi"))
        .await
        .unwrap();

    expect_that!(response.status().as_u16(), eq(400));
    expect_that!(
        timeout(Duration::from_secs(1), fake_smtp().last_mail_content()).await,
        err(anything())
    );
}

#[googletest::test]
#[tokio::test]
#[serial]
async fn returns_400_without_delivery_when_captcha_response_is_absent() {
    init().await;
    let subject = handler(
        TestEnvironment::with_mail_configuration().with_captcha_secret(),
        FakeRecaptcha::new(FAKE_RECAPTCHA_SECRET).require_response(CORRECT_CAPTCHA_RESPONSE),
    )
    .await;

    let response = subject.handle(event(VALID_BODY)).await.unwrap();

    expect_that!(response.status().as_u16(), eq(400));
    expect_that!(
        payload(response.body()),
        matches_pattern!(ResponsePayload {
            message: eq("Failed reCAPTCHA verification"),
            ok: eq(false),
        })
    );
    expect_that!(
        timeout(Duration::from_secs(1), fake_smtp().last_mail_content()).await,
        err(anything())
    );
}

#[googletest::test]
#[tokio::test]
#[serial]
async fn returns_400_when_captcha_response_is_wrong() {
    init().await;
    let subject = handler(
        TestEnvironment::with_mail_configuration().with_captcha_secret(),
        FakeRecaptcha::new(FAKE_RECAPTCHA_SECRET).require_response(CORRECT_CAPTCHA_RESPONSE),
    )
    .await;

    let response = subject
        .handle(event(format!(
            "{VALID_BODY}&g-recaptcha-response=incorrect+captcha+response"
        )))
        .await
        .unwrap();

    expect_that!(response.status().as_u16(), eq(400));
    expect_that!(
        timeout(Duration::from_secs(1), fake_smtp().last_mail_content()).await,
        err(anything())
    );
}

#[googletest::test]
#[tokio::test]
#[serial]
async fn delivers_submission_when_captcha_response_is_correct() {
    init().await;
    let subject = handler(
        TestEnvironment::with_mail_configuration().with_captcha_secret(),
        FakeRecaptcha::new(FAKE_RECAPTCHA_SECRET).require_response(CORRECT_CAPTCHA_RESPONSE),
    )
    .await;

    let response = subject
        .handle(event(format!(
            "{VALID_BODY}&g-recaptcha-response=correct+captcha+response"
        )))
        .await
        .unwrap();

    expect_that!(response.status().as_u16(), eq(200));
    expect_that!(
        timeout(Duration::from_secs(10), fake_smtp().last_mail_content()).await,
        ok(ok(contains_substring("[[Ada]]")))
    );
}

#[googletest::test]
#[tokio::test]
#[serial]
async fn does_not_deliver_when_captcha_service_fails() {
    init().await;
    let subject = handler(
        TestEnvironment::with_mail_configuration().with_captcha_secret(),
        FakeRecaptcha::new(FAKE_RECAPTCHA_SECRET).return_server_error(),
    )
    .await;

    let response = subject
        .handle(event(format!(
            "{VALID_BODY}&g-recaptcha-response=correct+captcha+response"
        )))
        .await
        .unwrap();

    expect_that!(response.status().as_u16(), eq(400));
    expect_that!(
        timeout(Duration::from_secs(1), fake_smtp().last_mail_content()).await,
        err(anything())
    );
}

#[googletest::test]
#[tokio::test]
#[serial]
async fn returns_500_without_delivery_when_password_is_missing() {
    init().await;
    let subject = handler(
        TestEnvironment::with_mail_configuration().without("CONTACT_EMAIL_PASSWORD"),
        FakeRecaptcha::new(FAKE_RECAPTCHA_SECRET),
    )
    .await;

    let response = subject.handle(event(VALID_BODY)).await.unwrap();

    expect_that!(response.status().as_u16(), eq(500));
    expect_that!(
        payload(response.body()),
        matches_pattern!(ResponsePayload {
            message: eq("Failed to send message."),
            ok: eq(false),
        })
    );
    expect_that!(
        timeout(Duration::from_secs(1), fake_smtp().last_mail_content()).await,
        err(anything())
    );
}

#[googletest::test]
#[tokio::test]
#[serial]
async fn returns_500_when_smtp_server_rejects_mail() {
    init().await;
    let subject = ContactFormMessageHandler::new(
        TestEnvironment::with_mail_configuration(),
        RecaptchaVerifier::new(FakeRecaptcha::new(FAKE_RECAPTCHA_SECRET).start().await),
        SmtpMailer::new(start_poisoned_smtp_server()),
    );

    let response = subject.handle(event(VALID_BODY)).await.unwrap();

    expect_that!(response.status().as_u16(), eq(500));
    expect_that!(
        payload(response.body()),
        matches_pattern!(ResponsePayload {
            message: eq("Failed to send message."),
            ok: eq(false),
        })
    );
    expect_that!(
        response.headers().get("Access-Control-Allow-Origin"),
        some(eq("*"))
    );
}

#[googletest::test]
#[tokio::test]
#[serial]
async fn returns_500_when_smtp_server_is_unreachable() {
    init().await;
    let subject = ContactFormMessageHandler::new(
        TestEnvironment::with_mail_configuration(),
        RecaptchaVerifier::new(FakeRecaptcha::new(FAKE_RECAPTCHA_SECRET).start().await),
        SmtpMailer::new("smtp://nonexistent.host.internal"),
    );

    let response = subject.handle(event(VALID_BODY)).await.unwrap();

    expect_that!(response.status().as_u16(), eq(500));
}

async fn init() {
    setup_logging();
    fake_smtp().start();
    fake_smtp().flush().await;
}

fn fake_smtp() -> &'static FakeSmtpServer {
    static FAKE_SMTP: OnceLock<FakeSmtpServer> = OnceLock::new();
    FAKE_SMTP.get_or_init(FakeSmtpServer::new)
}
