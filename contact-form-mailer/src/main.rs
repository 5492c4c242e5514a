use contact_form_mailer::{
    captcha::RecaptchaVerifier, environment::ProcessEnvironment, mailer::SmtpMailer,
    ContactFormMessageHandler,
};
use lambda_http::{run, service_fn, Error};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();

    let environment = ProcessEnvironment;
    let handler = ContactFormMessageHandler::new(
        environment,
        RecaptchaVerifier::from_environment(&environment),
        SmtpMailer::from_environment(&environment),
    );
    run(service_fn(|event| handler.handle(event))).await
}
