use crate::{
    configuration::MailConfiguration, contact::Contact, environment::Environment,
    message::ComposedMessage,
};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::{Credentials, Mechanism},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use secrecy::ExposeSecret;
use std::{borrow::Cow, fmt::Display};
use tracing::{info, warn};

const SMTP_URL: &str = "smtps://smtp.gmail.com";

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Sends `message` to every configured recipient as a single outbound mail.
    async fn send(
        &self,
        message: &ComposedMessage,
        contact: &Contact,
        configuration: &MailConfiguration,
    ) -> Result<(), DeliveryError>;
}

pub struct SmtpMailer {
    smtp_url: Cow<'static, str>,
}

impl SmtpMailer {
    pub fn new(smtp_url: impl Into<Cow<'static, str>>) -> Self {
        Self {
            smtp_url: smtp_url.into(),
        }
    }

    pub fn from_environment(environment: &impl Environment) -> Self {
        Self::new(
            environment
                .non_empty_var("SMTP_URL")
                .map(Cow::Owned)
                .unwrap_or(SMTP_URL.into()),
        )
    }

    fn build_transport(
        &self,
        configuration: &MailConfiguration,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, DeliveryError> {
        info!("Connecting to {}", self.smtp_url);
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::from_url(&self.smtp_url)
            .map_err(|error| DeliveryError::Transport(error.to_string()))?
            .authentication(vec![Mechanism::Plain]);

        // Credentials are only sent over TLS. A plaintext URL in production then fails
        // authentication at the server instead of exposing the password.
        if self.smtp_url.starts_with("smtps://") {
            builder = builder.credentials(Credentials::new(
                configuration.user.clone(),
                configuration.password.expose_secret().clone(),
            ));
        }

        Ok(builder.build())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(
        &self,
        message: &ComposedMessage,
        contact: &Contact,
        configuration: &MailConfiguration,
    ) -> Result<(), DeliveryError> {
        let email = build_email(message, contact, configuration)?;
        let transport = self.build_transport(configuration)?;
        transport
            .send(email)
            .await
            .map_err(|error| DeliveryError::Transport(error.to_string()))?;
        Ok(())
    }
}

fn build_email(
    message: &ComposedMessage,
    contact: &Contact,
    configuration: &MailConfiguration,
) -> Result<Message, DeliveryError> {
    let from: Mailbox = configuration
        .user
        .parse()
        .map_err(|_| DeliveryError::InvalidAddress(configuration.user.clone()))?;
    let mut builder = Message::builder().from(from);
    for recipient in &configuration.recipients {
        let to: Mailbox = recipient
            .parse()
            .map_err(|_| DeliveryError::InvalidAddress(recipient.clone()))?;
        builder = builder.to(to);
    }
    match contact.email.parse::<Mailbox>() {
        Ok(reply_to) => builder = builder.reply_to(reply_to),
        Err(error) => warn!(
            "Not setting Reply-To since {} is not a valid address: {error}",
            contact.email
        ),
    }
    builder
        .subject(message.subject.as_str())
        .header(ContentType::TEXT_PLAIN)
        .body(message.body.clone())
        .map_err(|error| DeliveryError::Message(error.to_string()))
}

#[derive(Debug)]
pub enum DeliveryError {
    InvalidAddress(String),
    Message(String),
    Transport(String),
}

impl Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryError::InvalidAddress(address) => write!(f, "Invalid address {address}"),
            DeliveryError::Message(error) => write!(f, "Error building message: {error}"),
            DeliveryError::Transport(error) => write!(f, "Error sending message: {error}"),
        }
    }
}

impl std::error::Error for DeliveryError {}
