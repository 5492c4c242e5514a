use crate::environment::Environment;
use secrecy::Secret;
use std::fmt::Display;

const SUBJECT_VARIABLE: &str = "CONTACT_EMAIL_SUBJECT";
const RECIPIENTS_VARIABLE: &str = "CONTACT_EMAIL_RECIPIENTS";
const USER_VARIABLE: &str = "CONTACT_EMAIL_USER";
const PASSWORD_VARIABLE: &str = "CONTACT_EMAIL_PASSWORD";

#[derive(Debug)]
pub struct MailConfiguration {
    pub subject: String,
    pub recipients: Vec<String>,
    pub user: String,
    pub password: Secret<String>,
}

impl MailConfiguration {
    /// Reads the mail configuration, failing on the first variable which is absent or empty.
    pub fn load(environment: &impl Environment) -> Result<Self, ConfigurationError> {
        let subject = required(environment, SUBJECT_VARIABLE)?;
        let recipients = parse_recipients(&required(environment, RECIPIENTS_VARIABLE)?);
        if recipients.is_empty() {
            return Err(ConfigurationError::MissingVariable(RECIPIENTS_VARIABLE));
        }
        let user = required(environment, USER_VARIABLE)?;
        let password = required(environment, PASSWORD_VARIABLE)?;
        Ok(Self {
            subject,
            recipients,
            user,
            password: Secret::new(password),
        })
    }
}

fn required(
    environment: &impl Environment,
    name: &'static str,
) -> Result<String, ConfigurationError> {
    environment
        .non_empty_var(name)
        .ok_or(ConfigurationError::MissingVariable(name))
}

fn parse_recipients(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|recipient| !recipient.is_empty())
        .map(String::from)
        .collect()
}

#[derive(Debug)]
pub enum ConfigurationError {
    MissingVariable(&'static str),
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigurationError::MissingVariable(name) => {
                write!(f, "Missing required configuration for mailing: {name}")
            }
        }
    }
}

impl std::error::Error for ConfigurationError {}
