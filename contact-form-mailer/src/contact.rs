use crate::ContactFormError;
use lambda_http::{http::header::CONTENT_TYPE, Body, Request, RequestPayloadExt};
use serde::Deserialize;

/// The submission as it arrived, before any field has been checked.
#[derive(Deserialize, Debug, Default)]
pub struct ContactForm {
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    message: Option<String>,
    #[serde(rename = "g-recaptcha-response")]
    captcha_response: Option<String>,
}

/// A submission with every required field present and non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub message: String,
}

impl ContactForm {
    /// Decodes the request body.
    ///
    /// Bodies declared as JSON go through [`RequestPayloadExt::payload`]. Everything else is
    /// treated as form encoding, including requests with no or an unrecognised content type.
    pub fn parse(event: &Request) -> Result<Self, ContactFormError> {
        if Self::is_form_encoded(event) {
            return Self::from_urlencoded(Self::body_text(event)?);
        }
        match event.payload::<Self>() {
            Ok(Some(form)) => Ok(form),
            Ok(None) => Self::from_urlencoded(Self::body_text(event)?),
            Err(error) => Err(ContactFormError::MalformedRequest(format!(
                "Invalid payload: {error}"
            ))),
        }
    }

    /// Decodes an `application/x-www-form-urlencoded` body.
    ///
    /// A key given more than once keeps its first value. A `%` not followed by two hex digits, or
    /// escapes which do not decode to UTF-8, make the body malformed.
    pub fn from_urlencoded(body: &str) -> Result<Self, ContactFormError> {
        check_percent_encoding(body)?;
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(body).map_err(|error| {
            ContactFormError::MalformedRequest(format!("Invalid form encoding: {error}"))
        })?;
        let mut form = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "name" => &mut form.name,
                "email" => &mut form.email,
                "phone" => &mut form.phone,
                "message" => &mut form.message,
                "g-recaptcha-response" => &mut form.captcha_response,
                _ => continue,
            };
            slot.get_or_insert(value);
        }
        Ok(form)
    }

    fn body_text(event: &Request) -> Result<&str, ContactFormError> {
        match event.body() {
            Body::Empty => Ok(""),
            Body::Text(text) => Ok(text.as_str()),
            Body::Binary(bytes) => std::str::from_utf8(bytes).map_err(|error| {
                ContactFormError::MalformedRequest(format!("Body is not valid UTF-8: {error}"))
            }),
        }
    }

    // `payload()` decodes form bodies leniently, so they are routed to `from_urlencoded`.
    fn is_form_encoded(event: &Request) -> bool {
        event
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.starts_with("application/x-www-form-urlencoded"))
            .unwrap_or(false)
    }

    /// Checks `name`, `email`, `phone`, `message` in that order and stops at the first one missing.
    pub fn validate(&self) -> Result<Contact, ContactFormError> {
        Ok(Contact {
            name: required("name", &self.name)?,
            email: required("email", &self.email)?,
            phone: required("phone", &self.phone)?,
            message: required("message", &self.message)?,
        })
    }

    pub fn captcha_response(&self) -> &str {
        self.captcha_response.as_deref().unwrap_or_default()
    }
}

/// Rejects malformed `%XX` escapes, which `serde_urlencoded` would otherwise pass through literally
/// or replace with U+FFFD.
fn check_percent_encoding(body: &str) -> Result<(), ContactFormError> {
    for component in body.split('&').flat_map(|pair| pair.splitn(2, '=')) {
        let bytes = component.as_bytes();
        let mut decoded = Vec::with_capacity(bytes.len());
        let mut index = 0;
        while index < bytes.len() {
            if bytes[index] == b'%' {
                let byte = bytes
                    .get(index + 1..index + 3)
                    .filter(|digits| digits.iter().all(u8::is_ascii_hexdigit))
                    .and_then(|digits| std::str::from_utf8(digits).ok())
                    .and_then(|digits| u8::from_str_radix(digits, 16).ok())
                    .ok_or_else(|| {
                        ContactFormError::MalformedRequest(format!(
                            "Invalid form encoding: bad escape at {:?}",
                            String::from_utf8_lossy(&bytes[index..bytes.len().min(index + 3)])
                        ))
                    })?;
                decoded.push(byte);
                index += 3;
            } else {
                decoded.push(bytes[index]);
                index += 1;
            }
        }
        if String::from_utf8(decoded).is_err() {
            return Err(ContactFormError::MalformedRequest(format!(
                "Invalid form encoding: {component:?} does not decode to UTF-8"
            )));
        }
    }
    Ok(())
}

fn required(field: &'static str, value: &Option<String>) -> Result<String, ContactFormError> {
    match value {
        Some(value) if !value.is_empty() => Ok(value.clone()),
        _ => Err(ContactFormError::MissingField(field)),
    }
}
