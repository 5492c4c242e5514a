use crate::{configuration::MailConfiguration, contact::Contact};
use serde::Serialize;
use tinytemplate::{format_unescaped, TinyTemplate};

const MESSAGE_TEMPLATE_NAME: &str = "message-template";
const MESSAGE_TEMPLATE: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/message.txt"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedMessage {
    pub subject: String,
    pub body: String,
}

#[derive(Serialize)]
struct Context<'a> {
    name: &'a str,
    email: &'a str,
    phone: &'a str,
    message: &'a str,
}

/// Renders the plain-text email for a contact.
///
/// Field values are inserted verbatim. The mail is plain text, so nothing is escaped and control
/// characters in the submission reach the recipient unchanged.
pub fn compose_message(contact: &Contact, configuration: &MailConfiguration) -> ComposedMessage {
    ComposedMessage {
        subject: format!("{}: [[{}]]", configuration.subject, contact.name),
        body: render_body(contact),
    }
}

fn render_body(contact: &Contact) -> String {
    let mut tt = TinyTemplate::new();
    tt.set_default_formatter(&format_unescaped);
    tt.add_template(MESSAGE_TEMPLATE_NAME, MESSAGE_TEMPLATE)
        .expect("message template should parse");
    let context = Context {
        name: &contact.name,
        email: &contact.email,
        phone: &contact.phone,
        message: &contact.message,
    };
    tt.render(MESSAGE_TEMPLATE_NAME, &context)
        .expect("message template should render string fields")
}
