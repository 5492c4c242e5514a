use log::debug;
use mailin_embedded::{Handler, Server, SslConfig};
use std::{net::IpAddr, sync::Arc, time::Duration};
use tokio::{
    sync::watch::{self, error::RecvError, Receiver, Sender},
    time::timeout,
};

const SMTP_PORT: u16 = 4567;
const POISONED_SMTP_PORT: u16 = 4568;

const SERVER_NAME: &str = "mail.example.com";

#[derive(Clone)]
struct RecordingSmtpHandler(Vec<u8>, Arc<Sender<String>>);

impl Handler for RecordingSmtpHandler {
    fn data(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.0.extend(buf);
        Ok(())
    }

    fn data_end(&mut self) -> mailin_embedded::Response {
        let content = String::from_utf8_lossy(&self.0.drain(..).collect::<Vec<_>>()).into_owned();
        debug!("Received mail:\n{content}");
        let _ = self.1.send(content);
        mailin_embedded::response::OK
    }
}

/// A loopback SMTP server at [`FakeSmtpServer::url`] which accepts every mail and publishes its
/// content.
pub struct FakeSmtpServer(
    std::sync::Mutex<Option<Server<RecordingSmtpHandler>>>,
    tokio::sync::Mutex<Receiver<String>>,
);

impl FakeSmtpServer {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel("".into());
        let handler = RecordingSmtpHandler(Vec::new(), Arc::new(sender));
        let server = loopback_server(handler, SMTP_PORT);
        Self(
            std::sync::Mutex::new(Some(server)),
            tokio::sync::Mutex::new(receiver),
        )
    }

    /// Starts serving on a background thread. Calling this again is a no-op.
    pub fn start(&self) {
        let mut guard = self.0.lock().unwrap();
        if let Some(server) = guard.take() {
            std::thread::spawn(move || {
                let _ = server.serve();
            });
        }
    }

    /// Waits for the next mail to arrive and returns its raw content.
    pub async fn last_mail_content(&self) -> Result<String, RecvError> {
        let mut receiver = self.1.lock().await;
        receiver.changed().await?;
        let content = receiver.borrow_and_update().clone();
        drop(receiver);
        Ok(content)
    }

    /// Discards any mail received since the last call to [`Self::last_mail_content`].
    pub async fn flush(&self) {
        let mut receiver = self.1.lock().await;
        let _ = timeout(Duration::from_millis(100), receiver.changed()).await;
        receiver.borrow_and_update();
    }

    pub fn url() -> String {
        smtp_url(SMTP_PORT)
    }
}

impl Default for FakeSmtpServer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
struct PoisonedSmtpHandler;

impl Handler for PoisonedSmtpHandler {
    fn helo(&mut self, _ip: IpAddr, _domain: &str) -> mailin_embedded::Response {
        mailin_embedded::response::INTERNAL_ERROR
    }

    fn mail(&mut self, _ip: IpAddr, _domain: &str, _from: &str) -> mailin_embedded::Response {
        mailin_embedded::response::INTERNAL_ERROR
    }
}

/// Starts an SMTP server which rejects every mail, and returns its URL.
pub fn start_poisoned_smtp_server() -> String {
    let server = loopback_server(PoisonedSmtpHandler, POISONED_SMTP_PORT);
    std::thread::spawn(move || {
        let _ = server.serve();
    });
    smtp_url(POISONED_SMTP_PORT)
}

fn loopback_server<H: Handler + Clone + Send + 'static>(handler: H, port: u16) -> Server<H> {
    let mut server = Server::new(handler);
    server
        .with_name(SERVER_NAME)
        .with_ssl(SslConfig::None)
        .expect("Plain-text SMTP should always be configurable")
        .with_addr(format!("127.0.0.1:{port}"))
        .expect("Loopback address should parse");
    server
}

fn smtp_url(port: u16) -> String {
    format!("smtp://127.0.0.1:{port}")
}
