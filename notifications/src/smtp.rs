//! SMTP sink using Lettre.

use crate::message::EmailMessage;
use crate::sink::{EmailSink, SinkError, SinkFuture};
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};

/// Port on which the server expects TLS from the first byte.
const IMPLICIT_TLS_PORT: u16 = 465;

/// Sends plain-text e-mails through an SMTP relay.
///
/// Port 465 uses implicit TLS; any other port upgrades with STARTTLS. The
/// transport is built once and shared; each send runs on the blocking pool.
///
/// # Examples
///
/// ```ignore
/// use book_exchange_notifications::SmtpEmailSink;
///
/// let sink = SmtpEmailSink::new(
///     "smtp.gmail.com",
///     587,
///     "user@gmail.com".to_string(),
///     "app_password".to_string(),
///     "Book Exchange <noreply@example.com>",
/// )?;
/// ```
#[derive(Clone)]
pub struct SmtpEmailSink {
    transport: SmtpTransport,
    from: Mailbox,
}

impl SmtpEmailSink {
    /// Create a sink for `host:port`, authenticating when `username` is set.
    ///
    /// # Errors
    ///
    /// - [`SinkError::InvalidAddress`] if `sender` is not a mailbox
    /// - [`SinkError::Transport`] if the relay cannot be configured for `host`
    pub fn new(
        host: &str,
        port: u16,
        username: String,
        password: String,
        sender: &str,
    ) -> Result<Self, SinkError> {
        let from: Mailbox = sender
            .parse()
            .map_err(|e| SinkError::InvalidAddress(format!("sender {sender:?}: {e}")))?;

        let relay = if port == IMPLICIT_TLS_PORT {
            SmtpTransport::relay(host)
        } else {
            SmtpTransport::starttls_relay(host)
        };
        let mut builder = relay
            .map_err(|e| SinkError::Transport(format!("SMTP relay error: {e}")))?
            .port(port);
        if !username.is_empty() {
            builder = builder.credentials(Credentials::new(username, password));
        }

        tracing::info!(host, port, sender = %from, "SMTP sink configured");
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn compose(&self, message: &EmailMessage) -> Result<Message, SinkError> {
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|e| SinkError::InvalidAddress(format!("recipient {:?}: {e}", message.to)))?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .map_err(|e| SinkError::Build(e.to_string()))
    }
}

impl EmailSink for SmtpEmailSink {
    fn send<'a>(&'a self, message: &'a EmailMessage) -> SinkFuture<'a> {
        Box::pin(async move {
            let email = self.compose(message)?;
            let mailer = self.transport.clone();

            tokio::task::spawn_blocking(move || {
                mailer
                    .send(&email)
                    .map_err(|e| SinkError::Transport(e.to_string()))
            })
            .await
            .map_err(|e| SinkError::Transport(format!("Email task failed: {e}")))?
            .map(|_| ())
        })
    }
}
