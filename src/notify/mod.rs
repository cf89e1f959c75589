//! Loss notifications
//!
//! The monitor only knows the [`Notifier`] capability. [`SmtpNotifier`] sends
//! the configured HTML template over STARTTLS with username/password login.

use crate::core::{Error, Event, NotificationSettings, Result};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::fs;
use std::path::PathBuf;

/// Something that can deliver a message
pub trait Notifier {
    fn notify(&self, subject: &str, body: &str) -> Result<()>;
}

/// Email delivery over authenticated SMTP
pub struct SmtpNotifier {
    transport: SmtpTransport,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpNotifier {
    pub fn new(settings: &NotificationSettings) -> Result<Self> {
        let from: Mailbox = settings
            .from
            .parse()
            .map_err(|e| Error::Config(format!("invalid sender {:?}: {}", settings.from, e)))?;
        let to: Mailbox = settings
            .to
            .parse()
            .map_err(|e| Error::Config(format!("invalid recipient {:?}: {}", settings.to, e)))?;

        let transport = SmtpTransport::starttls_relay(&settings.host)
            .map_err(|e| Error::Config(format!("invalid SMTP host {:?}: {}", settings.host, e)))?
            .port(settings.port)
            .credentials(Credentials::new(settings.user.clone(), settings.secret.clone()))
            .build();

        Ok(Self { transport, from, to })
    }
}

impl Notifier for SmtpNotifier {
    fn notify(&self, subject: &str, body: &str) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body.to_string())
            .map_err(|e| Error::Notification(format!("failed to build message: {}", e)))?;

        self.transport
            .send(&message)
            .map_err(|e| Error::Notification(format!("SMTP delivery failed: {}", e)))?;

        log::info!("Successfully sent email to {}", self.to);
        Ok(())
    }
}

/// Sends the notification template whenever it is handed an event
pub struct Alert {
    notifier: Box<dyn Notifier>,
    subject: String,
    template: PathBuf,
}

impl Alert {
    pub fn new(notifier: impl Notifier + 'static, subject: &str, template: PathBuf) -> Self {
        Self {
            notifier: Box::new(notifier),
            subject: subject.to_string(),
            template,
        }
    }

    /// Build an SMTP-backed alert from the resolved settings
    pub fn smtp(settings: &NotificationSettings) -> Result<Self> {
        Ok(Self::new(
            SmtpNotifier::new(settings)?,
            &settings.subject,
            settings.template.clone(),
        ))
    }

    /// Read the template and deliver it
    pub fn send(&self, event: &Event) -> Result<()> {
        let body = fs::read_to_string(&self.template).map_err(|e| {
            Error::Notification(format!(
                "cannot read template {}: {}",
                self.template.display(),
                e
            ))
        })?;

        log::debug!(
            "Sending {} notification for reading {} (#{})",
            event.kind,
            event.reading.value,
            event.count
        );
        self.notifier.notify(&self.subject, &body)
    }
}
