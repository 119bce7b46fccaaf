use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};

use super::Notifier;
use crate::config::SmtpConfig;

/// Sends HTML mail through an SMTP relay.
pub struct SmtpNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn new(config: &SmtpConfig) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let from: Mailbox = config.from.parse()?;
        let mailer = match (&config.user, &config.pass) {
            (Some(user), Some(pass)) => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(
                &config.host,
            )?
                .port(config.port)
                .credentials(Credentials::new(user.clone(), pass.clone()))
                .build(),
            _ => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
                .port(config.port)
                .build(),
        };
        Ok(Self { mailer, from })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> bool {
        let to: Mailbox = match to.parse() {
            Ok(to) => to,
            Err(e) => {
                tracing::warn!(to, error = %e, "Invalid recipient address");
                return false;
            }
        };
        let email = match Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html_body.to_string())
        {
            Ok(email) => email,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to build email");
                return false;
            }
        };
        match self.mailer.send(email).await {
            Ok(_) => {
                tracing::info!(subject, "Email sent");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to send email");
                false
            }
        }
    }
}
