//! SMTP delivery for account emails.

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use super::{MailError, Mailer, RecoveryMessage};
use crate::config::EmailConfig;

/// Sends mail through the SMTP server from the main config file
pub struct SmtpMailer {
    config: EmailConfig,
}

impl SmtpMailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Build a multipart message with HTML and plain text versions
    fn build_message(
        &self,
        to_email: &str,
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> Result<Message, MailError> {
        let from_address = self
            .config
            .from_address
            .as_ref()
            .ok_or_else(|| MailError::NotConfigured("from address".to_string()))?;

        let from_mailbox = format!("{} <{}>", self.config.from_name, from_address);
        let from: Mailbox = from_mailbox
            .parse()
            .map_err(|e| MailError::Address(format!("{}: {}", from_mailbox, e)))?;
        let to: Mailbox = to_email
            .parse()
            .map_err(|e| MailError::Address(format!("{}: {}", to_email, e)))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )
            .map_err(|e| MailError::Build(e.to_string()))
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, MailError> {
        let smtp_host = self
            .config
            .smtp_host
            .as_ref()
            .ok_or_else(|| MailError::NotConfigured("SMTP host".to_string()))?;

        let mailer = if self.config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)
                .map_err(|e| MailError::Transport(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer
        };

        Ok(mailer.build())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_recovery(&self, message: &RecoveryMessage) -> Result<(), MailError> {
        let subject = message.subject();
        let email = self.build_message(
            &message.to_email,
            &subject,
            &message.html_body(),
            &message.text_body(),
        )?;

        self.transport()?
            .send(email)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;

        tracing::info!(
            to = %message.to_email,
            subject = %subject,
            "Email sent successfully"
        );
        Ok(())
    }
}
