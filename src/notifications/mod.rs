//! Outbound mail collaborator.
//!
//! The account subsystem only composes messages; delivery goes through the
//! [`Mailer`] trait so the SMTP transport can be swapped out or disabled.

pub mod email;

use async_trait::async_trait;
use thiserror::Error;

pub use email::SmtpMailer;

use crate::config::EmailConfig;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail is not configured: {0}")]
    NotConfigured(String),

    #[error("invalid address: {0}")]
    Address(String),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("mail transport failed: {0}")]
    Transport(String),
}

/// Account-recovery message sent by the forgot-password flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryMessage {
    pub to_email: String,
    pub username: String,
}

impl RecoveryMessage {
    pub fn subject(&self) -> String {
        "Your Mealplan account".to_string()
    }

    pub fn text_body(&self) -> String {
        format!(
            r#"Hi,

Someone asked for the login details of the Mealplan account registered to {email}.

Username: {username}

If you no longer remember your password, sign in from the app and change it under your profile once you regain access, or contact support.

If you didn't ask for this, you can safely ignore this email."#,
            email = self.to_email,
            username = self.username,
        )
    }

    pub fn html_body(&self) -> String {
        format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Your Mealplan account</title></head>
<body>
    <p>Hi,</p>
    <p>Someone asked for the login details of the Mealplan account registered to <strong>{email}</strong>.</p>
    <p>Username: <strong>{username}</strong></p>
    <p>If you didn't ask for this, you can safely ignore this email.</p>
</body>
</html>"#,
            email = html_escape(&self.to_email),
            username = html_escape(&self.username),
        )
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_recovery(&self, message: &RecoveryMessage) -> Result<(), MailError>;
}

/// Logs instead of sending. Used when SMTP is not configured.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_recovery(&self, message: &RecoveryMessage) -> Result<(), MailError> {
        tracing::warn!(
            to = %message.to_email,
            "Email not configured, skipping recovery email"
        );
        Ok(())
    }
}

/// Pick the SMTP transport when configured, otherwise [`LogMailer`].
pub fn mailer_from_config(config: &EmailConfig) -> std::sync::Arc<dyn Mailer> {
    if config.is_configured() {
        std::sync::Arc::new(SmtpMailer::new(config.clone()))
    } else {
        std::sync::Arc::new(LogMailer)
    }
}

/// Escape HTML special characters
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
