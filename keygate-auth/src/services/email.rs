use async_trait::async_trait;
use keygate_core::error::AppError;
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};
use std::time::Duration;

use crate::config::SmtpConfig;

/// Outbound mail boundary. Delivery failure is surfaced to the caller,
/// which decides whether it is fatal (forgot-password) or best-effort
/// (registration).
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification_email(&self, to: &str, link: &str) -> Result<(), AppError>;

    async fn send_password_reset_email(&self, to: &str, link: &str) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct SmtpMailer {
    mailer: SmtpTransport,
    from: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, AppError> {
        let creds = Credentials::new(config.user.clone(), config.password.clone());

        let mailer = SmtpTransport::relay(&config.host)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!(e.to_string())))?
            .credentials(creds)
            .port(config.port)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!(host = %config.host, "SMTP mailer initialized");

        Ok(Self {
            mailer,
            from: config.from.clone(),
        })
    }

    async fn send(
        &self,
        to: &str,
        subject: &str,
        plain_body: &str,
        html_body: &str,
    ) -> Result<(), AppError> {
        let email = Message::builder()
            .from(self.from.parse().map_err(
                |e: lettre::address::AddressError| AppError::InternalError(e.into()),
            )?)
            .to(to.parse().map_err(|e: lettre::address::AddressError| {
                AppError::InternalError(e.into())
            })?)
            .subject(subject)
            .multipart(
                lettre::message::MultiPart::alternative()
                    .singlepart(
                        lettre::message::SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(plain_body.to_string()),
                    )
                    .singlepart(
                        lettre::message::SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )
            .map_err(|e| AppError::InternalError(e.into()))?;

        // Send on the blocking pool; the SMTP transport is synchronous.
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::InternalError(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to, subject = %subject, "Email sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e.to_string(), to = %to, "Failed to send email");
                Err(AppError::EmailError(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_verification_email(&self, to: &str, link: &str) -> Result<(), AppError> {
        let html_body = format!(
            r###"<html>
                <body style="font-family: Arial, sans-serif;">
                    <h2>Confirm your email address</h2>
                    <p>Thanks for signing up. Click the link below to confirm this email address:</p>
                    <p>
                        <a href="{}" style="background-color: #4CAF50; color: white; padding: 14px 20px; text-decoration: none; border-radius: 4px;">
                            Confirm Email
                        </a>
                    </p>
                    <p style="color: #666; font-size: 12px;">
                        This link expires in 45 minutes. If you didn't sign up, you can ignore this email.
                    </p>
                </body>
            </html>"###,
            link
        );

        let plain_body = format!(
            "Confirm your email address\n\nThanks for signing up. Visit the following link to confirm this email address:\n\n{}\n\nThis link expires in 45 minutes. If you didn't sign up, you can ignore this email.",
            link
        );

        self.send(to, "Confirm Your Email Address", &plain_body, &html_body)
            .await
    }

    async fn send_password_reset_email(&self, to: &str, link: &str) -> Result<(), AppError> {
        let html_body = format!(
            r###"<html>
                <body style="font-family: Arial, sans-serif;">
                    <h2>Password Reset Request</h2>
                    <p>We received a request to reset your password. Click the link below to choose a new one:</p>
                    <p>
                        <a href="{}" style="background-color: #2196F3; color: white; padding: 14px 20px; text-decoration: none; border-radius: 4px;">
                            Reset Password
                        </a>
                    </p>
                    <p style="color: #666; font-size: 12px;">
                        This link expires in 1 hour. If you didn't request this, please ignore this email.
                    </p>
                </body>
            </html>"###,
            link
        );

        let plain_body = format!(
            "Password Reset Request\n\nWe received a request to reset your password. Visit the following link to choose a new one:\n\n{}\n\nThis link expires in 1 hour. If you didn't request this, please ignore this email.",
            link
        );

        self.send(to, "Reset Your Password", &plain_body, &html_body)
            .await
    }
}

/// Recording mailer for tests. Captures every send and can be told to fail.
#[derive(Default)]
pub struct MockMailer {
    pub sent: std::sync::Mutex<Vec<(String, String)>>,
    pub fail: bool,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: std::sync::Mutex::new(Vec::new()),
            fail: true,
        }
    }

    fn record(&self, to: &str, link: &str) -> Result<(), AppError> {
        if self.fail {
            return Err(AppError::EmailError("smtp unavailable".to_string()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), link.to_string()));
        Ok(())
    }

    /// Links captured so far, in send order.
    pub fn links(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, link)| link.clone())
            .collect()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send_verification_email(&self, to: &str, link: &str) -> Result<(), AppError> {
        self.record(to, link)
    }

    async fn send_password_reset_email(&self, to: &str, link: &str) -> Result<(), AppError> {
        self.record(to, link)
    }
}
