use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    Message, SmtpTransport, Transport,
};
use secrecy::ExposeSecret;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::SmtpConfig;
use crate::models::FamilyProfile;
use crate::services::AuthError;

/// Everything needed to render a family-branded verification email.
#[derive(Debug, Clone)]
pub struct VerificationEmail {
    pub to: String,
    pub family: FamilyProfile,
    pub code: String,
    pub verify_link: String,
    pub expires_minutes: i64,
}

impl VerificationEmail {
    pub fn subject(&self) -> String {
        format!(
            "{} Verify Your Access - Code: {}",
            self.family.subject_prefix, self.code
        )
    }

    pub fn plain_body(&self) -> String {
        format!(
            "{display} - Access Verification\n\n\
             You've requested access to the {display} genealogy archives. {description}.\n\n\
             Your verification code is: {code}\n\n\
             Enter this code on the verification page, or open:\n{link}\n\n\
             This code expires in {minutes} minutes. If you didn't request access, you can ignore this email.\n",
            display = self.family.display_name,
            description = self.family.description,
            code = self.code,
            link = self.verify_link,
            minutes = self.expires_minutes,
        )
    }

    pub fn html_body(&self) -> String {
        format!(
            r###"<html>
  <body style="font-family: Georgia, serif; color: #2c3e50;">
    <h2>{display}</h2>
    <p style="color: #7f8c8d; font-size: 14px;">{site}</p>
    <p>You've requested access to the <strong>{display}</strong> genealogy archives. {description}.</p>
    <p>Your verification code is:</p>
    <p style="font-size: 32px; letter-spacing: 8px; font-weight: bold;">{code}</p>
    <p>
      <a href="{link}" style="background-color: #2c3e50; color: white; padding: 12px 20px; text-decoration: none; border-radius: 4px;">
        Verify Access
      </a>
    </p>
    <p style="color: #666; font-size: 12px;">
      This code expires in {minutes} minutes. If you didn't request access, you can ignore this email.
    </p>
  </body>
</html>
"###,
            display = self.family.display_name,
            site = self.family.site_url,
            description = self.family.description,
            code = self.code,
            link = self.verify_link,
            minutes = self.expires_minutes,
        )
    }
}

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_family_verification(&self, email: &VerificationEmail) -> Result<(), AuthError>;
}

#[derive(Clone)]
pub struct EmailService {
    mailer: SmtpTransport,
    from: Mailbox,
    timeout: Duration,
}

impl EmailService {
    pub fn new(config: &SmtpConfig) -> Result<Self, anyhow::Error> {
        let creds = Credentials::new(
            config.username.clone(),
            config.password.expose_secret().clone(),
        );
        let timeout = Duration::from_secs(config.timeout_seconds);

        let mailer = SmtpTransport::starttls_relay(&config.host)?
            .credentials(creds)
            .port(config.port)
            .timeout(Some(timeout))
            .build();

        let from = Mailbox::new(
            Some(config.from_name.clone()),
            config.from_email.parse()?,
        );

        tracing::info!(host = %config.host, port = config.port, "Email service initialized");

        Ok(Self {
            mailer,
            from,
            timeout,
        })
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        plain_body: String,
        html_body: String,
    ) -> Result<(), AuthError> {
        let to: Mailbox = to_email
            .parse()
            .map_err(|e: lettre::address::AddressError| AuthError::EmailDispatchFailed(e.to_string()))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(plain_body),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body),
                    ),
            )
            .map_err(|e| AuthError::EmailDispatchFailed(e.to_string()))?;

        // SMTP transport is blocking; keep it off the async workers and bound the wait.
        let mailer = self.mailer.clone();
        let send = tokio::task::spawn_blocking(move || mailer.send(&email));

        match tokio::time::timeout(self.timeout, send).await {
            Err(_) => {
                tracing::warn!(timeout_secs = self.timeout.as_secs(), "Email send timed out");
                Err(AuthError::EmailDispatchFailed("timed out".to_string()))
            }
            Ok(Err(join_err)) => Err(AuthError::EmailDispatchFailed(join_err.to_string())),
            Ok(Ok(Err(e))) => {
                tracing::warn!(error = %e, "Failed to send email");
                Err(AuthError::EmailDispatchFailed(e.to_string()))
            }
            Ok(Ok(Ok(_))) => {
                tracing::info!("Verification email sent");
                Ok(())
            }
        }
    }
}

#[async_trait]
impl EmailProvider for EmailService {
    async fn send_family_verification(&self, email: &VerificationEmail) -> Result<(), AuthError> {
        self.send_email(
            &email.to,
            &email.subject(),
            email.plain_body(),
            email.html_body(),
        )
        .await
    }
}

/// Records messages instead of sending them.
#[derive(Clone, Default)]
pub struct MockEmailService {
    outbox: Arc<Mutex<Vec<VerificationEmail>>>,
    fail: Arc<Mutex<bool>>,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<VerificationEmail> {
        self.outbox.lock().map(|o| o.clone()).unwrap_or_default()
    }

    /// Code from the most recent message to `to`.
    pub fn last_code_for(&self, to: &str) -> Option<String> {
        self.sent()
            .into_iter()
            .rev()
            .find(|m| m.to == to)
            .map(|m| m.code)
    }

    /// Make subsequent sends fail with `EmailDispatchFailed`.
    pub fn set_failing(&self, failing: bool) {
        if let Ok(mut flag) = self.fail.lock() {
            *flag = failing;
        }
    }
}

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send_family_verification(&self, email: &VerificationEmail) -> Result<(), AuthError> {
        if self.fail.lock().map(|f| *f).unwrap_or(false) {
            return Err(AuthError::EmailDispatchFailed("mock failure".to_string()));
        }
        if let Ok(mut outbox) = self.outbox.lock() {
            outbox.push(email.clone());
        }
        Ok(())
    }
}
