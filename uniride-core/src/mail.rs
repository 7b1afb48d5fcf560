use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::repository::GatewayResult;
use crate::verification::CodePurpose;
use crate::normalize_email;

/// Outbound mail collaborator. `Ok(false)` and `Err(_)` are both treated as
/// a failed delivery by the code store.
#[async_trait]
pub trait MailSender: Send + Sync {
    async fn send(&self, to: &str, code: &str, purpose: CodePurpose) -> GatewayResult<bool>;
}

/// Recipient restriction shared by every sender. Registration and recovery
/// codes only go to `@domain` addresses; admin-login codes go anywhere.
#[derive(Debug, Clone, Default)]
struct DomainGuard(Option<String>);

impl DomainGuard {
    fn new(domain: Option<String>) -> Self {
        Self(
            domain
                .map(|d| d.trim().trim_start_matches('@').to_lowercase())
                .filter(|d| !d.is_empty()),
        )
    }

    fn allows(&self, to: &str, purpose: CodePurpose) -> bool {
        match &self.0 {
            Some(domain) if purpose != CodePurpose::AdminLogin => {
                normalize_email(to).ends_with(&format!("@{}", domain))
            }
            _ => true,
        }
    }
}

/// Development mailer: writes the code to the log instead of sending it.
pub struct LogMailer {
    from: String,
    guard: DomainGuard,
}

impl LogMailer {
    pub fn new(allowed_domain: Option<String>) -> Self {
        Self {
            from: "no-reply@uniride.local".to_string(),
            guard: DomainGuard::new(allowed_domain),
        }
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }
}

#[async_trait]
impl MailSender for LogMailer {
    async fn send(&self, to: &str, code: &str, purpose: CodePurpose) -> GatewayResult<bool> {
        if !self.guard.allows(to, purpose) {
            warn!("Refusing to mail {} code to {}: outside allowed domain", purpose, to);
            return Ok(false);
        }

        info!("Mailing {} code {} from {} to {}", purpose, code, self.from, to);
        Ok(true)
    }
}

/// At most one mail per recipient within `window`. A failed send releases
/// the recipient again.
pub struct RecipientThrottle {
    window: Duration,
    last_sent: Mutex<HashMap<String, Instant>>,
}

impl RecipientThrottle {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    /// Claim the recipient; false while a previous mail is inside the window.
    pub async fn try_acquire(&self, to: &str) -> bool {
        let now = Instant::now();
        let mut last_sent = self.last_sent.lock().await;
        last_sent.retain(|_, at| now.duration_since(*at) < self.window);

        let key = normalize_email(to);
        if last_sent.contains_key(&key) {
            return false;
        }
        last_sent.insert(key, now);
        true
    }

    pub async fn release(&self, to: &str) {
        self.last_sent.lock().await.remove(&normalize_email(to));
    }
}

/// SMTP connection and sender settings.
#[derive(Debug, Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub allowed_domain: Option<String>,
    pub timeout: Duration,
    pub rate_limit: Duration,
}

/// Delivers codes over SMTP with STARTTLS.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    guard: DomainGuard,
    throttle: RecipientThrottle,
}

impl SmtpMailer {
    /// Builds the transport; no connection is opened until the first send.
    pub fn new(settings: SmtpSettings) -> GatewayResult<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)?
            .port(settings.port)
            .timeout(Some(settings.timeout));
        if let (Some(user), Some(password)) = (settings.username, settings.password) {
            builder = builder.credentials(Credentials::new(user, password));
        }

        Ok(Self {
            transport: builder.build(),
            from: settings.from.parse()?,
            guard: DomainGuard::new(settings.allowed_domain),
            throttle: RecipientThrottle::new(settings.rate_limit),
        })
    }

    fn compose(&self, to: &str, code: &str, purpose: CodePurpose) -> GatewayResult<Message> {
        let subject = match purpose {
            CodePurpose::Registration => format!("UniRide verification code - {}", code),
            CodePurpose::Recovery => format!("UniRide password recovery code - {}", code),
            CodePurpose::AdminLogin => format!("UniRide administrator login code - {}", code),
        };
        let body = format!(
            "Your UniRide {} code is: {}\n\nThe code can be used once.\n\nIf you did not request it, ignore this message.",
            purpose, code
        );

        Ok(Message::builder()
            .from(self.from.clone())
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)?)
    }
}

#[async_trait]
impl MailSender for SmtpMailer {
    async fn send(&self, to: &str, code: &str, purpose: CodePurpose) -> GatewayResult<bool> {
        if !self.guard.allows(to, purpose) {
            warn!("Refusing to mail {} code to {}: outside allowed domain", purpose, to);
            return Ok(false);
        }
        if !self.throttle.try_acquire(to).await {
            warn!("Rate limit reached for {}", to);
            return Ok(false);
        }

        let message = match self.compose(to, code, purpose) {
            Ok(message) => message,
            Err(e) => {
                self.throttle.release(to).await;
                return Err(e);
            }
        };

        match self.transport.send(message).await {
            Ok(_) => {
                info!("Mailed {} code to {}", purpose, to);
                Ok(true)
            }
            Err(e) => {
                self.throttle.release(to).await;
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_domain_restriction() {
        let mailer = LogMailer::new(Some("@espoch.edu.ec".to_string()));
        assert!(mailer.send("ana@espoch.edu.ec", "123456", CodePurpose::Recovery).await.unwrap());
        assert!(!mailer.send("ana@gmail.com", "123456", CodePurpose::Recovery).await.unwrap());
        assert!(mailer.send("root@gmail.com", "123456", CodePurpose::AdminLogin).await.unwrap());
    }

    #[tokio::test]
    async fn test_lookalike_domain_is_refused() {
        let mailer = LogMailer::new(Some("espoch.edu.ec".to_string()));
        assert!(!mailer
            .send("x@notespoch.edu.ec", "123456", CodePurpose::Registration)
            .await
            .unwrap());
        assert!(mailer
            .send(" Ana@ESPOCH.edu.ec ", "123456", CodePurpose::Registration)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_throttle_one_mail_per_window() {
        let throttle = RecipientThrottle::new(Duration::from_secs(30));
        assert!(throttle.try_acquire("ana@espoch.edu.ec").await);
        assert!(!throttle.try_acquire("ANA@espoch.edu.ec").await);
        assert!(throttle.try_acquire("luis@espoch.edu.ec").await);

        throttle.release("ana@espoch.edu.ec").await;
        assert!(throttle.try_acquire("ana@espoch.edu.ec").await);

        let short = RecipientThrottle::new(Duration::from_millis(10));
        assert!(short.try_acquire("ana@espoch.edu.ec").await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(short.try_acquire("ana@espoch.edu.ec").await);
    }

    #[tokio::test]
    async fn test_smtp_mailer_refuses_before_connecting() {
        let mailer = SmtpMailer::new(SmtpSettings {
            host: "smtp.invalid".to_string(),
            port: 587,
            username: None,
            password: None,
            from: "UniRide <no-reply@espoch.edu.ec>".to_string(),
            allowed_domain: Some("espoch.edu.ec".to_string()),
            timeout: Duration::from_secs(1),
            rate_limit: Duration::from_secs(30),
        })
        .unwrap();

        assert!(!mailer
            .send("ana@gmail.com", "123456", CodePurpose::Registration)
            .await
            .unwrap());
    }
}
