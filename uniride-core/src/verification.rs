use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::mail::MailSender;
use crate::{normalize_email, CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CodePurpose {
    Registration,
    Recovery,
    AdminLogin,
}

impl fmt::Display for CodePurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CodePurpose::Registration => "registration",
            CodePurpose::Recovery => "recovery",
            CodePurpose::AdminLogin => "admin-login",
        })
    }
}

/// A pending one-time code. `payload` carries whatever the issuing flow
/// needs back on success (pending user data, a display name).
#[derive(Debug, Clone)]
pub struct VerificationCode {
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub purpose: CodePurpose,
    pub payload: serde_json::Value,
}

impl VerificationCode {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Issues, validates and invalidates single-use codes keyed by normalized
/// email. At most one code exists per email.
pub struct CodeStore {
    codes: RwLock<HashMap<String, VerificationCode>>,
    mailer: Arc<dyn MailSender>,
    ttl: Duration,
}

impl CodeStore {
    pub fn new(mailer: Arc<dyn MailSender>, ttl: Duration) -> Self {
        Self {
            codes: RwLock::new(HashMap::new()),
            mailer,
            ttl,
        }
    }

    /// Store a fresh code (replacing any prior one for this email) and mail it.
    /// A failed delivery removes the code again.
    pub async fn issue(
        &self,
        email: &str,
        purpose: CodePurpose,
        payload: serde_json::Value,
    ) -> CoreResult<()> {
        let key = normalize_email(email);
        if key.is_empty() {
            return Err(CoreError::Validation("email is required".to_string()));
        }

        let entry = VerificationCode {
            code: generate_code(),
            expires_at: Utc::now() + self.ttl,
            purpose,
            payload,
        };
        let code = entry.code.clone();
        self.codes.write().await.insert(key.clone(), entry);

        self.deliver(&key, &code, purpose).await
    }

    /// Mail the current code again while it is valid, otherwise issue a new
    /// one with an empty payload.
    pub async fn resend(&self, email: &str, purpose: CodePurpose) -> CoreResult<()> {
        let key = normalize_email(email);
        let existing = self
            .codes
            .read()
            .await
            .get(&key)
            .filter(|entry| entry.purpose == purpose && !entry.is_expired())
            .map(|entry| entry.code.clone());

        match existing {
            Some(code) => {
                let sent = self.mailer.send(&key, &code, purpose).await.unwrap_or(false);
                if sent {
                    Ok(())
                } else {
                    Err(CoreError::Delivery(format!("could not resend {} code to {}", purpose, key)))
                }
            }
            None => self.issue(&key, purpose, serde_json::Value::Null).await,
        }
    }

    /// Consume a code. Single use: success removes the entry.
    pub async fn verify(
        &self,
        email: &str,
        code: &str,
        purpose: CodePurpose,
    ) -> CoreResult<serde_json::Value> {
        let key = normalize_email(email);
        let mut codes = self.codes.write().await;

        let entry = match codes.get(&key) {
            Some(entry) if entry.purpose == purpose => entry,
            _ => return Err(CoreError::NotFound(format!("no {} code for {}", purpose, key))),
        };

        if entry.is_expired() {
            codes.remove(&key);
            return Err(CoreError::Expired(key));
        }

        if entry.code != code.trim() {
            return Err(CoreError::Mismatch(key));
        }

        let entry = codes.remove(&key).ok_or_else(|| CoreError::NotFound(key.clone()))?;
        info!("Verified {} code for {}", purpose, key);
        Ok(entry.payload)
    }

    pub async fn invalidate(&self, email: &str) {
        self.codes.write().await.remove(&normalize_email(email));
    }

    async fn deliver(&self, key: &str, code: &str, purpose: CodePurpose) -> CoreResult<()> {
        let sent = match self.mailer.send(key, code, purpose).await {
            Ok(sent) => sent,
            Err(e) => {
                warn!("Mail collaborator failed for {}: {}", key, e);
                false
            }
        };

        if sent {
            info!("Issued {} code for {}", purpose, key);
            return Ok(());
        }

        // Only drop the code we issued; a concurrent issue may have replaced it.
        let mut codes = self.codes.write().await;
        if codes.get(key).map(|entry| entry.code.as_str()) == Some(code) {
            codes.remove(key);
        }
        Err(CoreError::Delivery(format!("could not send {} code to {}", purpose, key)))
    }
}

fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::GatewayResult;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<(String, String)>>,
        refuse: AtomicBool,
    }

    impl RecordingMailer {
        fn last_code(&self) -> String {
            self.sent.lock().unwrap().last().unwrap().1.clone()
        }
    }

    #[async_trait]
    impl MailSender for RecordingMailer {
        async fn send(&self, to: &str, code: &str, _purpose: CodePurpose) -> GatewayResult<bool> {
            if self.refuse.load(Ordering::SeqCst) {
                return Err("smtp timeout".into());
            }
            self.sent.lock().unwrap().push((to.to_string(), code.to_string()));
            Ok(true)
        }
    }

    fn store(mailer: Arc<RecordingMailer>) -> CodeStore {
        CodeStore::new(mailer, Duration::minutes(10))
    }

    #[tokio::test]
    async fn test_code_is_single_use() {
        let mailer = Arc::new(RecordingMailer::default());
        let codes = store(mailer.clone());

        codes
            .issue("Ana@espoch.edu.ec", CodePurpose::Registration, serde_json::json!({"name": "Ana"}))
            .await
            .unwrap();
        let code = mailer.last_code();
        assert_eq!(code.len(), 6);

        let payload = codes
            .verify("ana@espoch.edu.ec", &code, CodePurpose::Registration)
            .await
            .unwrap();
        assert_eq!(payload["name"], "Ana");

        let again = codes.verify("ana@espoch.edu.ec", &code, CodePurpose::Registration).await;
        assert!(matches!(again, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_reissue_invalidates_previous_code() {
        let mailer = Arc::new(RecordingMailer::default());
        let codes = store(mailer.clone());

        codes.issue("ana@espoch.edu.ec", CodePurpose::Recovery, serde_json::Value::Null).await.unwrap();
        let first = mailer.last_code();
        codes.issue("ana@espoch.edu.ec", CodePurpose::Recovery, serde_json::Value::Null).await.unwrap();
        let second = mailer.last_code();

        if first != second {
            let stale = codes.verify("ana@espoch.edu.ec", &first, CodePurpose::Recovery).await;
            assert!(matches!(stale, Err(CoreError::Mismatch(_))));
        }
        assert!(codes.verify("ana@espoch.edu.ec", &second, CodePurpose::Recovery).await.is_ok());
    }

    #[tokio::test]
    async fn test_mismatch_keeps_code_alive() {
        let mailer = Arc::new(RecordingMailer::default());
        let codes = store(mailer.clone());

        codes.issue("ana@espoch.edu.ec", CodePurpose::Recovery, serde_json::Value::Null).await.unwrap();
        let code = mailer.last_code();
        let wrong = if code == "100000" { "100001" } else { "100000" };

        let result = codes.verify("ana@espoch.edu.ec", wrong, CodePurpose::Recovery).await;
        assert!(matches!(result, Err(CoreError::Mismatch(_))));
        assert!(codes.verify("ana@espoch.edu.ec", &code, CodePurpose::Recovery).await.is_ok());
    }

    #[tokio::test]
    async fn test_expired_code_is_removed() {
        let mailer = Arc::new(RecordingMailer::default());
        let codes = CodeStore::new(mailer.clone(), Duration::milliseconds(-1));

        codes.issue("ana@espoch.edu.ec", CodePurpose::Recovery, serde_json::Value::Null).await.unwrap();
        let code = mailer.last_code();

        let first = codes.verify("ana@espoch.edu.ec", &code, CodePurpose::Recovery).await;
        assert!(matches!(first, Err(CoreError::Expired(_))));
        let second = codes.verify("ana@espoch.edu.ec", &code, CodePurpose::Recovery).await;
        assert!(matches!(second, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_purpose_must_match() {
        let mailer = Arc::new(RecordingMailer::default());
        let codes = store(mailer.clone());

        codes.issue("root@gmail.com", CodePurpose::AdminLogin, serde_json::json!("Root")).await.unwrap();
        let code = mailer.last_code();

        let wrong_flow = codes.verify("root@gmail.com", &code, CodePurpose::Recovery).await;
        assert!(matches!(wrong_flow, Err(CoreError::NotFound(_))));
        assert_eq!(
            codes.verify("root@gmail.com", &code, CodePurpose::AdminLogin).await.unwrap(),
            serde_json::json!("Root")
        );
    }

    #[tokio::test]
    async fn test_failed_delivery_invalidates_code() {
        let mailer = Arc::new(RecordingMailer::default());
        mailer.refuse.store(true, Ordering::SeqCst);
        let codes = store(mailer.clone());

        let result = codes.issue("ana@espoch.edu.ec", CodePurpose::Registration, serde_json::Value::Null).await;
        assert!(matches!(result, Err(CoreError::Delivery(_))));
        assert!(codes.codes.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_resend_reuses_valid_code() {
        let mailer = Arc::new(RecordingMailer::default());
        let codes = store(mailer.clone());

        codes.issue("ana@espoch.edu.ec", CodePurpose::Registration, serde_json::Value::Null).await.unwrap();
        let first = mailer.last_code();
        codes.resend("ana@espoch.edu.ec", CodePurpose::Registration).await.unwrap();

        assert_eq!(mailer.last_code(), first);
        assert_eq!(mailer.sent.lock().unwrap().len(), 2);
    }
}
