use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use pinchat_types::models::CodePurpose;

/// Outbound delivery of one-time codes. Best effort: a failed send is
/// logged and reported as `false`, never as an error.
#[derive(Clone)]
pub enum Mailer {
    /// Development mode: the notice is written to the log instead of sent.
    Console,
    Webhook(WebhookMailer),
}

impl Mailer {
    pub async fn send_verification_notice(
        &self,
        email: &str,
        code: &str,
        pin: &str,
        purpose: CodePurpose,
    ) -> bool {
        match self {
            Self::Console => {
                // The code is a live credential; it stays below info.
                info!(%email, purpose = purpose.as_str(), "[console mailer] notice logged instead of sent");
                debug!("[console mailer] {} code for {}: {} (PIN {})", purpose.as_str(), email, code, pin);
                true
            }
            Self::Webhook(webhook) => webhook.send(email, &render_notice(code, pin, purpose)).await,
        }
    }
}

/// Posts notices as JSON to an HTTP mail relay.
#[derive(Clone)]
pub struct WebhookMailer {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
    from: String,
}

#[derive(Serialize)]
struct OutboundMail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

struct Notice {
    subject: &'static str,
    text: String,
}

impl WebhookMailer {
    pub fn new(url: String, api_key: Option<String>, from: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            url,
            api_key,
            from,
        })
    }

    async fn send(&self, to: &str, notice: &Notice) -> bool {
        let mut request = self.client.post(&self.url).json(&OutboundMail {
            from: &self.from,
            to,
            subject: notice.subject,
            text: &notice.text,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("Notice '{}' delivered to {}", notice.subject, to);
                true
            }
            Ok(resp) => {
                warn!("Mail relay rejected notice for {}: HTTP {}", to, resp.status());
                false
            }
            Err(e) => {
                warn!("Mail relay unreachable for {}: {}", to, e);
                false
            }
        }
    }
}

fn render_notice(code: &str, pin: &str, purpose: CodePurpose) -> Notice {
    match purpose {
        CodePurpose::Registration => Notice {
            subject: "PinChat - Email Verification",
            text: format!(
                "Your verification code is {code}. It expires in 24 hours.\n\n\
                 Your PIN is {pin}. Share it with friends so they can start a chat with you.\n\n\
                 If you didn't create an account, please ignore this email."
            ),
        },
        CodePurpose::PasswordReset => Notice {
            subject: "PinChat - Password Reset",
            text: format!(
                "Your password reset code is {code}. It expires in 1 hour.\n\n\
                 If you didn't ask to reset your password, please ignore this email."
            ),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[test]
    fn notices_carry_code_and_pin() {
        let reg = render_notice("482913", "K3F9ZQ", CodePurpose::Registration);
        assert!(reg.text.contains("482913"));
        assert!(reg.text.contains("K3F9ZQ"));

        let reset = render_notice("111222", "K3F9ZQ", CodePurpose::PasswordReset);
        assert!(reset.text.contains("111222"));
        assert!(reset.subject.contains("Reset"));
    }

    #[tokio::test]
    async fn unreachable_relay_reports_failure() {
        let mailer = Mailer::Webhook(
            WebhookMailer::new("http://127.0.0.1:1/send".into(), None, "noreply@pinchat.local".into()).unwrap(),
        );
        let sent = mailer
            .send_verification_notice("a@x.com", "482913", "K3F9ZQ", CodePurpose::Registration)
            .await;
        assert!(!sent);
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn console_notice_keeps_the_code_out_of_info_logs() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let sent = Mailer::Console
            .send_verification_notice("a@x.com", "482913", "K3F9ZQ", CodePurpose::Registration)
            .await;
        assert!(sent);

        let logged = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("a@x.com"));
        assert!(!logged.contains("482913"));
        assert!(!logged.contains("K3F9ZQ"));
    }
}
