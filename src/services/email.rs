//! Outgoing e-mail
//!
//! Mail is sent through a [`Mailer`]. With SMTP configured an [`SmtpMailer`]
//! relays via lettre; otherwise a [`LogMailer`] records and logs messages.
//! Delivery failures are logged and never fail the calling request.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{error, info};

use crate::config::EmailConfig;
use crate::models::{Suspension, User, UserSubscription};

/// A rendered message
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<()>;
}

/// SMTP relay via lettre (STARTTLS)
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &EmailConfig, host: &str) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .with_context(|| format!("Invalid SMTP relay: {}", host))?
            .port(config.smtp_port);

        if let (Some(user), Some(password)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        let from = config
            .from_address
            .parse::<Mailbox>()
            .with_context(|| format!("Invalid from address: {}", config.from_address))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        let to = mail
            .to
            .parse::<Mailbox>()
            .with_context(|| format!("Invalid recipient: {}", mail.to))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&mail.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(mail.body.clone())
            .context("Failed to build message")?;

        self.transport
            .send(message)
            .await
            .context("SMTP delivery failed")?;
        Ok(())
    }
}

/// Logs messages instead of sending them and keeps a copy
#[derive(Default)]
pub struct LogMailer {
    sent: Mutex<Vec<OutgoingMail>>,
}

impl LogMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages "sent" so far
    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<()> {
        info!(to = %mail.to, subject = %mail.subject, "Mail (not sent, SMTP not configured)");
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(mail.clone());
        }
        Ok(())
    }
}

/// Pick the mailer for the configuration
pub fn build_mailer(config: &EmailConfig) -> Result<Arc<dyn Mailer>> {
    match config.smtp_host.as_deref() {
        Some(host) if !host.is_empty() => {
            info!("Using SMTP relay {}:{}", host, config.smtp_port);
            Ok(Arc::new(SmtpMailer::new(config, host)?))
        }
        _ => {
            info!("SMTP not configured, mail will only be logged");
            Ok(Arc::new(LogMailer::new()))
        }
    }
}

/// Renders templates and hands them to the mailer
#[derive(Clone)]
pub struct EmailService {
    mailer: Arc<dyn Mailer>,
    app_base_url: String,
}

impl EmailService {
    pub fn new(mailer: Arc<dyn Mailer>, app_base_url: impl Into<String>) -> Self {
        Self {
            mailer,
            app_base_url: app_base_url.into(),
        }
    }

    async fn deliver(&self, mail: OutgoingMail) {
        if let Err(e) = self.mailer.send(&mail).await {
            error!(to = %mail.to, subject = %mail.subject, "Failed to send mail: {:#}", e);
        }
    }

    pub async fn send_verification(&self, user: &User, token: &str) {
        self.deliver(templates::verification(user, &self.app_base_url, token))
            .await;
    }

    pub async fn send_welcome(&self, user: &User) {
        self.deliver(templates::welcome(user)).await;
    }

    pub async fn send_registration_approved(&self, user: &User) {
        self.deliver(templates::registration_approved(user)).await;
    }

    pub async fn send_registration_rejected(&self, user: &User, reason: Option<&str>) {
        self.deliver(templates::registration_rejected(user, reason))
            .await;
    }

    pub async fn send_account_suspended(&self, user: &User, suspension: &Suspension) {
        self.deliver(templates::account_suspended(user, suspension))
            .await;
    }

    pub async fn send_trial_expired(&self, user: &User) {
        self.deliver(templates::trial_expired(user)).await;
    }

    pub async fn send_payment_receipt(&self, user: &User, subscription: &UserSubscription) {
        self.deliver(templates::payment_receipt(user, subscription))
            .await;
    }
}

fn format_date(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d").to_string()
}

pub mod templates {
    use super::*;

    pub fn verification(user: &User, base_url: &str, token: &str) -> OutgoingMail {
        let link = format!(
            "{}/api/auth/verify-email?token={}",
            base_url.trim_end_matches('/'),
            token
        );
        OutgoingMail {
            to: user.email.clone(),
            subject: "Verify your MedSAS e-mail address".to_string(),
            body: format!(
                "Hello {},\n\nPlease confirm your e-mail address by opening the link below:\n\n{}\n\nThe link is valid for 24 hours.\n",
                user.first_name, link
            ),
        }
    }

    pub fn welcome(user: &User) -> OutgoingMail {
        let trial = user
            .trial_end_date
            .map(|end| format!("Your free trial runs until {}.\n", format_date(end)))
            .unwrap_or_default();
        OutgoingMail {
            to: user.email.clone(),
            subject: "Welcome to MedSAS".to_string(),
            body: format!(
                "Hello {},\n\nYour e-mail address is confirmed. {}\nWelcome aboard.\n",
                user.first_name, trial
            ),
        }
    }

    pub fn registration_approved(user: &User) -> OutgoingMail {
        OutgoingMail {
            to: user.email.clone(),
            subject: "Your MedSAS registration was approved".to_string(),
            body: format!(
                "Hello {},\n\nYour account has been approved. You can now sign in.\n",
                user.first_name
            ),
        }
    }

    pub fn registration_rejected(user: &User, reason: Option<&str>) -> OutgoingMail {
        let reason = reason
            .map(|r| format!("\nReason: {}\n", r))
            .unwrap_or_default();
        OutgoingMail {
            to: user.email.clone(),
            subject: "Your MedSAS registration was not approved".to_string(),
            body: format!(
                "Hello {},\n\nUnfortunately your registration could not be approved.\n{}",
                user.first_name, reason
            ),
        }
    }

    pub fn account_suspended(user: &User, suspension: &Suspension) -> OutgoingMail {
        let until = suspension
            .suspended_until
            .map(|u| format!("The suspension ends on {}.\n", format_date(u)))
            .unwrap_or_else(|| "The suspension has no end date.\n".to_string());
        let appeal = match (suspension.can_appeal, suspension.appeal_deadline) {
            (true, Some(deadline)) => {
                format!("You may appeal until {}.\n", format_date(deadline))
            }
            (true, None) => "You may appeal this decision.\n".to_string(),
            (false, _) => String::new(),
        };
        OutgoingMail {
            to: user.email.clone(),
            subject: "Your MedSAS account has been suspended".to_string(),
            body: format!(
                "Hello {},\n\nYour account has been suspended.\nReason: {}\n{}{}",
                user.first_name, suspension.reason, until, appeal
            ),
        }
    }

    pub fn trial_expired(user: &User) -> OutgoingMail {
        OutgoingMail {
            to: user.email.clone(),
            subject: "Your MedSAS trial has ended".to_string(),
            body: format!(
                "Hello {},\n\nYour free trial has ended. Choose a plan to keep using MedSAS.\n",
                user.first_name
            ),
        }
    }

    pub fn payment_receipt(user: &User, subscription: &UserSubscription) -> OutgoingMail {
        OutgoingMail {
            to: user.email.clone(),
            subject: "MedSAS payment receipt".to_string(),
            body: format!(
                "Hello {},\n\nWe received your payment of {} {} for the {} plan ({}).\nReference: {}\nCard: **** {}\nValid until: {}\n",
                user.first_name,
                subscription.amount,
                subscription.currency,
                subscription.plan,
                subscription.billing_period,
                subscription.payment_reference,
                subscription.card_last4,
                format_date(subscription.ends_at),
            ),
        }
    }
}
