use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use crate::{config::Config, error::DeliveryError, metrics::REPORTS_SENT, schema::ReportArtifact};

const BODY_TEXT: &str = "Please find attached the daily log analysis report.";

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_report(&self, date: NaiveDate, artifact: &ReportArtifact) -> Result<(), DeliveryError>;
}

fn parse_mailbox(address: &str) -> Result<Mailbox, DeliveryError> {
    address.parse().map_err(|e: lettre::address::AddressError| DeliveryError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

/// Builds the report email: a plain-text body plus the PDF attachment.
pub fn build_message(
    sender: &str,
    recipient: &str,
    subject_prefix: &str,
    date: NaiveDate,
    artifact: &ReportArtifact,
) -> Result<Message, DeliveryError> {
    let pdf = ContentType::parse("application/pdf").map_err(|e| DeliveryError::Message(e.to_string()))?;

    Message::builder()
        .from(parse_mailbox(sender)?)
        .to(parse_mailbox(recipient)?)
        .subject(format!("{} - {}", subject_prefix, date.format("%Y-%m-%d")))
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(BODY_TEXT.to_string()))
                .singlepart(Attachment::new(artifact.filename.clone()).body(artifact.bytes.clone(), pdf)),
        )
        .map_err(|e| DeliveryError::Message(e.to_string()))
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sender: String,
    recipient: String,
    subject_prefix: String,
}

impl SmtpMailer {
    /// STARTTLS relay on the configured host; the sender address is the
    /// SMTP username.
    pub fn new(cfg: &Config) -> Result<Self, DeliveryError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.smtp_host)?
            .port(cfg.smtp_port)
            .credentials(Credentials::new(cfg.sender_email.clone(), cfg.smtp_password.clone()))
            .timeout(Some(Duration::from_secs(cfg.http_timeout_secs)))
            .build();

        Ok(Self {
            transport,
            sender: cfg.sender_email.clone(),
            recipient: cfg.recipient_email.clone(),
            subject_prefix: cfg.subject_prefix.clone(),
        })
    }

    /// Plain connection without TLS or auth, for local relays.
    pub fn unencrypted(cfg: &Config) -> Self {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&cfg.smtp_host)
            .port(cfg.smtp_port)
            .timeout(Some(Duration::from_secs(cfg.http_timeout_secs)))
            .build();

        Self {
            transport,
            sender: cfg.sender_email.clone(),
            recipient: cfg.recipient_email.clone(),
            subject_prefix: cfg.subject_prefix.clone(),
        }
    }

    pub async fn test_connection(&self) -> Result<bool, DeliveryError> {
        Ok(self.transport.test_connection().await?)
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_report(&self, date: NaiveDate, artifact: &ReportArtifact) -> Result<(), DeliveryError> {
        let message = build_message(&self.sender, &self.recipient, &self.subject_prefix, date, artifact)?;
        let response = self.transport.send(message).await?;
        REPORTS_SENT.inc();
        info!(
            recipient = %self.recipient,
            attachment = %artifact.filename,
            code = %response.code(),
            "Sent report email"
        );
        Ok(())
    }
}
