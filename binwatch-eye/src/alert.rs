//! E-mail alerts with the offending frame attached

use crate::config::MailerConfig;
use crate::error::{EyeError, Result};
use crate::frame::Frame;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::time::Duration;
use tracing::{error, info, warn};

const JPEG_QUALITY: u8 = 95;
const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Delivers a garbage notification for an area.
///
/// Implementations never fail past this boundary: any problem is logged
/// and reported as `false`.
pub trait Alerter: Send + Sync {
    fn send_alert(&self, area: &str, frame: &Frame) -> bool;
}

pub fn alert_subject(area: &str) -> String {
    format!("Garbage Detected in {}", area)
}

pub fn alert_body(area: &str) -> String {
    format!(
        "Dear Maintenance Team,\n\n\
         The monitoring system has detected garbage in **{}**.\n\n\
         Attached is an image frame captured from the camera feed showing the detected garbage.\n\n\
         Please send the cleaning staff to inspect and clean the area immediately.\n\n\
         Regards,\n\
         Smart Garbage Detection System\n",
        area
    )
}

pub fn attachment_name(area: &str) -> String {
    format!("garbage_{}.jpg", area)
}

/// Build the alert message: plain-text body plus the JPEG attachment
pub fn compose_alert_email(config: &MailerConfig, area: &str, jpeg: Vec<u8>) -> Result<Message> {
    let from: Mailbox = config.sender.trim().parse()?;
    let to: Mailbox = config.recipient.trim().parse()?;
    let image_type = ContentType::parse("image/jpeg")
        .map_err(|e| EyeError::Alert(format!("Bad attachment content type: {}", e)))?;

    let message = Message::builder()
        .from(from)
        .to(to)
        .subject(alert_subject(area))
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(alert_body(area)))
                .singlepart(Attachment::new(attachment_name(area)).body(jpeg, image_type)),
        )?;

    Ok(message)
}

/// Sends alerts over an authenticated STARTTLS SMTP session
pub struct EmailAlerter {
    config: MailerConfig,
}

impl EmailAlerter {
    pub fn new(config: MailerConfig) -> Result<Self> {
        config.validate().map_err(EyeError::Config)?;
        if !config.has_credentials() {
            warn!("Mail credentials incomplete, alerts will fail until they are set");
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &MailerConfig {
        &self.config
    }

    fn transport(&self) -> Result<SmtpTransport> {
        let credentials = Credentials::new(self.config.sender.clone(), self.config.app_password.clone());
        Ok(SmtpTransport::starttls_relay(&self.config.smtp_host)?
            .port(self.config.smtp_port)
            .credentials(credentials)
            .timeout(Some(SMTP_TIMEOUT))
            .build())
    }

    fn try_send(&self, area: &str, frame: &Frame) -> Result<()> {
        let jpeg = frame.encode_jpeg(JPEG_QUALITY)?;
        let message = compose_alert_email(&self.config, area, jpeg)?;
        self.transport()?.send(&message)?;
        Ok(())
    }
}

impl Alerter for EmailAlerter {
    fn send_alert(&self, area: &str, frame: &Frame) -> bool {
        let attempts = self.config.max_attempts.max(1);
        let mut backoff = self.config.retry_backoff;

        for attempt in 1..=attempts {
            match self.try_send(area, frame) {
                Ok(()) => {
                    info!(
                        "Email with image sent successfully to {} for area {}",
                        self.config.recipient, area
                    );
                    return true;
                }
                Err(e) => {
                    error!("Failed to send email (attempt {}/{}): {}", attempt, attempts, e);
                    if attempt < attempts {
                        std::thread::sleep(backoff);
                        backoff = backoff.saturating_mul(2);
                    }
                }
            }
        }

        false
    }
}
