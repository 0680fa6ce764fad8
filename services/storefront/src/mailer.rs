//! Outgoing e-mail over SMTP
//!
//! Sending is best-effort: every send reports success as a `bool` and never
//! fails the request that triggered it.

use anyhow::Result;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
};
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::models::QuoteSubmission;

const DEFAULT_SENDER: &str = "no-reply@sight-tech.local";

const CONTAINER_STYLE: &str = "font-family: system-ui, -apple-system, Segoe UI, Roboto, Helvetica, Arial, sans-serif; line-height:1.6;";
const PRE_STYLE: &str = "white-space:pre-wrap;background:#f6f8fa;padding:12px;border-radius:6px;";

/// A composed message, independent of the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Letter {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// Mailer
#[derive(Clone)]
pub struct Mailer {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: String,
    quote_recipient: Option<String>,
    brand: String,
}

impl Mailer {
    /// Build the mailer from configuration
    ///
    /// `SMTP_URL` wins over the individual host settings. Without either the
    /// mailer is disabled and every send returns `false`.
    pub fn from_config(config: &AppConfig) -> Self {
        let transport = match build_transport(config) {
            Ok(Some(transport)) => {
                info!("SMTP transport configured");
                Some(transport)
            }
            Ok(None) => {
                warn!("SMTP not configured; e-mails will not be sent");
                None
            }
            Err(e) => {
                error!("Failed to init mail transport: {}", e);
                None
            }
        };

        Self {
            transport,
            from: config
                .smtp_user
                .clone()
                .unwrap_or_else(|| DEFAULT_SENDER.to_string()),
            quote_recipient: config.quote_recipient().map(str::to_string),
            brand: config.business_name.clone(),
        }
    }

    /// Mailer that never sends
    pub fn disabled(brand: &str) -> Self {
        Self {
            transport: None,
            from: DEFAULT_SENDER.to_string(),
            quote_recipient: None,
            brand: brand.to_string(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    /// Notify the business of a new quote request
    pub async fn send_quote_notification(&self, quote: &QuoteSubmission) -> bool {
        let Some(to) = self.quote_recipient.as_deref() else {
            warn!("Quote notification not sent: no recipient configured");
            return false;
        };
        self.deliver("quote notification", quote_notification(to, quote))
            .await
    }

    /// Confirm receipt to the person who asked for a quote
    pub async fn send_quote_auto_reply(&self, quote: &QuoteSubmission) -> bool {
        self.deliver("quote auto-reply", quote_auto_reply(&self.brand, quote))
            .await
    }

    pub async fn send_welcome(&self, name: &str, email: &str) -> bool {
        self.deliver("welcome e-mail", welcome(&self.brand, name, email))
            .await
    }

    pub async fn send_password_reset_code(&self, name: &str, email: &str, otp: &str) -> bool {
        self.deliver(
            "password reset code",
            password_reset_code(&self.brand, name, email, otp),
        )
        .await
    }

    async fn deliver(&self, kind: &str, letter: Letter) -> bool {
        let Some(transport) = &self.transport else {
            warn!("{} not sent: SMTP not configured", kind);
            return false;
        };

        match self.try_send(transport, letter).await {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to send {}: {}", kind, e);
                false
            }
        }
    }

    async fn try_send(
        &self,
        transport: &AsyncSmtpTransport<Tokio1Executor>,
        letter: Letter,
    ) -> Result<()> {
        let message = Message::builder()
            .from(self.from.parse::<Mailbox>()?)
            .to(letter.to.parse::<Mailbox>()?)
            .subject(letter.subject)
            .multipart(MultiPart::alternative_plain_html(letter.text, letter.html))?;

        transport.send(message).await?;
        Ok(())
    }
}

fn build_transport(config: &AppConfig) -> Result<Option<AsyncSmtpTransport<Tokio1Executor>>> {
    if let Some(url) = &config.smtp_url {
        return Ok(Some(
            AsyncSmtpTransport::<Tokio1Executor>::from_url(url)?.build(),
        ));
    }

    let (Some(host), Some(port), Some(user), Some(pass)) = (
        &config.smtp_host,
        config.smtp_port,
        &config.smtp_user,
        &config.smtp_pass,
    ) else {
        return Ok(None);
    };

    // Port 465 speaks implicit TLS; anything else upgrades with STARTTLS.
    let secure = config.smtp_secure.unwrap_or(false) || port == 465;
    let builder = if secure {
        AsyncSmtpTransport::<Tokio1Executor>::relay(host)?
    } else {
        AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
    };

    Ok(Some(
        builder
            .port(port)
            .credentials(Credentials::new(user.clone(), pass.clone()))
            .build(),
    ))
}

/// Escape text for inclusion in HTML
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn quote_notification(to: &str, quote: &QuoteSubmission) -> Letter {
    Letter {
        to: to.to_string(),
        subject: format!("New Quote Request - {}", quote.name),
        text: format!(
            "New quote received\n\nName: {}\nEmail: {}\n\nMessage:\n{}\n",
            quote.name, quote.email, quote.message
        ),
        html: format!(
            "<div style=\"{CONTAINER_STYLE}\">\
             <h2>New Quote Request</h2>\
             <p><strong>Name:</strong> {}</p>\
             <p><strong>Email:</strong> {}</p>\
             <p><strong>Message:</strong></p>\
             <pre style=\"{PRE_STYLE}\">{}</pre>\
             </div>",
            escape_html(&quote.name),
            escape_html(&quote.email),
            escape_html(&quote.message)
        ),
    }
}

pub fn quote_auto_reply(brand: &str, quote: &QuoteSubmission) -> Letter {
    Letter {
        to: quote.email.clone(),
        subject: format!("We received your request - {}", brand),
        text: format!(
            "Hi {},\n\nThanks for contacting {brand}!\n\n\
             We received your message and will get back to you shortly.\n\n\
             Your message:\n{}\n\n- {brand}",
            quote.name, quote.message
        ),
        html: format!(
            "<div style=\"{CONTAINER_STYLE}\">\
             <p>Hi {},</p>\
             <p>Thanks for contacting <strong>{}</strong>! We received your message and will get back to you shortly.</p>\
             <p><strong>Your message:</strong></p>\
             <pre style=\"{PRE_STYLE}\">{}</pre>\
             <p style=\"margin-top:12px;\">- {}</p>\
             </div>",
            escape_html(&quote.name),
            escape_html(brand),
            escape_html(&quote.message),
            escape_html(brand)
        ),
    }
}

pub fn welcome(brand: &str, name: &str, email: &str) -> Letter {
    let name = if name.is_empty() { "there" } else { name };
    Letter {
        to: email.to_string(),
        subject: format!("Welcome to {}", brand),
        text: format!(
            "Hi {name},\n\nWelcome to {brand}! Your account has been created successfully.\n\n- {brand}"
        ),
        html: format!(
            "<div style=\"{CONTAINER_STYLE}\">\
             <p>Hi {},</p>\
             <p>Welcome to <strong>{}</strong>! Your account has been created successfully.</p>\
             <p style=\"margin-top:12px;\">- {}</p>\
             </div>",
            escape_html(name),
            escape_html(brand),
            escape_html(brand)
        ),
    }
}

pub fn password_reset_code(brand: &str, name: &str, email: &str, otp: &str) -> Letter {
    let greeting = if name.is_empty() {
        "Hi,".to_string()
    } else {
        format!("Hi {},", name)
    };
    Letter {
        to: email.to_string(),
        subject: format!("{} password reset code", brand),
        text: format!(
            "{greeting}\n\nYour {brand} password reset code is: {otp}\n\
             This code expires in 15 minutes. If you did not request this, you can ignore this email.\n\n- {brand}"
        ),
        html: format!(
            "<div style=\"{CONTAINER_STYLE}\">\
             <p>{}</p>\
             <p>Your <strong>{}</strong> password reset code is:</p>\
             <p style=\"font-size:22px; font-weight:600; letter-spacing:3px;\">{}</p>\
             <p>This code expires in 15 minutes. If you did not request this, you can ignore this email.</p>\
             <p style=\"margin-top:12px;\">- {}</p>\
             </div>",
            escape_html(&greeting),
            escape_html(brand),
            escape_html(otp),
            escape_html(brand)
        ),
    }
}
