use anyhow::{anyhow, Context, Result};
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};
use serde::{Deserialize, Serialize};

fn default_port() -> u16 {
    587
}

/// Stored configuration of an email channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmailConfig {
    pub smtp_host: String,
    #[serde(default = "default_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub from_address: String,
    #[serde(default)]
    pub from_name: String,
    /// Comma separated.
    pub to_addresses: String,
}

impl EmailConfig {
    pub fn recipients(&self) -> Vec<&str> {
        self.to_addresses
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .collect()
    }
}

pub struct EmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailSender {
    /// Implicit TLS on port 465, STARTTLS on any other port.
    pub fn new(cfg: &EmailConfig) -> Result<Self> {
        let host = cfg.smtp_host.trim();
        if host.is_empty() {
            return Err(anyhow!("smtp_host missing"));
        }
        let (from, to) = addresses(cfg)?;

        let builder = if cfg.smtp_port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .with_context(|| format!("invalid smtp host {host}"))?
        .port(cfg.smtp_port);

        let mailer = if cfg.username.is_empty() {
            builder.build()
        } else {
            builder
                .credentials(Credentials::new(cfg.username.clone(), cfg.password.clone()))
                .build()
        };
        Ok(Self { mailer, from, to })
    }

    pub async fn send_html(&self, subject: &str, html: &str) -> Result<()> {
        let msg = build_message(&self.from, &self.to, subject, html)?;
        self.mailer.send(msg).await.context("send email")?;
        Ok(())
    }
}

/// Sender mailbox and recipient list from the channel configuration.
pub fn addresses(cfg: &EmailConfig) -> Result<(Mailbox, Vec<Mailbox>)> {
    let from_addr = cfg
        .from_address
        .trim()
        .parse()
        .with_context(|| format!("invalid from_address {}", cfg.from_address))?;
    let name = Some(cfg.from_name.trim().to_string()).filter(|n| !n.is_empty());
    let from = Mailbox::new(name, from_addr);

    let to = cfg
        .recipients()
        .into_iter()
        .map(|a| a.parse::<Mailbox>().with_context(|| format!("invalid recipient {a}")))
        .collect::<Result<Vec<_>>>()?;
    if to.is_empty() {
        return Err(anyhow!("no recipients configured"));
    }
    Ok((from, to))
}

/// Build the HTML message without sending it.
pub fn build_message(from: &Mailbox, to: &[Mailbox], subject: &str, html: &str) -> Result<Message> {
    let mut builder = Message::builder().from(from.clone()).subject(subject);
    for rcpt in to {
        builder = builder.to(rcpt.clone());
    }
    builder
        .header(header::ContentType::TEXT_HTML)
        .body(html.to_string())
        .context("build email")
}
