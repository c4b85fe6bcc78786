//! Outbound email: the only user-visible notification channel.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::info;

use terascout_common::ScoutEvent;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, from: &str, to: &str, subject: &str, html: &str) -> Result<()>;
}

// --- SMTP mailer ---

pub struct SmtpMailer {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(host: &str, user: &str, pass: &str) -> Result<Self> {
        let creds = Credentials::new(user.to_string(), pass.to_string());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .context("Invalid SMTP host")?
            .credentials(creds)
            .build();
        Ok(Self { mailer })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, from: &str, to: &str, subject: &str, html: &str) -> Result<()> {
        let msg = Message::builder()
            .from(from.parse().context("Invalid from address")?)
            .to(to.parse().context("Invalid to address")?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(html.to_string())
            .context("Failed to build email")?;

        self.mailer.send(msg).await.context("Failed to send email")?;
        info!(to, subject, "Notification email sent");
        Ok(())
    }
}

// --- Rendering ---

/// Build the notification subject + HTML body for a detected event.
pub fn render_event_email(event: &ScoutEvent) -> (String, String) {
    let subject = if event.is_breaking {
        format!("[Breaking] {}", event.tldr)
    } else {
        event.tldr.clone()
    };

    let mut html = String::new();
    html.push_str(&format!("<h2>{}</h2>\n", escape_html(&event.tldr)));
    html.push_str(&format!("<p>{}</p>\n", escape_html(&event.summary)));

    if !event.highlights.is_empty() {
        html.push_str("<ul>\n");
        for highlight in &event.highlights {
            html.push_str(&format!("<li>{}</li>\n", escape_html(highlight)));
        }
        html.push_str("</ul>\n");
    }

    if !event.articles.is_empty() {
        html.push_str("<h3>Coverage</h3>\n<ul>\n");
        for article in &event.articles {
            html.push_str(&format!(
                "<li><a href=\"{}\">{}</a> &mdash; {}</li>\n",
                escape_html(&article.url),
                escape_html(&article.title),
                escape_html(&article.snippet),
            ));
        }
        html.push_str("</ul>\n");
    }

    html.push_str(&format!(
        "<p><small>Detected from <a href=\"{}\">{}</a></small></p>\n",
        escape_html(&event.source_url),
        escape_html(&event.source_label),
    ));

    (subject, html)
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
