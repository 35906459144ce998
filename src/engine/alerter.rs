//! Alert delivery.
//!
//! Every emitted opportunity is flattened to an `OpportunityRecord` and
//! handed to each configured `AlertSink`. A sink that fails is logged and
//! skipped; it never stops delivery to the others. The dispatcher reports,
//! per record, whether any sink took it, so callers only treat delivered
//! alerts as sent.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::{AlertsConfig, AppConfig};
use crate::types::{ArbError, OpportunityRecord};

const TELEGRAM_API_URL: &str = "https://api.telegram.org";
const RULE: &str = "============================================================";

// ---------------------------------------------------------------------------
// Sink trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, record: &OpportunityRecord) -> Result<()>;

    /// Deliver several records as one unit. Defaults to one `send` each.
    async fn send_batch(&self, records: &[OpportunityRecord]) -> Result<()> {
        for record in records {
            self.send(record).await?;
        }
        Ok(())
    }

    /// Whether multi-record dispatches go through `send_batch`.
    fn batches(&self) -> bool {
        false
    }

    /// Channel name for logging.
    fn channel(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// Plain-text rendering of one opportunity.
pub fn format_text(r: &OpportunityRecord) -> String {
    format!(
        "ARBITRAGE OPPORTUNITY DETECTED\n\
         {RULE}\n\
         Event: {event}\n\
         Match Score: {score:.1}%\n\
         Timestamp: {ts}\n\
         \n\
         Strategy: {rec}\n\
         Total Investment: ${total:.2}\n\
         Guaranteed Profit: ${profit:.2}\n\
         ROI: {roi:.2}%\n\
         \n\
         {src_a}: YES {a_yes:.4} / NO {a_no:.4}  {link_a}\n\
         {src_b}: YES {b_yes:.4} / NO {b_no:.4}  {link_b}\n\
         {RULE}",
        event = r.event,
        score = r.match_score,
        ts = r.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        rec = r.recommendation,
        total = r.total_investment,
        profit = r.guaranteed_profit,
        roi = r.roi_percent,
        src_a = r.source_a,
        a_yes = r.source_a_yes_prob,
        a_no = r.source_a_no_prob,
        link_a = r.link_a,
        src_b = r.source_b,
        b_yes = r.source_b_yes_prob,
        b_no = r.source_b_no_prob,
        link_b = r.link_b,
    )
}

/// Escape the characters legacy Telegram Markdown treats as markup.
fn escape_markdown(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Telegram Markdown rendering of one opportunity.
pub fn format_telegram(r: &OpportunityRecord) -> String {
    format!(
        "*ARBITRAGE ALERT*\n\n\
         *Event:* {event}\n\n\
         *Strategy:* {rec}\n\n\
         *Returns:*\n\
         • Min Profit: ${profit:.2}\n\
         • ROI: {roi:.2}%\n\n\
         [{src_a}]({link_a}) | [{src_b}]({link_b})",
        event = escape_markdown(&r.event),
        rec = escape_markdown(&r.recommendation),
        profit = r.guaranteed_profit,
        roi = r.roi_percent,
        src_a = r.source_a,
        link_a = r.link_a,
        src_b = r.source_b,
        link_b = r.link_b,
    )
}

/// Plain-text digest of several opportunities.
pub fn format_text_batch(records: &[OpportunityRecord]) -> String {
    let mut text = format!("{} ARBITRAGE OPPORTUNITIES FOUND\n{RULE}\n", records.len());
    for (i, r) in records.iter().enumerate() {
        text.push_str(&format!(
            "\n{n}. {event}\n   Min Profit: ${profit:.2} (ROI: {roi:.2}%)\n   Strategy: {rec}\n",
            n = i + 1,
            event = r.event,
            profit = r.guaranteed_profit,
            roi = r.roi_percent,
            rec = r.recommendation,
        ));
    }
    text
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

const HTML_STYLE: &str = "body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; }\n\
    .container { max-width: 640px; margin: 0 auto; padding: 20px; }\n\
    .header { background: #4CAF50; color: white; padding: 20px; text-align: center; border-radius: 5px; }\n\
    .section { background: #f9f9f9; padding: 15px; margin: 15px 0; border-left: 4px solid #4CAF50; }\n\
    .profit { font-size: 24px; font-weight: bold; }\n\
    .link { display: inline-block; margin: 5px; padding: 8px 12px; background: #2196F3; color: white; text-decoration: none; border-radius: 3px; }";

fn html_page(heading: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<style>\n{HTML_STYLE}\n</style>\n</head>\n<body>\n\
         <div class=\"container\">\n<div class=\"header\">{heading}</div>\n{body}</div>\n</body>\n</html>\n"
    )
}

fn html_links(r: &OpportunityRecord) -> String {
    format!(
        "<a href=\"{link_a}\" class=\"link\">{src_a}</a> <a href=\"{link_b}\" class=\"link\">{src_b}</a>",
        link_a = escape_html(&r.link_a),
        src_a = escape_html(&r.source_a),
        link_b = escape_html(&r.link_b),
        src_b = escape_html(&r.source_b),
    )
}

/// HTML rendering of one opportunity.
pub fn format_html(r: &OpportunityRecord) -> String {
    let heading = format!(
        "<h1>ARBITRAGE OPPORTUNITY</h1>\n<p class=\"profit\">${:.2} Guaranteed Profit</p>",
        r.guaranteed_profit
    );
    let body = format!(
        "<div class=\"section\">\n<h2>Event</h2>\n<p><strong>{event}</strong></p>\n\
         <p>Match Score: {score:.1}% | {ts}</p>\n</div>\n\
         <div class=\"section\">\n<h2>Strategy</h2>\n<p>{rec}</p>\n\
         <p>Total Investment: ${total:.2} | ROI: {roi:.2}%</p>\n</div>\n\
         <div class=\"section\">\n<h2>Markets</h2>\n\
         <p>{src_a}: YES {a_yes:.4} / NO {a_no:.4}</p>\n\
         <p>{src_b}: YES {b_yes:.4} / NO {b_no:.4}</p>\n\
         <p>{links}</p>\n</div>\n",
        event = escape_html(&r.event),
        score = r.match_score,
        ts = r.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        rec = escape_html(&r.recommendation),
        total = r.total_investment,
        roi = r.roi_percent,
        src_a = escape_html(&r.source_a),
        a_yes = r.source_a_yes_prob,
        a_no = r.source_a_no_prob,
        src_b = escape_html(&r.source_b),
        b_yes = r.source_b_yes_prob,
        b_no = r.source_b_no_prob,
        links = html_links(r),
    );
    html_page(&heading, &body)
}

/// HTML digest of several opportunities.
pub fn format_html_batch(records: &[OpportunityRecord]) -> String {
    let heading = format!("<h1>{} Arbitrage Opportunities</h1>", records.len());
    let mut body = String::new();
    for (i, r) in records.iter().enumerate() {
        body.push_str(&format!(
            "<div class=\"section\">\n<h3>{n}. {event}</h3>\n\
             <p><strong>Min Profit: ${profit:.2}</strong> (ROI: {roi:.2}%)</p>\n\
             <p>{rec}</p>\n<p>{links}</p>\n</div>\n",
            n = i + 1,
            event = escape_html(&r.event),
            profit = r.guaranteed_profit,
            roi = r.roi_percent,
            rec = escape_html(&r.recommendation),
            links = html_links(r),
        ));
    }
    html_page(&heading, &body)
}

fn alert_error(channel: &str, message: impl Into<String>) -> ArbError {
    ArbError::Alert {
        channel: channel.to_string(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Writes each opportunity to the tracing log.
pub struct LogAlerter;

#[async_trait]
impl AlertSink for LogAlerter {
    async fn send(&self, record: &OpportunityRecord) -> Result<()> {
        info!(
            event = %record.event,
            profit = format!("${:.2}", record.guaranteed_profit),
            roi = format!("{:.2}%", record.roi_percent),
            "\n{}",
            format_text(record)
        );
        Ok(())
    }

    fn channel(&self) -> &str {
        "log"
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

/// Posts to a chat through the Telegram Bot API.
pub struct TelegramAlerter {
    http: Client,
    api_url: String,
    bot_token: Secret<String>,
    chat_id: String,
}

impl TelegramAlerter {
    pub fn new(bot_token: Secret<String>, chat_id: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to build Telegram HTTP client")?;

        Ok(Self {
            http,
            api_url: TELEGRAM_API_URL.to_string(),
            bot_token,
            chat_id,
        })
    }
}

#[async_trait]
impl AlertSink for TelegramAlerter {
    async fn send(&self, record: &OpportunityRecord) -> Result<()> {
        let url = format!(
            "{}/bot{}/sendMessage",
            self.api_url,
            self.bot_token.expose_secret()
        );
        let text = format_telegram(record);

        let resp = self
            .http
            .post(&url)
            .json(&SendMessage {
                chat_id: &self.chat_id,
                text: &text,
                parse_mode: "Markdown",
                disable_web_page_preview: true,
            })
            .send()
            .await
            // The URL embeds the token, so keep reqwest's error text out
            .map_err(|e| alert_error("telegram", format!("request failed: {}", e.without_url())))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(alert_error("telegram", format!("API error {status}: {body}")).into());
        }

        info!(event = %record.event, "Telegram alert sent");
        Ok(())
    }

    fn channel(&self) -> &str {
        "telegram"
    }
}

/// Sends multipart (plain + HTML) mail over SMTP, or any lettre transport.
pub struct EmailAlerter<T = AsyncSmtpTransport<Tokio1Executor>> {
    transport: T,
    from: Mailbox,
    to: Mailbox,
    digest: bool,
}

impl EmailAlerter {
    /// STARTTLS relay authenticated as the sender address.
    pub fn smtp(
        host: &str,
        port: u16,
        from: &str,
        to: &str,
        password: Secret<String>,
        digest: bool,
    ) -> Result<Self> {
        let login: Mailbox = from
            .parse()
            .with_context(|| format!("Invalid sender address {from}"))?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .with_context(|| format!("Invalid SMTP relay {host}"))?
            .port(port)
            .credentials(Credentials::new(
                login.email.to_string(),
                password.expose_secret().clone(),
            ))
            .timeout(Some(std::time::Duration::from_secs(10)))
            .build();
        Self::with_transport(transport, from, to, digest)
    }
}

impl<T> EmailAlerter<T>
where
    T: AsyncTransport + Send + Sync,
    T::Error: std::fmt::Display,
{
    pub fn with_transport(transport: T, from: &str, to: &str, digest: bool) -> Result<Self> {
        let from: Mailbox = from
            .parse()
            .with_context(|| format!("Invalid sender address {from}"))?;
        let to: Mailbox = to
            .parse()
            .with_context(|| format!("Invalid recipient address {to}"))?;
        Ok(Self {
            transport,
            from,
            to,
            digest,
        })
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    async fn mail(&self, subject: String, text: String, html: String) -> Result<()> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(text, html))
            .context("Failed to build alert email")?;

        self.transport
            .send(message)
            .await
            .map_err(|e| alert_error("email", e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl<T> AlertSink for EmailAlerter<T>
where
    T: AsyncTransport + Send + Sync,
    T::Error: std::fmt::Display,
{
    async fn send(&self, record: &OpportunityRecord) -> Result<()> {
        let subject = format!("Arbitrage Alert: ${:.2} Profit!", record.guaranteed_profit);
        self.mail(subject, format_text(record), format_html(record)).await?;
        info!(event = %record.event, to = %self.to, "Email alert sent");
        Ok(())
    }

    async fn send_batch(&self, records: &[OpportunityRecord]) -> Result<()> {
        let subject = format!("{} Arbitrage Opportunities Found!", records.len());
        self.mail(subject, format_text_batch(records), format_html_batch(records))
            .await?;
        info!(count = records.len(), to = %self.to, "Batch email alert sent");
        Ok(())
    }

    fn batches(&self) -> bool {
        self.digest
    }

    fn channel(&self) -> &str {
        "email"
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Delivery counts for one dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Successful record deliveries, summed over sinks.
    pub delivered: usize,
    pub failed: usize,
    /// Per record: taken by at least one sink. With no sinks every record
    /// counts as reached.
    pub reached: Vec<bool>,
}

/// Fans opportunities out to every sink.
#[derive(Clone, Default)]
pub struct AlertDispatcher {
    sinks: Vec<Arc<dyn AlertSink>>,
}

impl AlertDispatcher {
    pub fn new(sinks: Vec<Arc<dyn AlertSink>>) -> Self {
        Self { sinks }
    }

    /// Build the sinks enabled in config, resolving secrets from the env.
    pub fn from_config(config: &AlertsConfig) -> Result<Self> {
        let mut sinks: Vec<Arc<dyn AlertSink>> = Vec::new();
        if config.log_enabled {
            sinks.push(Arc::new(LogAlerter));
        }
        if config.telegram_enabled {
            let token_env = config
                .telegram_bot_token_env
                .as_deref()
                .context("telegram_bot_token_env not set")?;
            let chat_env = config
                .telegram_chat_id_env
                .as_deref()
                .context("telegram_chat_id_env not set")?;
            sinks.push(Arc::new(TelegramAlerter::new(
                AppConfig::resolve_secret(token_env)?,
                AppConfig::resolve_env(chat_env)?,
            )?));
        }
        if config.email_enabled {
            let from = config.email_from.as_deref().context("email_from not set")?;
            let to = config.email_to.as_deref().context("email_to not set")?;
            let password_env = config
                .email_password_env
                .as_deref()
                .context("email_password_env not set")?;
            sinks.push(Arc::new(EmailAlerter::smtp(
                &config.email_smtp_host,
                config.email_smtp_port,
                from,
                to,
                AppConfig::resolve_secret(password_env)?,
                config.email_digest,
            )?));
        }
        Ok(Self::new(sinks))
    }

    pub fn channels(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.channel()).collect()
    }

    /// Send every record to every sink concurrently.
    pub async fn dispatch(&self, records: &[OpportunityRecord]) -> DispatchSummary {
        if records.is_empty() {
            return DispatchSummary::default();
        }

        let per_sink = join_all(
            self.sinks
                .iter()
                .map(|s| Self::deliver_all(s.as_ref(), records)),
        )
        .await;

        let mut summary = DispatchSummary {
            reached: vec![self.sinks.is_empty(); records.len()],
            ..DispatchSummary::default()
        };
        for outcomes in per_sink {
            for (reached, ok) in summary.reached.iter_mut().zip(outcomes) {
                if ok {
                    summary.delivered += 1;
                    *reached = true;
                } else {
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    /// One sink's outcome per record.
    async fn deliver_all(sink: &dyn AlertSink, records: &[OpportunityRecord]) -> Vec<bool> {
        if sink.batches() && records.len() > 1 {
            let ok = match sink.send_batch(records).await {
                Ok(()) => true,
                Err(e) => {
                    error!(channel = sink.channel(), count = records.len(), error = %e, "Batch alert delivery failed");
                    false
                }
            };
            return vec![ok; records.len()];
        }
        join_all(records.iter().map(|r| Self::deliver(sink, r))).await
    }

    async fn deliver(sink: &dyn AlertSink, record: &OpportunityRecord) -> bool {
        match sink.send(record).await {
            Ok(()) => true,
            Err(e) => {
                error!(channel = sink.channel(), event = %record.event, error = %e, "Alert delivery failed");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
