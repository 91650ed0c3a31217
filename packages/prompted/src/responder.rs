//! Reference responder
//!
//! Polls the server's status and answers every new prompt by echoing it back
//! with a fixed prefix. Useful for smoke-testing a deployment and as a model
//! for real responders.

use std::time::Duration;

use anyhow::{Context, Result};
use prompt_hub::StatusMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_PREFIX: &str = "weom: ";

#[derive(Clone, Debug)]
pub struct ResponderConfig {
    /// Server base URL, e.g. `http://localhost:8182`
    pub server: String,
    pub secret: String,
    pub prefix: String,
    pub interval: Duration,
    /// Report `working` before answering and `ready` afterwards
    pub heartbeat: bool,
}

pub struct Responder {
    client: reqwest::Client,
    config: ResponderConfig,
}

impl Responder {
    pub fn new(config: ResponderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.server.trim_end_matches('/'), path)
    }

    pub async fn status(&self) -> Result<StatusMessage> {
        self.client
            .get(self.url("/status"))
            .send()
            .await
            .context("status request failed")?
            .json()
            .await
            .context("status reply was not a status message")
    }

    async fn post(&self, path: &str, form: &[(&str, &str)]) -> Result<StatusMessage> {
        self.client
            .post(self.url(path))
            .form(form)
            .send()
            .await
            .with_context(|| format!("{path} request failed"))?
            .json()
            .await
            .with_context(|| format!("{path} reply was not a status message"))
    }

    pub async fn heartbeat(&self, state: &str) -> Result<StatusMessage> {
        self.post(
            "/heartbeat",
            &[("secret", self.config.secret.as_str()), ("state", state)],
        )
        .await
    }

    /// Check for an unanswered prompt and answer it.
    ///
    /// Returns the server's reply to the answer, or `None` when there was
    /// nothing to do.
    pub async fn poll_once(&self) -> Result<Option<StatusMessage>> {
        let status = self.status().await?;
        if status.has_error() || status.prompt.is_empty() || !status.response.is_empty() {
            return Ok(None);
        }

        if self.config.heartbeat {
            self.heartbeat("working").await?;
        }

        let response = format!("{}{}", self.config.prefix, status.prompt);
        let reply = self
            .post(
                "/respond",
                &[
                    ("secret", self.config.secret.as_str()),
                    ("prompt", status.prompt.as_str()),
                    ("response", response.as_str()),
                ],
            )
            .await?;

        match &reply.error {
            Some(e) => warn!("answer rejected: {e}"),
            None => info!(prompt = %status.prompt, "answered prompt"),
        }

        if self.config.heartbeat {
            self.heartbeat("ready").await?;
        }
        Ok(Some(reply))
    }

    /// Poll every `interval` until cancelled. Request failures are logged
    /// and retried on the next tick.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            match self.poll_once().await {
                Ok(Some(_)) => {}
                Ok(None) => debug!("nothing to answer"),
                Err(e) => warn!("poll failed: {e:#}"),
            }
        }
    }
}
