//! Directive dispatch to Home Assistant

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use super::parse::{Directive, ServiceCall};
use crate::config::HomeConfig;
use crate::{Error, Result};

/// Executes one home-control service call
#[async_trait]
pub trait DirectiveSink: Send + Sync {
    /// Call a service with the given body
    ///
    /// # Errors
    ///
    /// Returns error on a network failure or non-2xx status
    async fn call_service(&self, call: &ServiceCall, payload: &Value) -> Result<()>;
}

/// Home Assistant REST client
pub struct HomeAssistant {
    client: reqwest::Client,
    base_url: url::Url,
    token: Option<SecretString>,
}

impl HomeAssistant {
    /// Create a new client
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &HomeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        if config.token.is_none() {
            tracing::warn!("no Home Assistant token configured, calls are unauthenticated");
        }

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            token: config
                .token
                .as_ref()
                .map(|t| SecretString::from(t.expose_secret().to_owned())),
        })
    }

    fn service_url(&self, call: &ServiceCall) -> String {
        format!(
            "{}/api/services/{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            call.domain,
            call.service
        )
    }
}

#[async_trait]
impl DirectiveSink for HomeAssistant {
    async fn call_service(&self, call: &ServiceCall, payload: &Value) -> Result<()> {
        let mut request = self.client.post(self.service_url(call)).json(payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Directive(format!("service call failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Directive(format!(
                "{}/{} returned {status}: {body}",
                call.domain, call.service
            )));
        }

        Ok(())
    }
}

/// Outcome counts for one batch of directives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Calls that returned 2xx
    pub succeeded: usize,
    /// Calls that failed at the network or HTTP level
    pub failed: usize,
    /// Directives whose service could not be split
    pub skipped: usize,
}

impl DispatchReport {
    /// Accumulate another batch
    pub fn merge(&mut self, other: Self) {
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }

    /// Directives seen in total
    #[must_use]
    pub const fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }
}

/// Dispatch each directive in order; one failure never stops the rest
pub async fn dispatch_all(sink: &dyn DirectiveSink, directives: &[Directive]) -> DispatchReport {
    let mut report = DispatchReport::default();

    for directive in directives {
        let Some(call) = directive.service_call() else {
            tracing::debug!(service = %directive.service, "skipping directive with unsplittable service");
            report.skipped += 1;
            continue;
        };

        match sink.call_service(&call, &directive.payload()).await {
            Ok(()) => {
                tracing::info!(
                    domain = %call.domain,
                    service = %call.service,
                    entity_id = directive.entity_id.as_deref().unwrap_or(""),
                    "home command executed"
                );
                report.succeeded += 1;
            }
            Err(e) => {
                tracing::warn!(error = %e, domain = %call.domain, service = %call.service, "home command failed");
                report.failed += 1;
            }
        }
    }

    report
}
