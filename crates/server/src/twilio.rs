//! Twilio REST client for placing outbound calls

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;

use phone_agent_config::TwilioConfig;

use crate::ServerError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Places calls through `POST /2010-04-01/Accounts/{sid}/Calls.json`
#[derive(Clone)]
pub struct TwilioClient {
    config: TwilioConfig,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct CallResource {
    sid: String,
    #[serde(default)]
    status: Option<String>,
}

impl TwilioClient {
    /// Returns `Ok(None)` when credentials or caller ID are missing
    pub fn from_config(config: &TwilioConfig) -> Result<Option<Self>, ServerError> {
        if !config.is_configured() {
            return Ok(None);
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        Ok(Some(Self {
            config: config.clone(),
            client,
        }))
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.config.api_base.trim_end_matches('/'),
            self.config.account_sid
        )
    }

    /// Webhook Twilio fetches once the callee answers
    pub fn outbound_webhook(&self) -> String {
        format!("{}/voice/outbound", self.config.public_base_url.trim_end_matches('/'))
    }

    /// Dial `to` and return the new call SID
    pub async fn place_call(&self, to: &str) -> Result<String, ServerError> {
        let to = to.trim();
        if to.is_empty() {
            return Err(ServerError::InvalidRequest("missing destination number".to_string()));
        }

        let webhook = self.outbound_webhook();
        let response = self
            .client
            .post(self.calls_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&[
                ("To", to),
                ("From", self.config.phone_number.as_str()),
                ("Url", webhook.as_str()),
            ])
            .send()
            .await
            .map_err(|e| ServerError::Upstream(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServerError::Upstream(format!("Twilio returned {}: {}", status, body)));
        }

        let call: CallResource = response
            .json()
            .await
            .map_err(|e| ServerError::Upstream(format!("invalid Twilio response: {}", e)))?;

        tracing::info!(
            call_sid = %call.sid,
            status = call.status.as_deref().unwrap_or("unknown"),
            to,
            "Outbound call placed"
        );
        Ok(call.sid)
    }
}
