//! HTTP client for the server-driven push path: an external Android SMS
//! gateway adapter the dispatcher POSTs to directly. Pull-mode deployments
//! never construct this.

use std::time::Duration;

use common::{is_permanent_error_code, Device, OutboundMessage};
use serde::{Deserialize, Serialize};

pub struct AdapterClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct AdapterSendRequest<'a> {
    to: &'a str,
    body: &'a str,
    device_id: String,
}

#[derive(Deserialize)]
struct AdapterSendResponse {
    id: Option<String>,
    #[serde(default)]
    error_code: Option<String>,
}

pub enum AdapterOutcome {
    Sent { external_id: Option<String> },
    Failed {
        error_code: Option<String>,
        message: String,
        permanent: bool,
    },
}

impl AdapterClient {
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("adapter http client builds");
        Self { http, base_url }
    }

    #[tracing::instrument(skip(self, message), fields(message_id = %message.id))]
    pub async fn send(&self, device: &Device, message: &OutboundMessage) -> AdapterOutcome {
        let request = AdapterSendRequest {
            to: &message.to_number,
            body: &message.message_body,
            device_id: device.id.to_string(),
        };
        let response = match self
            .http
            .post(format!("{}/send", self.base_url))
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                return AdapterOutcome::Failed {
                    error_code: None,
                    message: format!("adapter request error: {err}"),
                    permanent: false,
                }
            }
        };

        let status = response.status();
        if status.is_success() {
            let body: AdapterSendResponse = response.json().await.unwrap_or(AdapterSendResponse {
                id: None,
                error_code: None,
            });
            return AdapterOutcome::Sent {
                external_id: body.id,
            };
        }

        let body: AdapterSendResponse = response.json().await.unwrap_or(AdapterSendResponse {
            id: None,
            error_code: None,
        });
        let permanent = body
            .error_code
            .as_deref()
            .map(is_permanent_error_code)
            .unwrap_or(false);
        AdapterOutcome::Failed {
            error_code: body.error_code,
            message: format!("adapter returned {status}"),
            permanent,
        }
    }
}
