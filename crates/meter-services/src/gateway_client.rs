//! HTTP client for the payment gateway.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use meter_core::config::GatewayConfig;

use crate::gateway::{
    base64_bytes, CommandRequest, Gateway, GatewayError, PaymentTransaction, ResponseRequest,
};

// ── Request / response bodies ─────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ValidatePaymentBody<'a> {
    payment_request: &'a str,
    service_type: &'a str,
    commodity_type: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ValidationResponse {
    quantity: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct CreatePaymentInfoBody<'a> {
    service_type: &'a str,
    commodity_type: &'a str,
    amount: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ProcessPaymentBody<'a> {
    callback_url: String,
    payment_request: &'a str,
    node_id: &'a str,
    route: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProcessPaymentResponse {
    #[serde(default)]
    session_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ProcessCommandBody {
    session_id: String,
    command_id: String,
    command_type: i32,
    #[serde(with = "base64_bytes")]
    command_body: Bytes,
    node_id: String,
    callback_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ProcessResponseBody {
    #[serde(with = "base64_bytes")]
    response_body: Bytes,
    command_id: String,
    node_id: String,
    session_id: String,
}

// ── Client ────────────────────────────────────────────────────────────────────

/// Talks to the gateway's REST API.
///
/// Callback URLs handed to the gateway point at this node's callback
/// server (`meter-api`).
#[derive(Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    channel_url: String,
    callback_base_url: String,
    service_type: String,
    commodity_type: String,
}

impl HttpGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            channel_url: config.channel_url.trim_end_matches('/').to_string(),
            callback_base_url: config.callback_base_url(),
            service_type: config.service_type.clone(),
            commodity_type: config.commodity_type.clone(),
        })
    }

    async fn post<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, GatewayError> {
        let url = format!("{}{}", self.channel_url, path);
        let resp = self.client.post(&url).json(body).send().await?;
        tracing::debug!(url = %url, status = resp.status().as_u16(), "gateway call");
        check_status(resp).await
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(GatewayError::Status { status, body })
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn validate_payment(&self, payment_request: &str) -> Result<u64, GatewayError> {
        let body = ValidatePaymentBody {
            payment_request,
            service_type: &self.service_type,
            commodity_type: &self.commodity_type,
        };
        let reply: ValidationResponse = self
            .post("/api/utility/validatePayment", &body)
            .await?
            .json()
            .await?;
        Ok(reply.quantity)
    }

    async fn create_payment_info(&self, amount: u64) -> Result<String, GatewayError> {
        let body = CreatePaymentInfoBody {
            service_type: &self.service_type,
            commodity_type: &self.commodity_type,
            amount,
        };
        let claim = self
            .post("/api/utility/createPaymentInfo", &body)
            .await?
            .text()
            .await?;
        if claim.is_empty() {
            return Err(GatewayError::InvalidResponse(
                "empty payment request".to_string(),
            ));
        }
        Ok(claim)
    }

    async fn process_payment(
        &self,
        payment_request: &str,
        node_id: &str,
    ) -> Result<String, GatewayError> {
        let body = ProcessPaymentBody {
            callback_url: format!("{}/api/command", self.callback_base_url),
            payment_request,
            node_id,
            route: Vec::new(),
        };
        let reply: ProcessPaymentResponse = self
            .post("/api/gateway/processPayment", &body)
            .await?
            .json()
            .await?;
        if reply.session_id.is_empty() {
            return Err(GatewayError::MissingSessionId);
        }
        Ok(reply.session_id)
    }

    async fn process_command(&self, command: CommandRequest) -> Result<(), GatewayError> {
        let body = ProcessCommandBody {
            session_id: command.session_id,
            command_id: command.command_id,
            command_type: command.command_type,
            command_body: command.command_body,
            node_id: command.node_id,
            callback_url: format!("{}/api/commandResponse", self.callback_base_url),
        };
        self.post("/api/utility/processCommand", &body).await?;
        Ok(())
    }

    async fn process_response(&self, response: ResponseRequest) -> Result<(), GatewayError> {
        let body = ProcessResponseBody {
            response_body: response.response_body,
            command_id: response.command_id,
            node_id: response.node_id,
            session_id: response.session_id,
        };
        self.post("/api/gateway/processResponse", &body).await?;
        Ok(())
    }

    async fn get_transaction(&self, session_id: &str) -> Result<PaymentTransaction, GatewayError> {
        let mut url = reqwest::Url::parse(&self.channel_url)
            .map_err(|e| GatewayError::InvalidUrl(format!("{}: {e}", self.channel_url)))?;
        url.path_segments_mut()
            .map_err(|_| GatewayError::InvalidUrl(self.channel_url.clone()))?
            .pop_if_empty()
            .extend(["api", "gateway", "transaction", session_id]);

        let resp = self.client.get(url).send().await?;
        let trx = check_status(resp).await?.json().await?;
        Ok(trx)
    }
}
