//! # Stripe Payment Intents
//!
//! Implementation of the Stripe PaymentIntents API as the storefront's
//! payment provider. The client confirms the intent with the returned
//! `client_secret`; Stripe reports the outcome through the webhook.

use crate::config::StripeConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use shop_core::{IntentRequest, PaymentIntent, PaymentProvider, ShopError, ShopResult};
use tracing::{debug, error, info, instrument};

const PROVIDER: &str = "stripe";

/// Stripe PaymentIntents provider
pub struct StripeIntentProvider {
    config: StripeConfig,
    client: Client,
}

impl StripeIntentProvider {
    /// Create a new Stripe provider
    pub fn new(config: StripeConfig) -> ShopResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ShopError::Configuration(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Create from environment variables
    pub fn from_env() -> ShopResult<Self> {
        Self::new(StripeConfig::from_env()?)
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }

    /// Form fields for `POST /v1/payment_intents`
    fn form_params(request: &IntentRequest) -> Vec<(&'static str, String)> {
        vec![
            ("amount", request.amount.amount.to_string()),
            ("currency", request.amount.currency.as_str().to_string()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
            ("metadata[order_id]", request.order_id.to_string()),
            ("metadata[user_id]", request.user_id.to_string()),
        ]
    }

    fn transport_error(&self, e: reqwest::Error) -> ShopError {
        if e.is_timeout() {
            ShopError::Timeout {
                operation: "stripe",
                after: self.config.timeout,
            }
        } else {
            ShopError::PaymentProvider {
                provider: PROVIDER.to_string(),
                message: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl PaymentProvider for StripeIntentProvider {
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn create_intent(&self, request: &IntentRequest) -> ShopResult<PaymentIntent> {
        if request.amount.amount <= 0 {
            return Err(ShopError::InvalidInput(format!(
                "cannot charge {}",
                request.amount.display()
            )));
        }

        debug!(
            "Creating Stripe payment intent: amount={}, currency={}",
            request.amount.amount, request.amount.currency
        );

        let url = format!("{}/v1/payment_intents", self.config.api_base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.config.auth_header())
            .header("Stripe-Version", &self.config.api_version)
            .header("Idempotency-Key", &request.idempotency_key)
            .form(&Self::form_params(request))
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            error!("Stripe API error: status={}, body={}", status, body);

            // Parse Stripe error
            if let Ok(error_response) = serde_json::from_str::<StripeErrorResponse>(&body) {
                return Err(ShopError::PaymentProvider {
                    provider: PROVIDER.to_string(),
                    message: error_response.error.describe(),
                });
            }

            return Err(ShopError::PaymentProvider {
                provider: PROVIDER.to_string(),
                message: format!("HTTP {}: {}", status, body),
            });
        }

        let intent: StripePaymentIntentResponse =
            serde_json::from_str(&body).map_err(|e| ShopError::PaymentProvider {
                provider: PROVIDER.to_string(),
                message: format!("Failed to parse Stripe response: {}", e),
            })?;

        info!(
            "Created Stripe payment intent: id={}, status={}",
            intent.id, intent.status
        );

        Ok(PaymentIntent {
            intent_id: intent.id,
            client_secret: intent.client_secret,
            payment_method: Some(
                intent
                    .payment_method_types
                    .into_iter()
                    .next()
                    .unwrap_or_else(|| "card".to_string()),
            ),
        })
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

// =============================================================================
// Stripe API Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct StripePaymentIntentResponse {
    id: String,
    client_secret: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    payment_method_types: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeError,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

impl StripeError {
    fn describe(&self) -> String {
        match &self.code {
            Some(code) => format!("{} ({})", self.message, code),
            None => self.message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shop_core::{Currency, OrderId, Price, UserId};
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(amount: f64) -> IntentRequest {
        IntentRequest {
            order_id: OrderId(42),
            user_id: UserId(7),
            amount: Price::new(amount, Currency::USD),
            idempotency_key: "idem-123".to_string(),
        }
    }

    fn provider(server: &MockServer) -> StripeIntentProvider {
        let config = StripeConfig::new("sk_test_abc").with_api_base_url(server.uri());
        StripeIntentProvider::new(config).unwrap()
    }

    #[test]
    fn test_form_params_use_minor_units() {
        let params = StripeIntentProvider::form_params(&request(25.5));
        assert!(params.contains(&("amount", "2550".to_string())));
        assert!(params.contains(&("currency", "usd".to_string())));
        assert!(params.contains(&("metadata[order_id]", "42".to_string())));
    }

    #[tokio::test]
    async fn test_create_intent_returns_client_secret() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/payment_intents"))
            .and(header("Authorization", "Bearer sk_test_abc"))
            .and(header("Idempotency-Key", "idem-123"))
            .and(body_string_contains("amount=2500"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "pi_123",
                "client_secret": "pi_123_secret_456",
                "status": "requires_payment_method",
                "payment_method_types": ["card"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let intent = provider(&server).create_intent(&request(25.0)).await.unwrap();
        assert_eq!(intent.intent_id, "pi_123");
        assert_eq!(intent.client_secret, "pi_123_secret_456");
        assert_eq!(intent.payment_method.as_deref(), Some("card"));
    }

    #[tokio::test]
    async fn test_stripe_error_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/payment_intents"))
            .respond_with(ResponseTemplate::new(402).set_body_json(serde_json::json!({
                "error": { "message": "Your card was declined.", "code": "card_declined" }
            })))
            .mount(&server)
            .await;

        let err = provider(&server).create_intent(&request(10.0)).await.unwrap_err();
        match err {
            ShopError::PaymentProvider { provider, message } => {
                assert_eq!(provider, "stripe");
                assert!(message.contains("card_declined"));
            }
            other => panic!("expected provider error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_slow_stripe_is_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let config = StripeConfig::new("sk_test_abc")
            .with_api_base_url(server.uri())
            .with_timeout(Duration::from_millis(100));
        let err = StripeIntentProvider::new(config)
            .unwrap()
            .create_intent(&request(10.0))
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_zero_amount_never_reaches_stripe() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = provider(&server).create_intent(&request(0.0)).await.unwrap_err();
        assert!(matches!(err, ShopError::InvalidInput(_)));
    }
}
