//! Push delivery transports. A transport attempts exactly one delivery per call and
//! reports whether a failure is permanent (the subscription should be pruned).

use futures::future::BoxFuture;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::dao::models::PushSubscriptionEntity;

/// JSON payload delivered to the device.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub match_id: Uuid,
    pub title: String,
    pub body: String,
    pub url: String,
    /// Whether the device should show the notification with high priority.
    pub urgent: bool,
}

/// Device address and keys the payload is encrypted for.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PushTarget {
    pub endpoint: String,
    pub keys: PushKeys,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

impl From<&PushSubscriptionEntity> for PushTarget {
    fn from(subscription: &PushSubscriptionEntity) -> Self {
        Self {
            endpoint: subscription.endpoint.clone(),
            keys: PushKeys {
                p256dh: subscription.public_key.clone(),
                auth: subscription.auth_secret.clone(),
            },
        }
    }
}

/// A single failed delivery. Never escalated to the action that caused it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("push delivery to `{endpoint}` failed: {message}")]
pub struct DeliveryFailure {
    pub endpoint: String,
    /// The endpoint is gone for good (expired or unsubscribed).
    pub permanent: bool,
    pub message: String,
}

impl DeliveryFailure {
    pub fn transient(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            permanent: false,
            message: message.into(),
        }
    }

    pub fn permanent(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            permanent: true,
            message: message.into(),
        }
    }
}

/// Abstraction over the push delivery backend.
pub trait PushTransport: Send + Sync {
    /// Attempt one delivery of `payload` to `target`.
    fn deliver(
        &self,
        target: PushTarget,
        payload: PushPayload,
    ) -> BoxFuture<'static, Result<(), DeliveryFailure>>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Transport used when no gateway is configured: deliveries are logged and succeed.
#[derive(Debug, Clone, Default)]
pub struct NoopPushTransport;

impl PushTransport for NoopPushTransport {
    fn deliver(
        &self,
        target: PushTarget,
        payload: PushPayload,
    ) -> BoxFuture<'static, Result<(), DeliveryFailure>> {
        Box::pin(async move {
            debug!(
                endpoint = %target.endpoint,
                kind = %payload.kind,
                "no push gateway configured; dropping delivery"
            );
            Ok(())
        })
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}

#[cfg(feature = "http-push")]
pub use self::http::{HttpPushTransport, PushSetupError};

#[cfg(feature = "http-push")]
mod http {
    use std::{sync::Arc, time::Duration};

    use futures::future::BoxFuture;
    use reqwest::{Client, StatusCode};
    use serde::Serialize;
    use thiserror::Error;

    use super::{DeliveryFailure, PushPayload, PushTarget, PushTransport};

    /// Failure to build the HTTP push client.
    #[derive(Debug, Error)]
    pub enum PushSetupError {
        #[error("failed to build push gateway client")]
        ClientBuilder {
            #[source]
            source: reqwest::Error,
        },
    }

    #[derive(Serialize)]
    struct GatewayRequest<'a> {
        subscription: &'a PushTarget,
        payload: &'a PushPayload,
    }

    /// Posts each delivery to a Web-Push gateway that encrypts and forwards it.
    #[derive(Clone)]
    pub struct HttpPushTransport {
        client: Client,
        gateway_url: Arc<str>,
    }

    impl HttpPushTransport {
        pub fn new(gateway_url: &str, timeout: Duration) -> Result<Self, PushSetupError> {
            let client = Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|source| PushSetupError::ClientBuilder { source })?;
            Ok(Self {
                client,
                gateway_url: Arc::from(gateway_url.trim_end_matches('/')),
            })
        }

        async fn post(&self, target: PushTarget, payload: PushPayload) -> Result<(), DeliveryFailure> {
            let response = self
                .client
                .post(self.gateway_url.as_ref())
                .json(&GatewayRequest {
                    subscription: &target,
                    payload: &payload,
                })
                .send()
                .await
                .map_err(|err| DeliveryFailure::transient(&target.endpoint, err.to_string()))?;

            match response.status() {
                status if status.is_success() => Ok(()),
                status @ (StatusCode::NOT_FOUND | StatusCode::GONE) => Err(
                    DeliveryFailure::permanent(&target.endpoint, format!("gateway returned {status}")),
                ),
                status => Err(DeliveryFailure::transient(
                    &target.endpoint,
                    format!("gateway returned {status}"),
                )),
            }
        }
    }

    impl PushTransport for HttpPushTransport {
        fn deliver(
            &self,
            target: PushTarget,
            payload: PushPayload,
        ) -> BoxFuture<'static, Result<(), DeliveryFailure>> {
            let transport = self.clone();
            Box::pin(async move { transport.post(target, payload).await })
        }

        fn name(&self) -> &'static str {
            "http"
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    #[test]
    fn payload_uses_camel_case_and_type_field() {
        let match_id = Uuid::new_v4();
        let payload = PushPayload {
            kind: "chat_message".into(),
            match_id,
            title: "New message".into(),
            body: "see you at 7".into(),
            url: format!("/matches/{match_id}/chat"),
            urgent: false,
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "chat_message");
        assert_eq!(json["matchId"], match_id.to_string());
        assert!(json.get("match_id").is_none());
    }

    #[test]
    fn target_carries_the_subscription_keys() {
        let subscription = PushSubscriptionEntity {
            user_id: Uuid::new_v4(),
            endpoint: "https://push.example/abc".into(),
            public_key: "pk".into(),
            auth_secret: "secret".into(),
            updated_at: SystemTime::now(),
        };
        let target = PushTarget::from(&subscription);
        assert_eq!(target.endpoint, subscription.endpoint);
        assert_eq!(target.keys.p256dh, "pk");
        assert_eq!(target.keys.auth, "secret");
    }
}
