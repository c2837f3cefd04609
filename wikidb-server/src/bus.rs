//! In-process message bus
//!
//! Consumers register a [`MessageHandler`] under an address; senders issue
//! a request and await exactly one reply or failure. Every delivery is
//! handled on its own task, so a slow request does not hold up others on
//! the same address.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, RwLock};
use wikidb_core::{Envelope, Failure};

/// Deliveries buffered per consumer before senders wait
const CONSUMER_BUFFER: usize = 64;

/// Receives envelopes sent to an address
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, envelope: Envelope) -> Result<Value, Failure>;
}

/// Bus error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("no handlers for address '{address}'")]
    NoHandlers { address: String },

    #[error("address '{address}' already has a consumer")]
    AddressInUse { address: String },

    #[error("handler for '{address}' dropped the reply")]
    ReplyDropped { address: String },

    /// The handler answered with a failure
    #[error(transparent)]
    Recipient(#[from] Failure),
}

impl BusError {
    /// The handler's failure, if that is what this is
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            BusError::Recipient(failure) => Some(failure),
            _ => None,
        }
    }
}

struct Delivery {
    envelope: Envelope,
    reply: oneshot::Sender<Result<Value, Failure>>,
}

/// Cloneable handle to the bus; clones share one address table
#[derive(Clone, Default)]
pub struct EventBus {
    consumers: Arc<RwLock<HashMap<String, mpsc::Sender<Delivery>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `address`.
    ///
    /// # Errors
    ///
    /// `AddressInUse` if the address already has a consumer.
    pub async fn consumer(
        &self,
        address: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), BusError> {
        let mut consumers = self.consumers.write().await;
        if consumers.contains_key(address) {
            return Err(BusError::AddressInUse {
                address: address.to_owned(),
            });
        }

        let (tx, mut rx) = mpsc::channel::<Delivery>(CONSUMER_BUFFER);
        consumers.insert(address.to_owned(), tx);

        tracing::debug!(address = %address, "Consumer registered");

        let address = address.to_owned();
        tokio::spawn(async move {
            while let Some(delivery) = rx.recv().await {
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    let result = handler.handle(delivery.envelope).await;
                    // Sender may have stopped waiting
                    let _ = delivery.reply.send(result);
                });
            }
            tracing::debug!(address = %address, "Consumer closed");
        });

        Ok(())
    }

    /// Remove the consumer on `address`; in-flight deliveries still finish
    pub async fn unregister(&self, address: &str) -> bool {
        self.consumers.write().await.remove(address).is_some()
    }

    pub async fn has_consumer(&self, address: &str) -> bool {
        self.consumers.read().await.contains_key(address)
    }

    /// Send `envelope` to `address` and wait for the reply.
    pub async fn request(&self, address: &str, envelope: Envelope) -> Result<Value, BusError> {
        let no_handlers = || BusError::NoHandlers {
            address: address.to_owned(),
        };

        let sender = self
            .consumers
            .read()
            .await
            .get(address)
            .cloned()
            .ok_or_else(no_handlers)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        sender
            .send(Delivery {
                envelope,
                reply: reply_tx,
            })
            .await
            .map_err(|_| no_handlers())?;

        match reply_rx.await {
            Ok(Ok(body)) => Ok(body),
            Ok(Err(failure)) => Err(BusError::Recipient(failure)),
            Err(_) => Err(BusError::ReplyDropped {
                address: address.to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wikidb_core::ErrorCode;

    struct Echo;

    #[async_trait]
    impl MessageHandler for Echo {
        async fn handle(&self, envelope: Envelope) -> Result<Value, Failure> {
            match envelope.action() {
                Some("fail") => Err(Failure::bad_action("fail")),
                Some("slow") => {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(json!("slow"))
                }
                Some("panic") => panic!("handler blew up"),
                _ => Ok(envelope.body),
            }
        }
    }

    #[tokio::test]
    async fn request_reaches_consumer() {
        let bus = EventBus::new();
        bus.consumer("echo", Arc::new(Echo)).await.unwrap();

        let reply = bus
            .request("echo", Envelope::with_action("x").with_body(json!({"a": 1})))
            .await
            .unwrap();
        assert_eq!(reply, json!({"a": 1}));
    }

    #[tokio::test]
    async fn unknown_address_has_no_handlers() {
        let bus = EventBus::new();
        let err = bus.request("nowhere", Envelope::default()).await.unwrap_err();
        assert_eq!(
            err,
            BusError::NoHandlers {
                address: "nowhere".into()
            }
        );
    }

    #[tokio::test]
    async fn handler_failure_is_recipient_error() {
        let bus = EventBus::new();
        bus.consumer("echo", Arc::new(Echo)).await.unwrap();

        let err = bus
            .request("echo", Envelope::with_action("fail"))
            .await
            .unwrap_err();
        assert_eq!(err.failure().map(|f| f.code), Some(ErrorCode::BadAction));
    }

    #[tokio::test]
    async fn duplicate_consumer_rejected() {
        let bus = EventBus::new();
        bus.consumer("echo", Arc::new(Echo)).await.unwrap();

        let err = bus.consumer("echo", Arc::new(Echo)).await.unwrap_err();
        assert!(matches!(err, BusError::AddressInUse { .. }));
    }

    #[tokio::test]
    async fn unregister_stops_delivery() {
        let bus = EventBus::new();
        bus.consumer("echo", Arc::new(Echo)).await.unwrap();
        assert!(bus.unregister("echo").await);
        assert!(!bus.has_consumer("echo").await);

        let err = bus.request("echo", Envelope::default()).await.unwrap_err();
        assert!(matches!(err, BusError::NoHandlers { .. }));
    }

    #[tokio::test]
    async fn panicking_handler_drops_reply() {
        let bus = EventBus::new();
        bus.consumer("echo", Arc::new(Echo)).await.unwrap();

        let err = bus
            .request("echo", Envelope::with_action("panic"))
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::ReplyDropped { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_request_does_not_block_others() {
        let bus = EventBus::new();
        bus.consumer("echo", Arc::new(Echo)).await.unwrap();

        let slow = {
            let bus = bus.clone();
            tokio::spawn(async move { bus.request("echo", Envelope::with_action("slow")).await })
        };
        tokio::task::yield_now().await;

        let fast = bus
            .request("echo", Envelope::with_action("x").with_body(json!(1)))
            .await
            .unwrap();
        assert_eq!(fast, json!(1));
        assert!(!slow.is_finished());

        assert_eq!(slow.await.unwrap().unwrap(), json!("slow"));
    }
}
