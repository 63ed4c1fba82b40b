// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Pull loop forwarding Pub/Sub messages to FireTail.
//!
//! ```text
//!            pull = []  (sleep)
//!           ┌──────┐
//!           v      │
//!        ┌──────────┐  pull = [m..]   ┌────────────┐
//!        │   Idle   │ ──────────────> │ Processing │
//!        └──────────┘                 └─────┬──────┘
//!              ^   shipped + acknowledged   │
//!              └────────────────────────────┤
//!                                           │ any failure
//!                                           v
//!                                     error returned,
//!                                     nothing acknowledged
//! ```
//!
//! Messages are acknowledged only after every record built from them has been
//! accepted by the ingestion endpoint. Any failure in a cycle is returned to
//! the caller without acknowledging, so Pub/Sub redelivers the messages to the
//! next consumer. Logs may be delivered more than once but are never lost.

use std::sync::Arc;
use std::time::Duration;

use firetail_logs::constants::MAX_BATCH_ENTRIES;
use firetail_logs::flusher::LogShipper;
use firetail_logs::log::normalize;
use tracing::{debug, error, info};

use crate::error::ConsumerError;
use crate::subscriber::{PulledMessage, Subscriber};

pub const DEFAULT_MAX_MESSAGES: usize = 10;
pub const DEFAULT_IDLE_BACKOFF: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerState {
    /// No messages held.
    Idle,
    /// Messages pulled but not yet acknowledged.
    Processing(Vec<PulledMessage>),
}

#[derive(Debug, Clone, Copy)]
pub struct ConsumerConfig {
    /// Upper bound on messages requested per pull, at most one batch.
    pub max_messages: usize,
    /// Pause after a pull that returned nothing.
    pub idle_backoff: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        ConsumerConfig {
            max_messages: DEFAULT_MAX_MESSAGES,
            idle_backoff: DEFAULT_IDLE_BACKOFF,
        }
    }
}

pub struct Consumer {
    subscriber: Arc<dyn Subscriber>,
    shipper: Arc<dyn LogShipper>,
    config: ConsumerConfig,
}

impl Consumer {
    #[must_use]
    pub fn new(
        subscriber: Arc<dyn Subscriber>,
        shipper: Arc<dyn LogShipper>,
        mut config: ConsumerConfig,
    ) -> Self {
        config.max_messages = config.max_messages.clamp(1, MAX_BATCH_ENTRIES);
        Consumer {
            subscriber,
            shipper,
            config,
        }
    }

    /// Runs cycles until one fails. Only returns on error.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConsumerError`]; the messages of the failed cycle
    /// are left unacknowledged.
    pub async fn run(&self) -> Result<(), ConsumerError> {
        info!(
            "Pulling up to {} messages per cycle",
            self.config.max_messages
        );
        let mut state = ConsumerState::Idle;
        loop {
            state = self.step(state).await?;
        }
    }

    /// Performs a single state transition.
    ///
    /// # Errors
    ///
    /// Pull, decode, delivery and acknowledge failures are all returned as is.
    pub async fn step(&self, state: ConsumerState) -> Result<ConsumerState, ConsumerError> {
        match state {
            ConsumerState::Idle => {
                let messages = self
                    .subscriber
                    .pull(self.config.max_messages)
                    .await
                    .map_err(ConsumerError::Pull)?;
                if messages.is_empty() {
                    debug!("No messages pulled, sleeping {:?}", self.config.idle_backoff);
                    tokio::time::sleep(self.config.idle_backoff).await;
                    return Ok(ConsumerState::Idle);
                }
                Ok(ConsumerState::Processing(messages))
            }
            ConsumerState::Processing(messages) => {
                self.process(messages).await?;
                Ok(ConsumerState::Idle)
            }
        }
    }

    async fn process(&self, messages: Vec<PulledMessage>) -> Result<(), ConsumerError> {
        let n_messages = messages.len();
        let mut ack_ids = Vec::with_capacity(n_messages);
        let mut records = Vec::with_capacity(n_messages);

        for message in messages {
            let record = normalize(&message.data).map_err(|source| {
                error!("Message {} is not a log entry: {source}", message.message_id);
                ConsumerError::Decode {
                    message_id: message.message_id.clone(),
                    source,
                }
            })?;
            records.push(record);
            ack_ids.push(message.ack_id);
        }

        self.shipper.ship(records).await?;
        self.subscriber
            .acknowledge(&ack_ids)
            .await
            .map_err(ConsumerError::Acknowledge)?;
        debug!("Shipped and acknowledged {n_messages} messages");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SubscriberError;
    use crate::subscriber::AckId;
    use async_trait::async_trait;
    use firetail_logs::errors::ShipError;
    use firetail_logs::log::CanonicalLogRecord;
    use reqwest::StatusCode;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeSubscriber {
        pulls: Mutex<VecDeque<Vec<PulledMessage>>>,
        requested: Mutex<Vec<usize>>,
        acked: Mutex<Vec<AckId>>,
    }

    impl FakeSubscriber {
        fn with_pulls(pulls: Vec<Vec<PulledMessage>>) -> Self {
            FakeSubscriber {
                pulls: Mutex::new(pulls.into()),
                ..Default::default()
            }
        }

        fn acked(&self) -> Vec<AckId> {
            self.acked.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Subscriber for FakeSubscriber {
        async fn pull(&self, max_messages: usize) -> Result<Vec<PulledMessage>, SubscriberError> {
            self.requested.lock().unwrap().push(max_messages);
            Ok(self.pulls.lock().unwrap().pop_front().unwrap_or_default())
        }

        async fn acknowledge(&self, ack_ids: &[AckId]) -> Result<(), SubscriberError> {
            self.acked.lock().unwrap().extend_from_slice(ack_ids);
            Ok(())
        }
    }

    struct FakeShipper {
        fail: bool,
        shipped: Mutex<Vec<CanonicalLogRecord>>,
    }

    impl FakeShipper {
        fn new(fail: bool) -> Self {
            FakeShipper {
                fail,
                shipped: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LogShipper for FakeShipper {
        async fn deliver(
            &self,
            batch: &[CanonicalLogRecord],
        ) -> Result<Option<Value>, ShipError> {
            if self.fail {
                return Err(ShipError::Destination(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "try later".to_string(),
                ));
            }
            self.shipped.lock().unwrap().extend_from_slice(batch);
            Ok(None)
        }
    }

    fn message(n: u16) -> PulledMessage {
        let log = json!({
            "timestamp": "2023-12-14T20:57:40.111Z",
            "httpRequest": { "status": n, "requestUrl": format!("https://gw.dev/pets/{n}") },
            "jsonPayload": { "backendRequest": { "path": format!("/?pet_id={n}") } }
        });
        PulledMessage {
            ack_id: AckId::new(format!("ack-{n}")),
            message_id: n.to_string(),
            data: log.to_string().into_bytes(),
        }
    }

    fn consumer(subscriber: &Arc<FakeSubscriber>, shipper: &Arc<FakeShipper>) -> Consumer {
        Consumer::new(
            subscriber.clone(),
            shipper.clone(),
            ConsumerConfig {
                max_messages: 5,
                idle_backoff: Duration::from_secs(2),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_empty_pull_sleeps_and_stays_idle() {
        let subscriber = Arc::new(FakeSubscriber::default());
        let shipper = Arc::new(FakeShipper::new(false));
        let consumer = consumer(&subscriber, &shipper);

        let before = tokio::time::Instant::now();
        let state = consumer.step(ConsumerState::Idle).await.unwrap();

        assert_eq!(state, ConsumerState::Idle);
        assert!(before.elapsed() >= Duration::from_secs(2));
        assert_eq!(*subscriber.requested.lock().unwrap(), vec![5]);
    }

    #[tokio::test]
    async fn test_idle_pull_moves_to_processing() {
        let subscriber = Arc::new(FakeSubscriber::with_pulls(vec![vec![message(1), message(2)]]));
        let shipper = Arc::new(FakeShipper::new(false));
        let consumer = consumer(&subscriber, &shipper);

        let state = consumer.step(ConsumerState::Idle).await.unwrap();

        assert_eq!(state, ConsumerState::Processing(vec![message(1), message(2)]));
        assert!(subscriber.acked().is_empty());
    }

    #[tokio::test]
    async fn test_processing_success_acks_every_message_once() {
        let subscriber = Arc::new(FakeSubscriber::default());
        let shipper = Arc::new(FakeShipper::new(false));
        let consumer = consumer(&subscriber, &shipper);

        let messages = vec![message(200), message(404), message(500)];
        let state = consumer
            .step(ConsumerState::Processing(messages))
            .await
            .unwrap();

        assert_eq!(state, ConsumerState::Idle);
        assert_eq!(
            subscriber.acked(),
            vec![AckId::new("ack-200"), AckId::new("ack-404"), AckId::new("ack-500")]
        );
        let shipped = shipper.shipped.lock().unwrap();
        let statuses: Vec<u16> = shipped.iter().map(|r| r.response.status_code).collect();
        assert_eq!(statuses, vec![200, 404, 500]);
        assert_eq!(shipped[1].request.resource, "/pets/{pet_id}");
    }

    #[tokio::test]
    async fn test_processing_delivery_failure_acks_nothing() {
        let subscriber = Arc::new(FakeSubscriber::default());
        let shipper = Arc::new(FakeShipper::new(true));
        let consumer = consumer(&subscriber, &shipper);

        let err = consumer
            .step(ConsumerState::Processing(vec![message(1), message(2)]))
            .await
            .unwrap_err();

        assert!(matches!(err, ConsumerError::Delivery(_)));
        assert!(subscriber.acked().is_empty());
    }

    #[tokio::test]
    async fn test_processing_undecodable_message_acks_nothing() {
        let subscriber = Arc::new(FakeSubscriber::default());
        let shipper = Arc::new(FakeShipper::new(false));
        let consumer = consumer(&subscriber, &shipper);

        let garbage = PulledMessage {
            ack_id: AckId::new("ack-garbage"),
            message_id: "garbage".to_string(),
            data: b"not json".to_vec(),
        };
        let err = consumer
            .step(ConsumerState::Processing(vec![message(1), garbage]))
            .await
            .unwrap_err();

        assert!(matches!(err, ConsumerError::Decode { ref message_id, .. } if message_id == "garbage"));
        assert!(subscriber.acked().is_empty());
        assert!(shipper.shipped.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_first_failure() {
        let subscriber = Arc::new(FakeSubscriber::with_pulls(vec![vec![message(1)]]));
        let shipper = Arc::new(FakeShipper::new(true));
        let consumer = consumer(&subscriber, &shipper);

        let err = consumer.run().await.unwrap_err();

        assert!(matches!(err, ConsumerError::Delivery(_)));
        assert!(subscriber.acked().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_acks_each_cycle_after_delivery() {
        let subscriber = Arc::new(FakeSubscriber::with_pulls(vec![
            vec![message(1), message(2)],
            vec![],
            vec![message(3)],
        ]));
        let shipper = Arc::new(FakeShipper::new(false));
        let consumer = consumer(&subscriber, &shipper);

        let mut state = ConsumerState::Idle;
        for _ in 0..5 {
            state = consumer.step(state).await.unwrap();
        }

        assert_eq!(state, ConsumerState::Idle);
        assert_eq!(
            subscriber.acked(),
            vec![AckId::new("ack-1"), AckId::new("ack-2"), AckId::new("ack-3")]
        );
        assert_eq!(shipper.shipped.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_max_messages_is_clamped() {
        let subscriber: Arc<dyn Subscriber> = Arc::new(FakeSubscriber::default());
        let shipper: Arc<dyn LogShipper> = Arc::new(FakeShipper::new(false));

        let consumer = Consumer::new(
            subscriber.clone(),
            shipper.clone(),
            ConsumerConfig {
                max_messages: 1_000,
                ..Default::default()
            },
        );
        assert_eq!(consumer.config.max_messages, 100);

        let consumer = Consumer::new(
            subscriber,
            shipper,
            ConsumerConfig {
                max_messages: 0,
                ..Default::default()
            },
        );
        assert_eq!(consumer.config.max_messages, 1);
    }
}
