//! Retaining in-memory event log.
//!
//! [`InMemoryEventBus`] keeps every published event, in publish order, for the
//! lifetime of the bus. Each topic is a single partition (`0`) whose offsets
//! count from zero. A subscriber first receives the retained records at or
//! after its starting [`EventPosition`] and then live ones. Replay and
//! registration happen under one lock, so a subscriber sees neither gaps nor
//! duplicates.
//!
//! Failure injection:
//! - [`InMemoryEventBus::fail_publishes_with`] makes every publish return an error
//! - [`InMemoryEventBus::set_publish_delay`] delays acknowledgements (timeouts)

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Locks are never poisoned in tests

use job_postings_core::event::SerializedEvent;
use job_postings_core::event_bus::{Delivery, EventBus, EventBusError, EventStream, LogOffset};
use job_postings_core::projection::EventPosition;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Every topic lives on this partition.
pub const PARTITION: i32 = 0;

struct Subscriber {
    topics: Vec<String>,
    from: EventPosition,
    tx: mpsc::UnboundedSender<Result<Delivery, EventBusError>>,
}

impl Subscriber {
    fn wants(&self, offset: &LogOffset) -> bool {
        self.topics.contains(&offset.topic)
            && offset.offset >= self.from.next_offset(&offset.topic, offset.partition).unwrap_or(0)
    }
}

#[derive(Default)]
struct BusState {
    /// Every published record, in publish order.
    log: Vec<Delivery>,
    subscribers: Vec<Subscriber>,
    publish_failure: Option<EventBusError>,
    publish_delay: Option<Duration>,
    publish_attempts: usize,
}

/// In-memory [`EventBus`] for fast, deterministic tests.
///
/// # Example
///
/// ```
/// use job_postings_testing::InMemoryEventBus;
/// use job_postings_core::event::SerializedEvent;
/// use job_postings_core::event_bus::EventBus;
/// use chrono::Utc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = InMemoryEventBus::new();
/// let event = SerializedEvent::new("JobDeleted.v1".into(), "job-1".into(), Utc::now(), vec![]);
/// bus.publish("job-events", &event).await?;
///
/// assert_eq!(bus.published("job-events").len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryEventBus {
    state: Arc<Mutex<BusState>>,
}

impl InMemoryEventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish fail with `error`.
    pub fn fail_publishes_with(&self, error: EventBusError) {
        self.state.lock().unwrap().publish_failure = Some(error);
    }

    /// Delay every acknowledgement by `delay` (the event is still appended).
    pub fn set_publish_delay(&self, delay: Option<Duration>) {
        self.state.lock().unwrap().publish_delay = delay;
    }

    /// Events successfully appended to `topic`, in publish order.
    #[must_use]
    pub fn published(&self, topic: &str) -> Vec<SerializedEvent> {
        self.state
            .lock()
            .unwrap()
            .log
            .iter()
            .filter(|d| d.offset.topic == topic)
            .map(|d| d.event.clone())
            .collect()
    }

    /// Number of events successfully appended across all topics.
    #[must_use]
    pub fn publish_count(&self) -> usize {
        self.state.lock().unwrap().log.len()
    }

    /// Number of publish calls, including failed ones.
    #[must_use]
    pub fn publish_attempts(&self) -> usize {
        self.state.lock().unwrap().publish_attempts
    }

    fn append(&self, topic: &str, event: &SerializedEvent) -> Result<(), EventBusError> {
        let mut state = self.state.lock().unwrap();
        state.publish_attempts += 1;

        if let Some(error) = state.publish_failure.clone() {
            return Err(error);
        }

        let next = state.log.iter().filter(|d| d.offset.topic == topic).count();
        let delivery = Delivery {
            event: event.clone(),
            offset: LogOffset::new(topic, PARTITION, i64::try_from(next).unwrap()),
        };

        state.subscribers.retain(|subscriber| {
            if subscriber.wants(&delivery.offset) {
                subscriber.tx.send(Ok(delivery.clone())).is_ok()
            } else {
                !subscriber.tx.is_closed()
            }
        });
        state.log.push(delivery);
        Ok(())
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let event = event.clone();
        Box::pin(async move {
            self.append(&topic, &event)?;

            let delay = self.state.lock().unwrap().publish_delay;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
        from: &EventPosition,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let subscriber_topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();
        let from = from.clone();
        Box::pin(async move {
            let (tx, rx) = mpsc::unbounded_channel();
            let subscriber = Subscriber {
                topics: subscriber_topics,
                from,
                tx,
            };

            {
                let mut state = self.state.lock().unwrap();
                for delivery in &state.log {
                    if subscriber.wants(&delivery.offset) {
                        // Receiver is alive: we still hold it
                        let _ = subscriber.tx.send(Ok(delivery.clone()));
                    }
                }
                state.subscribers.push(subscriber);
            }

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(stream) as EventStream)
        })
    }
}
