//! Redpanda event log for the job postings service.
//!
//! This crate provides a Redpanda-backed implementation of the [`EventBus`]
//! trait from `job-postings-core`. It uses rdkafka, so any Kafka-compatible
//! broker works (Redpanda, Apache Kafka, MSK, ...).
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   JobService    │  add / update / delete
//! └────────┬────────┘
//!          │ publish (key = JobId)
//!          ▼
//! ┌─────────────────┐
//! │    Redpanda     │◄─── Source of truth (append-only, ordered per key)
//! │   job-events    │
//! └────────┬────────┘
//!          │ assign (from checkpoint)
//!          ▼
//! ┌─────────────────┐
//! │ Aggregation     │──► materialized view
//! │ worker          │
//! └─────────────────┘
//! ```
//!
//! # Ordering
//!
//! Every record is keyed by [`SerializedEvent::key`] (the aggregate id), so all
//! events of one posting land on the same partition in publish order. The
//! producer is idempotent, which keeps librdkafka's own transport resends from
//! reordering or duplicating a key's events. The adapter never retries a
//! failed or unacknowledged publish: that outcome is returned to the caller.
//!
//! # Record Layout
//!
//! A [`SerializedEvent`] maps onto native record fields; the value is the
//! encoded domain event and nothing else:
//!
//! | Event field  | Kafka record                  |
//! |--------------|-------------------------------|
//! | `key`        | record key                    |
//! | `timestamp`  | record timestamp (create time)|
//! | `event_type` | `event_type` header           |
//! | `data`       | record value                  |
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery**, driven by the caller's saved position:
//! - [`EventBus::subscribe`] assigns every partition of the topics explicitly,
//!   seeking each one to the next offset recorded in the given
//!   [`EventPosition`], or to its first retained record
//! - Offsets are never committed to the broker; the subscriber's checkpoint is
//!   the only cursor, so it decides where a restart resumes
//! - Records handled after the last checkpoint save are delivered again
//!
//! **Configuration options**:
//! - `consumer_group`: Consumer identity reported to the broker
//! - `buffer_size`: Event buffer (default: 1000) for handling bursts
//! - `auto_offset_reset`: Where to restart when a saved offset is no longer
//!   retained (default: "earliest")
//!
//! # Example
//!
//! ```no_run
//! use job_postings_redpanda::RedpandaEventBus;
//! use job_postings_core::event_bus::EventBus;
//! use job_postings_core::event::SerializedEvent;
//! use job_postings_core::projection::EventPosition;
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let event_bus = RedpandaEventBus::new("localhost:9092")?;
//!
//! let event = SerializedEvent::new(
//!     "JobDeleted.v1".to_string(),
//!     "job-123".to_string(),
//!     chrono::Utc::now(),
//!     br#"{"type":"deleted"}"#.to_vec(),
//! );
//! event_bus.publish("job-events", &event).await?;
//!
//! let mut stream = event_bus
//!     .subscribe(&["job-events"], &EventPosition::beginning())
//!     .await?;
//! while let Some(result) = stream.next().await {
//!     match result {
//!         Ok(delivery) => println!("Received: {} at {:?}", delivery.event, delivery.offset),
//!         Err(e) => eprintln!("Error: {}", e),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Utc};
use job_postings_core::event::SerializedEvent;
use job_postings_core::event_bus::{Delivery, EventBus, EventBusError, EventStream, LogOffset};
use job_postings_core::projection::EventPosition;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

const DEFAULT_ACKS: &str = "all";
const DEFAULT_COMPRESSION: &str = "none";
const DEFAULT_OFFSET_RESET: &str = "earliest";
const DEFAULT_BUFFER_SIZE: usize = 1000;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Record header carrying [`SerializedEvent::event_type`].
pub const EVENT_TYPE_HEADER: &str = "event_type";

/// Redpanda event bus implementation.
///
/// - **Ordered per key**: records are keyed by aggregate id
/// - **Idempotent producer**: `enable.idempotence=true`, `acks=all` by default
/// - **Explicit assignment**: a subscription reads every partition from the
///   caller's position
/// - **Bounded publish**: a send not acknowledged within the timeout is an error
///
/// # Example
///
/// ```no_run
/// use job_postings_redpanda::RedpandaEventBus;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let event_bus = RedpandaEventBus::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .compression("lz4")
///     .consumer_group("job-aggregator")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaEventBus {
    /// Kafka producer for publishing events
    producer: FutureProducer,
    /// Broker addresses (for creating consumers)
    brokers: String,
    /// Producer send timeout
    timeout: Duration,
    /// Consumer group ID reported to the broker (if explicitly set)
    consumer_group: Option<String>,
    /// Event buffer size for subscribers
    buffer_size: usize,
    /// Auto offset reset policy
    auto_offset_reset: String,
}

impl RedpandaEventBus {
    /// Create a new Redpanda event bus with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be
    /// created (invalid broker list or configuration).
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the event bus.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }
}

/// Builder for configuring a [`RedpandaEventBus`].
#[derive(Default)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    consumer_group: Option<String>,
    buffer_size: Option<usize>,
    auto_offset_reset: Option<String>,
}

impl RedpandaEventBusBuilder {
    /// Set the broker addresses (comma-separated, e.g. "localhost:9092").
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the producer acknowledgment mode.
    ///
    /// The idempotent producer requires `"all"`, which is the default.
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec: "none", "gzip", "snappy", "lz4", "zstd".
    ///
    /// Default: "none"
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the producer send timeout.
    ///
    /// Also used as librdkafka's `message.timeout.ms`, so a message is never
    /// delivered after the caller was told the publish failed, and as the
    /// metadata timeout when a subscription looks up partitions.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the consumer group ID reported by subscriptions.
    ///
    /// If not set, the consumer group is derived from the subscribed topics.
    /// No offsets are committed under it; it only names the consumer.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use job_postings_redpanda::RedpandaEventBus;
    ///
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let event_bus = RedpandaEventBus::builder()
    ///     .brokers("localhost:9092")
    ///     .consumer_group("job-aggregator")
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Set the event buffer size for subscriptions (minimum 1, default 1000).
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size.max(1));
        self
    }

    /// Set where a partition restarts when its saved offset is out of range
    /// (for example, removed by retention).
    ///
    /// - `"earliest"`: First retained record (default)
    /// - `"latest"`: Only new records
    /// - `"error"`: Surface the out-of-range error on the stream
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Build the [`RedpandaEventBus`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if:
    /// - Brokers not set
    /// - Cannot create producer
    /// - Invalid configuration
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self.brokers.ok_or_else(|| {
            EventBusError::ConnectionFailed("Brokers not configured".to_string())
        })?;
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let acks = self.producer_acks.as_deref().unwrap_or(DEFAULT_ACKS);
        let compression = self.compression.as_deref().unwrap_or(DEFAULT_COMPRESSION);

        let mut producer_config = ClientConfig::new();
        producer_config
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("enable.idempotence", "true")
            .set("acks", acks)
            .set("compression.type", compression);

        let producer: FutureProducer = producer_config.create().map_err(|e| {
            EventBusError::ConnectionFailed(format!("Failed to create producer: {e}"))
        })?;

        let buffer_size = self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let auto_offset_reset = self
            .auto_offset_reset
            .unwrap_or_else(|| DEFAULT_OFFSET_RESET.to_string());

        tracing::info!(
            brokers = %brokers,
            acks,
            compression,
            timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            buffer_size,
            auto_offset_reset = %auto_offset_reset,
            "RedpandaEventBus created successfully"
        );

        Ok(RedpandaEventBus {
            producer,
            brokers,
            timeout,
            consumer_group: self.consumer_group,
            buffer_size,
            auto_offset_reset,
        })
    }
}

/// Consumer group used when none was configured: derived from the sorted topics.
fn default_consumer_group(topics: &[String]) -> String {
    let mut sorted_topics = topics.to_vec();
    sorted_topics.sort();
    format!("job-postings-{}", sorted_topics.join("-"))
}

fn subscription_failed(topics: &[String], reason: String) -> EventBusError {
    EventBusError::SubscriptionFailed {
        topics: topics.to_vec(),
        reason,
    }
}

/// Start offset of every partition of `topics`: the next offset saved in
/// `from`, or the first retained record.
///
/// Blocks on a metadata request.
fn starting_assignment(
    consumer: &StreamConsumer,
    topics: &[String],
    from: &EventPosition,
    timeout: Duration,
) -> Result<TopicPartitionList, EventBusError> {
    let mut assignment = TopicPartitionList::new();

    for topic in topics {
        let metadata = consumer
            .fetch_metadata(Some(topic.as_str()), Timeout::After(timeout))
            .map_err(|e| subscription_failed(topics, format!("Failed to fetch metadata for {topic}: {e}")))?;

        let partitions: Vec<i32> = metadata
            .topics()
            .iter()
            .filter(|t| t.name() == topic && t.error().is_none())
            .flat_map(|t| t.partitions().iter().map(|p| p.id()))
            .collect();
        if partitions.is_empty() {
            return Err(subscription_failed(topics, format!("Topic {topic} has no partitions")));
        }

        for partition in partitions {
            let offset = from
                .next_offset(topic, partition)
                .map_or(Offset::Beginning, Offset::Offset);
            assignment
                .add_partition_offset(topic, partition, offset)
                .map_err(|e| subscription_failed(topics, format!("Invalid start offset: {e}")))?;
        }
    }

    Ok(assignment)
}

fn event_headers(event: &SerializedEvent) -> OwnedHeaders {
    OwnedHeaders::new().insert(Header {
        key: EVENT_TYPE_HEADER,
        value: Some(event.event_type.as_str()),
    })
}

fn malformed(message: &impl Message, what: &str) -> EventBusError {
    EventBusError::DeserializationFailed(format!(
        "Record {}/{}@{} {what}",
        message.topic(),
        message.partition(),
        message.offset()
    ))
}

/// Rebuild the event from the record's key, timestamp, header and value.
fn delivery_from(message: &impl Message) -> Result<Delivery, EventBusError> {
    let event_type = message
        .headers()
        .and_then(|headers| {
            (0..headers.count())
                .filter_map(|idx| headers.try_get(idx))
                .find(|header| header.key == EVENT_TYPE_HEADER)
                .and_then(|header| header.value)
        })
        .ok_or_else(|| malformed(message, "has no event_type header"))?;
    let event_type = std::str::from_utf8(event_type)
        .map_err(|_| malformed(message, "has a non UTF-8 event_type header"))?;

    let key = message
        .key()
        .ok_or_else(|| malformed(message, "has no key"))?;
    let key = std::str::from_utf8(key).map_err(|_| malformed(message, "has a non UTF-8 key"))?;

    let timestamp: DateTime<Utc> = message
        .timestamp()
        .to_millis()
        .and_then(DateTime::from_timestamp_millis)
        .ok_or_else(|| malformed(message, "has no timestamp"))?;

    let data = message
        .payload()
        .ok_or_else(|| malformed(message, "has no payload"))?;

    Ok(Delivery {
        event: SerializedEvent::new(event_type.to_string(), key.to_string(), timestamp, data.to_vec()),
        offset: LogOffset::new(message.topic(), message.partition(), message.offset()),
    })
}

impl EventBus for RedpandaEventBus {
    fn publish(
        &self,
        topic: &str,
        event: &SerializedEvent,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        let topic = topic.to_string();
        let event = event.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            // Keyed by aggregate id: one key, one partition, publish order kept
            let record = FutureRecord::to(&topic)
                .payload(&event.data)
                .key(event.key.as_bytes())
                .timestamp(event.timestamp.timestamp_millis())
                .headers(event_headers(&event));

            match self.producer.send(record, Timeout::After(timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %topic,
                        partition,
                        offset,
                        key = %event.key,
                        event_type = %event.event_type,
                        "Event published successfully"
                    );
                    Ok(())
                },
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic = %topic,
                        key = %event.key,
                        error = %kafka_error,
                        "Failed to publish event"
                    );
                    Err(EventBusError::PublishFailed {
                        topic,
                        reason: kafka_error.to_string(),
                    })
                },
            }
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
        from: &EventPosition,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, EventBusError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();
        let from = from.clone();
        let brokers = self.brokers.clone();
        let consumer_group = self.consumer_group.clone();
        let buffer_size = self.buffer_size;
        let auto_offset_reset = self.auto_offset_reset.clone();
        let timeout = self.timeout;

        Box::pin(async move {
            let consumer_group_id =
                consumer_group.unwrap_or_else(|| default_consumer_group(&topics));

            // The caller's checkpoint is the cursor: nothing is committed here
            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", &brokers)
                .set("group.id", &consumer_group_id)
                .set("enable.auto.commit", "false")
                .set("enable.auto.offset.store", "false")
                .set("auto.offset.reset", &auto_offset_reset)
                .set("enable.partition.eof", "false")
                .create()
                .map_err(|e| subscription_failed(&topics, format!("Failed to create consumer: {e}")))?;

            let (consumer, topics) = tokio::task::spawn_blocking(move || {
                let assignment = starting_assignment(&consumer, &topics, &from, timeout)?;
                consumer
                    .assign(&assignment)
                    .map_err(|e| subscription_failed(&topics, format!("Failed to assign partitions: {e}")))?;
                tracing::info!(
                    topics = ?topics,
                    partitions = assignment.count(),
                    resumed = !from.is_beginning(),
                    "Partitions assigned"
                );
                Ok::<_, EventBusError>((consumer, topics))
            })
            .await
            .map_err(|e| EventBusError::TransportError(format!("Assignment task failed: {e}")))??;

            tracing::info!(
                topics = ?topics,
                consumer_group = %consumer_group_id,
                buffer_size,
                auto_offset_reset = %auto_offset_reset,
                "Subscribed to topics"
            );

            let (tx, rx) = tokio::sync::mpsc::channel(buffer_size);

            // The task owns the consumer and forwards messages
            tokio::spawn(async move {
                use futures::StreamExt;

                let mut stream = consumer.stream();

                while let Some(msg_result) = stream.next().await {
                    let delivery = match msg_result {
                        Ok(message) => delivery_from(&message),
                        Err(e) => Err(EventBusError::TransportError(format!(
                            "Failed to receive message: {e}"
                        ))),
                    };

                    if let Ok(delivery) = &delivery {
                        tracing::trace!(
                            topic = %delivery.offset.topic,
                            partition = delivery.offset.partition,
                            offset = delivery.offset.offset,
                            key = %delivery.event.key,
                            event_type = %delivery.event.event_type,
                            "Received event"
                        );
                    }

                    if tx.send(delivery).await.is_err() {
                        tracing::debug!("Channel receiver dropped, exiting consumer task");
                        break;
                    }
                }

                tracing::debug!("Consumer task exiting");
            });

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

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use rdkafka::Timestamp;
    use rdkafka::message::OwnedMessage;

    #[test]
    fn redpanda_event_bus_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedpandaEventBus>();
        assert_sync::<RedpandaEventBus>();
    }

    #[test]
    fn build_without_brokers_fails() {
        let result = RedpandaEventBus::builder().build();
        assert!(matches!(result, Err(EventBusError::ConnectionFailed(_))));
    }

    #[test]
    fn default_consumer_group_is_order_independent() {
        let a = default_consumer_group(&["jobs".to_string(), "aggregates".to_string()]);
        let b = default_consumer_group(&["aggregates".to_string(), "jobs".to_string()]);
        assert_eq!(a, b);
        assert_eq!(a, "job-postings-aggregates-jobs");
    }

    fn record(headers: Option<OwnedHeaders>, key: Option<&str>) -> OwnedMessage {
        OwnedMessage::new(
            Some(br#"{"type":"deleted"}"#.to_vec()),
            key.map(|k| k.as_bytes().to_vec()),
            "job-events".to_string(),
            Timestamp::CreateTime(1_735_689_600_123),
            2,
            41,
            headers,
        )
    }

    fn typed(event_type: &str) -> OwnedHeaders {
        OwnedHeaders::new().insert(Header {
            key: EVENT_TYPE_HEADER,
            value: Some(event_type),
        })
    }

    #[test]
    fn record_fields_rebuild_the_event() {
        let delivery = delivery_from(&record(Some(typed("JobDeleted.v1")), Some("job-1"))).unwrap();

        assert_eq!(delivery.event.event_type, "JobDeleted.v1");
        assert_eq!(delivery.event.key, "job-1");
        assert_eq!(
            delivery.event.timestamp,
            DateTime::from_timestamp_millis(1_735_689_600_123).unwrap()
        );
        assert_eq!(delivery.event.data, br#"{"type":"deleted"}"#.to_vec());
        assert_eq!(delivery.offset, LogOffset::new("job-events", 2, 41));
    }

    #[test]
    fn event_type_travels_in_a_header() {
        let event = SerializedEvent::new(
            "JobDeleted.v1".to_string(),
            "job-1".to_string(),
            Utc::now(),
            br#"{"type":"deleted"}"#.to_vec(),
        );

        let headers = event_headers(&event);
        let header = headers.try_get(0).unwrap();
        assert_eq!(header.key, EVENT_TYPE_HEADER);
        assert_eq!(header.value, Some(b"JobDeleted.v1".as_slice()));
        assert_eq!(headers.count(), 1);
    }

    #[test]
    fn record_without_event_type_is_malformed() {
        let result = delivery_from(&record(None, Some("job-1")));
        assert!(matches!(result, Err(EventBusError::DeserializationFailed(_))));

        let other = OwnedHeaders::new().insert(Header {
            key: "trace_id",
            value: Some("abc"),
        });
        let result = delivery_from(&record(Some(other), Some("job-1")));
        assert!(matches!(result, Err(EventBusError::DeserializationFailed(_))));
    }

    #[test]
    fn record_without_key_is_malformed() {
        let result = delivery_from(&record(Some(typed("JobDeleted.v1")), None));
        assert!(matches!(result, Err(EventBusError::DeserializationFailed(reason)) if reason.contains("no key")));
    }

    #[test]
    fn buffer_size_is_never_zero() {
        let builder = RedpandaEventBus::builder().buffer_size(0);
        assert_eq!(builder.buffer_size, Some(1));
    }
}
