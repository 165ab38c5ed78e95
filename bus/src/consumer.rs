//! Group-coordinated consumer with bounded concurrency and a retry ladder.
//!
//! Each [`ConsumerGroup`] is one member of a broker consumer group. The
//! group coordinator assigns it partition claims; messages from those claims
//! are dispatched to registered handlers under a semaphore bound, retried on
//! transient failure, and dead-lettered once the ladder is exhausted.
//!
//! # Offset discipline
//!
//! Offsets are *stored* only after a handler reaches a terminal outcome
//! (success, permanent failure, or dead-letter emission) and *committed*
//! periodically by the client (`auto.commit.interval.ms`). A crash between
//! the two re-delivers the message, so handlers must be idempotent.
//!
//! # Lifecycle
//!
//! ```text
//! init → joining → assigned → consuming ⇄ rebalancing → stopped
//! ```
//!
//! Rebalance callbacks fire the configured session hooks and update the
//! observable member state. Graceful stop cancels the poll loop, waits for
//! in-flight handlers up to the shutdown deadline, then closes membership.

use crate::config::ConsumerConfig;
use crate::dlq::DlqProducer;
use crate::error::{BusError, BusResult};
use crate::handler::{HandlerRegistry, InboundMessage};
use crate::retry::{LadderOutcome, RetryPolicy, run_ladder};
use crate::shutdown::InflightTracker;
use futures::StreamExt;
use rdkafka::ClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, ConsumerContext, Rebalance, StreamConsumer};
use rdkafka::message::{Headers, Message, OwnedMessage};
use rocketry_core::envelope::DecodedHeaders;
use rocketry_core::{EventEnvelope, FabricError};
use std::sync::Arc;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Observable state of one group member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberState {
    /// Constructed, not yet subscribed.
    Init,
    /// Subscribed, waiting for the first assignment.
    Joining,
    /// Holds partition claims, not yet polling.
    Assigned,
    /// Actively delivering messages to handlers.
    Consuming,
    /// Claims are being reassigned.
    Rebalancing,
    /// Left the group; the run loop has returned.
    Stopped,
}

/// Callbacks fired when a group session starts and ends.
///
/// Both run on the client's callback thread and must not block.
#[derive(Clone, Default)]
pub struct SessionHooks {
    /// Fired after partitions are assigned.
    pub on_setup: Option<Arc<dyn Fn() + Send + Sync>>,
    /// Fired before partitions are revoked.
    pub on_cleanup: Option<Arc<dyn Fn() + Send + Sync>>,
}

/// Client context wiring rebalance callbacks into member state and hooks.
struct GroupContext {
    state_tx: Arc<watch::Sender<MemberState>>,
    hooks: SessionHooks,
}

impl ClientContext for GroupContext {}

impl ConsumerContext for GroupContext {
    fn pre_rebalance(&self, rebalance: &Rebalance<'_>) {
        if let Rebalance::Revoke(partitions) = rebalance {
            debug!(count = partitions.count(), "partitions being revoked");
            let _ = self.state_tx.send(MemberState::Rebalancing);
            if let Some(cleanup) = &self.hooks.on_cleanup {
                cleanup();
            }
        }
    }

    fn post_rebalance(&self, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Assign(partitions) => {
                info!(count = partitions.count(), "partitions assigned");
                let _ = self.state_tx.send(MemberState::Assigned);
                if let Some(setup) = &self.hooks.on_setup {
                    setup();
                }
            }
            Rebalance::Revoke(_) => {
                let _ = self.state_tx.send(MemberState::Rebalancing);
            }
            Rebalance::Error(e) => {
                error!(error = %e, "rebalance error");
            }
        }
    }
}

/// One member of a consumer group, delivering each claimed message to
/// exactly one handler invocation per attempt.
pub struct ConsumerGroup {
    config: ConsumerConfig,
    registry: Arc<HandlerRegistry>,
    consumer: Arc<StreamConsumer<GroupContext>>,
    dlq: Option<Arc<DlqProducer>>,
    semaphore: Arc<Semaphore>,
    inflight: Arc<InflightTracker>,
    shutdown_tx: watch::Sender<bool>,
    state_tx: Arc<watch::Sender<MemberState>>,
    state_rx: watch::Receiver<MemberState>,
}

impl ConsumerGroup {
    /// Create a member and subscribe it to the configured topics.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::InvalidConfig`] on bad settings,
    /// [`BusError::ConnectionFailed`] when the client cannot be created, and
    /// [`BusError::SubscriptionFailed`] when subscription is rejected.
    pub fn new(
        config: ConsumerConfig,
        registry: Arc<HandlerRegistry>,
        dlq: Option<DlqProducer>,
        hooks: SessionHooks,
    ) -> BusResult<Self> {
        config.validate()?;

        let (state_tx, state_rx) = watch::channel(MemberState::Init);
        let state_tx = Arc::new(state_tx);

        let context = GroupContext { state_tx: Arc::clone(&state_tx), hooks };

        let consumer: StreamConsumer<GroupContext> = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "true")
            .set(
                "auto.commit.interval.ms",
                config.auto_commit_interval.as_millis().to_string(),
            )
            // Offsets are stored by hand after a terminal handler outcome;
            // the periodic committer only writes what was stored.
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", config.initial_offset.as_config_str())
            .set("session.timeout.ms", config.session_timeout.as_millis().to_string())
            .set("enable.partition.eof", "false")
            .create_with_context(context)
            .map_err(|e| BusError::ConnectionFailed(format!("failed to create consumer: {e}")))?;

        let topic_refs: Vec<&str> = config.topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&topic_refs)
            .map_err(|e| BusError::SubscriptionFailed {
                topics: config.topics.clone(),
                reason: e.to_string(),
            })?;
        let _ = state_tx.send(MemberState::Joining);

        info!(
            group_id = %config.group_id,
            topics = ?config.topics,
            concurrency_level = config.concurrency_level,
            dlq = dlq.as_ref().map(DlqProducer::topic),
            "consumer group member created"
        );

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(config.concurrency_level)),
            inflight: InflightTracker::new(),
            shutdown_tx: watch::channel(false).0,
            consumer: Arc::new(consumer),
            registry,
            dlq: dlq.map(Arc::new),
            config,
            state_tx,
            state_rx,
        })
    }

    /// The group id this member joined with.
    #[must_use]
    pub fn group_id(&self) -> &str {
        &self.config.group_id
    }

    /// The topic→handler registry this member dispatches through.
    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Current member state.
    #[must_use]
    pub fn state(&self) -> MemberState {
        *self.state_rx.borrow()
    }

    /// Whether the member is participating in the group.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.state() != MemberState::Stopped
    }

    /// Spawn the consuming loop.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run the consuming loop until [`stop`](Self::stop) is called.
    ///
    /// Returns cleanly once the group membership is closed; a closed group is
    /// the normal end of life, not an error.
    pub async fn run(self: Arc<Self>) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut stream = self.consumer.stream();

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!(group_id = %self.config.group_id, "shutdown signal received");
                    break;
                }
                message = stream.next() => match message {
                    Some(Ok(borrowed)) => {
                        let _ = self.state_tx.send(MemberState::Consuming);
                        let owned = borrowed.detach();
                        Arc::clone(&self).dispatch(owned).await;
                    }
                    Some(Err(e)) => {
                        metrics::counter!("bus_consumer_poll_errors_total").increment(1);
                        error!(group_id = %self.config.group_id, error = %e, "poll error");
                    }
                    None => {
                        // The group was closed underneath us.
                        break;
                    }
                }
            }
        }

        drop(stream);
        let drained = self.inflight.drain(self.config.shutdown_timeout).await;
        if !drained {
            warn!(
                group_id = %self.config.group_id,
                in_flight = self.inflight.in_flight(),
                "shutdown deadline reached with handlers still in flight"
            );
        }
        let _ = self.state_tx.send(MemberState::Stopped);
        info!(group_id = %self.config.group_id, drained, "consumer group member stopped");
    }

    /// Request a graceful stop. Safe to call more than once.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Acquire a concurrency slot and process one message on its own task.
    async fn dispatch(self: Arc<Self>, owned: OwnedMessage) {
        let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
            // Semaphore closes only on shutdown.
            return;
        };
        let message = inbound_from(&owned);
        self.inflight.enter();

        tokio::spawn(async move {
            self.process(message).await;
            self.inflight.exit();
            drop(permit);
        });
    }

    /// Run one message through decode, handler lookup, the retry ladder and
    /// the terminal bookkeeping (DLQ + offset store).
    async fn process(&self, message: InboundMessage) {
        let envelope = match EventEnvelope::from_bytes(&message.value) {
            Ok(envelope) => envelope,
            Err(e) => {
                // Fatal to this message: validation-class, never retried.
                metrics::counter!("bus_consumer_messages_total", "topic" => message.topic.clone(), "result" => "decode_error").increment(1);
                error!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "envelope decode failed"
                );
                self.finish(&message, &FabricError::from(e), 1).await;
                return;
            }
        };

        let Some(handler) = self.registry.get(&message.topic).await else {
            debug!(topic = %message.topic, "no handler registered, skipping");
            metrics::counter!("bus_consumer_messages_total", "topic" => message.topic.clone(), "result" => "skipped").increment(1);
            self.store_offset(&message);
            return;
        };

        let policy = RetryPolicy::fixed(self.config.retry_attempts, self.config.retry_backoff);
        let deadline = self.config.max_processing_time;
        let outcome = run_ladder(&policy, || async {
            match tokio::time::timeout(deadline, handler.handle(&envelope)).await {
                Ok(result) => result,
                Err(_) => Err(FabricError::Transient(format!(
                    "handler exceeded deadline of {deadline:?}"
                ))),
            }
        })
        .await;

        match outcome {
            LadderOutcome::Success { attempts, .. } => {
                metrics::counter!("bus_consumer_messages_total", "topic" => message.topic.clone(), "result" => "ok").increment(1);
                debug!(
                    topic = %message.topic,
                    partition = message.partition,
                    offset = message.offset,
                    attempts,
                    event_id = %envelope.id,
                    "message processed"
                );
                self.store_offset(&message);
            }
            LadderOutcome::Failed { error, attempts } => {
                metrics::counter!("bus_consumer_messages_total", "topic" => message.topic.clone(), "result" => "failed").increment(1);
                self.finish(&message, &error, attempts).await;
            }
        }
    }

    /// Terminal-failure bookkeeping: dead-letter when enabled, then store the
    /// offset so the message is not redelivered.
    async fn finish(&self, message: &InboundMessage, error: &FabricError, attempts: u32) {
        if let Some(dlq) = &self.dlq {
            if let Err(dlq_error) = dlq.send(message, error, attempts).await {
                // Leave the offset unstored: redelivery is preferable to
                // losing the message entirely.
                error!(
                    topic = %message.topic,
                    offset = message.offset,
                    error = %dlq_error,
                    "dead-letter emission failed; offset left unstored"
                );
                return;
            }
        } else {
            warn!(
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                attempts,
                error = %error,
                "permanent handler failure (no dead-letter topic configured)"
            );
        }
        self.store_offset(message);
    }

    /// Mark the message processed. Stored offsets are flushed by the periodic
    /// auto-commit.
    fn store_offset(&self, message: &InboundMessage) {
        // Kafka commit convention: the next offset to read.
        if let Err(e) =
            self.consumer
                .store_offset(&message.topic, message.partition, message.offset + 1)
        {
            warn!(
                topic = %message.topic,
                partition = message.partition,
                offset = message.offset,
                error = %e,
                "failed to store offset (message may be redelivered)"
            );
        }
    }
}

/// Detach a broker message into the fabric's ingress view.
fn inbound_from(owned: &OwnedMessage) -> InboundMessage {
    let headers = owned.headers().map_or_else(DecodedHeaders::default, |headers| {
        DecodedHeaders::from_pairs(
            headers
                .iter()
                .filter_map(|header| header.value.map(|value| (header.key, value))),
        )
    });
    InboundMessage {
        topic: owned.topic().to_string(),
        partition: owned.partition(),
        offset: owned.offset(),
        key: owned.key().map(<[u8]>::to_vec),
        value: owned.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        headers,
        timestamp_ms: owned.timestamp().to_millis(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::config::ConsumerConfig;

    fn test_config() -> ConsumerConfig {
        ConsumerConfig::builder(
            "localhost:9092",
            "test-group",
            vec!["payment.processed".to_string()],
        )
        .concurrency_level(4)
        .build()
        .unwrap()
    }

    #[test]
    fn consumer_group_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<ConsumerGroup>();
        assert_sync::<ConsumerGroup>();
    }

    #[tokio::test]
    async fn member_starts_in_joining_after_subscribe() {
        let registry = Arc::new(HandlerRegistry::new());
        let group =
            ConsumerGroup::new(test_config(), registry, None, SessionHooks::default()).unwrap();
        assert_eq!(group.state(), MemberState::Joining);
        assert!(group.is_healthy());
    }

    #[tokio::test]
    async fn stop_without_broker_reaches_stopped() {
        let registry = Arc::new(HandlerRegistry::new());
        let group = Arc::new(
            ConsumerGroup::new(test_config(), registry, None, SessionHooks::default()).unwrap(),
        );
        let handle = Arc::clone(&group).start();
        group.stop();
        handle.await.unwrap();
        assert_eq!(group.state(), MemberState::Stopped);
        assert!(!group.is_healthy());
    }
}
