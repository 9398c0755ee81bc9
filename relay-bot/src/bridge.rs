//! Wiring between the gateway listener and the dispatcher.
//!
//! The listener pushes [`GatewayEvent`]s onto a bounded queue. The processor
//! drains it and handles each message in its own task, so a slow completion
//! for one user never blocks anyone else.

use crate::dispatcher::Dispatcher;
use crate::message::GatewayEvent;
use crate::traits::Channel;
use relay_common::logging::generate_trace_id;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::Instrument;

/// Capacity of the listener → processor queue.
pub const EVENT_QUEUE_CAPACITY: usize = 100;

/// Start a background processor that handles events from a channel.
///
/// Once the queue closes the processor waits for every in-flight message task
/// before it finishes.
pub fn spawn_processor(
    dispatcher: Arc<Dispatcher>,
    channel: Arc<dyn Channel>,
    mut rx: mpsc::Receiver<GatewayEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(channel = channel.name(), "Event processor started");
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(GatewayEvent::Ready(identity)) => dispatcher.on_ready(identity),
                    Some(GatewayEvent::Message(message)) => {
                        let dispatcher = dispatcher.clone();
                        let channel = channel.clone();
                        let span = relay_common::event_span!(
                            generate_trace_id(),
                            message_id = %message.id,
                            user_id = %message.author_id
                        );

                        tasks.spawn(
                            async move {
                                if let Err(e) = dispatcher.handle(message, channel.as_ref()).await {
                                    tracing::error!(error = %e, "Failed to deliver response");
                                }
                            }
                            .instrument(span),
                        );
                    }
                    None => break,
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => log_join(joined),
            }
        }

        if !tasks.is_empty() {
            tracing::info!(in_flight = tasks.len(), "Waiting for in-flight messages");
        }
        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }

        tracing::info!(channel = channel.name(), "Event processor stopped");
    })
}

fn log_join(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "Message task panicked");
    }
}

/// Keep a channel listener running, restarting it with exponential backoff
/// whenever it returns. Stops once the event queue is closed.
pub fn spawn_supervised_listener(
    channel: Arc<dyn Channel>,
    tx: mpsc::Sender<GatewayEvent>,
    initial_backoff_secs: u64,
    max_backoff_secs: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut backoff = initial_backoff_secs.max(1);
        let max_backoff = max_backoff_secs.max(backoff);

        loop {
            let result = channel.listen(tx.clone()).await;

            if tx.is_closed() {
                break;
            }

            match result {
                Ok(()) => {
                    tracing::warn!("Channel {} exited unexpectedly; restarting", channel.name());
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!("Channel {} failed permanently: {e}", channel.name());
                    break;
                }
                Err(e) => {
                    tracing::error!("Channel {} error: {e}; restarting in {backoff}s", channel.name());
                }
            }

            tokio::time::sleep(Duration::from_secs(backoff)).await;
            backoff = backoff.saturating_mul(2).min(max_backoff);
        }
    })
}
