//! Bus plumbing: bindings, deliveries, settlement and the consumer loop.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use tasknotify_core::{TaskEvent, TaskState};

use crate::dispatcher::Dispatcher;

/// Exchanges publishing task resolutions, with the state each announces.
const EXCHANGES: [(&str, TaskState); 3] = [
    ("exchange/taskcluster-queue/v1/task-completed", TaskState::Completed),
    ("exchange/taskcluster-queue/v1/task-failed", TaskState::Failed),
    ("exchange/taskcluster-queue/v1/task-exception", TaskState::Exception),
];

/// A topic binding the consumer queue needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub exchange: &'static str,
    pub routing_key_pattern: String,
}

/// Bindings that deliver every event some route under `prefix` could fire
/// for: the exchange's own state and `any`.
pub fn bindings(prefix: &str) -> Vec<Binding> {
    EXCHANGES
        .iter()
        .flat_map(|&(exchange, state)| {
            [state.as_str(), "any"].map(|condition| Binding {
                exchange,
                routing_key_pattern: format!("route.{prefix}.#.on-{condition}.#"),
            })
        })
        .collect()
}

/// What to tell the bus once an event has been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Processed (or deliberately dropped); remove from the queue.
    Ack,
    /// Processing failed; hand it back for redelivery.
    Requeue,
}

/// One event received from the bus, awaiting settlement.
#[derive(Debug)]
pub struct Delivery {
    pub event: TaskEvent,
    settle: oneshot::Sender<Settlement>,
}

impl Delivery {
    /// Wrap an event; the receiver resolves once the consumer settles it.
    pub fn new(event: TaskEvent) -> (Self, oneshot::Receiver<Settlement>) {
        let (settle, settled) = oneshot::channel();
        (Self { event, settle }, settled)
    }

    pub fn settle(self, settlement: Settlement) {
        // The bus side may have gone away; nothing left to tell it then.
        self.settle.send(settlement).ok();
    }
}

/// Drive deliveries through the dispatcher, at most `prefetch` at a time.
///
/// Returns when the delivery channel is closed and drained.
pub async fn consume(
    deliveries: mpsc::Receiver<Delivery>,
    dispatcher: Arc<Dispatcher>,
    prefetch: usize,
) {
    ReceiverStream::new(deliveries)
        .for_each_concurrent(prefetch.max(1), |delivery| {
            let dispatcher = dispatcher.clone();
            async move {
                let task_id = delivery.event.task_id().clone();
                let settlement = match dispatcher.handle(&delivery.event).await {
                    Ok(outcome) => {
                        debug!(task_id = %task_id, ?outcome, "Event processed");
                        Settlement::Ack
                    }
                    Err(e) => {
                        error!(task_id = %task_id, error = %e, "Event processing failed");
                        Settlement::Requeue
                    }
                };
                delivery.settle(settlement);
            }
        })
        .await;
}

/// Feed line-delimited JSON events from `reader` into the bus channel.
///
/// Blank lines are skipped; malformed lines are logged and skipped. Line
/// input cannot redeliver, so requeued events are only reported.
/// Returns the number of events submitted.
pub async fn read_json_lines<R>(reader: R, deliveries: mpsc::Sender<Delivery>) -> std::io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0usize;
    let mut submitted = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }

        let event: TaskEvent = match serde_json::from_str(&line) {
            Ok(event) => event,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping malformed event");
                continue;
            }
        };

        let task_id = event.task_id().clone();
        let (delivery, settled) = Delivery::new(event);
        if deliveries.send(delivery).await.is_err() {
            warn!(line = line_no, "Consumer stopped; no more events accepted");
            break;
        }
        submitted += 1;

        tokio::spawn(async move {
            match settled.await {
                Ok(Settlement::Ack) => {}
                Ok(Settlement::Requeue) => {
                    warn!(task_id = %task_id, line = line_no, "Event requeued; line input cannot redeliver it")
                }
                Err(_) => warn!(task_id = %task_id, line = line_no, "Event dropped without settlement"),
            }
        });
    }

    info!(events = submitted, "Event input closed");
    Ok(submitted)
}
