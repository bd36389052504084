//! In-process bus backed by crossbeam channels.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::debug;

use super::{BusConsumer, BusError, BusRecord, MessageBus};

struct Subscriber {
    id: u64,
    topics: HashSet<String>,
    sender: Sender<BusRecord>,
}

/// Fan-out bus living inside the process.
///
/// Every subscriber receives every record published on its topics.
#[derive(Default)]
pub struct LocalBus {
    subscribers: RwLock<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl LocalBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl MessageBus for LocalBus {
    fn publish(&self, topic: &str, value: &str) -> Result<(), BusError> {
        let mut closed = Vec::new();
        {
            let subscribers = self.subscribers.read().unwrap_or_else(|e| e.into_inner());
            for sub in subscribers.iter().filter(|s| s.topics.contains(topic)) {
                let record = BusRecord { topic: topic.to_string(), value: value.to_string() };
                if sub.sender.send(record).is_err() {
                    closed.push(sub.id);
                }
            }
        }
        if !closed.is_empty() {
            debug!("Pruning {} closed subscribers", closed.len());
            self.subscribers
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .retain(|s| !closed.contains(&s.id));
        }
        Ok(())
    }

    fn subscribe(&self, topics: &[&str]) -> Box<dyn BusConsumer> {
        let (sender, receiver) = unbounded();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let topics = topics.iter().map(|t| t.to_string()).collect();
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Subscriber { id, topics, sender });
        Box::new(LocalConsumer { receiver })
    }
}

struct LocalConsumer {
    receiver: Receiver<BusRecord>,
}

impl BusConsumer for LocalConsumer {
    fn poll(&mut self, timeout: Duration) -> Result<Vec<BusRecord>, BusError> {
        let first = match self.receiver.recv_timeout(timeout) {
            Ok(record) => record,
            Err(RecvTimeoutError::Timeout) => return Ok(Vec::new()),
            Err(RecvTimeoutError::Disconnected) => return Err(BusError::Disconnected),
        };
        let mut batch = vec![first];
        batch.extend(self.receiver.try_iter());
        Ok(batch)
    }
}
