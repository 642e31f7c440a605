//! Two satisfiers of the `Queue<T>` capability. A Kafka/Redpanda-topic
//! satisfier is named by the original system this pipeline replaces, but
//! is not implemented here: the dependency stack carries no Kafka client,
//! and adding one only to satisfy an interface no caller requires would
//! be exactly the kind of invented dependency this workspace avoids.

use async_trait::async_trait;
use newsfeed_core::error::Result;
use newsfeed_core::traits::Queue;
use tokio::sync::mpsc;

/// In-process channel broker: `publish` sends, `subscribe` hands out the
/// receiving half. Single-process deployments only — the channel does not
/// survive a restart.
pub struct InProcessQueue<T> {
    sender: mpsc::Sender<T>,
    receiver: std::sync::Mutex<Option<mpsc::Receiver<T>>>,
}

impl<T: Send + 'static> InProcessQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self { sender, receiver: std::sync::Mutex::new(Some(receiver)) }
    }

    /// Takes the receiving half. Panics if called more than once — there
    /// is exactly one consumer per topic in this pipeline's topology.
    pub fn subscribe(&self) -> mpsc::Receiver<T> {
        self.receiver.lock().expect("receiver mutex poisoned").take().expect("subscribe called more than once")
    }
}

#[async_trait]
impl<T: Send + 'static> Queue<T> for InProcessQueue<T> {
    async fn publish(&self, _topic: &str, item: T) -> Result<()> {
        self.sender.send(item).await.map_err(|_| {
            newsfeed_core::error::PipelineError::Other("in-process queue receiver dropped".to_string())
        })
    }
}

/// RelationalStore-polling broker: the default. `publish` is a no-op
/// because the row is already durable once the collector writes it;
/// "consuming" is just the next `claim_pending_*` call on an interval, so
/// there is nothing to implement here beyond satisfying the trait for
/// callers that are written against `Queue<T>` generically.
pub struct StorePollingQueue;

#[async_trait]
impl<T: Send + 'static> Queue<T> for StorePollingQueue {
    async fn publish(&self, _topic: &str, _item: T) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_process_queue_roundtrips_an_item() {
        let queue = InProcessQueue::<u32>::new(4);
        let mut receiver = queue.subscribe();
        queue.publish("news_links", 7).await.unwrap();
        assert_eq!(receiver.recv().await, Some(7));
    }

    #[tokio::test]
    async fn store_polling_queue_publish_is_a_no_op() {
        let queue = StorePollingQueue;
        queue.publish("news_links", 7u32).await.unwrap();
    }
}
