use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Outbound queue depth. Producers wait once it is full.
pub const QUEUE_CAPACITY: usize = 1000;

/// Pause after every message actually sent to the channel.
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_secs(4);

/// Where paced messages end up.
pub trait ChatSink: Send + Sync + 'static {
    fn send(&self, channel: &str, text: &str) -> anyhow::Result<()>;
}

/// Producer handle for the outbound message queue.
///
/// A single background task drains the queue in FIFO order, drops a
/// message that repeats the one it sent last, and sleeps for the send
/// interval after each message it sends. The task exits once every
/// `Dispatcher` clone has been dropped.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<String>,
}

impl Dispatcher {
    pub fn spawn<S: ChatSink>(sink: S, channel: String, interval: Duration) -> (Self, JoinHandle<()>) {
        Self::spawn_with_capacity(sink, channel, interval, QUEUE_CAPACITY)
    }

    pub fn spawn_with_capacity<S: ChatSink>(
        sink: S,
        channel: String,
        interval: Duration,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity);
        let task = tokio::spawn(run_sender(rx, sink, channel, interval));
        (Self { tx }, task)
    }

    /// Queue a message, waiting for room if the queue is full.
    pub async fn enqueue(&self, message: impl Into<String>) {
        if let Err(e) = self.tx.send(message.into()).await {
            warn!("Sender task is gone, dropping message: {}", e.0);
        }
    }
}

async fn run_sender<S: ChatSink>(
    mut rx: mpsc::Receiver<String>,
    sink: S,
    channel: String,
    interval: Duration,
) {
    let mut last_sent: Option<String> = None;

    while let Some(message) = rx.recv().await {
        if last_sent.as_deref() == Some(message.as_str()) {
            debug!("Skipping repeated message: {}", message);
            continue;
        }

        if let Err(e) = sink.send(&channel, &message) {
            warn!("Failed to send to {}: {:#}", channel, e);
        }
        last_sent = Some(message);

        tokio::time::sleep(interval).await;
    }

    info!("Dispatcher for {} stopped", channel);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    #[derive(Clone, Default)]
    struct Recorder {
        sent: Arc<Mutex<Vec<(Instant, String, String)>>>,
    }

    impl Recorder {
        fn texts(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|(_, _, t)| t.clone()).collect()
        }

        fn times(&self) -> Vec<Instant> {
            self.sent.lock().unwrap().iter().map(|(at, _, _)| *at).collect()
        }
    }

    impl ChatSink for Recorder {
        fn send(&self, channel: &str, text: &str) -> anyhow::Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((Instant::now(), channel.to_string(), text.to_string()));
            Ok(())
        }
    }

    struct Broken;

    impl ChatSink for Broken {
        fn send(&self, _channel: &str, _text: &str) -> anyhow::Result<()> {
            anyhow::bail!("connection closed")
        }
    }

    const INTERVAL: Duration = Duration::from_secs(4);

    #[tokio::test(start_paused = true)]
    async fn test_repeated_message_is_sent_once() {
        let recorder = Recorder::default();
        let (dispatcher, task) = Dispatcher::spawn(recorder.clone(), "#chan".into(), INTERVAL);

        dispatcher.enqueue("hello").await;
        dispatcher.enqueue("hello").await;
        drop(dispatcher);
        task.await.unwrap();

        assert_eq!(recorder.texts(), vec!["hello"]);
        assert_eq!(recorder.sent.lock().unwrap()[0].1, "#chan");
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_messages_are_paced() {
        let recorder = Recorder::default();
        let (dispatcher, task) = Dispatcher::spawn(recorder.clone(), "#chan".into(), INTERVAL);

        dispatcher.enqueue("first").await;
        dispatcher.enqueue("second").await;
        drop(dispatcher);
        task.await.unwrap();

        assert_eq!(recorder.texts(), vec!["first", "second"]);
        let times = recorder.times();
        assert!(times[1] - times[0] >= INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_consecutive_repeats_are_dropped() {
        let recorder = Recorder::default();
        let (dispatcher, task) = Dispatcher::spawn(recorder.clone(), "#chan".into(), INTERVAL);

        for text in ["a", "a", "b", "a", "a"] {
            dispatcher.enqueue(text).await;
        }
        drop(dispatcher);
        task.await.unwrap();

        assert_eq!(recorder.texts(), vec!["a", "b", "a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skipped_repeat_is_not_paced() {
        let recorder = Recorder::default();
        let (dispatcher, task) = Dispatcher::spawn(recorder.clone(), "#chan".into(), INTERVAL);

        let started = Instant::now();
        dispatcher.enqueue("a").await;
        dispatcher.enqueue("a").await;
        dispatcher.enqueue("b").await;
        drop(dispatcher);
        task.await.unwrap();

        let times = recorder.times();
        assert_eq!(times.len(), 2);
        assert!(times[1] - started >= INTERVAL);
        assert!(times[1] - started < INTERVAL * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_applies_backpressure() {
        let recorder = Recorder::default();
        let interval = Duration::from_secs(10);
        let (dispatcher, task) =
            Dispatcher::spawn_with_capacity(recorder.clone(), "#chan".into(), interval, 1);

        dispatcher.enqueue("one").await;
        dispatcher.enqueue("two").await;

        let blocked = tokio::time::timeout(Duration::from_secs(1), dispatcher.enqueue("three")).await;
        assert!(blocked.is_err(), "enqueue should wait while the queue is full");

        dispatcher.enqueue("three").await;
        drop(dispatcher);
        task.await.unwrap();
        assert_eq!(recorder.texts(), vec!["one", "two", "three"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_failure_does_not_stop_sender() {
        let (dispatcher, task) = Dispatcher::spawn(Broken, "#chan".into(), INTERVAL);
        dispatcher.enqueue("a").await;
        dispatcher.enqueue("b").await;
        drop(dispatcher);
        task.await.unwrap();
    }
}
