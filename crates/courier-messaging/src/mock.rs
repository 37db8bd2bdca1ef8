use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use courier_core::{Address, InboundTransport, Message, Transport, TransportError};

/// Scripted in-memory transport for deterministic tests without a broker.
///
/// Outcomes are consumed in order; once the script is exhausted every send
/// succeeds. Every attempt is recorded, including failed ones.
#[derive(Default)]
pub struct MockTransport {
    script: Mutex<VecDeque<Result<(), TransportError>>>,
    send_delay: Duration,
    sent: Mutex<Vec<(Address, Message)>>,
    subscribed: Mutex<Vec<String>>,
    paused: AtomicBool,
    pauses: AtomicUsize,
    resumes: AtomicUsize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(outcomes: Vec<Result<(), TransportError>>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            ..Self::default()
        }
    }

    /// Make every send take this long, to hold workers busy in tests.
    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    pub fn sent(&self) -> Vec<(Address, Message)> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn subscribed_topics(&self) -> Vec<String> {
        self.subscribed.lock().clone()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn pause_count(&self) -> usize {
        self.pauses.load(Ordering::Relaxed)
    }

    pub fn resume_count(&self) -> usize {
        self.resumes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, address: &Address, message: &Message) -> Result<(), TransportError> {
        if !self.send_delay.is_zero() {
            tokio::time::sleep(self.send_delay).await;
        }
        self.sent.lock().push((address.clone(), message.clone()));
        self.script.lock().pop_front().unwrap_or(Ok(()))
    }
}

#[async_trait]
impl InboundTransport for MockTransport {
    async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.subscribed.lock().push(topic.to_owned());
        Ok(())
    }

    fn pause_intake(&self) {
        self.paused.store(true, Ordering::Relaxed);
        self.pauses.fetch_add(1, Ordering::Relaxed);
    }

    fn resume_intake(&self) {
        self.paused.store(false, Ordering::Relaxed);
        self.resumes.fetch_add(1, Ordering::Relaxed);
    }
}
