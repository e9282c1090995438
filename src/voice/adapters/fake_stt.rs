//! Scripted STT adapter for orchestrator tests: replays a fixed sequence of
//! events, one per `send_audio` call, so a test can deterministically
//! control when each transcript event becomes visible to the orchestrator
//! instead of racing it against the real background task's own scheduling.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, Notify};

use crate::error::SttError;
use crate::voice::stt::{SttAdapter, SttConnection, SttEvent};

pub struct FakeSttAdapter {
    script: Vec<SttEvent>,
}

impl FakeSttAdapter {
    pub fn new(script: Vec<SttEvent>) -> Self {
        FakeSttAdapter { script }
    }
}

struct FakeConnection {
    queue: Mutex<VecDeque<SttEvent>>,
    releases: AtomicUsize,
    notify: Notify,
}

#[async_trait]
impl SttConnection for FakeConnection {
    async fn send_audio(&mut self, _frame: &[u8]) -> Result<(), SttError> {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_one();
        Ok(())
    }

    /// Pops the next scripted event once a matching `send_audio` has
    /// released it. A connection with an empty or fully-drained script
    /// simply never resolves again — a scripted provider with nothing left
    /// to say is a quiet line, not a dropped connection.
    async fn next_event(&mut self) -> Option<SttEvent> {
        loop {
            {
                let mut queue = self.queue.lock().await;
                if !queue.is_empty() && self.releases.load(Ordering::SeqCst) > 0 {
                    self.releases.fetch_sub(1, Ordering::SeqCst);
                    return queue.pop_front();
                }
            }
            self.notify.notified().await;
        }
    }
}

#[async_trait]
impl SttAdapter for FakeSttAdapter {
    async fn connect(&self) -> Result<Box<dyn SttConnection>, SttError> {
        Ok(Box::new(FakeConnection {
            queue: Mutex::new(self.script.clone().into()),
            releases: AtomicUsize::new(0),
            notify: Notify::new(),
        }))
    }
}
