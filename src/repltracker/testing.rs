//! In-memory fakes for tracker and monitor tests

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::metrics::GaugeSink;

use super::status::{ReplicaStatus, ReplicaStatusSource, SourceError};

type Reply = Result<ReplicaStatus, SourceError>;

/// Status source replaying a fixed list of replies
pub struct ScriptedSource {
    replies: Mutex<VecDeque<Reply>>,
    repeat: Option<Reply>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    in_flight: Option<(Arc<AtomicUsize>, Arc<AtomicUsize>)>,
}

impl ScriptedSource {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            repeat: None,
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: None,
        }
    }

    /// Answer every call with `reply`
    pub fn repeating(reply: Reply) -> Self {
        Self {
            repeat: Some(reply),
            ..Self::new(Vec::new())
        }
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Track current and peak number of concurrent calls
    pub fn with_in_flight(mut self, current: Arc<AtomicUsize>, peak: Arc<AtomicUsize>) -> Self {
        self.in_flight = Some((current, peak));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReplicaStatusSource for ScriptedSource {
    async fn replication_status(&self) -> Result<ReplicaStatus, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((current, peak)) = &self.in_flight {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some((current, _)) = &self.in_flight {
            current.fetch_sub(1, Ordering::SeqCst);
        }

        if let Some(reply) = self.replies.lock().pop_front() {
            return reply;
        }
        self.repeat
            .clone()
            .unwrap_or_else(|| Err(SourceError::Connection("script exhausted".into())))
    }
}

/// Gauge sink remembering the last value per name
#[derive(Default)]
pub struct RecordingGauges {
    values: Mutex<HashMap<String, i64>>,
    updates: AtomicUsize,
}

impl RecordingGauges {
    pub fn get(&self, name: &str) -> Option<i64> {
        self.values.lock().get(name).copied()
    }

    /// Total number of `set` calls
    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

impl GaugeSink for RecordingGauges {
    fn set(&self, name: &str, value: i64) {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.values.lock().insert(name.to_string(), value);
    }
}
