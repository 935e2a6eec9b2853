//! Scriptable in-memory remote store for tests.

use chrono::NaiveDate;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use uuid::Uuid;

use super::{RemoteError, RemoteStore};
use crate::models::MoodLogEntry;

#[derive(Debug, Clone)]
pub enum Outcome {
    Ok,
    Fail(RemoteError),
    /// The write lands but the caller sees an error, like a response lost
    /// after the server committed.
    ApplyThenFail(RemoteError),
}

#[derive(Default)]
struct State {
    records: HashMap<Uuid, MoodLogEntry>,
    commit_order: Vec<Uuid>,
    script: VecDeque<Outcome>,
    offline: bool,
    upsert_calls: usize,
}

/// Pauses the next remote call until released, to observe state mid-request.
pub struct Gate {
    pub started: Notify,
    pub release: Notify,
}

#[derive(Default)]
pub struct MockRemoteStore {
    state: Mutex<State>,
    gate: Mutex<Option<Arc<Gate>>>,
}

impl MockRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offline() -> Self {
        let store = Self::default();
        store.set_offline(true);
        store
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    /// Outcomes consumed one per upsert before falling back to normal behavior.
    pub fn push(&self, outcome: Outcome) {
        self.state.lock().unwrap().script.push_back(outcome);
    }

    pub fn install_gate(&self) -> Arc<Gate> {
        let gate = Arc::new(Gate {
            started: Notify::new(),
            release: Notify::new(),
        });
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn record_count(&self) -> usize {
        self.state.lock().unwrap().records.len()
    }

    pub fn record(&self, id: Uuid) -> Option<MoodLogEntry> {
        self.state.lock().unwrap().records.get(&id).cloned()
    }

    /// Ids in the order their first successful write landed.
    pub fn commit_order(&self) -> Vec<Uuid> {
        self.state.lock().unwrap().commit_order.clone()
    }

    pub fn upsert_calls(&self) -> usize {
        self.state.lock().unwrap().upsert_calls
    }

    async fn wait_at_gate(&self) {
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.started.notify_one();
            gate.release.notified().await;
        }
    }

    fn apply(state: &mut State, entry: &MoodLogEntry) {
        if state.records.insert(entry.id, entry.clone()).is_none() {
            state.commit_order.push(entry.id);
        }
    }
}

impl RemoteStore for MockRemoteStore {
    async fn upsert(&self, entry: &MoodLogEntry) -> Result<(), RemoteError> {
        self.wait_at_gate().await;

        let mut state = self.state.lock().unwrap();
        state.upsert_calls += 1;

        match state.script.pop_front() {
            Some(Outcome::Ok) => {
                Self::apply(&mut state, entry);
                Ok(())
            }
            Some(Outcome::Fail(e)) => Err(e),
            Some(Outcome::ApplyThenFail(e)) => {
                Self::apply(&mut state, entry);
                Err(e)
            }
            None if state.offline => Err(RemoteError::Network("network unreachable".into())),
            None => {
                Self::apply(&mut state, entry);
                Ok(())
            }
        }
    }

    async fn today(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Option<MoodLogEntry>, RemoteError> {
        self.wait_at_gate().await;

        let state = self.state.lock().unwrap();
        if state.offline {
            return Err(RemoteError::Network("network unreachable".into()));
        }

        Ok(state
            .records
            .values()
            .filter(|e| e.user_id == user_id && e.date == date)
            .max_by_key(|e| e.created_at)
            .cloned())
    }
}
