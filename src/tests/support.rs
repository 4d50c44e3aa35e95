//! Test doubles shared by the registry tests.

use anyhow::{anyhow, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::models::SessionId;
use crate::services::{SessionBackend, SpawnRequest};

/// In-memory PTY transport that records every call.
#[derive(Default)]
pub struct FakeBackend {
    live: Mutex<HashSet<SessionId>>,
    spawned: Mutex<Vec<SpawnRequest>>,
    killed: Mutex<Vec<SessionId>>,
    writes: Mutex<Vec<(SessionId, String)>>,
    fail_create: AtomicBool,
    fail_kill: AtomicBool,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn creates(&self) -> usize {
        self.spawned.lock().unwrap().len()
    }

    pub fn spawned(&self) -> Vec<SpawnRequest> {
        self.spawned.lock().unwrap().clone()
    }

    pub fn killed(&self) -> Vec<SessionId> {
        self.killed.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<(SessionId, String)> {
        self.writes.lock().unwrap().clone()
    }

    /// Simulate the process exiting on its own.
    pub fn exit(&self, session_id: &SessionId) {
        self.live.lock().unwrap().remove(session_id);
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_kill(&self, fail: bool) {
        self.fail_kill.store(fail, Ordering::SeqCst);
    }
}

impl SessionBackend for FakeBackend {
    async fn create(&self, request: &SpawnRequest) -> Result<()> {
        // Give concurrent callers a chance to pile up on the same flight.
        tokio::task::yield_now().await;
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(anyhow!("spawn refused"));
        }
        self.spawned.lock().unwrap().push(request.clone());
        self.live.lock().unwrap().insert(request.session_id.clone());
        Ok(())
    }

    async fn kill(&self, session_id: &SessionId) -> Result<()> {
        self.killed.lock().unwrap().push(session_id.clone());
        self.live.lock().unwrap().remove(session_id);
        if self.fail_kill.load(Ordering::SeqCst) {
            return Err(anyhow!("kill refused"));
        }
        Ok(())
    }

    async fn resize(&self, session_id: &SessionId, _cols: u16, _rows: u16) -> Result<()> {
        if self.is_live(session_id) {
            Ok(())
        } else {
            Err(anyhow!("no such session"))
        }
    }

    async fn write(&self, session_id: &SessionId, data: &str) -> Result<()> {
        if !self.is_live(session_id) {
            return Err(anyhow!("session has exited"));
        }
        self.writes
            .lock()
            .unwrap()
            .push((session_id.clone(), data.to_string()));
        Ok(())
    }

    fn is_live(&self, session_id: &SessionId) -> bool {
        self.live.lock().unwrap().contains(session_id)
    }
}

/// Deterministic xorshift64 generator for reproducible operation sequences.
pub struct Rng {
    state: u64,
}

impl Rng {
    pub fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    pub fn next(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    pub fn below(&mut self, max: usize) -> usize {
        if max == 0 {
            return 0;
        }
        (self.next() % max as u64) as usize
    }

    pub fn chance(&mut self, one_in: usize) -> bool {
        self.below(one_in) == 0
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        items.get(self.below(items.len()))
    }
}
