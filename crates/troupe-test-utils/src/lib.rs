//! Test utilities and mock types for Troupe development.
//!
//! Provides a configurable [`MockScript`] that records what it hears into a
//! shared [`Transcript`], a [`Gate`] for holding a delivery in place, a
//! [`MockLoader`] that builds mock scripts from a tiny source syntax, and
//! the tree shapes in [`fixtures`].

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use troupe_core::{NodeId, Script, ScriptError, ScriptLoader};

pub use fixtures::SampleTree;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Transcript ──────────────────────────────────────────────────

/// One message as heard by a mock script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Heard {
    pub by: String,
    pub author: NodeId,
    pub message: Vec<u8>,
}

/// Shared, append-only log of every message heard by the scripts that hold
/// a clone of it.
#[derive(Clone, Default)]
pub struct Transcript {
    inner: Arc<(Mutex<Vec<Heard>>, Condvar)>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, heard: Heard) {
        let (entries, cv) = &*self.inner;
        lock(entries).push(heard);
        cv.notify_all();
    }

    /// Copy of every entry so far, in arrival order.
    pub fn entries(&self) -> Vec<Heard> {
        lock(&self.inner.0).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.0).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of the listeners, in arrival order.
    pub fn listeners(&self) -> Vec<String> {
        lock(&self.inner.0).iter().map(|h| h.by.clone()).collect()
    }

    /// Messages heard by `name`, in arrival order.
    pub fn heard_by(&self, name: &str) -> Vec<Vec<u8>> {
        lock(&self.inner.0)
            .iter()
            .filter(|h| h.by == name)
            .map(|h| h.message.clone())
            .collect()
    }

    /// Block until at least `n` entries exist or `timeout` elapses.
    /// Returns whether the count was reached.
    pub fn wait_for(&self, n: usize, timeout: Duration) -> bool {
        let (entries, cv) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut guard = lock(entries);
        while guard.len() < n {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = cv
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

// ── Gate ────────────────────────────────────────────────────────

#[derive(Default)]
struct GateState {
    open: bool,
    arrivals: usize,
}

/// A latch that holds every script hook reaching it until opened.
///
/// Used to pin delivery agents or workers in place so saturation can be
/// observed deterministically.
#[derive(Clone, Default)]
pub struct Gate {
    inner: Arc<(Mutex<GateState>, Condvar)>,
}

impl Gate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Release every current and future waiter.
    pub fn open(&self) {
        let (state, cv) = &*self.inner;
        lock(state).open = true;
        cv.notify_all();
    }

    /// Block until the gate is opened.
    pub fn pass(&self) {
        let (state, cv) = &*self.inner;
        let mut guard = lock(state);
        guard.arrivals += 1;
        cv.notify_all();
        while !guard.open {
            guard = cv.wait(guard).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until `n` callers have reached the gate or `timeout` elapses.
    pub fn wait_arrivals(&self, n: usize, timeout: Duration) -> bool {
        let (state, cv) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut guard = lock(state);
        while guard.arrivals < n {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = cv
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

// ── MockScript ──────────────────────────────────────────────────

/// Configurable actor behaviour for tests.
///
/// Records each message into its transcript under its name. Optionally
/// fails its load hook, fails every message, or stops at a [`Gate`] before
/// recording.
pub struct MockScript {
    name: String,
    transcript: Transcript,
    gate: Option<Gate>,
    fail_load: bool,
    fail_messages: bool,
    loaded_as: Option<NodeId>,
}

impl MockScript {
    pub fn new(name: impl Into<String>, transcript: &Transcript) -> Self {
        Self {
            name: name.into(),
            transcript: transcript.clone(),
            gate: None,
            fail_load: false,
            fail_messages: false,
            loaded_as: None,
        }
    }

    /// Wait at `gate` before handling each message.
    pub fn gated(mut self, gate: &Gate) -> Self {
        self.gate = Some(gate.clone());
        self
    }

    /// Fail the load hook.
    pub fn failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    /// Fail every message (after recording it).
    pub fn failing_messages(mut self) -> Self {
        self.fail_messages = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The id passed to the load hook, if it ran.
    pub fn loaded_as(&self) -> Option<NodeId> {
        self.loaded_as
    }
}

impl Script for MockScript {
    fn on_message(&mut self, message: &[u8], author: NodeId) -> Result<(), ScriptError> {
        if let Some(gate) = &self.gate {
            gate.pass();
        }
        self.transcript.push(Heard {
            by: self.name.clone(),
            author,
            message: message.to_vec(),
        });
        if self.fail_messages {
            return Err(ScriptError::runtime(format!("{} rejects messages", self.name)));
        }
        Ok(())
    }

    fn on_load(&mut self, id: NodeId) -> Result<(), ScriptError> {
        if self.fail_load {
            return Err(ScriptError::runtime(format!("{} failed to start", self.name)));
        }
        self.loaded_as = Some(id);
        Ok(())
    }
}

// ── MockLoader ──────────────────────────────────────────────────

/// Builds [`MockScript`]s from source text of the form `name[:flag]`.
///
/// | Source        | Result                                   |
/// |---------------|------------------------------------------|
/// | `alice`       | recording script named `alice`           |
/// | `alice:hook`  | script whose load hook fails             |
/// | `alice:mute`  | script that fails every message          |
/// | `alice:gate`  | script gated on the loader's [`Gate`]    |
/// | `:reject` or empty | load error                          |
#[derive(Clone, Default)]
pub struct MockLoader {
    transcript: Transcript,
    gate: Gate,
}

impl MockLoader {
    pub fn new(transcript: &Transcript) -> Self {
        Self {
            transcript: transcript.clone(),
            gate: Gate::new(),
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn gate(&self) -> &Gate {
        &self.gate
    }
}

impl ScriptLoader for MockLoader {
    type Script = MockScript;

    fn load(&self, source: &str) -> Result<MockScript, ScriptError> {
        let (name, flag) = match source.split_once(':') {
            Some((name, flag)) => (name, Some(flag)),
            None => (source, None),
        };
        if name.is_empty() {
            return Err(ScriptError::load(format!("no actor name in '{source}'")));
        }
        let script = MockScript::new(name, &self.transcript);
        match flag {
            None => Ok(script),
            Some("hook") => Ok(script.failing_load()),
            Some("mute") => Ok(script.failing_messages()),
            Some("gate") => Ok(script.gated(&self.gate)),
            Some(other) => Err(ScriptError::load(format!("unknown flag '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn transcript_records_in_order() {
        let transcript = Transcript::new();
        let mut a = MockScript::new("a", &transcript);
        let mut b = MockScript::new("b", &transcript);
        a.on_message(b"one", NodeId::new(0, 1)).unwrap();
        b.on_message(b"two", NodeId::new(0, 1)).unwrap();
        assert_eq!(transcript.listeners(), vec!["a", "b"]);
        assert_eq!(transcript.heard_by("b"), vec![b"two".to_vec()]);
        assert!(transcript.wait_for(2, Duration::from_millis(1)));
        assert!(!transcript.wait_for(3, Duration::from_millis(1)));
    }

    #[test]
    fn loader_flags() {
        let loader = MockLoader::new(&Transcript::new());
        assert_eq!(loader.load("x").unwrap().name(), "x");
        assert!(loader.load("x:hook").unwrap().on_load(NodeId::new(1, 1)).is_err());
        assert!(loader
            .load("x:mute")
            .unwrap()
            .on_message(b"m", NodeId::new(1, 1))
            .is_err());
        assert!(matches!(loader.load(":reject"), Err(ScriptError::Load { .. })));
        assert!(matches!(loader.load("x:bogus"), Err(ScriptError::Load { .. })));
    }

    #[test]
    fn gate_holds_until_opened() {
        let transcript = Transcript::new();
        let gate = Gate::new();
        let mut script = MockScript::new("g", &transcript).gated(&gate);
        let handle = thread::spawn(move || script.on_message(b"held", NodeId::new(0, 1)));
        assert!(gate.wait_arrivals(1, Duration::from_secs(5)));
        assert!(transcript.is_empty());
        gate.open();
        handle.join().unwrap().unwrap();
        assert_eq!(transcript.len(), 1);
    }

    #[test]
    fn sample_tree_builds_in_preorder() {
        let mut next = 0;
        let tree = SampleTree::build(|_, _| -> Result<NodeId, ()> {
            next += 1;
            Ok(NodeId::new(next, 1))
        })
        .unwrap();
        assert_eq!(tree.name_of(tree.d), Some("D"));
        assert_eq!(tree.preorder()[0], NodeId::new(1, 1));
    }
}
