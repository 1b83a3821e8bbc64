//! Cooperative event engine.
//!
//! A single-threaded dispatcher in the style of a protothread kernel: every
//! [`Process`] is a state machine that reacts to one [`EventKind`] at a time
//! and hands control back by returning.  The periodic scheduler calls
//! [`EventEngine::do_one_event`] once per tick while holding the hub lock,
//! so processes can drive hardware without taking any lock of their own.
//!
//! # Example
//!
//! ```rust
//! use brick_hal::{DcMotors, Hub, LightDriver, RawMotorDriver};
//! use brick_runtime::engine::{EventEngine, EventKind, Outbox, Process, ProcessStatus};
//! use brick_types::PortRange;
//!
//! struct Once;
//!
//! impl Process for Once {
//!     fn handle(&mut self, event: EventKind, _hub: &mut Hub, _out: &mut Outbox) -> ProcessStatus {
//!         match event {
//!             EventKind::Init => ProcessStatus::Exited,
//!             _ => ProcessStatus::Waiting,
//!         }
//!     }
//! }
//!
//! let mut hub = Hub::new(
//!     DcMotors::new(RawMotorDriver::disconnected(PortRange::MOTORS)),
//!     LightDriver::new(),
//! );
//! let mut engine = EventEngine::new();
//! engine.spawn(Box::new(Once));
//! assert_eq!(engine.do_one_event(&mut hub), 0);
//! assert!(engine.is_empty());
//! ```

use std::collections::{BTreeMap, VecDeque};

use brick_hal::Hub;
use brick_types::{BrickError, BrickResult};
use tracing::{debug, warn};

/// Maximum number of queued events.
pub const EVENT_QUEUE_CAPACITY: usize = 32;

/// Identifier handed out by [`EventEngine::spawn`].
pub type ProcessId = u32;

/// What a process is being woken up for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// First event every process receives.
    Init,
    /// Delivered after [`EventEngine::request_poll`], ahead of the queue.
    Poll,
    Continue,
    Timer,
    /// The process is removed after handling this, whatever it returns.
    Exit,
    User(u32),
}

/// Recipient of a posted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Process(ProcessId),
    Broadcast,
}

/// Returned by [`Process::handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Waiting,
    Exited,
}

/// A cooperative task.
pub trait Process: Send {
    /// Name used in log output.
    fn name(&self) -> &str {
        "process"
    }

    /// React to one event.  Must not block.
    fn handle(&mut self, event: EventKind, hub: &mut Hub, outbox: &mut Outbox) -> ProcessStatus;
}

/// Follow-up work a process asks for while handling an event.
///
/// Collected during [`Process::handle`] and merged into the engine once the
/// handler returns.
#[derive(Debug)]
pub struct Outbox {
    sender: ProcessId,
    posts: Vec<(Target, EventKind)>,
    polls: Vec<ProcessId>,
}

impl Outbox {
    fn new(sender: ProcessId) -> Self {
        Self {
            sender,
            posts: Vec::new(),
            polls: Vec::new(),
        }
    }

    /// Id of the process currently running.
    pub fn sender(&self) -> ProcessId {
        self.sender
    }

    pub fn post(&mut self, target: Target, kind: EventKind) {
        self.posts.push((target, kind));
    }

    /// Queue `kind` for the running process itself.
    pub fn post_self(&mut self, kind: EventKind) {
        self.posts.push((Target::Process(self.sender), kind));
    }

    pub fn request_poll(&mut self, id: ProcessId) {
        self.polls.push(id);
    }
}

struct Entry {
    process: Box<dyn Process>,
    /// `Init` could not be queued; it goes out at the start of the next run.
    init_pending: bool,
    poll_requested: bool,
}

/// The process table and its event queue.
pub struct EventEngine {
    processes: BTreeMap<ProcessId, Entry>,
    queue: VecDeque<(Target, EventKind)>,
    next_id: ProcessId,
}

impl Default for EventEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EventEngine {
    pub fn new() -> Self {
        Self {
            processes: BTreeMap::new(),
            queue: VecDeque::with_capacity(EVENT_QUEUE_CAPACITY),
            next_id: 1,
        }
    }

    /// Register `process` and queue its [`EventKind::Init`].
    ///
    /// The process is registered even when the queue is full; its `Init` is
    /// then delivered at the start of the next [`EventEngine::do_one_event`],
    /// ahead of polls and queued events.
    pub fn spawn(&mut self, process: Box<dyn Process>) -> ProcessId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);
        debug!(pid = id, name = process.name(), "process spawned");
        self.processes.insert(
            id,
            Entry {
                process,
                init_pending: false,
                poll_requested: false,
            },
        );
        if self.push(Target::Process(id), EventKind::Init).is_err() {
            warn!(pid = id, "event queue full; init deferred to next run");
            if let Some(entry) = self.processes.get_mut(&id) {
                entry.init_pending = true;
            }
        }
        id
    }

    /// Queue an event.
    ///
    /// # Errors
    ///
    /// * [`BrickError::InvalidArgument`] if `target` names no live process.
    /// * [`BrickError::Again`] if the queue is full.
    pub fn post(&mut self, target: Target, kind: EventKind) -> BrickResult<()> {
        if let Target::Process(id) = target
            && !self.processes.contains_key(&id)
        {
            return Err(BrickError::InvalidArgument);
        }
        self.push(target, kind)
    }

    /// Ask for a [`EventKind::Poll`] delivery to `id` on the next run.
    /// Unknown ids are ignored.
    pub fn request_poll(&mut self, id: ProcessId) {
        if let Some(entry) = self.processes.get_mut(&id) {
            entry.poll_requested = true;
        }
    }

    /// Deliver deferred inits and pending polls, then at most one queued
    /// event.
    ///
    /// Returns the number of events still queued.
    pub fn do_one_event(&mut self, hub: &mut Hub) -> usize {
        let deferred: Vec<ProcessId> = self
            .processes
            .iter_mut()
            .filter(|(_, entry)| entry.init_pending)
            .map(|(&id, entry)| {
                entry.init_pending = false;
                id
            })
            .collect();
        for id in deferred {
            self.deliver(id, EventKind::Init, hub);
        }

        let polled: Vec<ProcessId> = self
            .processes
            .iter_mut()
            .filter(|(_, entry)| entry.poll_requested)
            .map(|(&id, entry)| {
                entry.poll_requested = false;
                id
            })
            .collect();
        for id in polled {
            self.deliver(id, EventKind::Poll, hub);
        }

        if let Some((target, kind)) = self.queue.pop_front() {
            match target {
                Target::Process(id) => self.deliver(id, kind, hub),
                Target::Broadcast => {
                    let ids: Vec<ProcessId> = self.processes.keys().copied().collect();
                    for id in ids {
                        self.deliver(id, kind, hub);
                    }
                }
            }
        }
        self.queue.len()
    }

    /// Number of live processes.
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn is_running(&self, id: ProcessId) -> bool {
        self.processes.contains_key(&id)
    }

    /// Number of queued events.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    fn push(&mut self, target: Target, kind: EventKind) -> BrickResult<()> {
        if self.queue.len() >= EVENT_QUEUE_CAPACITY {
            return Err(BrickError::Again);
        }
        self.queue.push_back((target, kind));
        Ok(())
    }

    fn deliver(&mut self, id: ProcessId, kind: EventKind, hub: &mut Hub) {
        // Events for a process that exited after they were queued are dropped.
        let Some(mut entry) = self.processes.remove(&id) else {
            return;
        };
        let mut outbox = Outbox::new(id);
        let status = entry.process.handle(kind, hub, &mut outbox);
        if status == ProcessStatus::Exited || kind == EventKind::Exit {
            debug!(pid = id, name = entry.process.name(), "process exited");
        } else {
            self.processes.insert(id, entry);
        }

        for (target, kind) in outbox.posts {
            if let Err(e) = self.post(target, kind) {
                warn!(pid = id, ?target, ?kind, error = %e, "dropping posted event");
            }
        }
        for poll in outbox.polls {
            self.request_poll(poll);
        }
    }
}
