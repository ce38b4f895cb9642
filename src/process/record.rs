//! Parent/child lifecycle records.
//!
//! One record exists per parent→child edge. It is the only structure two
//! processes touch. Each side holds exactly one link to it; dropping a
//! link is that side's release. The alive count starts at 2 and whichever
//! release takes it to 0 reclaims the record.
//!
//! ```text
//! CREATED → LOADING → LOAD_FAILED
//!                   → RUNNING → EXITED
//!                 (any) → RECLAIMED   once both links are gone
//! ```

use alloc::string::String;
use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use spin::Mutex;

use super::Pid;
use crate::sync::{Parker, Rendezvous};

/// Where a child is in its life, as recorded in its lifecycle record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Created,
    Loading,
    LoadFailed,
    Running,
    Exited,
    Reclaimed,
}

/// Result of the child's attempt to load its program image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Pending,
    Loaded,
    Failed,
}

/// Count of lifecycle records not yet reclaimed.
#[derive(Debug, Default)]
pub struct RecordCensus {
    live: AtomicUsize,
}

impl RecordCensus {
    pub const fn new() -> Self {
        Self {
            live: AtomicUsize::new(0),
        }
    }

    /// Records created and not yet reclaimed.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

struct RecordInner {
    state: RecordState,
    command: Option<String>,
    load: LoadOutcome,
    exit_status: Option<i32>,
}

struct Shared {
    child: Pid,
    alive: AtomicU32,
    inner: Mutex<RecordInner>,
    loaded: Rendezvous,
    exited: Rendezvous,
    census: Arc<RecordCensus>,
}

impl Shared {
    fn release(&self, side: &str) {
        // AcqRel: the last releaser must see everything the other side wrote.
        if self.alive.fetch_sub(1, Ordering::AcqRel) == 1 {
            let mut inner = self.inner.lock();
            inner.state = RecordState::Reclaimed;
            inner.command = None;
            drop(inner);
            self.census.live.fetch_sub(1, Ordering::AcqRel);
            log::debug!("record for {} reclaimed by {}", self.child, side);
        }
    }
}

/// Create the record for a new child, returning both sides' links.
pub fn create(child: Pid, command: String, census: &Arc<RecordCensus>) -> (ParentLink, ChildLink) {
    census.live.fetch_add(1, Ordering::AcqRel);
    let shared = Arc::new(Shared {
        child,
        alive: AtomicU32::new(2),
        inner: Mutex::new(RecordInner {
            state: RecordState::Created,
            command: Some(command),
            load: LoadOutcome::Pending,
            exit_status: None,
        }),
        loaded: Rendezvous::new(),
        exited: Rendezvous::new(),
        census: Arc::clone(census),
    });
    (
        ParentLink {
            shared: Arc::clone(&shared),
        },
        ChildLink { shared },
    )
}

/// The parent's hold on a child's record.
pub struct ParentLink {
    shared: Arc<Shared>,
}

impl ParentLink {
    /// The child this record describes.
    pub fn child(&self) -> Pid {
        self.shared.child
    }

    /// Current state of the record.
    pub fn state(&self) -> RecordState {
        self.shared.inner.lock().state
    }

    /// Sleep until the child has tried to load, then report the outcome.
    pub fn wait_loaded(&self, parker: &Arc<dyn Parker>) -> LoadOutcome {
        self.shared.loaded.wait(parker);
        self.shared.inner.lock().load
    }

    /// Sleep until the child has terminated, then report its exit status.
    pub fn wait_exited(&self, parker: &Arc<dyn Parker>) -> i32 {
        self.shared.exited.wait(parker);
        self.shared.inner.lock().exit_status.unwrap_or(-1)
    }
}

impl Drop for ParentLink {
    fn drop(&mut self) {
        self.shared.release("parent");
    }
}

impl fmt::Debug for ParentLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ParentLink({}, {:?})", self.child(), self.state())
    }
}

/// The child's hold on its own record.
pub struct ChildLink {
    shared: Arc<Shared>,
}

impl ChildLink {
    /// The child this record describes.
    pub fn child(&self) -> Pid {
        self.shared.child
    }

    /// Current state of the record.
    pub fn state(&self) -> RecordState {
        self.shared.inner.lock().state
    }

    /// Start loading: returns the requested command line.
    pub fn begin_load(&self) -> Option<String> {
        let mut inner = self.shared.inner.lock();
        if inner.state != RecordState::Created {
            return None;
        }
        inner.state = RecordState::Loading;
        inner.command.clone()
    }

    /// Publish the load outcome and wake the parent. Only the first report
    /// counts.
    pub fn report_load(&self, loaded: bool) {
        {
            let mut inner = self.shared.inner.lock();
            if inner.load != LoadOutcome::Pending {
                log::warn!("{}: load outcome reported twice", self.shared.child);
                return;
            }
            inner.command = None;
            if loaded {
                inner.load = LoadOutcome::Loaded;
                inner.state = RecordState::Running;
            } else {
                inner.load = LoadOutcome::Failed;
                inner.state = RecordState::LoadFailed;
            }
        }
        log::debug!("{}: load {}", self.shared.child, if loaded { "succeeded" } else { "failed" });
        self.shared.loaded.signal();
    }

    /// Publish the exit status and wake a waiting parent. The status is
    /// immutable once set.
    pub fn report_exit(&self, status: i32) {
        {
            let mut inner = self.shared.inner.lock();
            if inner.exit_status.is_some() {
                return;
            }
            inner.exit_status = Some(status);
            inner.state = RecordState::Exited;
        }
        self.shared.exited.signal();
    }
}

impl Drop for ChildLink {
    fn drop(&mut self) {
        self.shared.release("child");
    }
}

impl fmt::Debug for ChildLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChildLink({}, {:?})", self.child(), self.state())
    }
}
