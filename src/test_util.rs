// (c) Copyright 2025 Helsing GmbH. All rights reserved.
//! Shared fixtures for unit tests: a journaling participant, a small resource type and
//! quickcheck generators for sequences of storage operations.

use crate::{Resource, SnapshotParticipant};
use quickcheck::{Arbitrary, Gen};
use std::{cell::RefCell, fmt, rc::Rc};

/// Installs a `tracing` subscriber honouring `RUST_LOG`, once per test binary.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Ordered log of protocol events, shared between a test and its participants.
#[derive(Debug, Clone, Default)]
pub(crate) struct Journal(Rc<RefCell<Vec<String>>>);

impl Journal {
    pub(crate) fn record(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    pub(crate) fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }
}

/// A participant whose snapshots are plain copies of its value and which journals every
/// protocol call it receives.
#[derive(Debug)]
pub(crate) struct Counter {
    pub(crate) value: u64,
    pub(crate) final_commits: usize,
    journal: Journal,
}

impl Counter {
    pub(crate) fn new(journal: Journal) -> Self {
        Self {
            value: 0,
            final_commits: 0,
            journal,
        }
    }
}

impl SnapshotParticipant for Counter {
    type Snapshot = u64;

    fn create_snapshot(&self) -> u64 {
        self.journal.record(format!("create {}", self.value));
        self.value
    }

    fn restore_snapshot(&mut self, snapshot: &u64) {
        self.journal.record(format!("restore {snapshot}"));
        self.value = *snapshot;
    }

    fn release_snapshot(&mut self, snapshot: u64) {
        self.journal.record(format!("release {snapshot}"));
    }

    fn on_final_commit(&mut self) {
        self.final_commits += 1;
        self.journal.record(format!("final commit {}", self.value));
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum Fluid {
    Empty,
    Water,
    Lava,
    Milk,
}

impl Resource for Fluid {
    fn blank() -> Self {
        Self::Empty
    }
}

impl Arbitrary for Fluid {
    fn arbitrary(g: &mut Gen) -> Self {
        *g.choose(&[Self::Water, Self::Lava, Self::Milk])
            .expect("choices are not empty")
    }
}

/// One storage operation, addressed to one of two storages.
#[derive(Clone)]
pub(crate) enum StorageOp {
    Insert { target: usize, fluid: Fluid, amount: u64 },
    Extract { target: usize, fluid: Fluid, amount: u64 },
}

impl fmt::Debug for StorageOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert {
                target,
                fluid,
                amount,
            } => write!(f, "insert {amount} {fluid:?} into #{target}"),
            Self::Extract {
                target,
                fluid,
                amount,
            } => write!(f, "extract {amount} {fluid:?} from #{target}"),
        }
    }
}

impl Arbitrary for StorageOp {
    fn arbitrary(g: &mut Gen) -> Self {
        let target = usize::from(bool::arbitrary(g));
        let fluid = Fluid::arbitrary(g);
        let amount = u64::from(u8::arbitrary(g));
        if bool::arbitrary(g) {
            Self::Insert {
                target,
                fluid,
                amount,
            }
        } else {
            Self::Extract {
                target,
                fluid,
                amount,
            }
        }
    }

    fn shrink(&self) -> Box<dyn Iterator<Item = Self>> {
        match *self {
            Self::Insert {
                target,
                fluid,
                amount,
            } => Box::new(amount.shrink().map(move |amount| Self::Insert {
                target,
                fluid,
                amount,
            })),
            Self::Extract {
                target,
                fluid,
                amount,
            } => Box::new(amount.shrink().map(move |amount| Self::Extract {
                target,
                fluid,
                amount,
            })),
        }
    }
}
