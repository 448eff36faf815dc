//! Thread identity
//!
//! Every host thread that touches the platform is assigned a `Tid` on first
//! use. Ids are never reused for the lifetime of the process, which is what
//! mutex ownership checks rely on.

use core::fmt;
use core::num::NonZeroU64;
use core::sync::atomic::{AtomicU64, Ordering};

static NEXT_TID: AtomicU64 = AtomicU64::new(1);

std::thread_local! {
    static CURRENT_TID: Tid = Tid::allocate();
}

/// Thread identifier, unique within the process
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tid(NonZeroU64);

impl Tid {
    fn allocate() -> Self {
        let raw = NEXT_TID.fetch_add(1, Ordering::Relaxed);
        // Counter starts at 1 and a u64 will not wrap in practice.
        Self(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    /// Raw id value (never zero)
    #[inline]
    pub fn as_raw(self) -> u64 {
        self.0.get()
    }

    /// Rebuild a `Tid` from its raw value; zero means "no thread"
    #[inline]
    pub fn from_raw(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }
}

impl fmt::Debug for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tid({})", self.0)
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the calling thread
pub fn current() -> Tid {
    CURRENT_TID.with(|tid| *tid)
}
