//! CSpace - Capability table
//!
//! A fixed-capacity table mapping capability pointers to objects. Services
//! use it to hold capabilities transferred to them by clients and to revoke
//! them again when the associated resource goes away.
//!
//! ## Addressing
//!
//! CPtrs are handed out from a monotonic counter and are never reused by the
//! same table. A stale CPtr therefore always fails lookup instead of
//! silently addressing a newer object that landed in the same slot.

use crate::{PlatformError, Result};
use bitflags::bitflags;

/// Capability pointer (never zero for a minted capability)
pub type CPtr = u32;

/// The null capability pointer
pub const CAP_NULL: CPtr = 0;

/// Badge attached to a minted capability
pub type Badge = u64;

bitflags! {
    /// Capability rights
    ///
    /// Rights control what operations can be performed on an object through
    /// a capability.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CapRights: u8 {
        /// Can read from / wait on the object
        const READ = 0b0001;
        /// Can write to / signal the object
        const WRITE = 0b0010;
        /// Can transfer the capability
        const GRANT = 0b0100;
    }
}

/// Occupied capability slot
#[derive(Debug)]
pub struct CapSlot<C> {
    object: C,
    badge: Badge,
    rights: CapRights,
}

impl<C> CapSlot<C> {
    /// Object the capability refers to
    pub fn object(&self) -> &C {
        &self.object
    }

    /// Badge the capability was minted with
    pub fn badge(&self) -> Badge {
        self.badge
    }

    /// Rights granted by the capability
    pub fn rights(&self) -> CapRights {
        self.rights
    }

    /// Consume the slot, returning the object
    pub fn into_object(self) -> C {
        self.object
    }
}

/// Capability table with a fixed number of slots
pub struct CSpace<C> {
    slots: Box<[Option<(CPtr, CapSlot<C>)>]>,
    next_cptr: CPtr,
    count: usize,
}

impl<C> CSpace<C> {
    /// Create a table with `capacity` slots
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            next_cptr: CAP_NULL + 1,
            count: 0,
        }
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether no capability is held
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Mint a capability to `object` into the first free slot
    ///
    /// # Errors
    /// Returns `OutOfSlots` if every slot is occupied
    pub fn mint(&mut self, object: C, badge: Badge, rights: CapRights) -> Result<CPtr> {
        let capacity = self.capacity();
        let slot = self
            .slots
            .iter_mut()
            .find(|slot| slot.is_none())
            .ok_or(PlatformError::OutOfSlots { capacity })?;

        let cptr = self.next_cptr;
        // Skip the null pointer on wrap-around.
        self.next_cptr = self.next_cptr.checked_add(1).unwrap_or(CAP_NULL + 1);

        *slot = Some((
            cptr,
            CapSlot {
                object,
                badge,
                rights,
            },
        ));
        self.count += 1;

        log::trace!("cspace: minted cptr={} badge={} rights={:?}", cptr, badge, rights);
        Ok(cptr)
    }

    /// Look up a capability
    pub fn lookup(&self, cptr: CPtr) -> Option<&CapSlot<C>> {
        self.slots
            .iter()
            .flatten()
            .find(|(held, _)| *held == cptr)
            .map(|(_, slot)| slot)
    }

    /// Look up a capability and check it grants `rights`
    ///
    /// # Errors
    /// - `InvalidCapability` if nothing is held at `cptr`
    /// - `InsufficientRights` if the capability lacks `rights`
    pub fn lookup_with(&self, cptr: CPtr, rights: CapRights) -> Result<&C> {
        let slot = self
            .lookup(cptr)
            .ok_or(PlatformError::InvalidCapability { cptr })?;
        if !slot.rights.contains(rights) {
            return Err(PlatformError::InsufficientRights { cptr });
        }
        Ok(&slot.object)
    }

    /// Revoke a capability, freeing its slot
    ///
    /// # Errors
    /// Returns `InvalidCapability` if nothing is held at `cptr`
    pub fn revoke(&mut self, cptr: CPtr) -> Result<CapSlot<C>> {
        let entry = self
            .slots
            .iter_mut()
            .find(|slot| matches!(slot, Some((held, _)) if *held == cptr))
            .and_then(Option::take)
            .ok_or(PlatformError::InvalidCapability { cptr })?;

        self.count -= 1;
        log::trace!("cspace: revoked cptr={}", cptr);
        Ok(entry.1)
    }
}
