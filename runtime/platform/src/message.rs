//! IPC message layout
//!
//! Messages mirror the kernel message registers: a label (the opcode), up
//! to `MSG_MAX_WORDS` data words and at most one attached capability.

use crate::{PlatformError, Result};
use static_assertions::const_assert;

/// Machine word carried in a message register
pub type Word = usize;

/// Number of data words a message can carry
pub const MSG_MAX_WORDS: usize = 3;

const_assert!(MSG_MAX_WORDS >= 3);

/// Message with an optional attached capability of type `C`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message<C> {
    label: Word,
    words: [Word; MSG_MAX_WORDS],
    length: usize,
    cap: Option<C>,
}

impl<C> Message<C> {
    /// Create a message from a label and data words
    ///
    /// # Errors
    /// Returns `MessageTooLong` if more than `MSG_MAX_WORDS` words are given
    pub fn new(label: Word, data: &[Word]) -> Result<Self> {
        if data.len() > MSG_MAX_WORDS {
            return Err(PlatformError::MessageTooLong { length: data.len() });
        }

        let mut words = [0; MSG_MAX_WORDS];
        words[..data.len()].copy_from_slice(data);

        Ok(Self {
            label,
            words,
            length: data.len(),
            cap: None,
        })
    }

    /// Attach a capability to this message
    pub fn with_cap(mut self, cap: C) -> Self {
        self.cap = Some(cap);
        self
    }

    /// Message label (opcode)
    #[inline]
    pub fn label(&self) -> Word {
        self.label
    }

    /// Number of data words
    #[inline]
    pub fn length(&self) -> usize {
        self.length
    }

    /// Data word `index`, or `None` if beyond the message length
    #[inline]
    pub fn word(&self, index: usize) -> Option<Word> {
        self.words[..self.length].get(index).copied()
    }

    /// Data words actually carried
    pub fn words(&self) -> &[Word] {
        &self.words[..self.length]
    }

    /// Number of attached capabilities (0 or 1)
    #[inline]
    pub fn extra_caps(&self) -> usize {
        usize::from(self.cap.is_some())
    }

    /// Take the attached capability out of the message
    pub fn take_cap(&mut self) -> Option<C> {
        self.cap.take()
    }
}
