//! Sysclock wire protocol
//!
//! Requests carry the opcode in the message label:
//!
//! | Opcode | Words in | Cap in | Reply words |
//! |---|---|---|---|
//! | `GET_TIME` (0) | - | - | `tick` |
//! | `SET_TIMEOUT` (1) | `periodic`, `period_ms` | wake | `id`, `inserted_at` |
//! | `CANCEL_TIMEOUT` (2) | `id` | - | - |
//!
//! Every reply carries a `Status` in its label. Failed replies carry no words.

use super::schedule::TimeoutId;
use crate::thread::Wakeup;
use crate::{OsapiError, Result};
use kaal_platform::{Message, Signaller, Word};

pub const SYSCLOCK_GET_TIME: Word = 0;
pub const SYSCLOCK_SET_TIMEOUT: Word = 1;
pub const SYSCLOCK_CANCEL_TIMEOUT: Word = 2;

/// Capability a timeout fire is delivered to
pub type WakeCap = Signaller<Wakeup>;

/// Message exchanged with the sysclock server
pub type ClockMessage = Message<WakeCap>;

/// Reply status code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok = 0,
    /// Schedule full or timeout not found
    Failed = 1,
    BadRequest = 2,
}

impl Status {
    pub fn as_word(self) -> Word {
        self as Word
    }

    pub fn from_word(word: Word) -> Result<Self> {
        match word {
            0 => Ok(Self::Ok),
            1 => Ok(Self::Failed),
            2 => Ok(Self::BadRequest),
            other => Err(OsapiError::Protocol(format!("unknown status {}", other))),
        }
    }
}

/// Decoded sysclock request
#[derive(Debug)]
pub enum Request {
    GetTime,
    SetTimeout {
        periodic: bool,
        period_ms: u32,
        wake: WakeCap,
    },
    CancelTimeout {
        id: TimeoutId,
    },
}

impl Request {
    pub fn opcode(&self) -> Word {
        match self {
            Self::GetTime => SYSCLOCK_GET_TIME,
            Self::SetTimeout { .. } => SYSCLOCK_SET_TIMEOUT,
            Self::CancelTimeout { .. } => SYSCLOCK_CANCEL_TIMEOUT,
        }
    }

    pub fn into_message(self) -> Result<ClockMessage> {
        let opcode = self.opcode();
        let msg = match self {
            Self::GetTime => Message::new(opcode, &[])?,
            Self::SetTimeout {
                periodic,
                period_ms,
                wake,
            } => Message::new(opcode, &[Word::from(periodic), period_ms as Word])?.with_cap(wake),
            Self::CancelTimeout { id } => Message::new(opcode, &[id.as_word()])?,
        };
        Ok(msg)
    }

    /// Decode a request, taking its attached capability
    ///
    /// # Errors
    /// Returns `Protocol` for unknown opcodes, missing arguments, a missing
    /// wake capability or a periodic timeout with a zero period
    pub fn from_message(msg: &mut ClockMessage) -> Result<Self> {
        match msg.label() {
            SYSCLOCK_GET_TIME => Ok(Self::GetTime),
            SYSCLOCK_SET_TIMEOUT => {
                let periodic = match arg(msg, 0)? {
                    0 => false,
                    1 => true,
                    other => {
                        return Err(OsapiError::Protocol(format!(
                            "periodic flag must be 0 or 1, got {}",
                            other
                        )))
                    }
                };
                let period_ms = u32_arg(msg, 1)?;
                if periodic && period_ms == 0 {
                    return Err(OsapiError::Protocol("periodic timeout with zero period".into()));
                }
                let wake = msg
                    .take_cap()
                    .ok_or_else(|| OsapiError::Protocol("SET_TIMEOUT without wake capability".into()))?;
                Ok(Self::SetTimeout {
                    periodic,
                    period_ms,
                    wake,
                })
            }
            SYSCLOCK_CANCEL_TIMEOUT => Ok(Self::CancelTimeout {
                id: TimeoutId::from_word(arg(msg, 0)?)?,
            }),
            other => Err(OsapiError::Protocol(format!("unknown opcode {}", other))),
        }
    }
}

/// Sysclock reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Time { tick: u32 },
    Scheduled { id: TimeoutId, inserted_at: u32 },
    Cancelled,
    Failed(Status),
}

impl Reply {
    pub fn into_message(self) -> Result<ClockMessage> {
        let msg = match self {
            Self::Time { tick } => Message::new(Status::Ok.as_word(), &[tick as Word])?,
            Self::Scheduled { id, inserted_at } => Message::new(
                Status::Ok.as_word(),
                &[id.as_word(), inserted_at as Word],
            )?,
            Self::Cancelled => Message::new(Status::Ok.as_word(), &[])?,
            Self::Failed(status) => Message::new(status.as_word(), &[])?,
        };
        Ok(msg)
    }

    /// Decode the reply to a request with `opcode`
    pub fn from_message(opcode: Word, msg: &ClockMessage) -> Result<Self> {
        let status = Status::from_word(msg.label())?;
        if status != Status::Ok {
            return Ok(Self::Failed(status));
        }

        match opcode {
            SYSCLOCK_GET_TIME => Ok(Self::Time {
                tick: u32_arg(msg, 0)?,
            }),
            SYSCLOCK_SET_TIMEOUT => Ok(Self::Scheduled {
                id: TimeoutId::from_word(arg(msg, 0)?)?,
                inserted_at: u32_arg(msg, 1)?,
            }),
            SYSCLOCK_CANCEL_TIMEOUT => Ok(Self::Cancelled),
            other => Err(OsapiError::Protocol(format!("unknown opcode {}", other))),
        }
    }
}

fn arg(msg: &ClockMessage, index: usize) -> Result<Word> {
    msg.word(index).ok_or_else(|| {
        OsapiError::Protocol(format!(
            "opcode {} expects argument {}, message has {}",
            msg.label(),
            index,
            msg.length()
        ))
    })
}

fn u32_arg(msg: &ClockMessage, index: usize) -> Result<u32> {
    let word = arg(msg, index)?;
    u32::try_from(word).map_err(|_| OsapiError::Protocol(format!("argument {} out of range: {}", index, word)))
}
