//! Slave-side session context.
//!
//! A [`Session`] owns the receive buffer, the response buffer and the
//! idle/active flag of one slave. It knows nothing about pins: a caller feeds
//! it clock edges and chip-select transitions, either from a polling loop
//! (see [`crate::slave::Slave`]) or from an edge interrupt.

use heapless::{consts::U32, ArrayLength, Vec};

use crate::error::Error;

/// Level driven on MISO once a canned response is exhausted.
const IDLE_LEVEL: bool = true;

/// What the slave drives on MISO.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResponseMode {
    /// Each bit sampled on MOSI is driven straight back on MISO.
    Echo,
    /// Bits come from a preloaded response buffer.
    Canned,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum State {
    Idle,
    Active { bit: u8, acc: u8 },
}

pub struct Session<N = U32>
    where N: ArrayLength<u8>
{
    state: State,
    mode: ResponseMode,
    response: Vec<u8, N>,
    rx: Vec<u8, N>,
    mailbox: Option<Vec<u8, N>>,
}

impl<N> Session<N>
    where N: ArrayLength<u8>
{
    pub fn new() -> Self {
        Self {
            state: State::Idle,
            mode: ResponseMode::Echo,
            response: Vec::new(),
            rx: Vec::new(),
            mailbox: None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, State::Active { .. })
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::Idle)
    }

    pub fn is_full(&self) -> bool {
        self.rx.len() == self.rx.capacity()
    }

    /// A completed session is waiting to be read.
    pub fn is_ready(&self) -> bool {
        self.mailbox.is_some()
    }

    pub fn capacity(&self) -> usize {
        self.rx.capacity()
    }

    pub fn response_mode(&self) -> ResponseMode {
        self.mode
    }

    pub fn set_echo(&mut self) {
        self.mode = ResponseMode::Echo;
        self.response = Vec::new();
    }

    /// Preload the bytes driven back to the master, one per received byte.
    pub fn set_response(&mut self, response: &[u8]) -> Result<(), Error> {
        let mut staged = Vec::new();
        staged.extend_from_slice(response).map_err(|_| Error::BufferOverflow)?;
        self.response = staged;
        self.mode = ResponseMode::Canned;
        Ok(())
    }

    /// Bytes committed so far in the active session.
    pub fn received(&self) -> &[u8] {
        &self.rx
    }

    /// Start a session. A session already in progress is never restarted.
    pub fn begin(&mut self) -> Result<(), Error> {
        if self.is_active() {
            return Err(Error::Busy);
        }
        self.rx = Vec::new();
        self.state = State::Active { bit: 0, acc: 0 };
        Ok(())
    }

    /// Rising edge of the clock: shift `mosi` in and return the MISO level
    /// to drive for the rest of the bit period.
    pub fn clock_in(&mut self, mosi: bool) -> bool {
        let (bit, acc) = match self.state {
            State::Active { bit, acc } => (bit, acc),
            State::Idle => {
                log::warn!("clock edge outside of a session");
                return IDLE_LEVEL;
            }
        };

        if self.is_full() {
            return IDLE_LEVEL;
        }

        let miso = match self.mode {
            ResponseMode::Echo => mosi,
            ResponseMode::Canned => self
                .response
                .get(self.rx.len())
                .map(|byte| byte & (0x80 >> bit) != 0)
                .unwrap_or(IDLE_LEVEL),
        };

        let acc = (acc << 1) | mosi as u8;
        if bit == 7 {
            log::debug!("received byte {:#04x}", acc);
            // not full, checked above
            self.rx.push(acc).ok();
            self.state = State::Active { bit: 0, acc: 0 };
        } else {
            self.state = State::Active { bit: bit + 1, acc };
        }

        miso
    }

    /// Chip-select went high. Fine at a byte boundary; mid-byte the session
    /// can no longer complete.
    pub fn deselected(&self) -> Result<(), Error> {
        match self.state {
            State::Active { bit, .. } if bit != 0 => Err(self.incomplete()),
            _ => Ok(()),
        }
    }

    /// Progress of the active session, as an error.
    pub fn incomplete(&self) -> Error {
        let bits = match self.state {
            State::Active { bit, .. } => bit,
            State::Idle => 0,
        };
        Error::IncompleteTransfer {
            bytes: self.rx.len(),
            bits,
        }
    }

    /// Close the session and publish what was received. Returns the number
    /// of bytes published.
    pub fn finish(&mut self) -> usize {
        if self.is_idle() {
            return 0;
        }
        self.state = State::Idle;

        let received = core::mem::replace(&mut self.rx, Vec::new());
        let len = received.len();
        if self.mailbox.replace(received).is_some() {
            log::warn!("dropping unread session data");
        }
        len
    }

    /// Close the session and discard what was received.
    pub fn abort(&mut self) {
        if self.is_active() {
            log::warn!("aborting session after {} bytes", self.rx.len());
        }
        self.state = State::Idle;
        self.rx = Vec::new();
    }

    /// Hand over the data of the last completed session, once.
    ///
    /// `WouldBlock` while nothing is pending. A buffer too small for the data
    /// fails without consuming it.
    pub fn read(&mut self, buffer: &mut [u8]) -> nb::Result<usize, Error> {
        let len = match &self.mailbox {
            None => return Err(nb::Error::WouldBlock),
            Some(data) => data.len(),
        };
        if buffer.len() < len {
            return Err(nb::Error::Other(Error::BufferOverflow));
        }
        if let Some(data) = self.mailbox.take() {
            buffer[..len].copy_from_slice(&data);
        }
        Ok(len)
    }
}

impl<N> Default for Session<N>
    where N: ArrayLength<u8>
{
    fn default() -> Self {
        Self::new()
    }
}
