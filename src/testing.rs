//! Test doubles: recorded pins, a simulated clock, a loopback bus wiring a
//! master to a session, and time-driven input traces.

use core::cell::{Cell, RefCell};
use core::convert::Infallible;
use std::rc::Rc;

use embedded_hal::digital::v2::{InputPin, OutputPin};
use embedded_time::{clock, fraction::Fraction, Instant};

use crate::session::Session;

/// Microsecond clock that moves forward one tick every time it is read.
pub(crate) struct SimClock {
    ticks: Cell<u32>,
}

impl SimClock {
    pub(crate) fn new() -> Self {
        Self { ticks: Cell::new(0) }
    }

    /// Current tick, without advancing.
    pub(crate) fn ticks(&self) -> u32 {
        self.ticks.get()
    }
}

impl embedded_time::Clock for SimClock {
    type T = u32;
    const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000_000);

    fn try_now(&self) -> Result<Instant<Self>, clock::Error> {
        let now = self.ticks.get();
        self.ticks.set(now.wrapping_add(1));
        Ok(Instant::new(now))
    }
}

#[derive(Default)]
struct PinState {
    level: bool,
    changes: Vec<bool>,
    broken: bool,
    reads_left: Option<usize>,
}

/// Pin that records every level written to it.
#[derive(Clone, Default)]
pub(crate) struct MockPin {
    state: Rc<RefCell<PinState>>,
}

impl MockPin {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_level(level: bool) -> Self {
        let pin = Self::new();
        pin.state.borrow_mut().level = level;
        pin
    }

    /// Every access fails.
    pub(crate) fn broken() -> Self {
        let pin = Self::new();
        pin.state.borrow_mut().broken = true;
        pin
    }

    /// Reads succeed `reads` times, then every access fails.
    pub(crate) fn failing_after(reads: usize) -> Self {
        let pin = Self::new();
        pin.state.borrow_mut().reads_left = Some(reads);
        pin
    }

    pub(crate) fn is_set_high(&self) -> bool {
        self.state.borrow().level
    }

    pub(crate) fn changes(&self) -> Vec<bool> {
        self.state.borrow().changes.clone()
    }

    fn write(&mut self, level: bool) -> Result<(), ()> {
        let mut state = self.state.borrow_mut();
        if state.broken {
            return Err(());
        }
        state.level = level;
        state.changes.push(level);
        Ok(())
    }
}

impl OutputPin for MockPin {
    type Error = ();

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.write(false)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.write(true)
    }
}

impl InputPin for MockPin {
    type Error = ();

    fn is_high(&self) -> Result<bool, Self::Error> {
        let mut state = self.state.borrow_mut();
        match state.reads_left {
            Some(0) => state.broken = true,
            Some(left) => state.reads_left = Some(left - 1),
            None => {}
        }
        if state.broken {
            Err(())
        } else {
            Ok(state.level)
        }
    }

    fn is_low(&self) -> Result<bool, Self::Error> {
        self.is_high().map(|level| !level)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Line {
    Sck,
    Mosi,
    Miso,
    Cs,
}

/// Four shared lines with a slave session listening on them.
///
/// The session reacts synchronously to the edges the master drives, so a
/// master on a `Bus` is exercised bit for bit without threads.
pub(crate) struct Bus {
    sck: bool,
    mosi: bool,
    miso: bool,
    cs: bool,
    pub(crate) session: Session,
    pub(crate) pulses: usize,
    pub(crate) selects: usize,
}

impl Bus {
    pub(crate) fn new() -> Rc<RefCell<Bus>> {
        Rc::new(RefCell::new(Bus {
            sck: false,
            mosi: false,
            miso: false,
            cs: true,
            session: Session::new(),
            pulses: 0,
            selects: 0,
        }))
    }

    pub(crate) fn pin(bus: &Rc<RefCell<Bus>>, line: Line) -> BusPin {
        BusPin {
            bus: bus.clone(),
            line,
        }
    }

    fn drive(&mut self, line: Line, level: bool) {
        match line {
            Line::Cs => {
                let was = self.cs;
                self.cs = level;
                if was && !level {
                    self.selects += 1;
                    if self.session.is_idle() {
                        self.session.begin().ok();
                    }
                } else if !was && level && self.session.deselected().is_err() {
                    self.session.abort();
                }
            }
            Line::Sck => {
                let was = self.sck;
                self.sck = level;
                if !was && level {
                    self.pulses += 1;
                    if !self.cs && self.session.is_active() {
                        self.miso = self.session.clock_in(self.mosi);
                    }
                }
            }
            Line::Mosi => self.mosi = level,
            Line::Miso => self.miso = level,
        }
    }

    fn level(&self, line: Line) -> bool {
        match line {
            Line::Sck => self.sck,
            Line::Mosi => self.mosi,
            Line::Miso => self.miso,
            Line::Cs => self.cs,
        }
    }
}

#[derive(Clone)]
pub(crate) struct BusPin {
    bus: Rc<RefCell<Bus>>,
    line: Line,
}

impl OutputPin for BusPin {
    type Error = Infallible;

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.bus.borrow_mut().drive(self.line, false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.bus.borrow_mut().drive(self.line, true);
        Ok(())
    }
}

impl InputPin for BusPin {
    type Error = Infallible;

    fn is_high(&self) -> Result<bool, Self::Error> {
        Ok(self.bus.borrow().level(self.line))
    }

    fn is_low(&self) -> Result<bool, Self::Error> {
        Ok(!self.bus.borrow().level(self.line))
    }
}

/// Input whose level is a function of `SimClock` time.
#[derive(Clone)]
pub(crate) struct Trace<'clock> {
    clock: &'clock SimClock,
    initial: bool,
    edges: Rc<Vec<(u32, bool)>>,
}

impl<'clock> Trace<'clock> {
    pub(crate) fn constant(clock: &'clock SimClock, level: bool) -> Self {
        Self {
            clock,
            initial: level,
            edges: Rc::new(Vec::new()),
        }
    }

    fn level(&self) -> bool {
        let now = self.clock.ticks();
        self.edges
            .iter()
            .take_while(|(at, _)| *at <= now)
            .last()
            .map(|(_, level)| *level)
            .unwrap_or(self.initial)
    }
}

impl InputPin for Trace<'_> {
    type Error = Infallible;

    fn is_high(&self) -> Result<bool, Self::Error> {
        Ok(self.level())
    }

    fn is_low(&self) -> Result<bool, Self::Error> {
        Ok(!self.level())
    }
}

/// SCK, MOSI and CS as a master would drive them, one CS bracket per byte.
pub(crate) struct Waveform<'clock> {
    pub(crate) sck: Trace<'clock>,
    pub(crate) mosi: Trace<'clock>,
    pub(crate) cs: Trace<'clock>,
}

impl<'clock> Waveform<'clock> {
    /// Drive `bytes` starting at tick 0, stopping after `bits` bit periods.
    /// When cut short, chip-select is left asserted and the clock parked.
    pub(crate) fn master(
        clock: &'clock SimClock,
        bytes: &[u8],
        bits: usize,
        half_period: u32,
        settle: u32,
    ) -> Self {
        let mut sck = Vec::new();
        let mut mosi = Vec::new();
        let mut cs = Vec::new();
        let mut at = 0u32;
        let mut remaining = bits;

        'bytes: for byte in bytes {
            cs.push((at, false));
            at += settle;
            for bit in (0..8).rev() {
                if remaining == 0 {
                    break 'bytes;
                }
                remaining -= 1;
                mosi.push((at, byte & (1 << bit) != 0));
                at += half_period;
                sck.push((at, true));
                at += half_period;
                sck.push((at, false));
            }
            cs.push((at, true));
            at += settle;
        }

        let trace = |edges: Vec<(u32, bool)>| Trace {
            clock,
            initial: false,
            edges: Rc::new(edges),
        };
        Self {
            sck: trace(sck),
            mosi: trace(mosi),
            cs: Trace {
                clock,
                initial: true,
                edges: Rc::new(cs),
            },
        }
    }
}
