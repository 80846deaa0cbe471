use core::convert::TryFrom;

use embedded_hal::digital::v2::{InputPin, OutputPin};
use heapless::{consts::U32, ArrayLength};

use crate::config::Config;
use crate::error::Error;
use crate::session::{ResponseMode, Session};

enum Wait {
    Edge,
    Deselected,
}

/// SPI slave over four GPIO lines.
///
/// A session starts on the falling edge of chip-select, which the board
/// support code reports through [`Slave::on_chip_select_edge`]. The session
/// then busy-polls the clock; every wait is bounded by
/// [`Config::poll_timeout`].
pub struct Slave<'clock, Mosi, Miso, Sck, Cs, Clock, N = U32>
    where
        Mosi: InputPin,
        Miso: OutputPin,
        Sck: InputPin,
        Cs: InputPin,
        Clock: embedded_time::Clock + 'clock,
        N: ArrayLength<u8>,
{
    mosi: Mosi,
    miso: Miso,
    sck: Sck,
    cs: Cs,
    clock: &'clock Clock,
    config: Config,
    session: Session<N>,
}

impl<'clock, Mosi, Miso, Sck, Cs, Clock, N> Slave<'clock, Mosi, Miso, Sck, Cs, Clock, N>
    where
        Mosi: InputPin,
        Miso: OutputPin,
        Sck: InputPin,
        Cs: InputPin,
        Clock: embedded_time::Clock + 'clock,
        Clock::T: TryFrom<u32>,
        N: ArrayLength<u8>,
{
    pub fn new(
        mosi: Mosi,
        mut miso: Miso,
        sck: Sck,
        cs: Cs,
        clock: &'clock Clock,
        config: Config,
    ) -> Result<Self, Error> {
        miso.set_low().map_err(|_| Error::Pin)?;
        log::info!("SPI slave initialized");
        Ok(Self {
            mosi,
            miso,
            sck,
            cs,
            clock,
            config,
            session: Session::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Give the lines back.
    pub fn free(self) -> (Mosi, Miso, Sck, Cs) {
        (self.mosi, self.miso, self.sck, self.cs)
    }

    pub fn response_mode(&self) -> ResponseMode {
        self.session.response_mode()
    }

    /// Drive each received bit straight back to the master.
    pub fn set_echo(&mut self) {
        self.session.set_echo();
    }

    /// Answer with `response`, one byte per byte received.
    pub fn set_response(&mut self, response: &[u8]) -> Result<(), Error> {
        self.session.set_response(response)
    }

    pub fn is_selected(&self) -> Result<bool, Error> {
        self.cs.is_low().map_err(|_| Error::Pin)
    }

    /// Data from a completed session is waiting.
    pub fn is_ready(&self) -> bool {
        self.session.is_ready()
    }

    /// Chip-select changed level.
    ///
    /// On assertion this runs the whole session before returning; on release
    /// there is nothing to do.
    pub fn on_chip_select_edge(&mut self) -> Result<(), Error> {
        if !self.is_selected()? {
            return Ok(());
        }
        self.run_session()
    }

    /// See [`Session::read`].
    pub fn read(&mut self, buffer: &mut [u8]) -> nb::Result<usize, Error> {
        self.session.read(buffer)
    }

    fn run_session(&mut self) -> Result<(), Error> {
        self.session.begin()?;
        log::info!("SPI session started");

        let result = self.exchange();
        // park MISO whatever happened
        let parked = self.miso.set_low().map_err(|_| Error::Pin);

        match result.and(parked) {
            Ok(()) => {
                let len = self.session.finish();
                log::info!("SPI session ended, {} bytes received", len);
                Ok(())
            }
            Err(e) => {
                log::warn!("SPI session failed: {:?}", e);
                self.session.abort();
                Err(e)
            }
        }
    }

    fn exchange(&mut self) -> Result<(), Error> {
        while !self.session.is_full() {
            match self.await_clock(true)? {
                Wait::Edge => {
                    let mosi = self.mosi.is_high().map_err(|_| Error::Pin)?;
                    let miso = self.session.clock_in(mosi);
                    self.drive_miso(miso)?;
                    if let Wait::Deselected = self.await_clock(false)? {
                        if !self.await_reselect()? {
                            return Ok(());
                        }
                    }
                }
                Wait::Deselected => {
                    if !self.await_reselect()? {
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    fn drive_miso(&mut self, level: bool) -> Result<(), Error> {
        let driven = if level {
            self.miso.set_high()
        } else {
            self.miso.set_low()
        };
        driven.map_err(|_| Error::Pin)
    }

    /// Spin until SCK reads `level` or chip-select is released.
    fn await_clock(&self, level: bool) -> Result<Wait, Error> {
        let clock = self.clock;
        let timer = clock.new_timer(self.config.poll_timeout).start()?;
        loop {
            if self.sck.is_high().map_err(|_| Error::Pin)? == level {
                return Ok(Wait::Edge);
            }
            if self.cs.is_high().map_err(|_| Error::Pin)? {
                return Ok(Wait::Deselected);
            }
            if timer.is_expired()? {
                return Err(self.session.incomplete());
            }
        }
    }

    /// Chip-select is high. Returns `true` if the master selects again within
    /// the session gap, `false` once the session is over.
    fn await_reselect(&self) -> Result<bool, Error> {
        self.session.deselected()?;
        let clock = self.clock;
        let timer = clock.new_timer(self.config.session_gap).start()?;
        loop {
            if self.cs.is_low().map_err(|_| Error::Pin)? {
                return Ok(true);
            }
            if timer.is_expired()? {
                return Ok(false);
            }
        }
    }
}
