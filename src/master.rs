use core::convert::TryFrom;

use drogue_embedded_timer::Delay;
use embedded_hal::blocking::spi::Transfer;
use embedded_hal::digital::v2::{InputPin, OutputPin};
use embedded_time::duration::Microseconds;
use heapless::{consts::U32, ArrayLength, Vec};

use crate::chip_select::ChipSelect;
use crate::config::Config;
use crate::error::Error;

struct Lines<Sck, Mosi, Miso>
    where
        Sck: OutputPin,
        Mosi: OutputPin,
        Miso: InputPin,
{
    sck: Sck,
    mosi: Mosi,
    miso: Miso,
}

impl<Sck, Mosi, Miso> Lines<Sck, Mosi, Miso>
    where
        Sck: OutputPin,
        Mosi: OutputPin,
        Miso: InputPin,
{
    /// Clock one byte out on MOSI and one byte in from MISO, MSB first.
    ///
    /// MOSI changes while SCK is low and is sampled by the slave on the
    /// rising edge; MISO is sampled at the end of the high phase.
    fn shift<Clock>(&mut self, delay: &Delay<'_, Clock>, half_period: Microseconds<u32>, byte: u8) -> Result<u8, Error>
        where
            Clock: embedded_time::Clock,
            Clock::T: TryFrom<u32>,
    {
        let mut received = 0u8;
        for bit in (0..8).rev() {
            let driven = if byte & (1 << bit) != 0 {
                self.mosi.set_high()
            } else {
                self.mosi.set_low()
            };
            driven.map_err(|_| Error::Pin)?;
            delay.delay(half_period);

            self.sck.set_high().map_err(|_| Error::Pin)?;
            delay.delay(half_period);

            let sampled = self.miso.is_high().map_err(|_| Error::Pin)?;
            received = (received << 1) | sampled as u8;
            self.sck.set_low().map_err(|_| Error::Pin)?;
        }
        Ok(received)
    }
}

/// SPI master over four GPIO lines.
///
/// Every byte is bracketed by its own chip-select assertion. Nothing checks
/// what comes back: a missing slave reads as whatever MISO floats at.
pub struct Master<'clock, Sck, Mosi, Miso, Cs, Clock, N = U32>
    where
        Sck: OutputPin,
        Mosi: OutputPin,
        Miso: InputPin,
        Cs: OutputPin,
        Clock: embedded_time::Clock + 'clock,
        N: ArrayLength<u8>,
{
    lines: Lines<Sck, Mosi, Miso>,
    cs: ChipSelect<'clock, Cs, Clock>,
    delay: Delay<'clock, Clock>,
    config: Config,
    tx: Vec<u8, N>,
    rx: Vec<u8, N>,
}

impl<'clock, Sck, Mosi, Miso, Cs, Clock, N> Master<'clock, Sck, Mosi, Miso, Cs, Clock, N>
    where
        Sck: OutputPin,
        Mosi: OutputPin,
        Miso: InputPin,
        Cs: OutputPin,
        Clock: embedded_time::Clock + 'clock,
        Clock::T: TryFrom<u32>,
        N: ArrayLength<u8>,
{
    /// Take the lines and park them idle: SCK and MOSI low, CS high.
    pub fn new(
        mut sck: Sck,
        mut mosi: Mosi,
        miso: Miso,
        cs: Cs,
        clock: &'clock Clock,
        config: Config,
    ) -> Result<Self, Error> {
        sck.set_low().map_err(|_| Error::Pin)?;
        mosi.set_low().map_err(|_| Error::Pin)?;

        let delay = Delay::new(clock);
        let cs = ChipSelect::new(cs, delay.clone(), config.cs_settle)?;

        log::info!("SPI master initialized");
        Ok(Self {
            lines: Lines { sck, mosi, miso },
            cs,
            delay,
            config,
            tx: Vec::new(),
            rx: Vec::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Give the lines back.
    pub fn free(self) -> (Sck, Mosi, Miso, Cs) {
        let Lines { sck, mosi, miso } = self.lines;
        (sck, mosi, miso, self.cs.free())
    }

    fn transfer_byte(&mut self, byte: u8) -> Result<u8, Error> {
        let selected = self.cs.select()?;
        // an error drops `selected`, which releases CS
        let received = self.lines.shift(&self.delay, self.config.half_period, byte)?;
        selected.deselect()?;
        log::debug!("sent {:#04x} received {:#04x}", byte, received);
        Ok(received)
    }

    /// Full-duplex exchange of `tx` into `rx`.
    ///
    /// At most the TX buffer capacity per call. On error `rx` is untouched.
    pub fn exchange(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), Error> {
        if tx.len() != rx.len() {
            return Err(Error::LengthMismatch);
        }
        let mut received: Vec<u8, N> = Vec::new();
        if tx.len() > received.capacity() {
            return Err(Error::BufferOverflow);
        }
        // `rx` is only written once every byte made it
        for out in tx {
            let byte = self.transfer_byte(*out)?;
            received.push(byte).map_err(|_| Error::BufferOverflow)?;
        }
        rx.copy_from_slice(&received);
        Ok(())
    }

    /// Exchange `words` in place.
    pub fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], Error> {
        for word in words.iter_mut() {
            *word = self.transfer_byte(*word)?;
        }
        Ok(words)
    }

    /// Stage `data` as the TX buffer and send it.
    ///
    /// Returns the number of bytes sent. What the slave sent back is kept
    /// for [`Master::read`]; a failed transfer keeps nothing.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, Error> {
        let mut tx = Vec::new();
        tx.extend_from_slice(data).map_err(|_| Error::BufferOverflow)?;
        self.tx = tx;
        self.rx = Vec::new();

        let mut rx = Vec::new();
        for index in 0..self.tx.len() {
            let received = self.transfer_byte(self.tx[index])?;
            rx.push(received).map_err(|_| Error::BufferOverflow)?;
        }
        self.rx = rx;

        log::info!("SPI master sent {} bytes", self.tx.len());
        Ok(self.tx.len())
    }

    /// Copy out what came back during the last [`Master::write`].
    pub fn read(&self, buffer: &mut [u8]) -> Result<usize, Error> {
        let len = self.rx.len();
        if buffer.len() < len {
            return Err(Error::BufferOverflow);
        }
        buffer[..len].copy_from_slice(&self.rx);
        Ok(len)
    }
}

impl<'clock, Sck, Mosi, Miso, Cs, Clock, N> Transfer<u8> for Master<'clock, Sck, Mosi, Miso, Cs, Clock, N>
    where
        Sck: OutputPin,
        Mosi: OutputPin,
        Miso: InputPin,
        Cs: OutputPin,
        Clock: embedded_time::Clock + 'clock,
        Clock::T: TryFrom<u32>,
        N: ArrayLength<u8>,
{
    type Error = Error;

    fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], Self::Error> {
        Master::transfer(self, words)
    }
}
