use core::convert::TryFrom;

use drogue_embedded_timer::Delay;
use embedded_hal::digital::v2::OutputPin;
use embedded_time::duration::Microseconds;

use crate::error::Error;

pub(crate) struct ChipSelect<'clock, Pin, Clock>
    where Pin: OutputPin,
          Clock: embedded_time::Clock,
{
    pin: Pin,
    delay: Delay<'clock, Clock>,
    settle: Microseconds<u32>,
}

impl<'clock, Pin, Clock> ChipSelect<'clock, Pin, Clock>
    where Pin: OutputPin,
          Clock: embedded_time::Clock,
          Clock::T: TryFrom<u32>,
{
    /// Construct a new CS pin controller and set it high (unselected)
    pub(crate) fn new(mut pin: Pin, delay: Delay<'clock, Clock>, settle: Microseconds<u32>) -> Result<Self, Error> {
        pin.set_high().map_err(|_| Error::Pin)?;
        Ok(Self {
            pin,
            delay,
            settle,
        })
    }

    pub(crate) fn select<'pin>(&'pin mut self) -> Result<Selected<'pin, 'clock, Pin, Clock>, Error> {
        Selected::new(self)
    }

    pub(crate) fn free(self) -> Pin {
        self.pin
    }

    fn set_low(&mut self) -> Result<(), Error> {
        self.pin.set_low().map_err(|_| Error::Pin)
    }

    fn set_high(&mut self) -> Result<(), Error> {
        self.pin.set_high().map_err(|_| Error::Pin)
    }
}

/// Chip-select held low; released on `deselect` or drop.
pub(crate) struct Selected<'pin, 'clock, Pin, Clock>
    where Pin: OutputPin,
          Clock: embedded_time::Clock,
          Clock::T: TryFrom<u32>,
{
    cs: &'pin mut ChipSelect<'clock, Pin, Clock>,
    released: bool,
}

impl<'pin, 'clock, Pin, Clock> Selected<'pin, 'clock, Pin, Clock>
    where Pin: OutputPin,
          Clock: embedded_time::Clock,
          Clock::T: TryFrom<u32>,
{
    fn new(cs: &'pin mut ChipSelect<'clock, Pin, Clock>) -> Result<Self, Error> {
        cs.set_low()?;
        cs.delay.delay(cs.settle);
        Ok(Self {
            cs,
            released: false,
        })
    }

    /// Drive chip-select high and wait out the settle time.
    pub(crate) fn deselect(mut self) -> Result<(), Error> {
        self.released = true;
        self.release()
    }

    fn release(&mut self) -> Result<(), Error> {
        self.cs.set_high()?;
        self.cs.delay.delay(self.cs.settle);
        Ok(())
    }
}

impl<Pin, Clock> Drop for Selected<'_, '_, Pin, Clock>
    where Pin: OutputPin,
          Clock: embedded_time::Clock,
          Clock::T: TryFrom<u32>,
{
    fn drop(&mut self) {
        if !self.released && self.release().is_err() {
            log::warn!("unable to de-select CS");
        }
    }
}
