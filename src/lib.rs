//! Full-duplex SPI bit-banged over four GPIO lines, as master or slave.
//!
//! Both roles use one edge convention: MOSI changes while SCK is low and is
//! sampled on the rising edge; MISO changes while SCK is high and is sampled
//! just before the falling edge. Chip-select is active low.
#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod error;
mod chip_select;
pub mod master;
pub mod session;
pub mod slave;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::Error;
pub use master::Master;
pub use session::{ResponseMode, Session};
pub use slave::Slave;
