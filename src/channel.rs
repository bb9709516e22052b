//! Virtual register access channel.
//!
//! The AS726x keeps its configuration and results in virtual registers that
//! are not directly addressable on the I2C bus. Every access goes through an
//! indirect handshake over three physical registers:
//!
//! - read: wait for TX_VALID to clear, write the virtual address (bit 7
//!   clear) to WRITE, wait for RX_VALID to set, read the byte from READ.
//! - write: wait for TX_VALID to clear, write the virtual address with bit 7
//!   set to WRITE, wait for TX_VALID to clear again, write the data byte.
//!
//! The device has no interrupt line here; correctness depends entirely on
//! polling order and on never leaving a stale response byte in READ, which
//! would desynchronize the next exchange. A leftover RX_VALID at the start
//! of a read is drained (one discarded byte) before the handshake proceeds.
//!
//! Polling is unbounded by default: a device that never raises the expected
//! flag will block forever. Callers needing bounded latency opt in with
//! [`VirtualBus::set_poll_budget`]; an exhausted budget surfaces as
//! [`Error::PollTimeout`] and the device must be assumed desynchronized
//! (the stale-drain above recovers the channel on the next read).

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::regs::{phys, virt};
use crate::Error;

/// Delay between checks of the physical STATUS register.
pub const DEFAULT_POLL_INTERVAL_MS: u32 = 5;

/// The indirect-access channel to the AS726x virtual register space.
///
/// Owns the bus conversation: address, transfer buffer and polling policy
/// live here, and nothing outside this type touches the physical registers.
pub struct VirtualBus<I2C, D> {
    i2c: I2C,
    delay: D,
    address: u8,
    buf: [u8; 1],
    poll_interval_ms: u32,
    poll_budget: Option<u32>,
}

impl<I2C, D, E> VirtualBus<I2C, D>
where
    I2C: I2c<Error = E>,
    D: DelayNs,
{
    pub fn new(i2c: I2C, delay: D, address: u8) -> Self {
        Self {
            i2c,
            delay,
            address,
            buf: [0u8; 1],
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            poll_budget: None,
        }
    }

    /// Set the delay between STATUS polls.
    pub fn set_poll_interval_ms(&mut self, ms: u32) {
        self.poll_interval_ms = ms;
    }

    /// Bound every polling loop to at most `polls` sleep intervals.
    ///
    /// `None` (the default) restores the unbounded contract.
    pub fn set_poll_budget(&mut self, polls: Option<u32>) {
        self.poll_budget = polls;
    }

    pub(crate) fn poll_budget(&self) -> Option<u32> {
        self.poll_budget
    }

    /// Release the underlying bus and delay provider.
    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    /// Read a virtual register.
    pub fn read(&mut self, addr: u8) -> Result<u8, Error<E>> {
        // Drain a response left over from a prior, possibly aborted, exchange.
        if self.read_phys(phys::STATUS)? & phys::RX_VALID != 0 {
            let _ = self.read_phys(phys::READ)?;
        }

        self.wait_tx_clear()?;
        // Bit 7 clear requests a read.
        self.write_phys(phys::WRITE, addr)?;
        self.wait_rx_set()?;
        self.read_phys(phys::READ)
    }

    /// Write a virtual register.
    pub fn write(&mut self, addr: u8, value: u8) -> Result<(), Error<E>> {
        self.wait_tx_clear()?;
        self.write_phys(phys::WRITE, addr | virt::WRITE_FLAG)?;
        // Address accepted before the data phase may start.
        self.wait_tx_clear()?;
        self.write_phys(phys::WRITE, value)
    }

    /// Read-modify-write: `write(addr, (read(addr) & and_mask) | or_mask)`.
    ///
    /// The current value always comes from the device, never a local shadow;
    /// the protocol has no atomic multi-bit virtual write.
    pub fn modify(&mut self, addr: u8, and_mask: u8, or_mask: u8) -> Result<(), Error<E>> {
        let current = self.read(addr)?;
        self.write(addr, (current & and_mask) | or_mask)
    }

    /// Blocking settle delay, outside any poll budget.
    pub(crate) fn settle_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }

    /// Sleep one poll interval, charging `remaining` if a budget is set.
    pub(crate) fn pause(&mut self, remaining: &mut Option<u32>) -> Result<(), Error<E>> {
        if let Some(n) = remaining {
            if *n == 0 {
                return Err(Error::PollTimeout);
            }
            *n -= 1;
        }
        self.delay.delay_ms(self.poll_interval_ms);
        Ok(())
    }

    fn wait_tx_clear(&mut self) -> Result<(), Error<E>> {
        let mut remaining = self.poll_budget;
        while self.read_phys(phys::STATUS)? & phys::TX_VALID != 0 {
            self.pause(&mut remaining)?;
        }
        Ok(())
    }

    fn wait_rx_set(&mut self) -> Result<(), Error<E>> {
        let mut remaining = self.poll_budget;
        while self.read_phys(phys::STATUS)? & phys::RX_VALID == 0 {
            self.pause(&mut remaining)?;
        }
        Ok(())
    }

    fn read_phys(&mut self, reg: u8) -> Result<u8, Error<E>> {
        self.i2c.write_read(self.address, &[reg], &mut self.buf)?;
        Ok(self.buf[0])
    }

    fn write_phys(&mut self, reg: u8, value: u8) -> Result<(), Error<E>> {
        self.i2c.write(self.address, &[reg, value])?;
        Ok(())
    }
}
