//! Platform-agnostic driver for the AMS AS7262/AS7263 six-channel spectral
//! sensors, built on the `embedded-hal` 1.0 blocking `I2c` and `DelayNs`
//! traits.
//!
//! The AS726x hides its configuration and calibrated results behind a
//! virtual register space reached through an indirect handshake over three
//! physical I2C registers; see [`channel`] for the protocol. On top of that
//! the driver sequences device initialization (with hardware-variant
//! detection), exposes gain / integration-time / LED control, and runs
//! one-shot measurements that decode to six calibrated floats.
//!
//! # Usage
//!
//! ```rust,no_run
//! use as726x::{As726x, Gain};
//!
//! let i2c = embedded_hal_mock::eh1::i2c::Mock::new(&[]);
//! let delay = embedded_hal_mock::eh1::delay::NoopDelay;
//!
//! let mut sensor = As726x::new(i2c, delay).unwrap();
//! sensor.set_gain(Gain::X16).unwrap();
//! sensor.take_measurement_with_bulb().unwrap();
//! let values = sensor.read_calibrated_values().unwrap();
//! for (nm, v) in sensor.wavelengths().iter().zip(values.iter()) {
//!     // six calibrated channel readings, in wavelength order
//!     let _ = (nm, v);
//! }
//! ```
//!
//! Polling loops block indefinitely by default; a non-responding device
//! hangs the caller. Use [`As726x::set_poll_budget`] to bound every wait,
//! turning exhaustion into [`Error::PollTimeout`].

#![cfg_attr(not(test), no_std)]

pub mod channel;
pub mod driver;
pub mod regs;

pub use channel::VirtualBus;
pub use driver::{
    As726x, BulbCurrent, Config, Gain, IndicatorCurrent, MeasurementMode, SensorType,
};

/// Driver errors.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E> {
    /// I2C bus error, propagated unchanged from the transport.
    I2c(E),
    /// The hardware version probe matched no supported variant; the byte
    /// read is attached. No further bus access is made.
    UnsupportedDevice(u8),
    /// A polling loop exhausted its configured budget. Only produced when a
    /// poll budget is set; the channel must be assumed desynchronized.
    PollTimeout,
}

impl<E> From<E> for Error<E> {
    fn from(e: E) -> Self {
        Error::I2c(e)
    }
}
