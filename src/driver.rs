//! AS726x device controller and measurement pipeline.
//!
//! Datasheet summary:
//! - Two hardware variants share the register map: AS7262 (visible,
//!   450-650 nm) and AS7263 (NIR, 610-860 nm), told apart by the
//!   hardware-version virtual register (0x3e / 0x3f).
//! - Measurement modes 0/1 read one filter bank continuously, mode 2 reads
//!   all channels continuously (power-on default), mode 3 is one-shot.
//! - Calibrated channel values are 4-byte big-endian IEEE-754 floats at
//!   virtual 0x14 + 4k, already scaled by onboard firmware.
//! - Soft reset needs ~800 ms before the device answers again.

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;

use crate::channel::VirtualBus;
use crate::regs::{control, led, virt, DEFAULT_ADDRESS};
use crate::Error;

/// Integration time step: one INT_T count is 2.8 ms.
pub const INTEGRATION_STEP_MS: f32 = 2.8;

const SOFT_RESET_SETTLE_MS: u32 = 800;

/// Hardware variant, fixed by the version probe at construction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorType {
    /// Visible-light variant, version byte 0x3e.
    As7262,
    /// Near-infrared variant, version byte 0x3f.
    As7263,
}

impl SensorType {
    fn from_version(version: u8) -> Option<Self> {
        match version {
            0x3e => Some(SensorType::As7262),
            0x3f => Some(SensorType::As7263),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SensorType::As7262 => "AS7262",
            SensorType::As7263 => "AS7263",
        }
    }

    /// Channel center wavelengths in nm, in calibrated-value readout order.
    pub fn wavelengths(self) -> [u16; 6] {
        match self {
            SensorType::As7262 => [450, 500, 550, 570, 600, 650],
            SensorType::As7263 => [610, 680, 730, 760, 810, 860],
        }
    }
}

/// Measurement mode, CONTROL_SETUP bits 2-3.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MeasurementMode {
    /// Continuous reading of VBGY (AS7262) / STUV (AS7263).
    Bank1 = 0,
    /// Continuous reading of GYOR (AS7262) / RTUX (AS7263).
    Bank2 = 1,
    /// Continuous reading of all channels (power-on default).
    ContinuousAll = 2,
    /// One-shot reading of all channels.
    OneShot = 3,
}

/// Analog gain, CONTROL_SETUP bits 4-5.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Gain {
    /// 1x (power-on default).
    X1 = 0,
    /// 3.7x.
    X3_7 = 1,
    /// 16x.
    X16 = 2,
    /// 64x.
    X64 = 3,
}

/// Current limit for the onboard illumination bulb, LED_CONTROL bits 4-5.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum BulbCurrent {
    Ma12_5 = 0,
    Ma25 = 1,
    Ma50 = 2,
    Ma100 = 3,
}

/// Current limit for the indicator LED, LED_CONTROL bits 1-2.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum IndicatorCurrent {
    Ma1 = 0,
    Ma2 = 1,
    Ma4 = 2,
    Ma8 = 3,
}

/// Initial device configuration applied during construction.
#[derive(Copy, Clone, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub mode: MeasurementMode,
    pub gain: Gain,
    /// INT_T register counts; physical time is `integration_time` x 2.8 ms.
    pub integration_time: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: MeasurementMode::OneShot,
            gain: Gain::X64,
            integration_time: 50,
        }
    }
}

/// AS726x driver.
///
/// Exclusive owner of the bus conversation with one device; the handshake
/// protocol has no reentrancy, so sharing a device between two instances
/// must be serialized externally.
pub struct As726x<I2C, D> {
    bus: VirtualBus<I2C, D>,
    sensor_type: SensorType,
}

impl<I2C, D, E> As726x<I2C, D>
where
    I2C: I2c<Error = E>,
    D: DelayNs,
{
    /// Probe and initialize a sensor at the default address with the
    /// default configuration.
    pub fn new(i2c: I2C, delay: D) -> Result<Self, Error<E>> {
        Self::with_config(i2c, delay, DEFAULT_ADDRESS, Config::default())
    }

    /// Probe and initialize a sensor.
    ///
    /// Reads the hardware version first; an unrecognized version byte fails
    /// with [`Error::UnsupportedDevice`] before any control traffic. On
    /// success the LEDs are brought to a known baseline (minimum current,
    /// off) before integration time, gain and mode are applied.
    pub fn with_config(i2c: I2C, delay: D, address: u8, config: Config) -> Result<Self, Error<E>> {
        let mut bus = VirtualBus::new(i2c, delay, address);

        let version = bus.read(virt::HW_VERSION)?;
        let sensor_type =
            SensorType::from_version(version).ok_or(Error::UnsupportedDevice(version))?;

        let mut dev = Self { bus, sensor_type };
        dev.set_bulb_current(BulbCurrent::Ma12_5)?;
        dev.set_bulb(false)?;
        dev.set_indicator_current(IndicatorCurrent::Ma1)?;
        dev.set_indicator(false)?;
        dev.set_integration_time(config.integration_time)?;
        dev.set_gain(config.gain)?;
        dev.set_measurement_mode(config.mode)?;
        Ok(dev)
    }

    /// Detected hardware variant. No bus access.
    pub fn sensor_type(&self) -> SensorType {
        self.sensor_type
    }

    /// Channel wavelengths of the detected variant, in nm. No bus access.
    pub fn wavelengths(&self) -> [u16; 6] {
        self.sensor_type.wavelengths()
    }

    pub fn set_measurement_mode(&mut self, mode: MeasurementMode) -> Result<(), Error<E>> {
        self.bus.modify(
            virt::CONTROL_SETUP,
            !control::MODE_MASK,
            (mode as u8) << control::MODE_SHIFT,
        )
    }

    pub fn set_gain(&mut self, gain: Gain) -> Result<(), Error<E>> {
        self.bus.modify(
            virt::CONTROL_SETUP,
            !control::GAIN_MASK,
            (gain as u8) << control::GAIN_SHIFT,
        )
    }

    /// Set the integration time register directly.
    ///
    /// Physical integration time is `counts` x 2.8 ms.
    pub fn set_integration_time(&mut self, counts: u8) -> Result<(), Error<E>> {
        self.bus.write(virt::INT_T, counts)
    }

    /// Set the integration time in milliseconds, clamped to the register
    /// range (0 to 714 ms).
    pub fn set_integration_time_ms(&mut self, ms: f32) -> Result<(), Error<E>> {
        let counts = (ms / INTEGRATION_STEP_MS).clamp(0.0, 255.0) as u8;
        self.set_integration_time(counts)
    }

    pub fn set_bulb_current(&mut self, current: BulbCurrent) -> Result<(), Error<E>> {
        self.bus.modify(
            virt::LED_CONTROL,
            !led::BULB_CURRENT_MASK,
            (current as u8) << led::BULB_CURRENT_SHIFT,
        )
    }

    pub fn set_bulb(&mut self, on: bool) -> Result<(), Error<E>> {
        self.bus
            .modify(virt::LED_CONTROL, !led::BULB_ON, if on { led::BULB_ON } else { 0 })
    }

    pub fn set_indicator_current(&mut self, current: IndicatorCurrent) -> Result<(), Error<E>> {
        self.bus.modify(
            virt::LED_CONTROL,
            !led::INDICATOR_CURRENT_MASK,
            (current as u8) << led::INDICATOR_CURRENT_SHIFT,
        )
    }

    pub fn set_indicator(&mut self, on: bool) -> Result<(), Error<E>> {
        self.bus.modify(
            virt::LED_CONTROL,
            !led::INDICATOR_ON,
            if on { led::INDICATOR_ON } else { 0 },
        )
    }

    /// Soft-reset the device, then block for the 800 ms settle window.
    ///
    /// The device is unusable until this returns.
    pub fn soft_reset(&mut self) -> Result<(), Error<E>> {
        self.bus.modify(virt::CONTROL_SETUP, 0xFF, control::RESET)?;
        self.bus.settle_ms(SOFT_RESET_SETTLE_MS);
        Ok(())
    }

    /// Whether a completed measurement is waiting to be read.
    pub fn data_available(&mut self) -> Result<bool, Error<E>> {
        Ok(self.bus.read(virt::CONTROL_SETUP)? & control::DATA_RDY != 0)
    }

    /// Trigger a one-shot measurement and block until data is available.
    ///
    /// Clears the data-available flag, forces one-shot mode, then polls the
    /// flag. Unbounded unless a poll budget is configured on the channel.
    pub fn take_measurement(&mut self) -> Result<(), Error<E>> {
        self.bus
            .modify(virt::CONTROL_SETUP, !control::DATA_RDY, 0)?;
        self.set_measurement_mode(MeasurementMode::OneShot)?;

        let mut remaining = self.bus.poll_budget();
        while !self.data_available()? {
            self.bus.pause(&mut remaining)?;
        }
        Ok(())
    }

    /// Take a measurement under the onboard bulb.
    ///
    /// The bulb-off command is issued even when the measurement fails; the
    /// measurement error takes precedence over a bulb-off error.
    pub fn take_measurement_with_bulb(&mut self) -> Result<(), Error<E>> {
        self.set_bulb(true)?;
        let measured = self.take_measurement();
        let bulb_off = self.set_bulb(false);
        measured.and(bulb_off)
    }

    /// Read the six calibrated channel values, in wavelength order.
    ///
    /// Each channel is a 4-byte big-endian IEEE-754 float assembled from
    /// consecutive virtual reads.
    pub fn read_calibrated_values(&mut self) -> Result<[f32; 6], Error<E>> {
        let mut values = [0f32; 6];
        for (i, value) in values.iter_mut().enumerate() {
            *value = self.read_calibrated_value(virt::CAL_BASE + 4 * i as u8)?;
        }
        Ok(values)
    }

    /// Device temperature in degrees C. Coarse by hardware design (+/-8.5 C).
    pub fn temperature(&mut self) -> Result<u8, Error<E>> {
        self.bus.read(virt::DEVICE_TEMP)
    }

    /// Read a virtual register directly.
    pub fn read_virtual(&mut self, addr: u8) -> Result<u8, Error<E>> {
        self.bus.read(addr)
    }

    /// Write a virtual register directly.
    pub fn write_virtual(&mut self, addr: u8, value: u8) -> Result<(), Error<E>> {
        self.bus.write(addr, value)
    }

    /// Bound every polling loop; see [`VirtualBus::set_poll_budget`].
    pub fn set_poll_budget(&mut self, polls: Option<u32>) {
        self.bus.set_poll_budget(polls);
    }

    /// Release the underlying bus and delay provider.
    pub fn release(self) -> (I2C, D) {
        self.bus.release()
    }

    fn read_calibrated_value(&mut self, base: u8) -> Result<f32, Error<E>> {
        let mut raw = [0u8; 4];
        for (i, byte) in raw.iter_mut().enumerate() {
            *byte = self.bus.read(base + i as u8)?;
        }
        Ok(f32::from_be_bytes(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::phys;

    use embedded_hal_mock::eh1::delay::NoopDelay;
    use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTransaction};

    const A: u8 = DEFAULT_ADDRESS;

    fn status(flags: u8) -> I2cTransaction {
        I2cTransaction::write_read(A, vec![phys::STATUS], vec![flags])
    }

    fn vread(reg: u8, val: u8) -> Vec<I2cTransaction> {
        vec![
            status(0x00),
            status(0x00),
            I2cTransaction::write(A, vec![phys::WRITE, reg]),
            status(phys::RX_VALID),
            I2cTransaction::write_read(A, vec![phys::READ], vec![val]),
        ]
    }

    fn vwrite(reg: u8, val: u8) -> Vec<I2cTransaction> {
        vec![
            status(0x00),
            I2cTransaction::write(A, vec![phys::WRITE, reg | virt::WRITE_FLAG]),
            status(0x00),
            I2cTransaction::write(A, vec![phys::WRITE, val]),
        ]
    }

    /// Read-modify-write with `old` as the device-reported current value.
    fn vmodify(reg: u8, old: u8, new: u8) -> Vec<I2cTransaction> {
        let mut t = vread(reg, old);
        t.extend(vwrite(reg, new));
        t
    }

    /// Full construction sequence for a device reporting `version`, with
    /// LED_CONTROL and CONTROL_SETUP starting at zero.
    fn init_expectations(version: u8) -> Vec<I2cTransaction> {
        let mut t = vread(virt::HW_VERSION, version);
        t.extend(vmodify(virt::LED_CONTROL, 0x00, 0x00)); // bulb current min
        t.extend(vmodify(virt::LED_CONTROL, 0x00, 0x00)); // bulb off
        t.extend(vmodify(virt::LED_CONTROL, 0x00, 0x00)); // indicator current min
        t.extend(vmodify(virt::LED_CONTROL, 0x00, 0x00)); // indicator off
        t.extend(vwrite(virt::INT_T, 50));
        t.extend(vmodify(virt::CONTROL_SETUP, 0x00, 0x30)); // gain 64x
        t.extend(vmodify(virt::CONTROL_SETUP, 0x30, 0x3C)); // mode one-shot
        t
    }

    fn sensor(expectations: &[I2cTransaction]) -> As726x<I2cMock, NoopDelay> {
        As726x::new(I2cMock::new(expectations), NoopDelay::new()).unwrap()
    }

    #[test]
    fn init_detects_as7262() {
        let dev = sensor(&init_expectations(0x3e));
        assert_eq!(dev.sensor_type(), SensorType::As7262);
        assert_eq!(dev.sensor_type().name(), "AS7262");
        assert_eq!(dev.wavelengths(), [450, 500, 550, 570, 600, 650]);
        dev.release().0.done();
    }

    #[test]
    fn init_detects_as7263() {
        let dev = sensor(&init_expectations(0x3f));
        assert_eq!(dev.sensor_type(), SensorType::As7263);
        assert_eq!(dev.wavelengths(), [610, 680, 730, 760, 810, 860]);
        dev.release().0.done();
    }

    #[test]
    fn init_rejects_unknown_version_without_further_traffic() {
        // Only the version probe; mock verifies nothing else was sent.
        let mut mock = I2cMock::new(&vread(virt::HW_VERSION, 0x12));
        let err = As726x::new(mock.clone(), NoopDelay::new()).err().unwrap();
        assert!(matches!(err, Error::UnsupportedDevice(0x12)));
        mock.done();
    }

    #[test]
    fn set_gain_preserves_unrelated_bits() {
        let mut expectations = init_expectations(0x3e);
        // Device reports 0b1000_0011; only bits 4-5 may change.
        expectations.extend(vmodify(virt::CONTROL_SETUP, 0b1000_0011, 0b1010_0011));
        let mut dev = sensor(&expectations);
        dev.set_gain(Gain::X16).unwrap();
        dev.release().0.done();
    }

    #[test]
    fn set_bulb_touches_only_its_bit() {
        let mut expectations = init_expectations(0x3e);
        expectations.extend(vmodify(virt::LED_CONTROL, 0b0011_0111, 0b0011_1111));
        expectations.extend(vmodify(virt::LED_CONTROL, 0b0011_1111, 0b0011_0111));
        let mut dev = sensor(&expectations);
        dev.set_bulb(true).unwrap();
        dev.set_bulb(false).unwrap();
        dev.release().0.done();
    }

    #[test]
    fn soft_reset_pulses_the_reset_bit() {
        let mut expectations = init_expectations(0x3e);
        // RMW keeps every configured bit and raises bit 7.
        expectations.extend(vmodify(virt::CONTROL_SETUP, 0x3C, 0xBC));
        let mut dev = sensor(&expectations);
        dev.soft_reset().unwrap();
        dev.release().0.done();
    }

    #[test]
    fn integration_time_ms_converts_and_clamps() {
        let mut expectations = init_expectations(0x3e);
        expectations.extend(vwrite(virt::INT_T, 50)); // 140 ms / 2.8 ms
        expectations.extend(vwrite(virt::INT_T, 255)); // clamped high
        expectations.extend(vwrite(virt::INT_T, 0)); // clamped low
        let mut dev = sensor(&expectations);
        dev.set_integration_time_ms(140.0).unwrap();
        dev.set_integration_time_ms(10_000.0).unwrap();
        dev.set_integration_time_ms(-1.0).unwrap();
        dev.release().0.done();
    }

    #[test]
    fn take_measurement_polls_until_data_ready() {
        let mut expectations = init_expectations(0x3e);
        expectations.extend(vmodify(virt::CONTROL_SETUP, 0x3E, 0x3C)); // clear DATA_RDY
        expectations.extend(vmodify(virt::CONTROL_SETUP, 0x3C, 0x3C)); // force one-shot
        expectations.extend(vread(virt::CONTROL_SETUP, 0x3C)); // not ready
        expectations.extend(vread(virt::CONTROL_SETUP, 0x3E)); // DATA_RDY set
        let mut dev = sensor(&expectations);
        dev.take_measurement().unwrap();
        dev.release().0.done();
    }

    #[test]
    fn bulb_measurement_turns_bulb_off_on_aborted_poll() {
        let mut expectations = init_expectations(0x3e);
        expectations.extend(vmodify(virt::LED_CONTROL, 0x00, 0x08)); // bulb on
        expectations.extend(vmodify(virt::CONTROL_SETUP, 0x3C, 0x3C)); // clear DATA_RDY
        expectations.extend(vmodify(virt::CONTROL_SETUP, 0x3C, 0x3C)); // force one-shot
        expectations.extend(vread(virt::CONTROL_SETUP, 0x3C)); // never ready
        // Budget exhausted here; the bulb-off command must still go out.
        expectations.extend(vmodify(virt::LED_CONTROL, 0x08, 0x00));
        let mut dev = sensor(&expectations);
        dev.set_poll_budget(Some(0));
        let err = dev.take_measurement_with_bulb().unwrap_err();
        assert!(matches!(err, Error::PollTimeout));
        dev.release().0.done();
    }

    #[test]
    fn calibrated_values_decode_big_endian_floats() {
        let mut expectations = init_expectations(0x3e);
        let pattern = [0x43, 0x48, 0x00, 0x00]; // 200.0
        for group in 0..6u8 {
            for offset in 0..4u8 {
                expectations.extend(vread(
                    virt::CAL_BASE + 4 * group + offset,
                    pattern[offset as usize],
                ));
            }
        }
        let mut dev = sensor(&expectations);
        assert_eq!(dev.read_calibrated_values().unwrap(), [200.0f32; 6]);
        dev.release().0.done();
    }

    #[test]
    fn temperature_is_a_single_virtual_read() {
        let mut expectations = init_expectations(0x3f);
        expectations.extend(vread(virt::DEVICE_TEMP, 26));
        let mut dev = sensor(&expectations);
        assert_eq!(dev.temperature().unwrap(), 26);
        dev.release().0.done();
    }
}
