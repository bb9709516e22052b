//! Register maps for the AS726x.
//!
//! The device exposes three physical I2C registers that front a larger
//! virtual register space. Virtual registers are only reachable through the
//! STATUS/WRITE/READ handshake implemented in [`crate::channel`].

/// Default I2C address of the AS726x.
pub const DEFAULT_ADDRESS: u8 = 0x49;

/// Physical (directly addressable) I2C registers.
pub mod phys {
    pub const STATUS: u8 = 0x00;
    pub const WRITE: u8 = 0x01;
    pub const READ: u8 = 0x02;

    /// STATUS bit 0: a response byte is waiting in READ.
    pub const RX_VALID: u8 = 0x01;
    /// STATUS bit 1: a request is still pending acceptance.
    pub const TX_VALID: u8 = 0x02;
}

/// Virtual registers, addressed through the handshake.
pub mod virt {
    pub const DEVICE_TYPE: u8 = 0x00;
    pub const HW_VERSION: u8 = 0x01; // 0x3e = AS7262, 0x3f = AS7263
    pub const CONTROL_SETUP: u8 = 0x04;
    pub const INT_T: u8 = 0x05; // integration time, 2.8 ms per count
    pub const DEVICE_TEMP: u8 = 0x06;
    pub const LED_CONTROL: u8 = 0x07;

    /// First calibrated channel value; six 4-byte big-endian floats follow.
    pub const CAL_BASE: u8 = 0x14;

    /// Set on a WRITE-register address byte to request a virtual write.
    pub const WRITE_FLAG: u8 = 0x80;
}

/// Bit layout of the CONTROL_SETUP virtual register.
pub mod control {
    pub const DATA_RDY: u8 = 1 << 1; // read-only, cleared by the host
    pub const MODE_SHIFT: u8 = 2;
    pub const MODE_MASK: u8 = 0b0000_1100;
    pub const GAIN_SHIFT: u8 = 4;
    pub const GAIN_MASK: u8 = 0b0011_0000;
    pub const RESET: u8 = 1 << 7;
}

/// Bit layout of the LED_CONTROL virtual register.
pub mod led {
    pub const INDICATOR_ON: u8 = 1 << 0;
    pub const INDICATOR_CURRENT_SHIFT: u8 = 1;
    pub const INDICATOR_CURRENT_MASK: u8 = 0b0000_0110;
    pub const BULB_ON: u8 = 1 << 3;
    pub const BULB_CURRENT_SHIFT: u8 = 4;
    pub const BULB_CURRENT_MASK: u8 = 0b0011_0000;
}
