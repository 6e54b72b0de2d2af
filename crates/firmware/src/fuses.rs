//! Configuration word ("fuses") for the mid-range PIC core.
//!
//! The word is 14 bits wide and lives at program memory word address
//! [`CONFIG_WORD_ADDRESS`]. An erased word reads `0x3FFF`; bits that are not
//! named here keep their erased value.

use bitflags::bitflags;

/// Program memory word address of the first configuration word.
pub const CONFIG_WORD_ADDRESS: u16 = 0x2007;

/// Value of an unprogrammed configuration word.
pub const ERASED_WORD: u16 = 0x3FFF;

bitflags! {
    /// Raw bits of the configuration word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ConfigWord: u16 {
        const FOSC0 = 1 << 0;
        const FOSC1 = 1 << 1;
        const FOSC2 = 1 << 2;
        const WDTE = 1 << 3;
        /// Active low: cleared means the power-up timer is enabled.
        const PWRTE_N = 1 << 4;
        const MCLRE = 1 << 5;
        /// Active low: cleared means program memory is protected.
        const CP_N = 1 << 6;
        const CPD_N = 1 << 7;
        const BOREN0 = 1 << 8;
        const BOREN1 = 1 << 9;
        const IESO = 1 << 10;
        const FCMEN = 1 << 11;
        const LVP = 1 << 13;

        const FOSC_MASK = Self::FOSC0.bits() | Self::FOSC1.bits() | Self::FOSC2.bits();
        const BOREN_MASK = Self::BOREN0.bits() | Self::BOREN1.bits();
    }
}

/// Oscillator source selection (FOSC<2:0>).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Oscillator {
    Lp,
    Xt,
    Hs,
    Ec,
    /// Internal RC, RA6/RA7 as I/O.
    IntRcNoClkOut,
    /// Internal RC, Fosc/4 on the CLKOUT pin.
    IntRcClkOut,
    ExtRcNoClkOut,
    ExtRcClkOut,
}

impl Oscillator {
    const fn bits(self) -> u16 {
        match self {
            Oscillator::Lp => 0b000,
            Oscillator::Xt => 0b001,
            Oscillator::Hs => 0b010,
            Oscillator::Ec => 0b011,
            Oscillator::IntRcNoClkOut => 0b100,
            Oscillator::IntRcClkOut => 0b101,
            Oscillator::ExtRcNoClkOut => 0b110,
            Oscillator::ExtRcClkOut => 0b111,
        }
    }

    const fn from_bits(bits: u16) -> Self {
        match bits & 0b111 {
            0b000 => Oscillator::Lp,
            0b001 => Oscillator::Xt,
            0b010 => Oscillator::Hs,
            0b011 => Oscillator::Ec,
            0b100 => Oscillator::IntRcNoClkOut,
            0b101 => Oscillator::IntRcClkOut,
            0b110 => Oscillator::ExtRcNoClkOut,
            _ => Oscillator::ExtRcClkOut,
        }
    }
}

/// On/off state of a single fuse option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Switch {
    On,
    Off,
}

impl Switch {
    const fn is_on(self) -> bool {
        matches!(self, Switch::On)
    }

    const fn from_bool(on: bool) -> Self {
        if on {
            Switch::On
        } else {
            Switch::Off
        }
    }
}

/// Typed view of the configuration word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FuseConfig {
    pub oscillator: Oscillator,
    pub watchdog: Switch,
    pub power_up_timer: Switch,
    pub master_clear: Switch,
    pub code_protect: Switch,
    pub brown_out: Switch,
}

impl Default for FuseConfig {
    fn default() -> Self {
        FUSES
    }
}

/// Fuse settings burned alongside the blink firmware.
pub const FUSES: FuseConfig = FuseConfig {
    oscillator: Oscillator::IntRcNoClkOut,
    watchdog: Switch::Off,
    power_up_timer: Switch::On,
    master_clear: Switch::On,
    code_protect: Switch::Off,
    brown_out: Switch::Off,
};

impl FuseConfig {
    /// Encode into the 14-bit configuration word.
    pub const fn encode(&self) -> ConfigWord {
        let mut bits = ERASED_WORD;

        bits = (bits & !ConfigWord::FOSC_MASK.bits()) | self.oscillator.bits();

        if !self.watchdog.is_on() {
            bits &= !ConfigWord::WDTE.bits();
        }
        if self.power_up_timer.is_on() {
            bits &= !ConfigWord::PWRTE_N.bits();
        }
        if !self.master_clear.is_on() {
            bits &= !ConfigWord::MCLRE.bits();
        }
        if self.code_protect.is_on() {
            bits &= !ConfigWord::CP_N.bits();
        }
        if !self.brown_out.is_on() {
            bits &= !ConfigWord::BOREN_MASK.bits();
        }

        ConfigWord::from_bits_retain(bits)
    }

    /// Decode the options this type models. Brown-out counts as on when
    /// either BOREN bit is set.
    pub const fn decode(word: ConfigWord) -> Self {
        let bits = word.bits();
        Self {
            oscillator: Oscillator::from_bits(bits),
            watchdog: Switch::from_bool(bits & ConfigWord::WDTE.bits() != 0),
            power_up_timer: Switch::from_bool(bits & ConfigWord::PWRTE_N.bits() == 0),
            master_clear: Switch::from_bool(bits & ConfigWord::MCLRE.bits() != 0),
            code_protect: Switch::from_bool(bits & ConfigWord::CP_N.bits() == 0),
            brown_out: Switch::from_bool(bits & ConfigWord::BOREN_MASK.bits() != 0),
        }
    }
}

/// Encoded word for [`FUSES`].
pub const CONFIG_WORD: u16 = FUSES.encode().bits();
