//! Device identity tags
//!
//! Every record carries a tag of the form `KIND:BOARD-UID6`, for example
//! `SHT30:S2-FE74A8`. It is rebuilt from hardware facts on each wake and never
//! persisted, so it cannot go stale after a sensor swap.

use alloc::format;
use alloc::string::String;
use core::fmt::{self, Write};

use crate::reading::SensorKind;

/// Board family the firmware runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BoardCode {
    /// ESP32-S2
    S2,
    /// ESP32-S3
    S3,
    /// Raspberry Pi RP2040
    Rp2040,
    /// Anything else
    Unknown,
}

impl BoardCode {
    /// Classify a platform or machine description string
    pub fn from_platform(platform: &str) -> Self {
        let mut lowered = String::with_capacity(platform.len());
        for c in platform.chars().filter(|c| *c != '-' && *c != '_' && *c != ' ') {
            lowered.extend(c.to_lowercase());
        }
        if lowered.contains("esp32s2") {
            BoardCode::S2
        } else if lowered.contains("esp32s3") {
            BoardCode::S3
        } else if lowered.contains("rp2040") || lowered.contains("rp2") {
            BoardCode::Rp2040
        } else {
            BoardCode::Unknown
        }
    }

    /// Short code used in the identity tag
    pub const fn code(&self) -> &'static str {
        match self {
            BoardCode::S2 => "S2",
            BoardCode::S3 => "S3",
            BoardCode::Rp2040 => "RP",
            BoardCode::Unknown => "UNK",
        }
    }
}

/// `KIND:BOARD-UID6` identity of one device/sensor combination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityTag {
    kind: SensorKind,
    board: BoardCode,
    uid: heapless::String<6>,
    tag: heapless::String<32>,
}

impl IdentityTag {
    /// Build the tag from the detected kind, board and hardware unique ID
    ///
    /// Only the last three bytes of the unique ID are used, rendered as six
    /// uppercase hex digits.
    pub fn new(kind: SensorKind, board: BoardCode, hardware_uid: &[u8]) -> Self {
        let tail = &hardware_uid[hardware_uid.len().saturating_sub(3)..];
        let mut uid = heapless::String::<6>::new();
        for byte in tail {
            // 3 bytes * 2 digits always fit
            let _ = write!(uid, "{byte:02X}");
        }

        let mut tag = heapless::String::<32>::new();
        let _ = write!(tag, "{}:{}-{}", kind.tag_label(), board.code(), uid);

        Self { kind, board, uid, tag }
    }

    /// Full tag text
    pub fn as_str(&self) -> &str {
        &self.tag
    }

    /// Six hex digit hardware suffix
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Sensor kind the tag was built for
    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    /// Board the tag was built on
    pub fn board(&self) -> BoardCode {
        self.board
    }

    /// Human readable device name, e.g. `HowlX Atmos [SHT30:S2-FE74A8]`
    pub fn display_name(&self, sensor_name: &str) -> String {
        format!("{sensor_name} [{}]", self.tag)
    }
}

impl fmt::Display for IdentityTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag)
    }
}
