use crate::{ConfigError, Hertz};

/// Swept frequency span in whole megahertz, `start_mhz < stop_mhz`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrequencyRange {
    start_mhz: u32,
    stop_mhz: u32,
}

impl FrequencyRange {
    pub fn new(start_mhz: u32, stop_mhz: u32) -> Result<Self, ConfigError> {
        if stop_mhz <= start_mhz {
            return Err(ConfigError::InvalidFrequencyRange {
                start_mhz,
                stop_mhz,
            });
        }
        Ok(Self {
            start_mhz,
            stop_mhz,
        })
    }

    pub const fn start_mhz(&self) -> u32 {
        self.start_mhz
    }

    pub const fn stop_mhz(&self) -> u32 {
        self.stop_mhz
    }

    pub const fn start(&self) -> Hertz {
        Hertz::mhz(self.start_mhz as u64)
    }

    pub const fn stop(&self) -> Hertz {
        Hertz::mhz(self.stop_mhz as u64)
    }

    pub const fn span(&self) -> Hertz {
        Hertz::mhz((self.stop_mhz - self.start_mhz) as u64)
    }
}

impl Default for FrequencyRange {
    fn default() -> Self {
        Self {
            start_mhz: 2400,
            stop_mhz: 2500,
        }
    }
}

impl std::fmt::Display for FrequencyRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{} MHz", self.start_mhz, self.stop_mhz)
    }
}
