//! PTT controller (§4.6 step 1, §2 item 12): raises/lowers the
//! transmit-enable line around a transmission.
//!
//! The actual hardware access (serial RTS/DTR, a GPIO chip, an LPT port
//! bit, or a CAT/rig-control command) is host-specific and lives in the
//! daemon; this module defines the trait the transmit thread drives and a
//! [`NullPtt`] / [`RecordingPtt`] pair for tests and dry runs.

use crate::config::{PttConfig, PttLine};

/// One controllable transmit-enable line. Implementations only need to
/// track "asserted" vs "not asserted" — inversion and the paired second
/// line are handled by [`Ptt`] above this trait, not by the backend.
pub trait PttLineDriver: Send {
    fn assert(&mut self, line: PttLine, asserted: bool);
}

/// Drives a channel's PTT per its [`PttConfig`]: polarity inversion and an
/// optional second line held at the opposite level, e.g. a transceiver
/// with separate "transmit" and "not-receive" control inputs.
pub struct Ptt<D: PttLineDriver> {
    config: PttConfig,
    driver: D,
    active: bool,
}

impl<D: PttLineDriver> Ptt<D> {
    pub fn new(config: PttConfig, driver: D) -> Self {
        Self {
            config,
            driver,
            active: false,
        }
    }

    fn physical_level(&self, logical_asserted: bool) -> bool {
        if self.config.inverted {
            !logical_asserted
        } else {
            logical_asserted
        }
    }

    /// Raise the PTT line(s) ahead of a transmission.
    pub fn key_up(&mut self) {
        self.driver.assert(self.config.line, self.physical_level(true));
        if let Some(paired) = self.config.paired_line {
            // The paired line is driven at the opposite logical polarity
            // from the primary, before any inversion of either is applied.
            self.driver.assert(paired, self.physical_level(false));
        }
        self.active = true;
    }

    /// Lower the PTT line(s) after a transmission completes.
    pub fn key_down(&mut self) {
        self.driver.assert(self.config.line, self.physical_level(false));
        if let Some(paired) = self.config.paired_line {
            self.driver.assert(paired, self.physical_level(true));
        }
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn config(&self) -> &PttConfig {
        &self.config
    }
}

/// A backend that does nothing — for SmartBeaconing tests, simulated
/// channels, or a receive-only configuration.
pub struct NullPtt;
impl PttLineDriver for NullPtt {
    fn assert(&mut self, _line: PttLine, _asserted: bool) {}
}

/// A backend that records every assertion, for tests that need to verify
/// the exact sequence of line changes a transmission produced.
#[derive(Debug, Default)]
pub struct RecordingPtt {
    pub events: Vec<(PttLine, bool)>,
}
impl PttLineDriver for RecordingPtt {
    fn assert(&mut self, line: PttLine, asserted: bool) {
        self.events.push((line, asserted));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PttConfig {
        PttConfig {
            line: PttLine::Rts,
            inverted: false,
            paired_line: None,
            txdelay_ms: 300,
            txtail_ms: 50,
            dwait_ms: 0,
            slottime_ms: 100,
            persist: 63,
        }
    }

    #[test]
    fn key_up_then_down_round_trips() {
        let mut ptt = Ptt::new(config(), RecordingPtt::default());
        ptt.key_up();
        assert!(ptt.is_active());
        ptt.key_down();
        assert!(!ptt.is_active());
        assert_eq!(ptt.driver.events, vec![(PttLine::Rts, true), (PttLine::Rts, false)]);
    }

    #[test]
    fn inverted_polarity_flips_physical_level() {
        let mut cfg = config();
        cfg.inverted = true;
        let mut ptt = Ptt::new(cfg, RecordingPtt::default());
        ptt.key_up();
        assert_eq!(ptt.driver.events, vec![(PttLine::Rts, false)]);
    }

    #[test]
    fn paired_line_driven_opposite() {
        let mut cfg = config();
        cfg.paired_line = Some(PttLine::Dtr);
        let mut ptt = Ptt::new(cfg, RecordingPtt::default());
        ptt.key_up();
        assert_eq!(
            ptt.driver.events,
            vec![(PttLine::Rts, true), (PttLine::Dtr, false)]
        );
    }
}
