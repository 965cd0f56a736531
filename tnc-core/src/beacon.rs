//! Beacon and SmartBeaconing scheduler (§4.8): periodically builds
//! position/object/tracker/custom beacon packets and routes each to its
//! configured destination.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::address::Address;
use crate::config::{BeaconConfig, BeaconDestination, BeaconKind, SmartBeaconConfig};
use crate::packet::Packet;

/// GPS fix quality, ordered so "at least 2D" is a single comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FixQuality {
    None,
    Fix2D,
    Fix3D,
}

#[derive(Debug, Clone, Copy)]
pub struct GpsFix {
    pub lat: f64,
    pub lon: f64,
    pub speed_kph: f64,
    pub heading_deg: f64,
    pub quality: FixQuality,
}

/// The GPS device itself is host-specific (NMEA over serial, gpsd, a
/// mock for bench testing); the scheduler only needs the latest fix.
pub trait GpsSource: Send {
    fn read(&mut self) -> Option<GpsFix>;
}

/// No GPS attached — tracker beacons never transmit (§4.8 step 4 /
/// "Tracker beacon with no GPS fix sets next_time = now + 2, never
/// transmits").
pub struct NullGpsSource;
impl GpsSource for NullGpsSource {
    fn read(&mut self) -> Option<GpsFix> {
        None
    }
}

struct BeaconState {
    next_time: Instant,
    last_heading: Option<f64>,
    last_tx_at: Option<Instant>,
}

/// Owns the configured beacon set, the optional SmartBeaconing tuning,
/// and the GPS source. One instance per beacon thread.
pub struct BeaconScheduler<G: GpsSource> {
    beacons: Vec<(BeaconConfig, BeaconState)>,
    smartbeacon: Option<SmartBeaconConfig>,
    gps: G,
    mycall: Address,
}

impl<G: GpsSource> BeaconScheduler<G> {
    pub fn new(beacons: Vec<BeaconConfig>, smartbeacon: Option<SmartBeaconConfig>, gps: G, mycall: Address, start: Instant) -> Self {
        let beacons = beacons
            .into_iter()
            .map(|cfg| {
                let next_time = start + Duration::from_secs(cfg.delay_secs);
                (
                    cfg,
                    BeaconState {
                        next_time,
                        last_heading: None,
                        last_tx_at: None,
                    },
                )
            })
            .collect();
        Self {
            beacons,
            smartbeacon,
            gps,
            mycall,
        }
    }

    fn has_tracker(&self) -> bool {
        self.beacons.iter().any(|(c, _)| c.kind == BeaconKind::Tracker)
    }

    /// The next instant [`Self::tick`] should be called (§4.8 step 1).
    /// When a tracker beacon is configured under SmartBeaconing, the
    /// wakeup is pulled earlier so corner-peg detection isn't missed
    /// between two ordinary beacon intervals.
    pub fn earliest_wakeup(&self, now: Instant) -> Instant {
        let mut earliest = self
            .beacons
            .iter()
            .map(|(_, s)| s.next_time)
            .min()
            .unwrap_or_else(|| now + Duration::from_secs(3600));

        if self.has_tracker() {
            if let Some(sb) = &self.smartbeacon {
                earliest = earliest
                    .min(now + Duration::from_secs(sb.turn_time_secs))
                    .min(now + Duration::from_secs(sb.fast_rate_secs));
            }
        }
        earliest
    }

    /// Run one scheduler wakeup: read a GPS fix if needed, apply
    /// SmartBeaconing's corner-peg preemption, then transmit every beacon
    /// whose `next_time` has arrived. Returns the beacons due, paired
    /// with their configured destination.
    pub fn tick(&mut self, now: Instant) -> Vec<(BeaconDestination, Packet)> {
        let fix = if self.has_tracker() { self.gps.read() } else { None };

        if let (Some(sb), Some(fix)) = (&self.smartbeacon, &fix) {
            if fix.quality >= FixQuality::Fix2D {
                for (cfg, state) in self.beacons.iter_mut().filter(|(c, _)| c.kind == BeaconKind::Tracker) {
                    let _ = cfg;
                    let turn_fires = match state.last_heading {
                        Some(prev) => {
                            let delta = heading_delta(prev, fix.heading_deg);
                            let slope_term = if fix.speed_kph > 0.0 { sb.turn_slope / fix.speed_kph } else { f64::INFINITY };
                            let elapsed_ok = state
                                .last_tx_at
                                .map(|t| now.duration_since(t) >= Duration::from_secs(sb.turn_time_secs))
                                .unwrap_or(true);
                            delta > sb.turn_angle_deg + slope_term && elapsed_ok
                        }
                        None => false,
                    };
                    if turn_fires {
                        state.next_time = now;
                    }
                }
            }
        }

        let mut due = Vec::new();
        for (cfg, state) in self.beacons.iter_mut() {
            if state.next_time > now {
                continue;
            }

            let packet = match cfg.kind {
                BeaconKind::Tracker => match &fix {
                    Some(f) if f.quality >= FixQuality::Fix2D => build_position_packet(&self.mycall, cfg, f.lat, f.lon, &cfg.comment),
                    _ => {
                        state.next_time = now + Duration::from_secs(2);
                        continue;
                    }
                },
                BeaconKind::Position => build_position_packet(&self.mycall, cfg, cfg.latitude, cfg.longitude, &cfg.comment),
                BeaconKind::Object => build_object_packet(&self.mycall, cfg),
                BeaconKind::Custom => build_custom_packet(&self.mycall, cfg),
            };
            due.push((cfg.destination, packet));

            state.last_tx_at = Some(now);
            if let Some(f) = &fix {
                state.last_heading = Some(f.heading_deg);
            }
            state.next_time = match (cfg.kind, &self.smartbeacon, &fix) {
                (BeaconKind::Tracker, Some(sb), Some(f)) if f.quality >= FixQuality::Fix2D => {
                    now + Duration::from_secs(smartbeacon_rate(sb, f.speed_kph))
                }
                _ => now + Duration::from_secs(cfg.every_secs),
            };
        }
        due
    }
}

/// SmartBeaconing's speed-dependent interval (§4.8 step 4).
fn smartbeacon_rate(sb: &SmartBeaconConfig, speed_kph: f64) -> u64 {
    if speed_kph >= sb.fast_speed_kph {
        sb.fast_rate_secs
    } else if speed_kph <= sb.slow_speed_kph {
        sb.slow_rate_secs
    } else {
        (sb.fast_rate_secs as f64 * sb.fast_speed_kph / speed_kph).round() as u64
    }
}

/// Absolute heading change in degrees, accounting for wraparound (e.g.
/// 350° -> 10° is a 20° turn, not 340°).
fn heading_delta(a: f64, b: f64) -> f64 {
    let d = (b - a).abs() % 360.0;
    if d > 180.0 {
        360.0 - d
    } else {
        d
    }
}

/// `DDMM.mmN/DDDMM.mmWs` — the fixed-width lat/lon/symbol field shared by
/// position, object, and tracker beacons.
fn format_position(lat: f64, lon: f64, symbol_table: char, symbol_code: char) -> String {
    let (lat_deg, lat_min) = deg_min(lat.abs());
    let ns = if lat >= 0.0 { 'N' } else { 'S' };
    let (lon_deg, lon_min) = deg_min(lon.abs());
    let ew = if lon >= 0.0 { 'E' } else { 'W' };
    format!("{lat_deg:02}{lat_min:05.2}{ns}{symbol_table}{lon_deg:03}{lon_min:05.2}{ew}{symbol_code}")
}

fn deg_min(value: f64) -> (u32, f64) {
    let deg = value.floor();
    let min = (value - deg) * 60.0;
    (deg as u32, min)
}

fn build_position_packet(mycall: &Address, cfg: &BeaconConfig, lat: f64, lon: f64, comment: &str) -> Packet {
    let mut info = format!("!{}", format_position(lat, lon, cfg.symbol_table, cfg.symbol_code));
    if let Some(phg) = &cfg.phg {
        info.push_str(phg);
    }
    info.push_str(comment);
    Packet::new_ui(mycall.clone(), "APRS".parse().unwrap(), info.into_bytes())
}

/// `hhmmssh` — zulu time-of-day, the "HMS" APRS timestamp form. Avoids
/// needing a calendar to compute the day-of-month the other timestamp
/// forms require.
fn hms_timestamp() -> String {
    let secs_of_day = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() % 86400;
    let (h, m, s) = (secs_of_day / 3600, (secs_of_day % 3600) / 60, secs_of_day % 60);
    format!("{h:02}{m:02}{s:02}h")
}

fn build_object_packet(mycall: &Address, cfg: &BeaconConfig) -> Packet {
    let name: String = cfg.object_name.chars().take(9).collect();
    let mut info = format!(";{name:<9}*{}{}", hms_timestamp(), format_position(cfg.latitude, cfg.longitude, cfg.symbol_table, cfg.symbol_code));
    if let Some(phg) = &cfg.phg {
        info.push_str(phg);
    }
    info.push_str(&cfg.comment);
    Packet::new_ui(mycall.clone(), "APRS".parse().unwrap(), info.into_bytes())
}

/// Builds a custom beacon: a fixed comment string, or (if configured) the
/// captured stdout of an operator-configured shell command — the same
/// "comment generator" contract real TNCs expose for weather stations and
/// similar telemetry sources. The command is part of the station's own
/// configuration, never attacker-supplied input.
fn build_custom_packet(mycall: &Address, cfg: &BeaconConfig) -> Packet {
    let text = match &cfg.comment_command {
        Some(cmd) => run_comment_command(cmd).unwrap_or_else(|| cfg.comment.clone()),
        None => cfg.comment.clone(),
    };
    Packet::new_ui(mycall.clone(), "APRS".parse().unwrap(), text.into_bytes())
}

fn run_comment_command(cmd: &str) -> Option<String> {
    let output = std::process::Command::new("sh").arg("-c").arg(cmd).output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mycall() -> Address {
        Address::new("MYCALL", 0).unwrap()
    }

    fn position_config() -> BeaconConfig {
        BeaconConfig {
            delay_secs: 0,
            every_secs: 1800,
            latitude: 42.6190,
            longitude: -71.3472,
            comment: "-test".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn position_beacon_formats_lat_lon_like_reference_scenario() {
        let mut scheduler = BeaconScheduler::new(vec![position_config()], None, NullGpsSource, mycall(), Instant::now());
        let out = scheduler.tick(Instant::now());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].1.to_tnc2(), "MYCALL>APRS:!4237.14N/07120.83W-test");
    }

    #[test]
    fn fixed_interval_reschedules_after_transmit() {
        let now = Instant::now();
        let mut scheduler = BeaconScheduler::new(vec![position_config()], None, NullGpsSource, mycall(), now);
        assert_eq!(scheduler.tick(now).len(), 1);
        assert!(scheduler.tick(now).is_empty());
        assert!(scheduler.tick(now + Duration::from_secs(1801)).len() == 1);
    }

    struct FixedGps(Option<GpsFix>);
    impl GpsSource for FixedGps {
        fn read(&mut self) -> Option<GpsFix> {
            self.0
        }
    }

    #[test]
    fn tracker_without_fix_retries_soon_and_never_transmits() {
        let mut cfg = position_config();
        cfg.kind = BeaconKind::Tracker;
        let now = Instant::now();
        let mut scheduler = BeaconScheduler::new(vec![cfg], None, NullGpsSource, mycall(), now);
        assert!(scheduler.tick(now).is_empty());
        assert!(scheduler.tick(now + Duration::from_secs(1)).is_empty());
        assert!(!scheduler.tick(now + Duration::from_secs(3)).is_empty());
    }

    fn smartbeacon() -> SmartBeaconConfig {
        SmartBeaconConfig {
            fast_speed_kph: 100.0,
            fast_rate_secs: 60,
            slow_speed_kph: 5.0,
            slow_rate_secs: 600,
            turn_time_secs: 15,
            turn_angle_deg: 25.0,
            turn_slope: 255.0,
        }
    }

    #[test]
    fn smartbeacon_uses_slow_rate_at_zero_speed() {
        let mut cfg = position_config();
        cfg.kind = BeaconKind::Tracker;
        let now = Instant::now();
        let fix = GpsFix { lat: 42.0, lon: -71.0, speed_kph: 0.0, heading_deg: 0.0, quality: FixQuality::Fix2D };
        let mut scheduler = BeaconScheduler::new(vec![cfg], Some(smartbeacon()), FixedGps(Some(fix)), mycall(), now);
        assert_eq!(scheduler.tick(now).len(), 1);
        // slow_rate_secs = 600: nothing due well before that, due at/after it.
        assert!(scheduler.tick(now + Duration::from_secs(300)).is_empty());
        assert_eq!(scheduler.tick(now + Duration::from_secs(601)).len(), 1);
    }

    #[test]
    fn smartbeacon_uses_fast_rate_at_high_speed() {
        let mut cfg = position_config();
        cfg.kind = BeaconKind::Tracker;
        let now = Instant::now();
        let fix = GpsFix { lat: 42.0, lon: -71.0, speed_kph: 120.0, heading_deg: 0.0, quality: FixQuality::Fix2D };
        let mut scheduler = BeaconScheduler::new(vec![cfg], Some(smartbeacon()), FixedGps(Some(fix)), mycall(), now);
        assert_eq!(scheduler.tick(now).len(), 1);
        // fast_rate_secs = 60: due again well before the slow rate would allow.
        assert_eq!(scheduler.tick(now + Duration::from_secs(61)).len(), 1);
    }

    #[test]
    fn corner_peg_preempts_next_time_on_sharp_turn() {
        let mut cfg = position_config();
        cfg.kind = BeaconKind::Tracker;
        cfg.every_secs = 600;
        let now = Instant::now();
        let fix1 = GpsFix { lat: 42.0, lon: -71.0, speed_kph: 30.0, heading_deg: 0.0, quality: FixQuality::Fix2D };
        let mut scheduler = BeaconScheduler::new(vec![cfg], Some(smartbeacon()), FixedGps(Some(fix1)), mycall(), now);
        assert_eq!(scheduler.tick(now).len(), 1);

        // Heading swings 90 degrees after the turn_time window elapses.
        let later = now + Duration::from_secs(20);
        scheduler.gps.0 = Some(GpsFix { lat: 42.0, lon: -71.0, speed_kph: 30.0, heading_deg: 90.0, quality: FixQuality::Fix2D });
        assert_eq!(scheduler.tick(later).len(), 1);
    }

    #[test]
    fn object_beacon_includes_name_and_timestamp_marker() {
        let mut cfg = position_config();
        cfg.kind = BeaconKind::Object;
        cfg.object_name = "WX1".to_string();
        let mut scheduler = BeaconScheduler::new(vec![cfg], None, NullGpsSource, mycall(), Instant::now());
        let out = scheduler.tick(Instant::now());
        let text = out[0].1.to_tnc2();
        assert!(text.contains(";WX1"));
        assert!(text.contains('h'));
    }

    #[test]
    fn custom_beacon_falls_back_to_fixed_comment_without_command() {
        let mut cfg = position_config();
        cfg.kind = BeaconKind::Custom;
        cfg.comment = "fixed text".to_string();
        let mut scheduler = BeaconScheduler::new(vec![cfg], None, NullGpsSource, mycall(), Instant::now());
        let out = scheduler.tick(Instant::now());
        assert!(out[0].1.to_tnc2().ends_with("fixed text"));
    }
}
