//! Policy knobs and the power-save configuration surface.

use core::fmt;
use core::time::Duration;

use heapless::Vec;

use crate::power::PowerSaveMode;

/// Default idle-sleep period armed on entering IMPS.
pub const DEFAULT_IDLE_SLEEP_PERIOD: Duration = Duration::from_secs(10);
/// Default traffic-measurement period while at full power.
pub const DEFAULT_TRAFFIC_MEASURE_PERIOD: Duration = Duration::from_millis(500);
/// Default back-off before an exit command that could not be submitted is retried.
pub const DEFAULT_EXIT_RETRY_DELAY: Duration = Duration::from_millis(10);
/// Traffic-timer expiries tolerated while the remain-active guard is held.
pub const DEFAULT_REMAIN_ACTIVE_MAX_TICKS: u8 = 20;
/// Frames per traffic period above which the link is considered busy.
pub const DEFAULT_TRAFFIC_THRESHOLD: u32 = 8;

/// Where the platform currently draws power from.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PowerSource {
    Battery,
    Ac,
}

impl fmt::Display for PowerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerSource::Battery => f.write_str("battery"),
            PowerSource::Ac => f.write_str("ac"),
        }
    }
}

/// Policy consulted by every pre-flight check.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PowerPolicy {
    pub imps_enabled: bool,
    pub bmps_enabled: bool,
    pub uapsd_enabled: bool,
    pub standby_enabled: bool,
    pub wowl_enabled: bool,
    /// Pursue BMPS from full power without an explicit request.
    pub auto_bmps: bool,
    pub enter_imps_on_ac: bool,
    pub enter_bmps_on_ac: bool,
    /// Zero disables the idle-sleep timer.
    pub idle_sleep_period: Duration,
    /// Zero disables the traffic timer.
    pub traffic_measure_period: Duration,
    pub exit_retry_delay: Duration,
    pub traffic_threshold: u32,
    pub remain_active_max_ticks: u8,
}

impl PowerPolicy {
    /// Policy with every mode enabled and automatic BMPS on.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            imps_enabled: true,
            bmps_enabled: true,
            uapsd_enabled: true,
            standby_enabled: true,
            wowl_enabled: true,
            auto_bmps: true,
            enter_imps_on_ac: false,
            enter_bmps_on_ac: false,
            idle_sleep_period: DEFAULT_IDLE_SLEEP_PERIOD,
            traffic_measure_period: DEFAULT_TRAFFIC_MEASURE_PERIOD,
            exit_retry_delay: DEFAULT_EXIT_RETRY_DELAY,
            traffic_threshold: DEFAULT_TRAFFIC_THRESHOLD,
            remain_active_max_ticks: DEFAULT_REMAIN_ACTIVE_MAX_TICKS,
        }
    }

    /// Returns `true` when `mode` is enabled.
    #[must_use]
    pub const fn is_enabled(&self, mode: PowerSaveMode) -> bool {
        match mode {
            PowerSaveMode::Imps => self.imps_enabled,
            PowerSaveMode::Bmps => self.bmps_enabled,
            PowerSaveMode::Uapsd => self.uapsd_enabled,
            PowerSaveMode::Standby => self.standby_enabled,
            PowerSaveMode::Wowl => self.wowl_enabled,
        }
    }

    pub fn set_enabled(&mut self, mode: PowerSaveMode, enabled: bool) {
        let flag = match mode {
            PowerSaveMode::Imps => &mut self.imps_enabled,
            PowerSaveMode::Bmps => &mut self.bmps_enabled,
            PowerSaveMode::Uapsd => &mut self.uapsd_enabled,
            PowerSaveMode::Standby => &mut self.standby_enabled,
            PowerSaveMode::Wowl => &mut self.wowl_enabled,
        };
        *flag = enabled;
    }

    /// Returns `true` when `mode` may be entered while running from `source`.
    #[must_use]
    pub const fn allows_on(&self, mode: PowerSaveMode, source: PowerSource) -> bool {
        match (mode, source) {
            (_, PowerSource::Battery) => true,
            (PowerSaveMode::Imps, PowerSource::Ac) => self.enter_imps_on_ac,
            (PowerSaveMode::Bmps | PowerSaveMode::Uapsd, PowerSource::Ac) => {
                self.enter_bmps_on_ac
            }
            (PowerSaveMode::Standby | PowerSaveMode::Wowl, PowerSource::Ac) => true,
        }
    }
}

impl Default for PowerPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Which beacons the firmware forwards to the host while in BMPS.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum BeaconForward {
    None,
    Tim,
    Dtim,
    EveryNth(u8),
    All,
}

/// Beacon early termination settings.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BeaconEarlyTermination {
    pub enabled: bool,
    pub wake_interval: u16,
}

/// Encoded length of a [`PowerSaveConfig`].
pub const POWER_SAVE_CONFIG_LEN: usize = 8;

/// Options applied through the `PowerSaveConfig` message.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PowerSaveConfig {
    pub beacon_forward: BeaconForward,
    pub listen_interval: u16,
    pub enable_ps_poll: bool,
    pub immediate_ps_on_last_frame: bool,
    pub beacon_early_termination: BeaconEarlyTermination,
}

impl PowerSaveConfig {
    const FLAG_PS_POLL: u8 = 1 << 0;
    const FLAG_IMMEDIATE_PS: u8 = 1 << 1;
    const FLAG_BET: u8 = 1 << 2;

    #[must_use]
    pub const fn new() -> Self {
        Self {
            beacon_forward: BeaconForward::Dtim,
            listen_interval: 1,
            enable_ps_poll: false,
            immediate_ps_on_last_frame: true,
            beacon_early_termination: BeaconEarlyTermination {
                enabled: false,
                wake_interval: 0,
            },
        }
    }

    /// Serializes the configuration into the message payload layout:
    /// `[mode, nth, flags, listen_lo, listen_hi, wake_lo, wake_hi, reserved]`.
    #[must_use]
    pub fn encode(&self) -> Vec<u8, POWER_SAVE_CONFIG_LEN> {
        let (mode, nth) = match self.beacon_forward {
            BeaconForward::None => (0, 0),
            BeaconForward::Tim => (1, 0),
            BeaconForward::Dtim => (2, 0),
            BeaconForward::EveryNth(n) => (3, n),
            BeaconForward::All => (4, 0),
        };

        let mut flags = 0;
        if self.enable_ps_poll {
            flags |= Self::FLAG_PS_POLL;
        }
        if self.immediate_ps_on_last_frame {
            flags |= Self::FLAG_IMMEDIATE_PS;
        }
        if self.beacon_early_termination.enabled {
            flags |= Self::FLAG_BET;
        }

        let listen = self.listen_interval.to_le_bytes();
        let wake = self.beacon_early_termination.wake_interval.to_le_bytes();
        Vec::from_array([mode, nth, flags, listen[0], listen[1], wake[0], wake[1], 0])
    }

    /// Parses a payload produced by [`PowerSaveConfig::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, ConfigDecodeError> {
        if bytes.len() != POWER_SAVE_CONFIG_LEN {
            return Err(ConfigDecodeError::Length(bytes.len()));
        }

        let beacon_forward = match (bytes[0], bytes[1]) {
            (0, _) => BeaconForward::None,
            (1, _) => BeaconForward::Tim,
            (2, _) => BeaconForward::Dtim,
            (3, 0) => return Err(ConfigDecodeError::ZeroInterval),
            (3, n) => BeaconForward::EveryNth(n),
            (4, _) => BeaconForward::All,
            (mode, _) => return Err(ConfigDecodeError::BeaconMode(mode)),
        };

        let flags = bytes[2];
        Ok(Self {
            beacon_forward,
            listen_interval: u16::from_le_bytes([bytes[3], bytes[4]]),
            enable_ps_poll: flags & Self::FLAG_PS_POLL != 0,
            immediate_ps_on_last_frame: flags & Self::FLAG_IMMEDIATE_PS != 0,
            beacon_early_termination: BeaconEarlyTermination {
                enabled: flags & Self::FLAG_BET != 0,
                wake_interval: u16::from_le_bytes([bytes[5], bytes[6]]),
            },
        })
    }
}

impl Default for PowerSaveConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors reported while decoding a [`PowerSaveConfig`] payload.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConfigDecodeError {
    Length(usize),
    BeaconMode(u8),
    ZeroInterval,
}

impl fmt::Display for ConfigDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigDecodeError::Length(len) => {
                write!(f, "expected {POWER_SAVE_CONFIG_LEN} bytes, found {len}")
            }
            ConfigDecodeError::BeaconMode(mode) => write!(f, "unknown beacon mode {mode}"),
            ConfigDecodeError::ZeroInterval => f.write_str("every-nth beacon interval of zero"),
        }
    }
}
