//! Power-mode vocabulary shared by the state machine, its collaborators and
//! every front-end.

use core::fmt;

/// Radio power mode. Exactly one is current at any instant.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PowerState {
    Stopped,
    FullPower,
    LowPower,
    Imps,
    RequestImps,
    Bmps,
    RequestBmps,
    Uapsd,
    RequestStartUapsd,
    RequestStopUapsd,
    Standby,
    RequestStandby,
    RequestFullPower,
    Wowl,
    RequestEnterWowl,
    RequestExitWowl,
}

impl PowerState {
    /// All states in declaration order.
    pub const ALL: [PowerState; 16] = [
        PowerState::Stopped,
        PowerState::FullPower,
        PowerState::LowPower,
        PowerState::Imps,
        PowerState::RequestImps,
        PowerState::Bmps,
        PowerState::RequestBmps,
        PowerState::Uapsd,
        PowerState::RequestStartUapsd,
        PowerState::RequestStopUapsd,
        PowerState::Standby,
        PowerState::RequestStandby,
        PowerState::RequestFullPower,
        PowerState::Wowl,
        PowerState::RequestEnterWowl,
        PowerState::RequestExitWowl,
    ];

    /// Returns `true` for the transient states that stand in for an
    /// outstanding command.
    #[must_use]
    pub const fn is_request(self) -> bool {
        matches!(
            self,
            PowerState::RequestImps
                | PowerState::RequestBmps
                | PowerState::RequestStartUapsd
                | PowerState::RequestStopUapsd
                | PowerState::RequestStandby
                | PowerState::RequestFullPower
                | PowerState::RequestEnterWowl
                | PowerState::RequestExitWowl
        )
    }

    /// Returns `true` for the stable power-save states that can be left with
    /// an exit command.
    #[must_use]
    pub const fn is_power_save(self) -> bool {
        matches!(
            self,
            PowerState::Imps
                | PowerState::Bmps
                | PowerState::Uapsd
                | PowerState::Standby
                | PowerState::Wowl
        )
    }

    /// Compact discriminant used by atomic snapshots.
    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            PowerState::Stopped => 0,
            PowerState::FullPower => 1,
            PowerState::LowPower => 2,
            PowerState::Imps => 3,
            PowerState::RequestImps => 4,
            PowerState::Bmps => 5,
            PowerState::RequestBmps => 6,
            PowerState::Uapsd => 7,
            PowerState::RequestStartUapsd => 8,
            PowerState::RequestStopUapsd => 9,
            PowerState::Standby => 10,
            PowerState::RequestStandby => 11,
            PowerState::RequestFullPower => 12,
            PowerState::Wowl => 13,
            PowerState::RequestEnterWowl => 14,
            PowerState::RequestExitWowl => 15,
        }
    }

    /// Decodes a discriminant produced by [`PowerState::to_raw`].
    #[must_use]
    pub fn from_raw(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    /// Kebab-case label used in logs and console output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            PowerState::Stopped => "stopped",
            PowerState::FullPower => "full-power",
            PowerState::LowPower => "low-power",
            PowerState::Imps => "imps",
            PowerState::RequestImps => "request-imps",
            PowerState::Bmps => "bmps",
            PowerState::RequestBmps => "request-bmps",
            PowerState::Uapsd => "uapsd",
            PowerState::RequestStartUapsd => "request-start-uapsd",
            PowerState::RequestStopUapsd => "request-stop-uapsd",
            PowerState::Standby => "standby",
            PowerState::RequestStandby => "request-standby",
            PowerState::RequestFullPower => "request-full-power",
            PowerState::Wowl => "wowl",
            PowerState::RequestEnterWowl => "request-enter-wowl",
            PowerState::RequestExitWowl => "request-exit-wowl",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Why a caller needs the radio back at full power. Carried on exit commands.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FullPowerReason {
    Other,
    Host,
    ConnectionManager,
    Qos,
    Roam,
    LinkLost,
    Custom(u8),
}

impl FullPowerReason {
    const OTHER_CODE: u8 = 0x00;
    const HOST_CODE: u8 = 0x01;
    const CONNECTION_MANAGER_CODE: u8 = 0x02;
    const QOS_CODE: u8 = 0x03;
    const ROAM_CODE: u8 = 0x04;
    const LINK_LOST_CODE: u8 = 0x05;

    /// Encodes the reason into the byte carried by exit commands.
    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            FullPowerReason::Other => Self::OTHER_CODE,
            FullPowerReason::Host => Self::HOST_CODE,
            FullPowerReason::ConnectionManager => Self::CONNECTION_MANAGER_CODE,
            FullPowerReason::Qos => Self::QOS_CODE,
            FullPowerReason::Roam => Self::ROAM_CODE,
            FullPowerReason::LinkLost => Self::LINK_LOST_CODE,
            FullPowerReason::Custom(code) => code,
        }
    }

    /// Decodes a reason byte, falling back to [`FullPowerReason::Custom`].
    #[must_use]
    pub const fn from_raw(code: u8) -> Self {
        match code {
            Self::OTHER_CODE => FullPowerReason::Other,
            Self::HOST_CODE => FullPowerReason::Host,
            Self::CONNECTION_MANAGER_CODE => FullPowerReason::ConnectionManager,
            Self::QOS_CODE => FullPowerReason::Qos,
            Self::ROAM_CODE => FullPowerReason::Roam,
            Self::LINK_LOST_CODE => FullPowerReason::LinkLost,
            other => FullPowerReason::Custom(other),
        }
    }
}

impl fmt::Display for FullPowerReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FullPowerReason::Other => f.write_str("other"),
            FullPowerReason::Host => f.write_str("host"),
            FullPowerReason::ConnectionManager => f.write_str("connection-manager"),
            FullPowerReason::Qos => f.write_str("qos"),
            FullPowerReason::Roam => f.write_str("roam"),
            FullPowerReason::LinkLost => f.write_str("link-lost"),
            FullPowerReason::Custom(code) => write!(f, "custom({code})"),
        }
    }
}

/// Successful answer to a request.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RequestStatus {
    /// Nothing to wait for; the radio already satisfies the request.
    Immediate,
    /// Accepted; the supplied callback fires when the transition settles.
    Pending,
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestStatus::Immediate => f.write_str("immediate"),
            RequestStatus::Pending => f.write_str("pending"),
        }
    }
}

/// Status reported by the link-management layer for a finished command.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CommandStatus {
    Success,
    Failure,
}

impl CommandStatus {
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, CommandStatus::Success)
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandStatus::Success => f.write_str("success"),
            CommandStatus::Failure => f.write_str("failure"),
        }
    }
}

/// Rejections surfaced to callers. Internal consistency violations panic
/// instead of producing a value.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PowerError {
    /// Operation is not valid from the current state.
    InvalidState,
    /// Mode is disabled by policy.
    Disabled,
    /// A veto or structural precondition failed; the traffic timer retries.
    NotNow,
    AlreadyInTargetMode,
    /// Command pool, callback list or deferred queue is exhausted.
    Resources,
    /// The transition was attempted and failed, or was abandoned.
    Failure,
}

impl fmt::Display for PowerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerError::InvalidState => f.write_str("invalid-state"),
            PowerError::Disabled => f.write_str("disabled"),
            PowerError::NotNow => f.write_str("not-now"),
            PowerError::AlreadyInTargetMode => f.write_str("already-in-target-mode"),
            PowerError::Resources => f.write_str("resources"),
            PowerError::Failure => f.write_str("failure"),
        }
    }
}

/// Power-save modes that can be enabled or disabled by policy.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PowerSaveMode {
    Imps,
    Bmps,
    Uapsd,
    Standby,
    Wowl,
}

impl fmt::Display for PowerSaveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerSaveMode::Imps => f.write_str("imps"),
            PowerSaveMode::Bmps => f.write_str("bmps"),
            PowerSaveMode::Uapsd => f.write_str("uapsd"),
            PowerSaveMode::Standby => f.write_str("standby"),
            PowerSaveMode::Wowl => f.write_str("wowl"),
        }
    }
}

/// Public request entry points, used to label rejections.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PowerRequest {
    Start,
    FullPower,
    Imps,
    Bmps,
    StartUapsd,
    StopUapsd,
    Standby,
    EnterWowl,
    ExitWowl,
    EnterLowPower,
    ExitLowPower,
    DeferMessage,
}

impl fmt::Display for PowerRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PowerRequest::Start => "start",
            PowerRequest::FullPower => "full-power",
            PowerRequest::Imps => "imps",
            PowerRequest::Bmps => "bmps",
            PowerRequest::StartUapsd => "start-uapsd",
            PowerRequest::StopUapsd => "stop-uapsd",
            PowerRequest::Standby => "standby",
            PowerRequest::EnterWowl => "enter-wowl",
            PowerRequest::ExitWowl => "exit-wowl",
            PowerRequest::EnterLowPower => "enter-low-power",
            PowerRequest::ExitLowPower => "exit-low-power",
            PowerRequest::DeferMessage => "defer-message",
        })
    }
}
