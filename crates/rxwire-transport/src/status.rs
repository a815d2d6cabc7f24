use std::fmt;

/// Raw sentinel: no connected subscriber.
pub const NOT_CONNECTED: i64 = -1;
/// Raw sentinel: the channel is full, try again later.
pub const BACK_PRESSURED: i64 = -2;
/// Raw sentinel: an administrative action is in progress, try again later.
pub const ADMIN_ACTION: i64 = -3;
/// Raw sentinel: the channel has been closed.
pub const CLOSED: i64 = -4;
/// Raw sentinel: the channel has reached its maximum position.
pub const MAX_POSITION_EXCEEDED: i64 = -5;

/// Result of one non-blocking offer of a complete frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferStatus {
    /// The frame was accepted; carries the new stream position.
    Success(u64),
    /// The channel cannot take the frame right now.
    BackPressured,
    /// The channel is paused by an administrative action.
    AdminAction,
    /// There is no connected peer.
    NotConnected,
    /// The channel is closed for good.
    Closed,
    /// The channel ran out of addressable positions.
    MaxPositionExceeded,
    /// A negative code this library does not know.
    Unknown(i64),
}

impl OfferStatus {
    /// Normalize a raw status code.
    ///
    /// Non-negative codes are positions; negative codes are sentinels.
    pub fn from_code(code: i64) -> Self {
        match code {
            code if code >= 0 => Self::Success(code as u64),
            NOT_CONNECTED => Self::NotConnected,
            BACK_PRESSURED => Self::BackPressured,
            ADMIN_ACTION => Self::AdminAction,
            CLOSED => Self::Closed,
            MAX_POSITION_EXCEEDED => Self::MaxPositionExceeded,
            other => Self::Unknown(other),
        }
    }

    /// The raw code for this status.
    pub fn code(self) -> i64 {
        match self {
            Self::Success(position) => i64::try_from(position).unwrap_or(i64::MAX),
            Self::NotConnected => NOT_CONNECTED,
            Self::BackPressured => BACK_PRESSURED,
            Self::AdminAction => ADMIN_ACTION,
            Self::Closed => CLOSED,
            Self::MaxPositionExceeded => MAX_POSITION_EXCEEDED,
            Self::Unknown(code) => code,
        }
    }

    /// True if retrying the same offer later may succeed.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::BackPressured | Self::AdminAction)
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success(position) => write!(f, "success (position {position})"),
            Self::BackPressured => f.write_str("back pressured"),
            Self::AdminAction => f.write_str("admin action"),
            Self::NotConnected => f.write_str("not connected"),
            Self::Closed => f.write_str("closed"),
            Self::MaxPositionExceeded => f.write_str("max position exceeded"),
            Self::Unknown(code) => write!(f, "unknown status {code}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_codes_are_positions() {
        assert_eq!(OfferStatus::from_code(0), OfferStatus::Success(0));
        assert_eq!(OfferStatus::from_code(4096), OfferStatus::Success(4096));
    }

    #[test]
    fn sentinels_normalize() {
        assert_eq!(OfferStatus::from_code(-1), OfferStatus::NotConnected);
        assert_eq!(OfferStatus::from_code(-2), OfferStatus::BackPressured);
        assert_eq!(OfferStatus::from_code(-3), OfferStatus::AdminAction);
        assert_eq!(OfferStatus::from_code(-4), OfferStatus::Closed);
        assert_eq!(OfferStatus::from_code(-5), OfferStatus::MaxPositionExceeded);
        assert_eq!(OfferStatus::from_code(-99), OfferStatus::Unknown(-99));
    }

    #[test]
    fn code_inverts_from_code() {
        for code in [-99, -5, -4, -3, -2, -1, 0, 77] {
            assert_eq!(OfferStatus::from_code(code).code(), code);
        }
    }

    #[test]
    fn only_back_pressure_and_admin_are_transient() {
        assert!(OfferStatus::BackPressured.is_transient());
        assert!(OfferStatus::AdminAction.is_transient());
        assert!(!OfferStatus::NotConnected.is_transient());
        assert!(!OfferStatus::Closed.is_transient());
        assert!(!OfferStatus::Success(1).is_transient());
        assert!(!OfferStatus::Unknown(-42).is_transient());
    }
}
