use std::fmt;

/// Why the EventSub connection ended.
///
/// Codes 4000 to 4007 are Twitch's documented close codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    InternalServerError,
    ClientSentInboundTraffic,
    ClientFailedPingPong,
    ConnectionUnused,
    ReconnectGraceExpired,
    NetworkTimeout,
    NetworkError,
    InvalidReconnect,
    /// A close frame with a code we do not know.
    Unknown { code: u16, reason: String },
    /// The transport ended without a close frame.
    Dropped(String),
}

impl CloseReason {
    pub fn from_code(code: u16, reason: &str) -> Self {
        match code {
            4000 => Self::InternalServerError,
            4001 => Self::ClientSentInboundTraffic,
            4002 => Self::ClientFailedPingPong,
            4003 => Self::ConnectionUnused,
            4004 => Self::ReconnectGraceExpired,
            4005 => Self::NetworkTimeout,
            4006 => Self::NetworkError,
            4007 => Self::InvalidReconnect,
            code => Self::Unknown {
                code,
                reason: reason.to_string(),
            },
        }
    }

    pub fn code(&self) -> Option<u16> {
        match self {
            Self::InternalServerError => Some(4000),
            Self::ClientSentInboundTraffic => Some(4001),
            Self::ClientFailedPingPong => Some(4002),
            Self::ConnectionUnused => Some(4003),
            Self::ReconnectGraceExpired => Some(4004),
            Self::NetworkTimeout => Some(4005),
            Self::NetworkError => Some(4006),
            Self::InvalidReconnect => Some(4007),
            Self::Unknown { code, .. } => Some(*code),
            Self::Dropped(_) => None,
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::InternalServerError => "Internal server error",
            Self::ClientSentInboundTraffic => "Client sent inbound traffic",
            Self::ClientFailedPingPong => "Client failed ping-pong",
            Self::ConnectionUnused => "Connection unused, no subscription after 10 seconds",
            Self::ReconnectGraceExpired => "Reconnect grace time expired",
            Self::NetworkTimeout => "Network timeout",
            Self::NetworkError => "Network error",
            Self::InvalidReconnect => "Invalid reconnect URL",
            Self::Unknown { code, reason } if reason.is_empty() => {
                return write!(f, "Unrecognized close code {code}");
            }
            Self::Unknown { code, reason } => {
                return write!(f, "Unrecognized close code {code}: {reason}");
            }
            Self::Dropped(detail) => return write!(f, "Connection dropped: {detail}"),
        };
        match self.code() {
            Some(code) => write!(f, "{text} ({code})"),
            None => f.write_str(text),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes_round_trip() {
        for code in 4000..=4007 {
            let reason = CloseReason::from_code(code, "");
            assert_eq!(reason.code(), Some(code));
            assert!(!matches!(reason, CloseReason::Unknown { .. }));
            assert!(reason.to_string().ends_with(&format!("({code})")));
        }
    }

    #[test]
    fn test_unknown_code_is_surfaced() {
        let reason = CloseReason::from_code(1006, "abnormal");
        assert_eq!(reason.to_string(), "Unrecognized close code 1006: abnormal");
        assert_eq!(
            CloseReason::from_code(4003, "").to_string(),
            "Connection unused, no subscription after 10 seconds (4003)"
        );
    }
}
