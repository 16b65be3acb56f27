/// RADIUS attribute types used by the gateway (RFC 2865, 2866, 2869, 3579, 5176)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AttributeType {
    /// User-Name (1) - RFC 2865
    UserName = 1,
    /// User-Password (2) - RFC 2865
    UserPassword = 2,
    /// NAS-IP-Address (4) - RFC 2865
    NasIpAddress = 4,
    /// NAS-Port (5) - RFC 2865
    NasPort = 5,
    /// Service-Type (6) - RFC 2865
    ServiceType = 6,
    /// Framed-IP-Address (8) - RFC 2865
    FramedIpAddress = 8,
    /// Reply-Message (18) - RFC 2865
    ReplyMessage = 18,
    /// State (24) - RFC 2865
    State = 24,
    /// Class (25) - RFC 2865
    Class = 25,
    /// Vendor-Specific (26) - RFC 2865
    VendorSpecific = 26,
    /// Session-Timeout (27) - RFC 2865
    SessionTimeout = 27,
    /// Idle-Timeout (28) - RFC 2865
    IdleTimeout = 28,
    /// Called-Station-Id (30) - RFC 2865, carries the AP MAC and SSID/APN
    CalledStationId = 30,
    /// Calling-Station-Id (31) - RFC 2865, carries the device MAC
    CallingStationId = 31,
    /// NAS-Identifier (32) - RFC 2865
    NasIdentifier = 32,
    /// Proxy-State (33) - RFC 2865
    ProxyState = 33,
    /// Acct-Status-Type (40) - RFC 2866
    AcctStatusType = 40,
    /// Acct-Delay-Time (41) - RFC 2866
    AcctDelayTime = 41,
    /// Acct-Input-Octets (42) - RFC 2866
    AcctInputOctets = 42,
    /// Acct-Output-Octets (43) - RFC 2866
    AcctOutputOctets = 43,
    /// Acct-Session-Id (44) - RFC 2866
    AcctSessionId = 44,
    /// Acct-Authentic (45) - RFC 2866
    AcctAuthentic = 45,
    /// Acct-Session-Time (46) - RFC 2866
    AcctSessionTime = 46,
    /// Acct-Input-Packets (47) - RFC 2866
    AcctInputPackets = 47,
    /// Acct-Output-Packets (48) - RFC 2866
    AcctOutputPackets = 48,
    /// Acct-Terminate-Cause (49) - RFC 2866
    AcctTerminateCause = 49,
    /// Acct-Multi-Session-Id (50) - RFC 2866
    AcctMultiSessionId = 50,
    /// Acct-Input-Gigawords (52) - RFC 2869
    AcctInputGigawords = 52,
    /// Acct-Output-Gigawords (53) - RFC 2869
    AcctOutputGigawords = 53,
    /// Event-Timestamp (55) - RFC 2869
    EventTimestamp = 55,
    /// NAS-Port-Type (61) - RFC 2865
    NasPortType = 61,
    /// EAP-Message (79) - RFC 3579
    EapMessage = 79,
    /// Message-Authenticator (80) - RFC 3579
    MessageAuthenticator = 80,
    /// Acct-Interim-Interval (85) - RFC 2869
    AcctInterimInterval = 85,
    /// NAS-Port-Id (87) - RFC 2869
    NasPortId = 87,
    /// Error-Cause (101) - RFC 5176
    ErrorCause = 101,
}

impl AttributeType {
    pub fn from_u8(value: u8) -> Option<Self> {
        use AttributeType::*;
        let attr_type = match value {
            1 => UserName,
            2 => UserPassword,
            4 => NasIpAddress,
            5 => NasPort,
            6 => ServiceType,
            8 => FramedIpAddress,
            18 => ReplyMessage,
            24 => State,
            25 => Class,
            26 => VendorSpecific,
            27 => SessionTimeout,
            28 => IdleTimeout,
            30 => CalledStationId,
            31 => CallingStationId,
            32 => NasIdentifier,
            33 => ProxyState,
            40 => AcctStatusType,
            41 => AcctDelayTime,
            42 => AcctInputOctets,
            43 => AcctOutputOctets,
            44 => AcctSessionId,
            45 => AcctAuthentic,
            46 => AcctSessionTime,
            47 => AcctInputPackets,
            48 => AcctOutputPackets,
            49 => AcctTerminateCause,
            50 => AcctMultiSessionId,
            52 => AcctInputGigawords,
            53 => AcctOutputGigawords,
            55 => EventTimestamp,
            61 => NasPortType,
            79 => EapMessage,
            80 => MessageAuthenticator,
            85 => AcctInterimInterval,
            87 => NasPortId,
            101 => ErrorCause,
            _ => return None,
        };
        Some(attr_type)
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}
