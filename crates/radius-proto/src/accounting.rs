//! RADIUS accounting values (RFC 2866, RFC 2869)

use crate::attributes::AttributeType;
use crate::packet::Packet;

/// Acct-Status-Type values (RFC 2866 Section 5.1)
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AcctStatusType {
    Start = 1,
    Stop = 2,
    InterimUpdate = 3,
    /// NAS is ready
    AccountingOn = 7,
    /// NAS is shutting down
    AccountingOff = 8,
}

impl AcctStatusType {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(AcctStatusType::Start),
            2 => Some(AcctStatusType::Stop),
            3 => Some(AcctStatusType::InterimUpdate),
            7 => Some(AcctStatusType::AccountingOn),
            8 => Some(AcctStatusType::AccountingOff),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Start, Stop or Interim-Update
    pub fn is_session_status(self) -> bool {
        matches!(
            self,
            AcctStatusType::Start | AcctStatusType::Stop | AcctStatusType::InterimUpdate
        )
    }
}

/// Acct-Terminate-Cause values (RFC 2866 Section 5.10) used by the gateway
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AcctTerminateCause {
    UserRequest = 1,
    LostCarrier = 2,
    IdleTimeout = 4,
    SessionTimeout = 5,
    AdminReset = 6,
    NasRequest = 10,
}

impl AcctTerminateCause {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(AcctTerminateCause::UserRequest),
            2 => Some(AcctTerminateCause::LostCarrier),
            4 => Some(AcctTerminateCause::IdleTimeout),
            5 => Some(AcctTerminateCause::SessionTimeout),
            6 => Some(AcctTerminateCause::AdminReset),
            10 => Some(AcctTerminateCause::NasRequest),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Usage counters of an Accounting-Request, read verbatim from the packet
///
/// Absent counters read as zero.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageCounters {
    pub input_octets: u32,
    pub output_octets: u32,
    pub input_packets: u32,
    pub output_packets: u32,
    pub input_gigawords: u32,
    pub output_gigawords: u32,
}

impl UsageCounters {
    pub fn from_packet(packet: &Packet) -> Self {
        let read = |attr_type| packet.lookup_integer(attr_type).unwrap_or(0);
        UsageCounters {
            input_octets: read(AttributeType::AcctInputOctets),
            output_octets: read(AttributeType::AcctOutputOctets),
            input_packets: read(AttributeType::AcctInputPackets),
            output_packets: read(AttributeType::AcctOutputPackets),
            input_gigawords: read(AttributeType::AcctInputGigawords),
            output_gigawords: read(AttributeType::AcctOutputGigawords),
        }
    }

    /// Input octets including the Acct-Input-Gigawords wraps (RFC 2869 Section 5.1)
    pub fn total_input_octets(&self) -> u64 {
        (u64::from(self.input_gigawords) << 32) | u64::from(self.input_octets)
    }

    /// Output octets including the Acct-Output-Gigawords wraps (RFC 2869 Section 5.2)
    pub fn total_output_octets(&self) -> u64 {
        (u64::from(self.output_gigawords) << 32) | u64::from(self.output_octets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::Attribute;
    use crate::packet::Code;

    #[test]
    fn test_status_type_values() {
        assert_eq!(AcctStatusType::from_u32(3), Some(AcctStatusType::InterimUpdate));
        assert_eq!(AcctStatusType::from_u32(4), None);
        assert!(AcctStatusType::Stop.is_session_status());
        assert!(!AcctStatusType::AccountingOn.is_session_status());
        assert_eq!(AcctTerminateCause::NasRequest.as_u32(), 10);
    }

    #[test]
    fn test_usage_counters() {
        let mut packet = Packet::new(Code::AccountingRequest, 1, [0u8; 16]);
        packet.add_attribute(Attribute::integer(AttributeType::AcctInputOctets as u8, 1000).unwrap());
        packet.add_attribute(Attribute::integer(AttributeType::AcctOutputPackets as u8, 12).unwrap());
        packet.add_attribute(Attribute::integer(AttributeType::AcctInputGigawords as u8, 2).unwrap());

        let counters = UsageCounters::from_packet(&packet);
        assert_eq!(counters.input_octets, 1000);
        assert_eq!(counters.output_octets, 0);
        assert_eq!(counters.output_packets, 12);
        assert_eq!(counters.total_input_octets(), (2u64 << 32) + 1000);
        assert_eq!(counters.total_output_octets(), 0);
    }
}
