//! Core vocabulary types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::SuretyError;

/// Monetary amount in the smallest currency unit (wei).
pub type Amount = u128;

/// Number of wei in one ether.
pub const WEI_PER_ETHER: Amount = 1_000_000_000_000_000_000;

/// Convert whole ether to wei.
pub const fn ether(n: u128) -> Amount {
    n * WEI_PER_ETHER
}

/// Opaque identity of a caller (airline, passenger, oracle or owner).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Create an address from any string-like identity.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identity.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Address {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifies a flight: the operating airline, its designator and the
/// scheduled departure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlightKey {
    /// Operating airline
    pub airline: Address,
    /// Flight designator, e.g. "BD674"
    pub designator: String,
    /// Scheduled departure time
    pub scheduled: DateTime<Utc>,
}

impl FlightKey {
    /// Create a new flight key.
    pub fn new(airline: impl Into<Address>, designator: impl Into<String>, scheduled: DateTime<Utc>) -> Self {
        Self {
            airline: airline.into(),
            designator: designator.into(),
            scheduled,
        }
    }
}

impl fmt::Display for FlightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}@{}",
            self.airline,
            self.designator,
            self.scheduled.timestamp()
        )
    }
}

/// Status of a flight. Codes match the wire values used by status reporters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum FlightStatus {
    /// No verdict yet
    Unknown = 0,
    /// Departed on time
    OnTime = 10,
    /// Late through the airline's fault; triggers payouts
    LateAirline = 20,
    /// Late due to weather
    LateWeather = 30,
    /// Late due to a technical problem
    LateTechnical = 40,
    /// Late for any other reason
    LateOther = 50,
}

impl FlightStatus {
    /// All statuses, in code order.
    pub const ALL: [FlightStatus; 6] = [
        Self::Unknown,
        Self::OnTime,
        Self::LateAirline,
        Self::LateWeather,
        Self::LateTechnical,
        Self::LateOther,
    ];

    /// Numeric wire code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    /// Whether this status ends the flight's lifecycle.
    pub fn is_terminal(self) -> bool {
        self != Self::Unknown
    }

    /// Whether policies on a flight with this status pay out.
    pub fn pays_out(self) -> bool {
        self == Self::LateAirline
    }

    /// Stable lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::OnTime => "on_time",
            Self::LateAirline => "late_airline",
            Self::LateWeather => "late_weather",
            Self::LateTechnical => "late_technical",
            Self::LateOther => "late_other",
        }
    }
}

impl Default for FlightStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

impl TryFrom<u8> for FlightStatus {
    type Error = SuretyError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or(SuretyError::InvalidStatus(code))
    }
}

impl fmt::Display for FlightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who is calling and what value is attached to the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    /// Calling identity
    pub caller: Address,
    /// Value attached to the call (funding, premium or stake)
    pub value: Amount,
}

impl CallContext {
    /// A call without attached value.
    pub fn new(caller: impl Into<Address>) -> Self {
        Self {
            caller: caller.into(),
            value: 0,
        }
    }

    /// Attach a value to the call.
    pub fn with_value(mut self, value: Amount) -> Self {
        self.value = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(FlightStatus::LateAirline.code(), 20);
        assert_eq!(FlightStatus::from_code(30), Some(FlightStatus::LateWeather));
        assert_eq!(FlightStatus::from_code(21), None);
        assert!(matches!(
            FlightStatus::try_from(7),
            Err(SuretyError::InvalidStatus(7))
        ));
    }

    #[test]
    fn test_only_late_airline_pays() {
        let paying: Vec<_> = FlightStatus::ALL.into_iter().filter(|s| s.pays_out()).collect();
        assert_eq!(paying, vec![FlightStatus::LateAirline]);
        assert!(!FlightStatus::Unknown.is_terminal());
        assert!(FlightStatus::OnTime.is_terminal());
    }

    #[test]
    fn test_flight_key_display() {
        let scheduled = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let key = FlightKey::new("airline-a", "BD674", scheduled);
        assert_eq!(key.to_string(), "airline-a/BD674@1700000000");
    }

    #[test]
    fn test_call_context_value() {
        let ctx = CallContext::new("p").with_value(ether(1));
        assert_eq!(ctx.value, WEI_PER_ETHER);
        assert_eq!(ctx.caller.as_str(), "p");
    }
}
