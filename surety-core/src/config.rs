//! Configuration for the Flight Surety core.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SuretyError};
use crate::types::{ether, Address, Amount};

/// Configuration for a Flight Surety deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuretyConfig {
    /// Membership registry configuration
    #[serde(default)]
    pub membership: MembershipConfig,
    /// Oracle aggregator configuration
    #[serde(default)]
    pub oracle: OracleConfig,
    /// Escrow ledger configuration
    #[serde(default)]
    pub escrow: EscrowConfig,
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,
}

impl SuretyConfig {
    /// Load config from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| SuretyError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| SuretyError::Config(e.to_string()))
    }

    /// Reject configurations the core cannot operate under.
    pub fn validate(&self) -> Result<()> {
        let approval = &self.membership.approval;
        if approval.denominator == 0 || approval.numerator > approval.denominator {
            return Err(SuretyError::Config(format!(
                "approval ratio {}/{} must be within (0, 1]",
                approval.numerator, approval.denominator
            )));
        }
        if self.oracle.indexes_per_oracle == 0
            || self.oracle.indexes_per_oracle > usize::from(self.oracle.index_space)
        {
            return Err(SuretyError::Config(format!(
                "cannot draw {} distinct indexes from a space of {}",
                self.oracle.indexes_per_oracle, self.oracle.index_space
            )));
        }
        if let Some(ttl) = self.oracle.request_ttl_secs {
            if i64::try_from(ttl)
                .ok()
                .and_then(chrono::TimeDelta::try_seconds)
                .is_none()
            {
                return Err(SuretyError::Config(format!(
                    "request_ttl_secs {} is out of range",
                    ttl
                )));
            }
        }
        if self.oracle.min_responses == 0 {
            return Err(SuretyError::Config("min_responses must be at least 1".to_string()));
        }
        if self.escrow.payout_denominator == 0 {
            return Err(SuretyError::Config("payout denominator must be non-zero".to_string()));
        }
        if self.escrow.max_premium == 0 {
            return Err(SuretyError::Config("max_premium must be non-zero".to_string()));
        }
        Ok(())
    }
}

/// Rounding applied when a vote ratio does not divide evenly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rounding {
    /// Round the required vote count up
    Up,
    /// Round the required vote count down
    Down,
}

/// Share of registered airlines whose votes admit a new airline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionPolicy {
    /// Ratio numerator
    pub numerator: u32,
    /// Ratio denominator
    pub denominator: u32,
    /// Rounding of the required count
    pub rounding: Rounding,
}

impl AdmissionPolicy {
    /// Votes required to admit a candidate given the registered count.
    /// Never less than one.
    pub fn required_votes(&self, registered: usize) -> usize {
        let num = registered as u64 * u64::from(self.numerator);
        let den = u64::from(self.denominator.max(1));
        let required = match self.rounding {
            Rounding::Up => num.div_ceil(den),
            Rounding::Down => num / den,
        };
        (required as usize).max(1)
    }
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            numerator: 1,
            denominator: 2,
            rounding: Rounding::Up,
        }
    }
}

/// Membership registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipConfig {
    /// Minimum participation funding
    pub min_funding: Amount,
    /// Registered count below which a single airline admits a candidate
    pub bootstrap_threshold: usize,
    /// Multi-party admission rule
    pub approval: AdmissionPolicy,
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            min_funding: ether(10),
            bootstrap_threshold: 4,
            approval: AdmissionPolicy::default(),
        }
    }
}

/// Oracle aggregator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Indexes are drawn from `[0, index_space)`
    pub index_space: u8,
    /// Distinct indexes assigned to each oracle
    pub indexes_per_oracle: usize,
    /// Matching responses that finalize a verdict
    pub min_responses: usize,
    /// Stake required to register
    pub registration_stake: Amount,
    /// Seed mixed into index derivation
    pub seed: String,
    /// Open requests older than this may be expired (seconds); none keeps them open
    pub request_ttl_secs: Option<u64>,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            index_space: 10,
            indexes_per_oracle: 3,
            min_responses: 3,
            registration_stake: ether(1),
            seed: "flight-surety".to_string(),
            request_ttl_secs: None,
        }
    }
}

/// Escrow ledger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowConfig {
    /// Largest premium accepted for one policy
    pub max_premium: Amount,
    /// Payout multiplier numerator
    pub payout_numerator: Amount,
    /// Payout multiplier denominator
    pub payout_denominator: Amount,
}

impl EscrowConfig {
    /// Amount credited for a paying policy.
    pub fn payout_for(&self, premium: Amount) -> Amount {
        premium.saturating_mul(self.payout_numerator) / self.payout_denominator.max(1)
    }
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            max_premium: ether(1),
            payout_numerator: 3,
            payout_denominator: 2,
        }
    }
}

/// General configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Identity allowed to flip the operational switch
    pub owner: Address,
    /// Airline seeded as registered at startup
    pub founding_airline: Address,
    /// Events retained in history
    pub event_history: usize,
    /// Whether mutations start enabled
    pub start_operational: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            owner: Address::new("owner"),
            founding_airline: Address::new("founding-airline"),
            event_history: 1000,
            start_operational: true,
        }
    }
}
