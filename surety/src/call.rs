//! Calls as data, for substrates that deliver an ordered stream of calls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::escrow::Policy;
use crate::service::FlightSurety;
use surety_core::{Address, Amount, CallContext, FlightKey, FlightStatus, Result, SuretyError};
use surety_oracle::{StatusRequest, SubmissionOutcome};
use surety_registry::Admission;

/// A mutating call on the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum Call {
    /// Owner toggles the operational switch
    SetOperational { operational: bool },
    /// Fund `airline` with the attached value
    Fund { airline: Address },
    /// Propose or vote for a candidate airline
    RegisterAirline { candidate: Address },
    /// Register a flight operated by the caller
    RegisterFlight {
        designator: String,
        scheduled: DateTime<Utc>,
        coverage_closes_at: DateTime<Utc>,
    },
    /// Register the caller as an oracle, staking the attached value
    RegisterOracle,
    /// Ask oracles for a flight's status
    RequestStatus { flight: FlightKey },
    /// Oracle report; `status_code` is the reporter's wire code
    SubmitResponse {
        index: u8,
        flight: FlightKey,
        status_code: u8,
    },
    /// Insure the caller on a flight with the attached premium
    BuyPolicy { flight: FlightKey },
    /// Pay out the caller's credited balance
    Withdraw,
}

impl Call {
    /// Decode a call from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SuretyError::Config(format!("malformed call: {}", e)))
    }
}

/// Result of an applied call.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Applied; nothing to return
    Done,
    /// Airline's total funding after the call
    Funded(Amount),
    /// Admission state of the candidate
    Admission(Admission),
    /// Key of the new flight
    FlightRegistered(FlightKey),
    /// Indexes assigned to the new oracle
    OracleRegistered(Vec<u8>),
    /// The open or finalized request for the flight
    StatusRequested(StatusRequest),
    /// Effect of the oracle's report
    Submission(SubmissionOutcome),
    /// The purchased policy
    PolicyPurchased(Policy),
    /// Amount paid out
    Withdrawn(Amount),
}

impl FlightSurety {
    /// Apply one call on behalf of `ctx`.
    pub async fn apply(&self, ctx: &CallContext, call: Call) -> Result<Outcome> {
        let outcome = match call {
            Call::SetOperational { operational } => {
                self.set_operational(ctx, operational).await?;
                Outcome::Done
            }
            Call::Fund { airline } => Outcome::Funded(self.fund(ctx, &airline).await?),
            Call::RegisterAirline { candidate } => {
                Outcome::Admission(self.register_airline(ctx, &candidate).await?)
            }
            Call::RegisterFlight {
                designator,
                scheduled,
                coverage_closes_at,
            } => Outcome::FlightRegistered(
                self.register_flight(ctx, designator, scheduled, coverage_closes_at)
                    .await?,
            ),
            Call::RegisterOracle => Outcome::OracleRegistered(self.register_oracle(ctx).await?),
            Call::RequestStatus { flight } => {
                Outcome::StatusRequested(self.request_status(ctx, &flight).await?)
            }
            Call::SubmitResponse {
                index,
                flight,
                status_code,
            } => {
                let status = FlightStatus::try_from(status_code)?;
                Outcome::Submission(self.submit_response(ctx, index, &flight, status).await?)
            }
            Call::BuyPolicy { flight } => Outcome::PolicyPurchased(self.buy_policy(ctx, &flight).await?),
            Call::Withdraw => Outcome::Withdrawn(self.withdraw(ctx).await?),
        };
        Ok(outcome)
    }
}
