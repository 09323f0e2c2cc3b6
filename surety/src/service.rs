//! FlightSurety - the call surface of the insurance core.
//!
//! Wires the membership registry, flight directory, oracle aggregator and
//! escrow ledger together, gates mutations behind the owner's operational
//! switch, and publishes notifications for every state change.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::escrow::{EscrowLedger, InMemoryTransfer, PayoutTransfer, Policy};
use surety_core::{
    Address, Amount, CallContext, EventBus, FlightKey, FlightStatus, Result, SuretyConfig,
    SuretyError, SuretyEvent,
};
use surety_oracle::{OracleAggregator, StatusRequest, SubmissionOutcome};
use surety_registry::{Admission, Flight, FlightDirectory, MembershipRegistry};

/// The flight delay insurance core.
///
/// Every operation takes the caller's [`CallContext`] explicitly; value
/// attached to the call is read from it (funding, stake, premium).
pub struct FlightSurety {
    /// Configuration
    config: SuretyConfig,
    /// Owner-controlled mutation switch
    operational: Arc<RwLock<bool>>,
    /// Notification bus
    events: EventBus,
    /// Airline membership
    membership: Arc<MembershipRegistry>,
    /// Flight records
    directory: Arc<FlightDirectory>,
    /// Oracle consensus
    oracles: Arc<OracleAggregator>,
    /// Policies and balances
    escrow: Arc<EscrowLedger>,
}

impl FlightSurety {
    /// Create a core with the given configuration and payout rail.
    pub async fn new(config: SuretyConfig, transfer: Arc<dyn PayoutTransfer>) -> Result<Self> {
        config.validate()?;

        let events = EventBus::new(config.general.event_history);
        let membership = Arc::new(MembershipRegistry::new(
            config.membership.clone(),
            config.general.founding_airline.clone(),
        ));
        let directory = Arc::new(FlightDirectory::new(membership.clone()));
        let oracles = Arc::new(
            OracleAggregator::new(config.oracle.clone(), directory.clone(), events.clone()).await?,
        );
        let escrow = Arc::new(EscrowLedger::new(
            config.escrow.clone(),
            directory.clone(),
            transfer,
            events.clone(),
        ));

        info!(
            owner = %config.general.owner,
            founding_airline = %config.general.founding_airline,
            "FlightSurety initialized"
        );

        Ok(Self {
            operational: Arc::new(RwLock::new(config.general.start_operational)),
            config,
            events,
            membership,
            directory,
            oracles,
            escrow,
        })
    }

    async fn require_operational(&self) -> Result<()> {
        if *self.operational.read().await {
            Ok(())
        } else {
            Err(SuretyError::NotOperational)
        }
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Whether mutating calls are accepted.
    pub async fn is_operational(&self) -> bool {
        *self.operational.read().await
    }

    /// Flip the operational switch. Owner only.
    pub async fn set_operational(&self, ctx: &CallContext, operational: bool) -> Result<()> {
        if ctx.caller != self.config.general.owner {
            return Err(SuretyError::Unauthorized(format!(
                "{} is not the contract owner",
                ctx.caller
            )));
        }

        {
            let mut current = self.operational.write().await;
            if *current == operational {
                return Ok(());
            }
            *current = operational;
        }

        info!(operational = operational, "Operational status changed");
        self.events
            .publish(SuretyEvent::OperationalChanged { operational })
            .await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    /// Fund `airline` with the value attached to the call.
    pub async fn fund(&self, ctx: &CallContext, airline: &Address) -> Result<Amount> {
        self.require_operational().await?;
        let total = self.membership.fund(airline, ctx.value).await?;
        self.events
            .publish(SuretyEvent::AirlineFunded {
                airline: airline.clone(),
                total,
            })
            .await;
        Ok(total)
    }

    /// Propose `candidate` as the calling airline.
    pub async fn register_airline(&self, ctx: &CallContext, candidate: &Address) -> Result<Admission> {
        self.require_operational().await?;
        let admission = self.membership.register_airline(&ctx.caller, candidate).await?;
        self.events
            .publish(SuretyEvent::AirlineAdmission {
                airline: admission.airline.clone(),
                admitted: admission.admitted,
                votes: admission.votes,
                required: admission.required,
            })
            .await;
        Ok(admission)
    }

    /// Whether `airline` is registered.
    pub async fn is_registered(&self, airline: &Address) -> bool {
        self.membership.is_registered(airline).await
    }

    /// Whether `airline` has funded.
    pub async fn is_funded(&self, airline: &Address) -> bool {
        self.membership.is_funded(airline).await
    }

    /// Number of registered airlines.
    pub async fn registered_airlines(&self) -> usize {
        self.membership.registered_count().await
    }

    // ------------------------------------------------------------------
    // Flights
    // ------------------------------------------------------------------

    /// Register a flight operated by the calling airline.
    pub async fn register_flight(
        &self,
        ctx: &CallContext,
        designator: impl Into<String>,
        scheduled: DateTime<Utc>,
        coverage_closes_at: DateTime<Utc>,
    ) -> Result<FlightKey> {
        self.require_operational().await?;
        let flight = self
            .directory
            .register_flight(&ctx.caller, designator, scheduled, coverage_closes_at)
            .await?;
        self.events
            .publish(SuretyEvent::FlightRegistered {
                flight: flight.clone(),
            })
            .await;
        Ok(flight)
    }

    /// Current status of a flight.
    pub async fn status(&self, flight: &FlightKey) -> Result<FlightStatus> {
        self.directory.status(flight).await
    }

    /// Snapshot of a flight.
    pub async fn flight(&self, flight: &FlightKey) -> Option<Flight> {
        self.directory.flight(flight).await
    }

    /// Flights operated by an airline.
    pub async fn flights_for(&self, airline: &Address) -> Vec<Flight> {
        self.directory.flights_for(airline).await
    }

    // ------------------------------------------------------------------
    // Oracles
    // ------------------------------------------------------------------

    /// Register the caller as an oracle, staking the attached value.
    pub async fn register_oracle(&self, ctx: &CallContext) -> Result<Vec<u8>> {
        self.require_operational().await?;
        self.oracles.register_oracle(&ctx.caller, ctx.value).await
    }

    /// Indexes assigned to the calling oracle.
    pub async fn oracle_indexes(&self, ctx: &CallContext) -> Result<Vec<u8>> {
        self.oracles.indexes(&ctx.caller).await
    }

    /// Ask oracles to report on a flight.
    pub async fn request_status(&self, ctx: &CallContext, flight: &FlightKey) -> Result<StatusRequest> {
        self.require_operational().await?;
        self.oracles.request_status(&ctx.caller, flight).await
    }

    /// Submit the calling oracle's report. A report that completes the
    /// quorum settles the flight's policies.
    pub async fn submit_response(
        &self,
        ctx: &CallContext,
        index: u8,
        flight: &FlightKey,
        status: FlightStatus,
    ) -> Result<SubmissionOutcome> {
        self.require_operational().await?;
        let outcome = self
            .oracles
            .submit_response(&ctx.caller, index, flight, status)
            .await?;

        if let SubmissionOutcome::Finalized { status } = outcome {
            let settlement = self.escrow.on_verdict(flight, status).await;
            debug!(
                flight = %flight,
                settled = settlement.settled,
                credited = %settlement.credited,
                "Verdict forwarded to escrow"
            );
        }

        Ok(outcome)
    }

    /// Drop open requests older than the configured TTL.
    pub async fn expire_stale_requests(&self, now: DateTime<Utc>) -> Result<Vec<FlightKey>> {
        self.require_operational().await?;
        Ok(self.oracles.expire_stale(now))
    }

    /// The status request for a flight, if any.
    pub fn status_request(&self, flight: &FlightKey) -> Option<StatusRequest> {
        self.oracles.request(flight)
    }

    // ------------------------------------------------------------------
    // Insurance
    // ------------------------------------------------------------------

    /// Buy coverage on a flight with the attached value as premium.
    pub async fn buy_policy(&self, ctx: &CallContext, flight: &FlightKey) -> Result<Policy> {
        self.require_operational().await?;
        self.escrow.buy_policy(&ctx.caller, flight, ctx.value).await
    }

    /// Withdraw the caller's credited balance.
    pub async fn withdraw(&self, ctx: &CallContext) -> Result<Amount> {
        self.require_operational().await?;
        self.escrow.withdraw(&ctx.caller).await
    }

    /// Withdrawable balance of a passenger.
    pub fn balance(&self, passenger: &Address) -> Amount {
        self.escrow.balance(passenger)
    }

    /// Policies held by a passenger.
    pub fn policies_for(&self, passenger: &Address) -> Vec<Policy> {
        self.escrow.policies_for(passenger)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Notification bus.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Escrow ledger.
    pub fn escrow(&self) -> &EscrowLedger {
        &self.escrow
    }

    /// Active configuration.
    pub fn config(&self) -> &SuretyConfig {
        &self.config
    }
}

/// Builder for FlightSurety.
pub struct FlightSuretyBuilder {
    config: SuretyConfig,
    transfer: Option<Arc<dyn PayoutTransfer>>,
}

impl FlightSuretyBuilder {
    /// Create a builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: SuretyConfig::default(),
            transfer: None,
        }
    }

    /// Start from an existing configuration.
    pub fn with_config(mut self, config: SuretyConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the owner identity.
    pub fn owner(mut self, owner: impl Into<Address>) -> Self {
        self.config.general.owner = owner.into();
        self
    }

    /// Set the founding airline.
    pub fn founding_airline(mut self, airline: impl Into<Address>) -> Self {
        self.config.general.founding_airline = airline.into();
        self
    }

    /// Set the oracle index seed.
    pub fn oracle_seed(mut self, seed: impl Into<String>) -> Self {
        self.config.oracle.seed = seed.into();
        self
    }

    /// Set the payout rail.
    pub fn transfer(mut self, transfer: Arc<dyn PayoutTransfer>) -> Self {
        self.transfer = Some(transfer);
        self
    }

    /// Build the core. Without an explicit rail, payouts go to an
    /// [`InMemoryTransfer`].
    pub async fn build(self) -> Result<FlightSurety> {
        let transfer: Arc<dyn PayoutTransfer> = match self.transfer {
            Some(transfer) => transfer,
            None => Arc::new(InMemoryTransfer::new()),
        };
        FlightSurety::new(self.config, transfer).await
    }
}

impl Default for FlightSuretyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
