//! Flight directory - flight records and their single-shot verdict.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::membership::MembershipRegistry;
use surety_core::{Address, FlightKey, FlightStatus, Result, SuretyError};

/// A registered flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flight {
    /// Flight identity
    pub key: FlightKey,
    /// Current status; terminal once set
    pub status: FlightStatus,
    /// Coverage is advertised until this time
    pub coverage_closes_at: DateTime<Utc>,
    /// When the flight was registered
    pub registered_at: DateTime<Utc>,
    /// When the verdict was applied
    pub finalized_at: Option<DateTime<Utc>>,
}

/// Capability to apply verdicts to one directory.
///
/// Issued at most once per directory by [`FlightDirectory::claim_verdict_authority`];
/// it cannot be built, cloned or deserialized elsewhere.
#[derive(Debug)]
pub struct VerdictAuthority {
    id: Uuid,
}

/// Owns flight records; airline authorization is looked up in the
/// membership registry.
pub struct FlightDirectory {
    membership: Arc<MembershipRegistry>,
    flights: Arc<RwLock<HashMap<FlightKey, Flight>>>,
    /// Id of the single issued verdict authority
    verdict_authority: Arc<RwLock<Option<Uuid>>>,
}

impl FlightDirectory {
    /// Create an empty directory.
    pub fn new(membership: Arc<MembershipRegistry>) -> Self {
        Self {
            membership,
            flights: Arc::new(RwLock::new(HashMap::new())),
            verdict_authority: Arc::new(RwLock::new(None)),
        }
    }

    /// Issue the directory's verdict authority. Only the first claim succeeds.
    pub async fn claim_verdict_authority(&self) -> Result<VerdictAuthority> {
        let mut issued = self.verdict_authority.write().await;
        if issued.is_some() {
            warn!("Verdict authority already claimed");
            return Err(SuretyError::Unauthorized(
                "verdict authority already claimed".to_string(),
            ));
        }
        let id = Uuid::new_v4();
        *issued = Some(id);
        info!(authority = %id, "Verdict authority issued");
        Ok(VerdictAuthority { id })
    }

    /// Register a flight operated by `airline`.
    pub async fn register_flight(
        &self,
        airline: &Address,
        designator: impl Into<String>,
        scheduled: DateTime<Utc>,
        coverage_closes_at: DateTime<Utc>,
    ) -> Result<FlightKey> {
        if !self.membership.is_participant(airline).await {
            return Err(SuretyError::Unauthorized(format!(
                "{} must be a registered and funded airline",
                airline
            )));
        }

        let key = FlightKey::new(airline.clone(), designator, scheduled);

        let mut flights = self.flights.write().await;
        if flights.contains_key(&key) {
            return Err(SuretyError::AlreadyExists(key.to_string()));
        }

        flights.insert(
            key.clone(),
            Flight {
                key: key.clone(),
                status: FlightStatus::Unknown,
                coverage_closes_at,
                registered_at: Utc::now(),
                finalized_at: None,
            },
        );

        info!(flight = %key, "Flight registered");
        Ok(key)
    }

    /// Current status of a flight.
    pub async fn status(&self, key: &FlightKey) -> Result<FlightStatus> {
        self.flights
            .read()
            .await
            .get(key)
            .map(|f| f.status)
            .ok_or_else(|| SuretyError::NotFound(format!("flight {}", key)))
    }

    /// Snapshot of a flight record.
    pub async fn flight(&self, key: &FlightKey) -> Option<Flight> {
        self.flights.read().await.get(key).cloned()
    }

    /// Flights operated by `airline`, earliest departure first.
    pub async fn flights_for(&self, airline: &Address) -> Vec<Flight> {
        let flights = self.flights.read().await;
        let mut found: Vec<Flight> = flights
            .values()
            .filter(|f| &f.key.airline == airline)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.key.scheduled.cmp(&b.key.scheduled));
        found
    }

    /// Apply the finalized verdict for a flight. Succeeds at most once per key.
    pub async fn apply_verdict(
        &self,
        authority: &VerdictAuthority,
        key: &FlightKey,
        status: FlightStatus,
    ) -> Result<FlightStatus> {
        if *self.verdict_authority.read().await != Some(authority.id) {
            return Err(SuretyError::Unauthorized(format!(
                "authority {} may not apply verdicts here",
                authority.id
            )));
        }
        if !status.is_terminal() {
            return Err(SuretyError::InvalidStatus(status.code()));
        }

        let mut flights = self.flights.write().await;
        let flight = flights
            .get_mut(key)
            .ok_or_else(|| SuretyError::NotFound(format!("flight {}", key)))?;

        if flight.status.is_terminal() {
            debug!(flight = %key, status = %flight.status, "Verdict already applied");
            return Err(SuretyError::AlreadyFinalized(key.to_string()));
        }

        flight.status = status;
        flight.finalized_at = Some(Utc::now());

        info!(flight = %key, status = %status, "Flight verdict applied");
        Ok(status)
    }
}
