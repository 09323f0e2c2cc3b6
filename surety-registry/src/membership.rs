//! Membership registry - airline admission and funding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use surety_core::{Address, Amount, MembershipConfig, Result, SuretyError};

/// An airline known to the registry, admitted or pending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Airline {
    /// Airline identity
    pub address: Address,
    /// Admitted to the registry
    pub is_registered: bool,
    /// Paid at least the participation minimum
    pub is_funded: bool,
    /// Total funding paid in
    pub funded_amount: Amount,
    /// Voters supporting the current candidacy
    pub votes_received: HashSet<Address>,
    /// When the airline was admitted
    pub admitted_at: Option<DateTime<Utc>>,
}

impl Airline {
    fn candidate(address: Address) -> Self {
        Self {
            address,
            is_registered: false,
            is_funded: false,
            funded_amount: 0,
            votes_received: HashSet::new(),
            admitted_at: None,
        }
    }

    fn admit(&mut self) {
        self.is_registered = true;
        self.votes_received.clear();
        self.admitted_at = Some(Utc::now());
    }

    /// Registered and funded: allowed to vote and register flights.
    pub fn is_participant(&self) -> bool {
        self.is_registered && self.is_funded
    }
}

/// Outcome of a `register_airline` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    /// Candidate airline
    pub airline: Address,
    /// Whether the candidate is now registered
    pub admitted: bool,
    /// Votes counted for this candidacy
    pub votes: usize,
    /// Votes the candidacy needs
    pub required: usize,
}

/// Owns airline records and runs the admission protocol.
pub struct MembershipRegistry {
    /// Configuration
    config: MembershipConfig,
    /// Airlines by identity, pending candidates included
    airlines: Arc<RwLock<HashMap<Address, Airline>>>,
}

impl MembershipRegistry {
    /// Create a registry seeded with a single founding airline.
    ///
    /// The founding airline is registered but must still fund before it can
    /// sponsor candidates or register flights.
    pub fn new(config: MembershipConfig, founding_airline: Address) -> Self {
        let mut founder = Airline::candidate(founding_airline.clone());
        founder.admit();

        let mut airlines = HashMap::new();
        airlines.insert(founding_airline, founder);

        Self {
            config,
            airlines: Arc::new(RwLock::new(airlines)),
        }
    }

    /// Pay participation funding for a registered airline.
    ///
    /// Returns the airline's total funded amount.
    pub async fn fund(&self, airline: &Address, amount: Amount) -> Result<Amount> {
        if amount < self.config.min_funding {
            return Err(SuretyError::InsufficientFunds {
                required: self.config.min_funding,
                provided: amount,
            });
        }

        let mut airlines = self.airlines.write().await;
        let record = airlines
            .get_mut(airline)
            .filter(|a| a.is_registered)
            .ok_or_else(|| {
                SuretyError::Unauthorized(format!("{} is not a registered airline", airline))
            })?;

        record.funded_amount = record.funded_amount.saturating_add(amount);
        record.is_funded = true;

        info!(
            airline = %airline,
            amount = %amount,
            total = %record.funded_amount,
            "Airline funded"
        );

        Ok(record.funded_amount)
    }

    /// Propose `candidate` for admission on behalf of `proposer`.
    pub async fn register_airline(
        &self,
        proposer: &Address,
        candidate: &Address,
    ) -> Result<Admission> {
        let mut airlines = self.airlines.write().await;

        if !airlines.get(proposer).is_some_and(Airline::is_participant) {
            return Err(SuretyError::Unauthorized(format!(
                "{} must be a registered and funded airline",
                proposer
            )));
        }

        if airlines.get(candidate).is_some_and(|a| a.is_registered) {
            return Err(SuretyError::AlreadyRegistered(candidate.to_string()));
        }

        let registered = airlines.values().filter(|a| a.is_registered).count();
        let record = airlines
            .entry(candidate.clone())
            .or_insert_with(|| Airline::candidate(candidate.clone()));

        // Bootstrap: a single sponsor suffices
        if registered < self.config.bootstrap_threshold {
            record.admit();
            info!(
                airline = %candidate,
                sponsor = %proposer,
                registered = registered + 1,
                "Airline admitted by sponsor"
            );
            return Ok(Admission {
                airline: candidate.clone(),
                admitted: true,
                votes: 1,
                required: 1,
            });
        }

        let required = self.config.approval.required_votes(registered);
        if !record.votes_received.insert(proposer.clone()) {
            debug!(airline = %candidate, voter = %proposer, "Duplicate admission vote ignored");
        }
        let votes = record.votes_received.len();

        let admitted = votes >= required;
        if admitted {
            record.admit();
            info!(
                airline = %candidate,
                votes = votes,
                required = required,
                "Airline admitted by consensus"
            );
        } else {
            debug!(
                airline = %candidate,
                votes = votes,
                required = required,
                "Admission vote recorded"
            );
        }

        Ok(Admission {
            airline: candidate.clone(),
            admitted,
            votes,
            required,
        })
    }

    /// Whether the airline is registered.
    pub async fn is_registered(&self, airline: &Address) -> bool {
        self.airlines
            .read()
            .await
            .get(airline)
            .is_some_and(|a| a.is_registered)
    }

    /// Whether the airline has funded.
    pub async fn is_funded(&self, airline: &Address) -> bool {
        self.airlines
            .read()
            .await
            .get(airline)
            .is_some_and(|a| a.is_funded)
    }

    /// Whether the airline is registered and funded.
    pub async fn is_participant(&self, airline: &Address) -> bool {
        self.airlines
            .read()
            .await
            .get(airline)
            .is_some_and(Airline::is_participant)
    }

    /// Snapshot of one airline record.
    pub async fn airline(&self, airline: &Address) -> Option<Airline> {
        self.airlines.read().await.get(airline).cloned()
    }

    /// Number of registered airlines.
    pub async fn registered_count(&self) -> usize {
        self.airlines
            .read()
            .await
            .values()
            .filter(|a| a.is_registered)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surety_core::ether;
    use tokio_test::{assert_err, assert_ok};

    fn addr(s: &str) -> Address {
        Address::new(s)
    }

    async fn funded_registry() -> MembershipRegistry {
        let registry = MembershipRegistry::new(MembershipConfig::default(), addr("a0"));
        registry.fund(&addr("a0"), ether(10)).await.unwrap();
        registry
    }

    /// Registers a1..=a3 via the founder and funds them.
    async fn four_funded(registry: &MembershipRegistry) {
        for name in ["a1", "a2", "a3"] {
            let admission = registry.register_airline(&addr("a0"), &addr(name)).await.unwrap();
            assert!(admission.admitted);
            registry.fund(&addr(name), ether(10)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_founder_is_registered_not_funded() {
        let registry = MembershipRegistry::new(MembershipConfig::default(), addr("a0"));
        assert!(registry.is_registered(&addr("a0")).await);
        assert!(!registry.is_funded(&addr("a0")).await);
        assert_eq!(registry.registered_count().await, 1);
    }

    #[tokio::test]
    async fn test_underfunding_never_sets_funded() {
        let registry = MembershipRegistry::new(MembershipConfig::default(), addr("a0"));
        let err = registry.fund(&addr("a0"), ether(9)).await.unwrap_err();
        assert!(matches!(err, SuretyError::InsufficientFunds { .. }));
        assert!(!registry.is_funded(&addr("a0")).await);
    }

    #[tokio::test]
    async fn test_funding_accumulates() {
        let registry = funded_registry().await;
        let total = registry.fund(&addr("a0"), ether(10)).await.unwrap();
        assert_eq!(total, ether(20));
    }

    #[tokio::test]
    async fn test_unregistered_cannot_fund() {
        let registry = funded_registry().await;
        let err = registry.fund(&addr("stranger"), ether(10)).await.unwrap_err();
        assert!(matches!(err, SuretyError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_unfunded_proposer_unauthorized() {
        let registry = MembershipRegistry::new(MembershipConfig::default(), addr("a0"));
        let err = registry
            .register_airline(&addr("a0"), &addr("a1"))
            .await
            .unwrap_err();
        assert!(matches!(err, SuretyError::Unauthorized(_)));
        assert!(!registry.is_registered(&addr("a1")).await);
    }

    #[tokio::test]
    async fn test_bootstrap_admits_on_single_sponsor() {
        let registry = funded_registry().await;
        four_funded(&registry).await;
        assert_eq!(registry.registered_count().await, 4);
    }

    #[tokio::test]
    async fn test_already_registered() {
        let registry = funded_registry().await;
        assert_ok!(registry.register_airline(&addr("a0"), &addr("a1")).await);
        let err = registry
            .register_airline(&addr("a0"), &addr("a1"))
            .await
            .unwrap_err();
        assert_eq!(err, SuretyError::AlreadyRegistered("a1".to_string()));
    }

    #[tokio::test]
    async fn test_fifth_airline_needs_two_votes() {
        let registry = funded_registry().await;
        four_funded(&registry).await;

        let first = registry.register_airline(&addr("a0"), &addr("a4")).await.unwrap();
        assert!(!first.admitted);
        assert_eq!((first.votes, first.required), (1, 2));
        assert!(!registry.is_registered(&addr("a4")).await);

        let second = registry.register_airline(&addr("a1"), &addr("a4")).await.unwrap();
        assert!(second.admitted);
        assert!(registry.is_registered(&addr("a4")).await);

        let record = registry.airline(&addr("a4")).await.unwrap();
        assert!(record.votes_received.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_vote_is_noop() {
        let registry = funded_registry().await;
        four_funded(&registry).await;

        assert_ok!(registry.register_airline(&addr("a0"), &addr("a4")).await);
        let again = registry.register_airline(&addr("a0"), &addr("a4")).await.unwrap();
        assert!(!again.admitted);
        assert_eq!(again.votes, 1);
    }

    #[tokio::test]
    async fn test_unfunded_member_cannot_vote() {
        let registry = funded_registry().await;
        four_funded(&registry).await;

        // a4 admitted but never funded
        registry.register_airline(&addr("a0"), &addr("a4")).await.unwrap();
        registry.register_airline(&addr("a1"), &addr("a4")).await.unwrap();

        assert_err!(registry.register_airline(&addr("a4"), &addr("a5")).await);
    }

    #[tokio::test]
    async fn test_sixth_airline_needs_three_votes() {
        let registry = funded_registry().await;
        four_funded(&registry).await;
        registry.register_airline(&addr("a0"), &addr("a4")).await.unwrap();
        registry.register_airline(&addr("a1"), &addr("a4")).await.unwrap();
        assert_eq!(registry.registered_count().await, 5);

        // ceil(5 / 2) = 3
        for (voter, expect) in [("a0", false), ("a1", false), ("a2", true)] {
            let admission = registry.register_airline(&addr(voter), &addr("a5")).await.unwrap();
            assert_eq!(admission.required, 3);
            assert_eq!(admission.admitted, expect);
        }
    }
}
