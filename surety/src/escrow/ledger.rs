//! Escrow ledger - converts verdicts into exactly-once payouts.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::transfer::PayoutTransfer;
use surety_core::{
    Address, Amount, EscrowConfig, EventBus, FlightKey, FlightStatus, Result, SuretyError,
    SuretyEvent,
};
use surety_registry::FlightDirectory;

/// A passenger's coverage on one flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Insured passenger
    pub passenger: Address,
    /// Covered flight
    pub flight: FlightKey,
    /// Premium paid
    pub premium: Amount,
    /// Resolved by the flight's verdict
    pub settled: bool,
    /// Amount credited at settlement
    pub payout: Amount,
    /// When the policy was bought
    pub purchased_at: DateTime<Utc>,
}

/// Result of settling a flight's policies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    /// Settled flight
    pub flight: FlightKey,
    /// Verdict applied
    pub status: FlightStatus,
    /// Policies settled by this pass
    pub settled: usize,
    /// Total credited by this pass
    pub credited: Amount,
}

/// Escrow liabilities against collected premiums.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Solvency {
    /// Sum of all premiums paid in
    pub premiums_collected: Amount,
    /// Credited but not yet withdrawn
    pub outstanding: Amount,
    /// Largest liability the premiums can back
    pub max_liability: Amount,
}

impl Solvency {
    /// Outstanding balances stay within the payout bound.
    pub fn is_solvent(&self) -> bool {
        self.outstanding <= self.max_liability
    }
}

/// Policies of one flight plus the verdict once settled.
#[derive(Debug, Default)]
struct FlightBook {
    verdict: Option<FlightStatus>,
    policies: Vec<Policy>,
}

/// Owns policies and withdrawable balances.
pub struct EscrowLedger {
    config: EscrowConfig,
    directory: Arc<FlightDirectory>,
    transfer: Arc<dyn PayoutTransfer>,
    events: EventBus,
    /// Entry lock serializes purchases and settlement of one flight
    books: DashMap<FlightKey, FlightBook>,
    /// Entry lock serializes credit and withdrawal of one passenger
    balances: DashMap<Address, Amount>,
}

impl EscrowLedger {
    /// Create an empty ledger.
    pub fn new(
        config: EscrowConfig,
        directory: Arc<FlightDirectory>,
        transfer: Arc<dyn PayoutTransfer>,
        events: EventBus,
    ) -> Self {
        Self {
            config,
            directory,
            transfer,
            events,
            books: DashMap::new(),
            balances: DashMap::new(),
        }
    }

    /// Buy coverage on a flight whose verdict is still unknown.
    pub async fn buy_policy(
        &self,
        passenger: &Address,
        flight: &FlightKey,
        premium: Amount,
    ) -> Result<Policy> {
        if self.directory.status(flight).await?.is_terminal() {
            return Err(SuretyError::FlightAlreadyFinalized(flight.to_string()));
        }
        if premium == 0 || premium > self.config.max_premium {
            return Err(SuretyError::InvalidPremium {
                max: self.config.max_premium,
                provided: premium,
            });
        }

        let policy = {
            let mut book = self.books.entry(flight.clone()).or_default();
            // Settlement may have run since the directory read
            if book.verdict.is_some() {
                return Err(SuretyError::FlightAlreadyFinalized(flight.to_string()));
            }
            if book.policies.iter().any(|p| &p.passenger == passenger) {
                return Err(SuretyError::AlreadyExists(format!(
                    "policy for {} on {}",
                    passenger, flight
                )));
            }

            let policy = Policy {
                passenger: passenger.clone(),
                flight: flight.clone(),
                premium,
                settled: false,
                payout: 0,
                purchased_at: Utc::now(),
            };
            book.policies.push(policy.clone());
            policy
        };

        info!(passenger = %passenger, flight = %flight, premium = %premium, "Policy purchased");

        self.events
            .publish(SuretyEvent::PolicyPurchased {
                passenger: passenger.clone(),
                flight: flight.clone(),
                premium,
            })
            .await;

        Ok(policy)
    }

    /// Settle every unsettled policy on a finalized flight.
    ///
    /// Paying verdicts credit `premium × multiplier`; other verdicts settle
    /// without credit. Running it again settles nothing new.
    pub async fn on_verdict(&self, flight: &FlightKey, status: FlightStatus) -> Settlement {
        let mut credits = Vec::new();
        let mut settled = 0;

        {
            let mut book = self.books.entry(flight.clone()).or_default();
            book.verdict.get_or_insert(status);

            for policy in book.policies.iter_mut().filter(|p| !p.settled) {
                policy.settled = true;
                settled += 1;

                if status.pays_out() {
                    let payout = self.config.payout_for(policy.premium);
                    policy.payout = payout;
                    *self.balances.entry(policy.passenger.clone()).or_insert(0) += payout;
                    credits.push((policy.passenger.clone(), payout));
                }
            }
        }

        let credited: Amount = credits.iter().map(|(_, amount)| amount).sum();

        info!(
            flight = %flight,
            status = %status,
            settled = settled,
            credited = %credited,
            "Policies settled"
        );

        for (passenger, amount) in credits {
            self.events
                .publish(SuretyEvent::PayoutCredited {
                    passenger,
                    flight: flight.clone(),
                    amount,
                })
                .await;
        }

        Settlement {
            flight: flight.clone(),
            status,
            settled,
            credited,
        }
    }

    /// Withdraw a passenger's whole balance. Returns the amount transferred.
    ///
    /// The balance is zeroed before the transfer and restored if it fails.
    pub async fn withdraw(&self, passenger: &Address) -> Result<Amount> {
        let amount = match self.balances.get_mut(passenger) {
            Some(mut balance) if *balance > 0 => std::mem::take(&mut *balance),
            _ => {
                debug!(passenger = %passenger, "Nothing to withdraw");
                return Ok(0);
            }
        };

        if let Err(e) = self.transfer.transfer(passenger, amount).await {
            *self.balances.entry(passenger.clone()).or_insert(0) += amount;
            warn!(
                passenger = %passenger,
                amount = %amount,
                error = %e,
                "Payout transfer failed, balance restored"
            );
            return Err(SuretyError::TransferFailed(e.to_string()));
        }

        info!(passenger = %passenger, amount = %amount, "Balance withdrawn");

        self.events
            .publish(SuretyEvent::Withdrawn {
                passenger: passenger.clone(),
                amount,
            })
            .await;

        Ok(amount)
    }

    /// Withdrawable balance of a passenger.
    pub fn balance(&self, passenger: &Address) -> Amount {
        self.balances.get(passenger).map_or(0, |b| *b)
    }

    /// Policies held by a passenger across all flights.
    pub fn policies_for(&self, passenger: &Address) -> Vec<Policy> {
        self.books
            .iter()
            .flat_map(|book| {
                book.policies
                    .iter()
                    .filter(|p| &p.passenger == passenger)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Policies written on a flight.
    pub fn policies_on(&self, flight: &FlightKey) -> Vec<Policy> {
        self.books
            .get(flight)
            .map(|book| book.policies.clone())
            .unwrap_or_default()
    }

    /// Current liabilities against collected premiums.
    pub fn solvency(&self) -> Solvency {
        let premiums_collected: Amount = self
            .books
            .iter()
            .map(|book| book.policies.iter().map(|p| p.premium).sum::<Amount>())
            .sum();
        let outstanding = self.balances.iter().map(|b| *b.value()).sum();

        Solvency {
            premiums_collected,
            outstanding,
            max_liability: self.config.payout_for(premiums_collected),
        }
    }
}
