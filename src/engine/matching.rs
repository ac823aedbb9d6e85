use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::geo::{GeoIndex, NearbyAgent, NearbyQuery};
use crate::models::event::EngineEvent;
use crate::models::offer::{Offer, OfferOutcome};
use crate::models::order::Order;
use crate::observability::metrics::Metrics;

#[derive(Debug, Clone)]
pub enum MatchResult {
    Matched { agent_id: Uuid, offer: Offer },
    Exhausted,
    // cancelled while matching
    Aborted,
}

impl MatchResult {
    pub fn as_label(&self) -> &'static str {
        match self {
            MatchResult::Matched { .. } => "matched",
            MatchResult::Exhausted => "exhausted",
            MatchResult::Aborted => "aborted",
        }
    }
}

struct PendingOffer {
    offer: Offer,
    respond_tx: oneshot::Sender<bool>,
}

struct IssuedOffer {
    offer: Offer,
    respond_rx: oneshot::Receiver<bool>,
    expires: Instant,
}

enum RoundResult {
    Matched { agent_id: Uuid, offer: Offer },
    Unmatched,
    Aborted,
}

pub struct MatchingEngine {
    geo: Arc<GeoIndex>,
    config: EngineConfig,
    pending: DashMap<Uuid, PendingOffer>,
    aborts: DashMap<Uuid, watch::Sender<bool>>,
    events_tx: broadcast::Sender<EngineEvent>,
    metrics: Metrics,
}

impl MatchingEngine {
    pub fn new(
        geo: Arc<GeoIndex>,
        config: EngineConfig,
        events_tx: broadcast::Sender<EngineEvent>,
        metrics: Metrics,
    ) -> Self {
        Self {
            geo,
            config,
            pending: DashMap::new(),
            aborts: DashMap::new(),
            events_tx,
            metrics,
        }
    }

    pub fn pending_offers(&self) -> usize {
        self.pending.len()
    }

    pub fn register(&self, order_id: Uuid) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        self.aborts.insert(order_id, tx);
        rx
    }

    pub fn unregister(&self, order_id: Uuid) {
        self.aborts.remove(&order_id);
    }

    pub fn abort(&self, order_id: Uuid) -> bool {
        match self.aborts.get(&order_id) {
            Some(tx) => tx.send(true).is_ok(),
            None => false,
        }
    }

    // The outcome is tentative; an acceptance can still lose the claim.
    pub fn respond_to_offer(
        &self,
        offer_id: Uuid,
        agent_id: Uuid,
        accept: bool,
    ) -> Result<Offer, EngineError> {
        {
            let pending = self
                .pending
                .get(&offer_id)
                .ok_or(EngineError::OfferNotFound(offer_id))?;
            if pending.offer.agent_id != agent_id {
                tracing::warn!(
                    offer_id = %offer_id,
                    agent_id = %agent_id,
                    "offer response from an agent it was not issued to"
                );
                return Err(EngineError::UnauthorizedReporter {
                    order_id: pending.offer.order_id,
                    agent_id,
                });
            }
        }

        let (_, pending) = self
            .pending
            .remove(&offer_id)
            .ok_or(EngineError::OfferNotFound(offer_id))?;
        pending
            .respond_tx
            .send(accept)
            .map_err(|_| EngineError::OfferNotFound(offer_id))?;

        debug!(offer_id = %offer_id, agent_id = %agent_id, accept, "offer answered");
        let mut offer = pending.offer;
        offer.outcome = if accept {
            OfferOutcome::Accepted
        } else {
            OfferOutcome::Declined
        };
        Ok(offer)
    }

    pub async fn match_order(&self, order: &Order, mut abort_rx: watch::Receiver<bool>) -> MatchResult {
        let started = Instant::now();
        let waited = order
            .matching_since()
            .and_then(|since| (Utc::now() - since).to_std().ok())
            .unwrap_or_default();
        let deadline = started + self.config.matching_timeout.saturating_sub(waited);
        let mut offered: HashSet<Uuid> = HashSet::new();

        let result = loop {
            if *abort_rx.borrow() {
                break MatchResult::Aborted;
            }
            if Instant::now() >= deadline {
                break MatchResult::Exhausted;
            }

            let candidates = self.geo.query_nearby(&NearbyQuery {
                origin: order.request.origin,
                role: order.service_type.agent_role(),
                vehicle_class: order.request.vehicle_class,
                radius_m: self.config.search_radius_m,
                limit: self.config.match_batch_size,
                exclude: offered.clone(),
            });

            let round = self.issue_round(order, &candidates, deadline, &mut offered);
            if round.is_empty() {
                let wake = (Instant::now() + self.config.requery_interval).min(deadline);
                tokio::select! {
                    _ = sleep_until(wake) => {}
                    changed = abort_rx.changed() => {
                        if changed.is_err() {
                            break MatchResult::Aborted;
                        }
                    }
                }
                continue;
            }

            match self.run_round(order.id, round, &mut abort_rx).await {
                RoundResult::Matched { agent_id, offer } => {
                    break MatchResult::Matched { agent_id, offer };
                }
                RoundResult::Aborted => break MatchResult::Aborted,
                RoundResult::Unmatched => {
                    debug!(order_id = %order.id, offered = offered.len(), "round ended without a match");
                }
            }
        };

        let label = result.as_label();
        self.metrics.matches_total.with_label_values(&[label]).inc();
        self.metrics
            .match_latency_seconds
            .with_label_values(&[label])
            .observe(started.elapsed().as_secs_f64());
        info!(
            order_id = %order.id,
            outcome = label,
            offered = offered.len(),
            "matching finished"
        );

        result
    }

    fn issue_round(
        &self,
        order: &Order,
        candidates: &[NearbyAgent],
        deadline: Instant,
        offered: &mut HashSet<Uuid>,
    ) -> Vec<IssuedOffer> {
        let mut round = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let offer_id = Uuid::new_v4();
            if let Err(err) = self.geo.reserve_for_offer(candidate.agent_id, offer_id) {
                debug!(
                    order_id = %order.id,
                    agent_id = %candidate.agent_id,
                    error = %err,
                    "skipping candidate"
                );
                continue;
            }
            offered.insert(candidate.agent_id);

            let now = Instant::now();
            let expires = (now + self.config.offer_timeout).min(deadline);
            let window = chrono::Duration::from_std(expires.saturating_duration_since(now))
                .unwrap_or_else(|_| chrono::Duration::zero());
            let issued_at = Utc::now();

            let offer = Offer {
                id: offer_id,
                order_id: order.id,
                agent_id: candidate.agent_id,
                issued_at,
                expires_at: issued_at + window,
                outcome: OfferOutcome::Pending,
            };

            let (respond_tx, respond_rx) = oneshot::channel();
            self.pending.insert(
                offer_id,
                PendingOffer {
                    offer: offer.clone(),
                    respond_tx,
                },
            );
            let _ = self.events_tx.send(EngineEvent::OfferIssued {
                offer: offer.clone(),
            });
            debug!(
                order_id = %order.id,
                agent_id = %candidate.agent_id,
                offer_id = %offer_id,
                distance_m = candidate.distance_m,
                "offer issued"
            );

            round.push(IssuedOffer {
                offer,
                respond_rx,
                expires,
            });
        }

        round
    }

    async fn run_round(
        &self,
        order_id: Uuid,
        round: Vec<IssuedOffer>,
        abort_rx: &mut watch::Receiver<bool>,
    ) -> RoundResult {
        let mut open: HashMap<Uuid, Offer> = round
            .iter()
            .map(|issued| (issued.offer.id, issued.offer.clone()))
            .collect();

        let mut responses: FuturesUnordered<_> = round
            .into_iter()
            .map(|issued| async move {
                let answer = timeout_at(issued.expires, issued.respond_rx).await;
                (issued.offer, answer)
            })
            .collect();

        loop {
            tokio::select! {
                changed = abort_rx.changed() => {
                    if changed.is_err() || *abort_rx.borrow() {
                        self.withdraw(open.into_values());
                        return RoundResult::Aborted;
                    }
                }
                next = responses.next() => {
                    let Some((offer, answer)) = next else {
                        return RoundResult::Unmatched;
                    };
                    open.remove(&offer.id);

                    match answer {
                        Ok(Ok(true)) => match self.geo.claim(offer.agent_id, offer.id, order_id) {
                            Ok(change) => {
                                let offer = self.resolve(offer, OfferOutcome::Accepted);
                                let _ = self.events_tx.send(EngineEvent::AgentAvailabilityChanged {
                                    agent_id: change.agent_id,
                                    available: change.available,
                                    at: Utc::now(),
                                });
                                self.withdraw(open.into_values());
                                return RoundResult::Matched {
                                    agent_id: offer.agent_id,
                                    offer,
                                };
                            }
                            Err(err) => {
                                debug!(
                                    order_id = %order_id,
                                    agent_id = %offer.agent_id,
                                    error = %err,
                                    "lost claim after acceptance"
                                );
                                self.geo.release_offer(offer.agent_id, offer.id);
                                self.resolve(offer, OfferOutcome::Declined);
                            }
                        },
                        Ok(Ok(false)) => {
                            self.geo.release_offer(offer.agent_id, offer.id);
                            self.resolve(offer, OfferOutcome::Declined);
                        }
                        Ok(Err(_)) | Err(_) => {
                            self.pending.remove(&offer.id);
                            self.geo.release_offer(offer.agent_id, offer.id);
                            self.resolve(offer, OfferOutcome::Expired);
                        }
                    }
                }
            }
        }
    }

    fn withdraw(&self, offers: impl Iterator<Item = Offer>) {
        for offer in offers {
            self.pending.remove(&offer.id);
            self.geo.release_offer(offer.agent_id, offer.id);
            self.resolve(offer, OfferOutcome::Expired);
        }
    }

    fn resolve(&self, mut offer: Offer, outcome: OfferOutcome) -> Offer {
        offer.outcome = outcome;
        self.metrics
            .offers_total
            .with_label_values(&[outcome.as_label()])
            .inc();
        let _ = self.events_tx.send(EngineEvent::OfferResolved {
            offer: offer.clone(),
        });
        debug!(
            offer_id = %offer.id,
            agent_id = %offer.agent_id,
            outcome = outcome.as_label(),
            "offer resolved"
        );
        offer
    }
}
