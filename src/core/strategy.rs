//! Strategy Engine - N-of-M Signal Voting
//!
//! Every inserted signal triggers an evaluation of its pool:
//! 1. Keep the pool's signals inside the voting window
//! 2. Group by type; the first type (lexical order) with `count >= N` wins
//! 3. Score the pool's recent event descriptions with the sentiment capability
//! 4. `overall = min(0.95, avg(winning confidences) + 0.3 * sentiment confidence)`
//! 5. Fire when `|polarity| >= sentiment_threshold` or `overall >= 0.8`
//! 6. On fire, clear every active signal of the pool, then notify all sinks
//!
//! Insert-then-evaluate runs under one engine-wide async lock so two
//! near-simultaneous signals cannot both count the same evidence. Sinks are
//! invoked after the lock is released.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::alerts::{format_alert_message, AlertSink};
use crate::core::classifier::Classification;
use crate::core::registry::PoolRegistry;
use crate::core::sentiment::{SentimentAnalyzer, SentimentScore};
use crate::core::store::{log_store_error, EventStore};
use crate::models::config::StrategyConfig;
use crate::models::types::{
    AlertPayload, AlertRecord, EngineStats, PoolEvent, PoolSignals, Signal, SignalSummary,
    SignalType, SignalView,
};
use crate::utils::constants::{
    ALERT_CONTEXT_EVENTS, MAX_EVENTS_PER_POOL, MAX_RECENT_ALERTS, MAX_SIGNAL_HISTORY,
    OVERALL_CONFIDENCE_CAP, SENTIMENT_WEIGHT,
};

/// Float slack for the confidence gate
const GATE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone)]
struct EventNote {
    description: String,
}

/// Recent event descriptions of one pool
#[derive(Debug)]
struct PoolNotes {
    notes: VecDeque<EventNote>,
    /// Trailing notes not yet seen by `assess_sentiment`
    unassessed: usize,
    last_at: DateTime<Utc>,
}

impl PoolNotes {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            notes: VecDeque::new(),
            unassessed: 0,
            last_at: now,
        }
    }

    fn push(&mut self, description: String, now: DateTime<Utc>) {
        self.notes.push_back(EventNote { description });
        self.unassessed += 1;
        while self.notes.len() > MAX_EVENTS_PER_POOL {
            self.notes.pop_front();
        }
        self.unassessed = self.unassessed.min(self.notes.len());
        self.last_at = now;
    }

    fn texts(&self) -> Vec<String> {
        self.notes.iter().map(|n| n.description.clone()).collect()
    }

    /// Unassessed notes, marking them assessed
    fn take_unassessed(&mut self) -> Vec<String> {
        let skip = self.notes.len() - self.unassessed;
        self.unassessed = 0;
        self.notes.iter().skip(skip).map(|n| n.description.clone()).collect()
    }
}

#[derive(Default)]
struct EngineState {
    /// Voting-eligible signals per pool, pruned to the retention window
    active: HashMap<String, Vec<Signal>>,
    /// Display history, pruned to 24h
    history: VecDeque<Signal>,
    notes: HashMap<String, PoolNotes>,
    total_events: u64,
    total_alerts: u64,
    recent_alerts: VecDeque<AlertRecord>,
}

pub struct StrategyEngine {
    config: StrategyConfig,
    registry: PoolRegistry,
    sentiment: Arc<dyn SentimentAnalyzer>,
    store: Arc<dyn EventStore>,
    sinks: RwLock<Vec<Arc<dyn AlertSink>>>,
    state: Mutex<EngineState>,
}

impl StrategyEngine {
    pub fn new(
        config: StrategyConfig,
        registry: PoolRegistry,
        sentiment: Arc<dyn SentimentAnalyzer>,
        store: Arc<dyn EventStore>,
    ) -> Self {
        Self {
            config,
            registry,
            sentiment,
            store,
            sinks: RwLock::new(Vec::new()),
            state: Mutex::new(EngineState::default()),
        }
    }

    pub fn register_sink(&self, sink: Arc<dyn AlertSink>) {
        info!("📣 Alert sink registered: {}", sink.name());
        self.sinks
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(sink);
    }

    fn sinks(&self) -> Vec<Arc<dyn AlertSink>> {
        self.sinks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    // ============================================
    // WRITE PATH
    // ============================================

    /// Insert a signal and evaluate its pool. Returns the alert if one fired.
    pub async fn submit(&self, signal: Signal) -> Option<AlertRecord> {
        self.submit_at(signal, Utc::now()).await
    }

    /// `submit` against an explicit clock reading. The signal is timestamped
    /// with `now`, not with its block time.
    pub async fn submit_at(&self, mut signal: Signal, now: DateTime<Utc>) -> Option<AlertRecord> {
        signal.created_at = now;
        signal.pool_address = signal.pool_address.to_lowercase();
        let pool = signal.pool_address.clone();
        debug!(
            pool = %pool,
            "{} signal {} ({:.2})",
            signal.signal_type.emoji(),
            signal.signal_type.as_str(),
            signal.confidence
        );

        let fired = {
            let mut state = self.state.lock().await;
            self.insert(&mut state, signal.clone(), now);
            self.evaluate(&mut state, &pool, now).await
        };

        log_store_error("signal", self.store.save_signal(&signal).await);

        let payload = fired?;
        self.deliver(&payload).await;
        log_store_error("alert", self.store.save_alert(&payload.record).await);
        Some(payload.record)
    }

    /// Record a decoded event for stats and for sentiment/alert context.
    /// Activity events pass their classification so that only signal-worthy
    /// events are described as whale or major liquidity activity.
    pub async fn record_event(&self, event: &PoolEvent, classification: Option<&Classification>) {
        let (usd, notable) = classification.map_or((None, false), |c| (c.usd, c.signal.is_some()));
        let description = event.describe(usd, notable);
        let now = Utc::now();
        {
            let mut state = self.state.lock().await;
            state.total_events += 1;
            state
                .notes
                .entry(event.pool_address.to_lowercase())
                .or_insert_with(|| PoolNotes::new(now))
                .push(description, now);
        }
        log_store_error("event", self.store.save_event(event).await);
    }

    /// Score the pool's event descriptions recorded since the previous
    /// assessment; a positive reading at or above the sentiment threshold
    /// becomes a `sentiment` signal.
    pub async fn assess_sentiment(&self, pool: &str) -> Option<AlertRecord> {
        let pool = pool.to_lowercase();
        let texts = {
            let mut state = self.state.lock().await;
            state
                .notes
                .get_mut(&pool)
                .map(PoolNotes::take_unassessed)
                .unwrap_or_default()
        };
        if texts.is_empty() {
            return None;
        }

        let score = self.score_sentiment(&pool, &texts).await;
        if score.polarity < self.config.sentiment_threshold {
            return None;
        }
        let signal = Signal::new(
            SignalType::Sentiment,
            &pool,
            score.confidence,
            json!({ "polarity": score.polarity, "texts": texts.len() }),
        );
        self.submit(signal).await
    }

    /// Drop expired signals of every pool, and the notes of pools with no
    /// event inside the retention window
    pub async fn prune(&self, now: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        let cutoff = now - self.config.retention;
        state.active.retain(|_, signals| {
            signals.retain(|s| s.created_at >= cutoff);
            !signals.is_empty()
        });
        state.notes.retain(|_, notes| notes.last_at >= cutoff);
        self.prune_history(&mut state, now);
    }

    fn insert(&self, state: &mut EngineState, signal: Signal, now: DateTime<Utc>) {
        let cutoff = now - self.config.retention;
        let signals = state.active.entry(signal.pool_address.clone()).or_default();
        signals.retain(|s| s.created_at >= cutoff);
        signals.push(signal.clone());

        state.history.push_back(signal);
        self.prune_history(state, now);
    }

    fn prune_history(&self, state: &mut EngineState, now: DateTime<Utc>) {
        let cutoff = now - self.config.history;
        while state
            .history
            .front()
            .map_or(false, |s| s.created_at < cutoff || state.history.len() > MAX_SIGNAL_HISTORY)
        {
            state.history.pop_front();
        }
    }

    fn texts_for(state: &EngineState, pool: &str) -> Vec<String> {
        state
            .notes
            .get(pool)
            .map(PoolNotes::texts)
            .unwrap_or_default()
    }

    async fn score_sentiment(&self, pool: &str, texts: &[String]) -> SentimentScore {
        match tokio::time::timeout(self.config.sentiment_timeout, self.sentiment.analyze(texts)).await {
            Ok(Ok(score)) => score.clamped(),
            Ok(Err(e)) => {
                warn!(pool = %pool, "💬 Sentiment unavailable: {}", e);
                SentimentScore::neutral()
            }
            Err(_) => {
                warn!(pool = %pool, "💬 Sentiment timed out after {:?}", self.config.sentiment_timeout);
                SentimentScore::neutral()
            }
        }
    }

    // ============================================
    // VOTING
    // ============================================

    async fn evaluate(
        &self,
        state: &mut EngineState,
        pool: &str,
        now: DateTime<Utc>,
    ) -> Option<AlertPayload> {
        let window_start = now - self.config.voting_window;
        let mut groups: BTreeMap<SignalType, Vec<f64>> = BTreeMap::new();
        for signal in state.active.get(pool)?.iter().filter(|s| s.created_at >= window_start) {
            groups.entry(signal.signal_type).or_default().push(signal.confidence);
        }

        // BTreeMap iterates in lexical order of the type names
        let (winner, confidences) = groups
            .iter()
            .find(|(_, c)| c.len() >= self.config.vote_threshold)
            .map(|(t, c)| (*t, c.clone()))?;

        let texts = Self::texts_for(state, pool);
        let sentiment = if texts.is_empty() {
            SentimentScore::neutral()
        } else {
            self.score_sentiment(pool, &texts).await
        };

        let avg = confidences.iter().sum::<f64>() / confidences.len() as f64;
        let overall = (avg + SENTIMENT_WEIGHT * sentiment.confidence).min(OVERALL_CONFIDENCE_CAP);
        let sentiment_pass = sentiment.polarity.abs() >= self.config.sentiment_threshold;
        let confidence_pass = overall + GATE_EPSILON >= self.config.confidence_gate;

        if !(sentiment_pass || confidence_pass) {
            debug!(
                pool = %pool,
                "🗳️ {} reached {} votes but gate held (overall {:.2}, sentiment {:+.2})",
                winner.as_str(),
                confidences.len(),
                overall,
                sentiment.polarity
            );
            return None;
        }

        let signals: BTreeMap<String, SignalSummary> = groups
            .iter()
            .map(|(t, c)| {
                (
                    t.as_str().to_string(),
                    SignalSummary {
                        count: c.len(),
                        avg_confidence: c.iter().sum::<f64>() / c.len() as f64,
                    },
                )
            })
            .collect();

        // Fired evidence never votes or gets scored again
        state.active.remove(pool);
        state.notes.remove(pool);

        let record = AlertRecord {
            id: Uuid::new_v4(),
            pool_address: pool.to_string(),
            signal_type: winner,
            signal_count: confidences.len(),
            confidence: overall,
            sentiment_score: sentiment.polarity,
            sentiment_confidence: sentiment.confidence,
            triggered_at: now,
        };

        let recent_events: Vec<String> = texts
            .iter()
            .rev()
            .take(ALERT_CONTEXT_EVENTS)
            .cloned()
            .collect();
        let pool_meta = self.registry.get(pool);
        let message = format_alert_message(
            pool,
            pool_meta.as_ref(),
            &signals,
            winner,
            overall,
            sentiment.polarity,
            &recent_events,
        );

        state.total_alerts += 1;
        state.recent_alerts.push_back(record.clone());
        while state.recent_alerts.len() > MAX_RECENT_ALERTS {
            state.recent_alerts.pop_front();
        }

        info!(
            pool = %pool,
            "🚨 ALERT FIRED: {} x{} (overall {:.2}, sentiment {:+.2}/{:.2})",
            winner.as_str(),
            record.signal_count,
            overall,
            sentiment.polarity,
            sentiment.confidence
        );

        Some(AlertPayload {
            record,
            message,
            signals,
            pool: pool_meta,
            recent_events,
        })
    }

    /// Each sink runs independently under its own timeout
    async fn deliver(&self, payload: &AlertPayload) {
        for sink in self.sinks() {
            match tokio::time::timeout(self.config.sink_timeout, sink.notify(payload)).await {
                Ok(Ok(())) => debug!("📨 Alert delivered via {}", sink.name()),
                Ok(Err(e)) => warn!("📨 Sink {} failed: {}", sink.name(), e),
                Err(_) => warn!(
                    "📨 Sink {} timed out after {:?}",
                    sink.name(),
                    self.config.sink_timeout
                ),
            }
        }
    }

    // ============================================
    // READ API
    // ============================================

    pub async fn get_stats(&self) -> EngineStats {
        let now = Utc::now();
        let hour_ago = now - chrono::Duration::hours(1);
        let history_cutoff = now - self.config.history;
        let state = self.state.lock().await;

        let mut breakdown: BTreeMap<String, usize> = BTreeMap::new();
        let mut pools: HashSet<&str> = HashSet::new();
        let mut recent = 0;
        for signal in state.history.iter().filter(|s| s.created_at >= hour_ago) {
            recent += 1;
            pools.insert(signal.pool_address.as_str());
            *breakdown.entry(signal.signal_type.as_str().to_string()).or_default() += 1;
        }

        EngineStats {
            monitored_pools: self.registry.len(),
            total_events: state.total_events,
            total_signals: state
                .history
                .iter()
                .filter(|s| s.created_at >= history_cutoff)
                .count(),
            recent_signals_last_hour: recent,
            active_pools_last_hour: pools.len(),
            signal_breakdown: breakdown,
            total_alerts: state.total_alerts,
        }
    }

    /// Newest first, from the 24h history
    pub async fn get_recent_signals(&self, limit: usize) -> Vec<SignalView> {
        let cutoff = Utc::now() - self.config.history;
        let state = self.state.lock().await;
        state
            .history
            .iter()
            .rev()
            .filter(|s| s.created_at >= cutoff)
            .take(limit)
            .map(|s| self.view(s))
            .collect()
    }

    /// Voting-eligible signals grouped by pool
    pub async fn get_current_active_signals(&self) -> Vec<PoolSignals> {
        let cutoff = Utc::now() - self.config.retention;
        let state = self.state.lock().await;
        let mut grouped: Vec<PoolSignals> = state
            .active
            .iter()
            .filter_map(|(pool, signals)| {
                let mut views: Vec<SignalView> = signals
                    .iter()
                    .filter(|s| s.created_at >= cutoff)
                    .map(|s| self.view(s))
                    .collect();
                if views.is_empty() {
                    return None;
                }
                views.reverse();
                let meta = self.registry.get(pool);
                Some(PoolSignals {
                    pool_address: pool.clone(),
                    token0: meta.as_ref().map(|p| p.token0.clone()),
                    token1: meta.map(|p| p.token1),
                    signals: views,
                })
            })
            .collect();
        grouped.sort_by(|a, b| a.pool_address.cmp(&b.pool_address));
        grouped
    }

    /// Newest first
    pub async fn recent_alerts(&self, limit: usize) -> Vec<AlertRecord> {
        let state = self.state.lock().await;
        state.recent_alerts.iter().rev().take(limit).cloned().collect()
    }

    /// Active signal count of one pool
    pub async fn active_count(&self, pool: &str) -> usize {
        let state = self.state.lock().await;
        state.active.get(&pool.to_lowercase()).map_or(0, Vec::len)
    }

    #[cfg(test)]
    async fn note_pools(&self) -> usize {
        self.state.lock().await.notes.len()
    }

    fn view(&self, signal: &Signal) -> SignalView {
        let meta = self.registry.get(&signal.pool_address);
        SignalView {
            pool_address: signal.pool_address.clone(),
            token0: meta.as_ref().map(|p| p.token0.clone()),
            token1: meta.map(|p| p.token1),
            signal_type: signal.signal_type,
            confidence: signal.confidence,
            created_at: signal.created_at,
        }
    }
}
