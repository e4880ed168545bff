//! Alert Pipeline
//!
//! One alert cycle per asset as a fixed sequence of named stages:
//!
//! ```text
//! Filter -> Reason -> Cooldown -> Emit -> Done
//!    \         \          \
//!     `---------`----------`----------> Done
//! ```
//!
//! Each stage reads an immutable [`CycleContext`] and returns a new one;
//! [`route`] picks the next stage from the context alone. Reasoning and
//! delivery are opaque collaborators behind [`SignalReasoner`] and [`AlertSink`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::filters::{ConfluenceFilter, CooldownDecision, CooldownGate, FilterResult};
use crate::indicators::IndicatorSnapshot;
use crate::persistence::PersistedSignal;
use crate::types::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Filter,
    Reason,
    Cooldown,
    Emit,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Filter => "filter",
            Stage::Reason => "reason",
            Stage::Cooldown => "cooldown",
            Stage::Emit => "emit",
            Stage::Done => "done",
        };
        write!(f, "{}", name)
    }
}

/// Signal proposed by the reasoning collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalCandidate {
    pub direction: Direction,
    pub confidence: f64,
    pub signal_type: String,
    #[serde(default)]
    pub rationale: String,
}

impl SignalCandidate {
    pub fn is_actionable(&self) -> bool {
        self.direction != Direction::Neutral
    }
}

#[async_trait]
pub trait SignalReasoner: Send + Sync {
    async fn propose(
        &self,
        asset: &str,
        snapshot: &IndicatorSnapshot,
        filter: &FilterResult,
    ) -> Result<Option<SignalCandidate>>;
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn emit(&self, alert: &PersistedSignal) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// Confluence filter rejected the snapshot
    Filtered,
    /// Reasoner had nothing actionable
    NoCandidate,
    CooledDown { remaining_minutes: i64 },
    Emitted(PersistedSignal),
}

/// Everything a cycle has learned so far
#[derive(Debug, Clone)]
pub struct CycleContext {
    pub asset: String,
    pub snapshot: IndicatorSnapshot,
    pub now: DateTime<Utc>,
    pub filter: Option<FilterResult>,
    pub candidate: Option<SignalCandidate>,
    pub cooldown: Option<CooldownDecision>,
    pub emitted: Option<PersistedSignal>,
}

impl CycleContext {
    pub fn new(asset: impl Into<String>, snapshot: IndicatorSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            asset: asset.into(),
            snapshot,
            now,
            filter: None,
            candidate: None,
            cooldown: None,
            emitted: None,
        }
    }

    /// Outcome implied by the context once the cycle reached `Done`
    pub fn outcome(&self) -> CycleOutcome {
        if let Some(alert) = &self.emitted {
            return CycleOutcome::Emitted(alert.clone());
        }
        if let Some(decision) = self.cooldown.filter(|d| d.skip) {
            return CycleOutcome::CooledDown {
                remaining_minutes: decision.remaining_minutes,
            };
        }
        match &self.filter {
            Some(f) if f.should_proceed => CycleOutcome::NoCandidate,
            _ => CycleOutcome::Filtered,
        }
    }
}

/// Next stage after `stage` has run
pub fn route(stage: Stage, ctx: &CycleContext) -> Stage {
    match stage {
        Stage::Filter => match &ctx.filter {
            Some(f) if f.should_proceed => Stage::Reason,
            _ => Stage::Done,
        },
        Stage::Reason => match &ctx.candidate {
            Some(c) if c.is_actionable() => Stage::Cooldown,
            _ => Stage::Done,
        },
        Stage::Cooldown => match ctx.cooldown {
            Some(d) if !d.skip => Stage::Emit,
            _ => Stage::Done,
        },
        Stage::Emit | Stage::Done => Stage::Done,
    }
}

/// Filter stage; synchronous
pub fn filter_stage(filter: &ConfluenceFilter, ctx: &CycleContext) -> CycleContext {
    CycleContext {
        filter: Some(filter.evaluate(&ctx.snapshot)),
        ..ctx.clone()
    }
}

pub struct AlertPipeline {
    filter: ConfluenceFilter,
    reasoner: Arc<dyn SignalReasoner>,
    cooldown: CooldownGate,
    sink: Arc<dyn AlertSink>,
}

impl AlertPipeline {
    pub fn new(
        filter: ConfluenceFilter,
        reasoner: Arc<dyn SignalReasoner>,
        cooldown: CooldownGate,
        sink: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            filter,
            reasoner,
            cooldown,
            sink,
        }
    }

    /// Run one cycle for `asset` to completion
    pub async fn run_cycle(
        &self,
        asset: &str,
        snapshot: IndicatorSnapshot,
        now: DateTime<Utc>,
    ) -> Result<CycleOutcome> {
        let mut ctx = CycleContext::new(asset, snapshot, now);
        let mut stage = Stage::Filter;

        while stage != Stage::Done {
            ctx = self.step(stage, &ctx).await?;
            let next = route(stage, &ctx);
            debug!(asset = %asset, from = %stage, to = %next, "Stage transition");
            stage = next;
        }

        let outcome = ctx.outcome();
        if let CycleOutcome::Emitted(alert) = &outcome {
            info!(
                asset = %asset,
                direction = %alert.direction,
                confidence = alert.confidence,
                signal_type = %alert.signal_type,
                "Alert emitted"
            );
        }
        Ok(outcome)
    }

    async fn step(&self, stage: Stage, ctx: &CycleContext) -> Result<CycleContext> {
        match stage {
            Stage::Filter => Ok(filter_stage(&self.filter, ctx)),
            Stage::Reason => self.reason_stage(ctx).await,
            Stage::Cooldown => Ok(self.cooldown_stage(ctx).await),
            Stage::Emit => self.emit_stage(ctx).await,
            Stage::Done => Ok(ctx.clone()),
        }
    }

    async fn reason_stage(&self, ctx: &CycleContext) -> Result<CycleContext> {
        let Some(filter) = &ctx.filter else {
            return Ok(ctx.clone());
        };
        let candidate = self
            .reasoner
            .propose(&ctx.asset, &ctx.snapshot, filter)
            .await
            .with_context(|| format!("Reasoning failed for {}", ctx.asset))?;

        Ok(CycleContext {
            candidate,
            ..ctx.clone()
        })
    }

    async fn cooldown_stage(&self, ctx: &CycleContext) -> CycleContext {
        let Some(candidate) = &ctx.candidate else {
            return ctx.clone();
        };
        let decision = self
            .cooldown
            .check_at(&ctx.asset, &ctx.snapshot, candidate.confidence, ctx.now)
            .await;

        CycleContext {
            cooldown: Some(decision),
            ..ctx.clone()
        }
    }

    async fn emit_stage(&self, ctx: &CycleContext) -> Result<CycleContext> {
        let Some(candidate) = &ctx.candidate else {
            return Ok(ctx.clone());
        };
        let alert = PersistedSignal {
            id: format!("{}-{}", ctx.asset, ctx.now.timestamp_millis()),
            asset: ctx.asset.clone(),
            direction: candidate.direction,
            confidence: candidate.confidence,
            signal_type: candidate.signal_type.clone(),
            timestamp: ctx.now,
        };
        self.sink
            .emit(&alert)
            .await
            .with_context(|| format!("Failed to deliver alert for {}", ctx.asset))?;

        Ok(CycleContext {
            emitted: Some(alert),
            ..ctx.clone()
        })
    }
}
