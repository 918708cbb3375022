//! Tick timing for the open-model executors.
//!
//! A [`TickPlan`] is a lazy, time-ordered sequence of offsets from the run
//! start. The scheduler sleeps until each offset and starts one iteration.

use crate::config::{ExecutorKind, ScenarioConfig};
use std::time::Duration;

#[derive(Debug, Clone)]
struct RampStage {
    /// Per-second rates at the start and end of the stage.
    from: f64,
    to: f64,
    duration: f64,
}

#[derive(Debug, Clone)]
enum Plan {
    Constant {
        rate: u128,
        unit_nanos: u128,
        duration_nanos: u128,
    },
    Ramping {
        stages: Vec<RampStage>,
        stage: usize,
        stage_start: f64,
        /// Ticks owed by all stages before `stage`.
        before: f64,
    },
}

#[derive(Debug, Clone)]
pub struct TickPlan {
    plan: Plan,
    next: u64,
    span: Duration,
}

impl TickPlan {
    pub fn from_config(config: &ScenarioConfig) -> Self {
        match config.executor {
            ExecutorKind::ConstantArrivalRate => {
                Self::constant(config.rate, config.time_unit, config.duration)
            }
            ExecutorKind::RampingArrivalRate => Self::ramping(
                config.start_rate,
                config.stages.iter().map(|s| (s.duration, s.target)),
                config.time_unit,
            ),
        }
    }

    /// `rate` ticks per `time_unit`, evenly spaced, for `duration`.
    pub fn constant(rate: u32, time_unit: Duration, duration: Duration) -> Self {
        Self {
            plan: Plan::Constant {
                rate: rate.max(1) as u128,
                unit_nanos: time_unit.as_nanos().max(1),
                duration_nanos: duration.as_nanos(),
            },
            next: 0,
            span: duration,
        }
    }

    /// Linearly interpolated rate between stage targets, starting from `start_rate`.
    pub fn ramping<I>(start_rate: u32, stages: I, time_unit: Duration) -> Self
    where
        I: IntoIterator<Item = (Duration, u32)>,
    {
        let unit = time_unit.as_secs_f64().max(f64::MIN_POSITIVE);
        let mut from = start_rate as f64 / unit;
        let mut span = Duration::ZERO;
        let mut ramp = Vec::new();
        for (duration, target) in stages {
            let to = target as f64 / unit;
            ramp.push(RampStage {
                from,
                to,
                duration: duration.as_secs_f64(),
            });
            span += duration;
            from = to;
        }

        Self {
            plan: Plan::Ramping {
                stages: ramp,
                stage: 0,
                stage_start: 0.0,
                before: 0.0,
            },
            next: 0,
            span,
        }
    }

    /// Time from the first possible tick to the end of the last stage.
    pub fn span(&self) -> Duration {
        self.span
    }

    /// Number of ticks the plan emits in total.
    pub fn expected_ticks(&self) -> u64 {
        match &self.plan {
            Plan::Constant {
                rate,
                unit_nanos,
                duration_nanos,
            } => {
                let product = duration_nanos * rate;
                let ticks = product / unit_nanos + u128::from(product % unit_nanos != 0);
                u64::try_from(ticks).unwrap_or(u64::MAX)
            }
            Plan::Ramping { stages, .. } => stages
                .iter()
                .map(|s| (s.from + s.to) / 2.0 * s.duration)
                .sum::<f64>()
                .ceil() as u64,
        }
    }
}

impl Iterator for TickPlan {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let index = self.next;
        let offset = match &mut self.plan {
            Plan::Constant {
                rate,
                unit_nanos,
                duration_nanos,
            } => {
                let offset = index as u128 * *unit_nanos / *rate;
                if offset >= *duration_nanos {
                    return None;
                }
                Duration::from_nanos(u64::try_from(offset).unwrap_or(u64::MAX))
            }
            Plan::Ramping {
                stages,
                stage,
                stage_start,
                before,
            } => loop {
                let current = stages.get(*stage)?;
                let target = index as f64 - *before;
                if let Some(t) = crossing_time(current, target) {
                    break Duration::from_secs_f64(*stage_start + t);
                }
                *before += (current.from + current.to) / 2.0 * current.duration;
                *stage_start += current.duration;
                *stage += 1;
            },
        };
        self.next += 1;
        Some(offset)
    }
}

/// Seconds into `stage` at which the integrated rate reaches `target`, if
/// that happens before the stage ends.
fn crossing_time(stage: &RampStage, target: f64) -> Option<f64> {
    if target <= 0.0 {
        return (stage.from > 0.0 || stage.to > 0.0).then_some(0.0);
    }
    // integral of r(t) = from + (to - from) t / d  is  a t^2 + b t
    let a = (stage.to - stage.from) / (2.0 * stage.duration);
    let b = stage.from;
    let discriminant = b * b + 4.0 * a * target;
    if discriminant < 0.0 {
        return None;
    }
    let denominator = b + discriminant.sqrt();
    if denominator <= 0.0 {
        return None;
    }
    let t = 2.0 * target / denominator;
    (t < stage.duration).then_some(t)
}
