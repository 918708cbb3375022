//! Pass/fail conditions over aggregated metrics, evaluated once at run end.

use crate::error::ConfigError;
use crate::metrics::summary::MetricsSnapshot;
use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Rate,
    Trend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    HttpReqs,
    HttpReqFailed,
    HttpReqDuration,
    Iterations,
    IterationDuration,
    DroppedIterations,
    AbortedIterations,
    Checks,
    DataSent,
    DataReceived,
}

impl MetricName {
    pub const ALL: [MetricName; 10] = [
        MetricName::HttpReqs,
        MetricName::HttpReqFailed,
        MetricName::HttpReqDuration,
        MetricName::Iterations,
        MetricName::IterationDuration,
        MetricName::DroppedIterations,
        MetricName::AbortedIterations,
        MetricName::Checks,
        MetricName::DataSent,
        MetricName::DataReceived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::HttpReqs => "http_reqs",
            MetricName::HttpReqFailed => "http_req_failed",
            MetricName::HttpReqDuration => "http_req_duration",
            MetricName::Iterations => "iterations",
            MetricName::IterationDuration => "iteration_duration",
            MetricName::DroppedIterations => "dropped_iterations",
            MetricName::AbortedIterations => "aborted_iterations",
            MetricName::Checks => "checks",
            MetricName::DataSent => "data_sent",
            MetricName::DataReceived => "data_received",
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            MetricName::HttpReqFailed | MetricName::Checks => MetricKind::Rate,
            MetricName::HttpReqDuration | MetricName::IterationDuration => MetricKind::Trend,
            _ => MetricKind::Counter,
        }
    }
}

impl FromStr for MetricName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricName::ALL
            .iter()
            .copied()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownMetric(s.to_string()))
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Count,
    Rate,
    Avg,
    Min,
    Med,
    Max,
    Percentile(f64),
}

impl Aggregation {
    fn allowed_for(&self, kind: MetricKind) -> bool {
        match kind {
            MetricKind::Counter => matches!(self, Aggregation::Count | Aggregation::Rate),
            MetricKind::Rate => matches!(self, Aggregation::Rate),
            MetricKind::Trend => matches!(
                self,
                Aggregation::Avg
                    | Aggregation::Min
                    | Aggregation::Med
                    | Aggregation::Max
                    | Aggregation::Percentile(_)
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparison {
    fn parse(op: &str) -> Option<Self> {
        match op {
            "<" => Some(Comparison::Lt),
            "<=" => Some(Comparison::Le),
            ">" => Some(Comparison::Gt),
            ">=" => Some(Comparison::Ge),
            "==" => Some(Comparison::Eq),
            "!=" => Some(Comparison::Ne),
            _ => None,
        }
    }

    pub fn holds(&self, actual: f64, bound: f64) -> bool {
        match self {
            Comparison::Lt => actual < bound,
            Comparison::Le => actual <= bound,
            Comparison::Gt => actual > bound,
            Comparison::Ge => actual >= bound,
            Comparison::Eq => actual == bound,
            Comparison::Ne => actual != bound,
        }
    }
}

fn expression_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^\s*(count|rate|avg|min|med|max|p\(\s*(\d+(?:\.\d+)?)\s*\))\s*(<=|>=|==|!=|<|>)\s*(-?\d+(?:\.\d+)?)\s*$",
        )
        .expect("static pattern compiles")
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSpec {
    metric: MetricName,
    expression: String,
    aggregation: Aggregation,
    comparison: Comparison,
    bound: f64,
}

impl ThresholdSpec {
    pub fn parse(metric: &str, expression: &str) -> Result<Self, ConfigError> {
        let metric: MetricName = metric.parse()?;
        let invalid = |reason: &str| ConfigError::Threshold {
            metric: metric.to_string(),
            expression: expression.to_string(),
            reason: reason.to_string(),
        };

        let caps = expression_pattern()
            .captures(expression)
            .ok_or_else(|| invalid("expected <aggregation><operator><number>, e.g. p(95)<2000"))?;

        let aggregation = match &caps[1] {
            "count" => Aggregation::Count,
            "rate" => Aggregation::Rate,
            "avg" => Aggregation::Avg,
            "min" => Aggregation::Min,
            "med" => Aggregation::Med,
            "max" => Aggregation::Max,
            _ => {
                let p: f64 = caps[2]
                    .parse()
                    .map_err(|_| invalid("percentile is not a number"))?;
                if !(0.0..=100.0).contains(&p) {
                    return Err(invalid("percentile must be between 0 and 100"));
                }
                Aggregation::Percentile(p)
            }
        };

        if !aggregation.allowed_for(metric.kind()) {
            return Err(invalid(match metric.kind() {
                MetricKind::Counter => "counter metrics support count and rate",
                MetricKind::Rate => "rate metrics support rate",
                MetricKind::Trend => "trend metrics support avg, min, med, max and p(N)",
            }));
        }

        let comparison = Comparison::parse(&caps[3]).ok_or_else(|| invalid("unknown operator"))?;
        let bound: f64 = caps[4]
            .parse()
            .map_err(|_| invalid("threshold value is not a number"))?;

        Ok(Self {
            metric,
            expression: expression.trim().to_string(),
            aggregation,
            comparison,
            bound,
        })
    }

    pub fn metric(&self) -> MetricName {
        self.metric
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn evaluate(&self, snapshot: &MetricsSnapshot) -> ThresholdResult {
        let actual = snapshot.aggregate(self.metric, self.aggregation);
        ThresholdResult {
            metric: self.metric.to_string(),
            expression: self.expression.clone(),
            actual,
            passed: self.comparison.holds(actual, self.bound),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdResult {
    pub metric: String,
    pub expression: String,
    pub actual: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdSet {
    specs: Vec<ThresholdSpec>,
}

impl ThresholdSet {
    pub fn from_config(thresholds: &IndexMap<String, Vec<String>>) -> Result<Self, ConfigError> {
        let mut specs = Vec::new();
        for (metric, expressions) in thresholds {
            for expression in expressions {
                specs.push(ThresholdSpec::parse(metric, expression)?);
            }
        }
        Ok(Self { specs })
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ThresholdSpec> {
        self.specs.iter()
    }

    pub fn evaluate(&self, snapshot: &MetricsSnapshot) -> Vec<ThresholdResult> {
        self.specs.iter().map(|spec| spec.evaluate(snapshot)).collect()
    }
}
