use stampede_instruments::{BuiltinMetric, MetricKind, RunMetrics, ThresholdRow};

/// Which aggregate of a metric a threshold compares.
#[derive(Debug, Clone, Copy, PartialEq, derive_more::Display)]
pub enum Aggregation {
    #[display("avg")]
    Avg,
    #[display("min")]
    Min,
    #[display("max")]
    Max,
    #[display("med")]
    Med,
    #[display("p({_0})")]
    Percentile(f64),
    #[display("rate")]
    Rate,
    #[display("count")]
    Count,
}

impl Aggregation {
    fn default_for(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Trend => Aggregation::Avg,
            MetricKind::Rate => Aggregation::Rate,
            MetricKind::Counter => Aggregation::Count,
        }
    }

    fn parse(input: &str) -> Option<Self> {
        match input {
            "avg" => Some(Aggregation::Avg),
            "min" => Some(Aggregation::Min),
            "max" => Some(Aggregation::Max),
            "med" => Some(Aggregation::Med),
            "rate" => Some(Aggregation::Rate),
            "count" => Some(Aggregation::Count),
            _ => {
                // Both `p(95)` and `p95` are accepted.
                let percentile = input.strip_prefix('p')?;
                let percentile = percentile
                    .strip_prefix('(')
                    .and_then(|p| p.strip_suffix(')'))
                    .unwrap_or(percentile);
                let percentile = percentile.parse::<f64>().ok()?;
                (0.0..=100.0)
                    .contains(&percentile)
                    .then_some(Aggregation::Percentile(percentile))
            }
        }
    }

    fn applies_to(&self, kind: MetricKind) -> bool {
        match kind {
            MetricKind::Trend => matches!(
                self,
                Aggregation::Avg
                    | Aggregation::Min
                    | Aggregation::Max
                    | Aggregation::Med
                    | Aggregation::Percentile(_)
            ),
            MetricKind::Rate => matches!(self, Aggregation::Rate),
            MetricKind::Counter => matches!(self, Aggregation::Count | Aggregation::Rate),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Comparison {
    #[display("<")]
    Lt,
    #[display("<=")]
    Le,
    #[display(">")]
    Gt,
    #[display(">=")]
    Ge,
}

impl Comparison {
    fn holds(&self, observed: f64, limit: f64) -> bool {
        match self {
            Comparison::Lt => observed < limit,
            Comparison::Le => observed <= limit,
            Comparison::Gt => observed > limit,
            Comparison::Ge => observed >= limit,
        }
    }
}

/// A pass/fail criterion on an aggregate metric, for example `p(95)<800` on `http_req_duration`.
#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    metric: BuiltinMetric,
    aggregation: Aggregation,
    comparison: Comparison,
    limit: f64,
    expression: String,
}

impl Threshold {
    /// Parse `[aggregation] operator number`. Whitespace is ignored and the aggregation may be
    /// left out to use the metric's default, `avg` for trends, `rate` for rates and `count` for
    /// counters.
    pub fn parse(metric: &str, expression: &str) -> Result<Self, String> {
        let metric_name = metric;
        let metric = BuiltinMetric::from_name(metric_name).ok_or_else(|| {
            format!(
                "threshold on unknown metric [{metric_name}], expected one of {}",
                BuiltinMetric::ALL.map(|m| m.name()).join(", ")
            )
        })?;

        let compact = expression
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>();

        let at = compact.find(['<', '>']).ok_or_else(|| {
            format!("threshold [{expression}] on [{metric_name}] has no comparison, expected < or >")
        })?;
        let (lhs, rest) = compact.split_at(at);
        let (comparison, literal) = if let Some(literal) = rest.strip_prefix("<=") {
            (Comparison::Le, literal)
        } else if let Some(literal) = rest.strip_prefix(">=") {
            (Comparison::Ge, literal)
        } else if let Some(literal) = rest.strip_prefix('<') {
            (Comparison::Lt, literal)
        } else {
            (Comparison::Gt, &rest[1..])
        };

        let limit = literal
            .parse::<f64>()
            .ok()
            .filter(|limit| limit.is_finite())
            .ok_or_else(|| {
                format!("threshold [{expression}] on [{metric_name}] does not compare against a number")
            })?;

        let aggregation = if lhs.is_empty() {
            Aggregation::default_for(metric.kind())
        } else {
            Aggregation::parse(lhs).ok_or_else(|| {
                format!("threshold [{expression}] on [{metric_name}] has unknown aggregation [{lhs}]")
            })?
        };

        if !aggregation.applies_to(metric.kind()) {
            return Err(format!(
                "threshold [{expression}] uses [{aggregation}] which does not apply to [{metric_name}]"
            ));
        }

        Ok(Self {
            metric,
            aggregation,
            comparison,
            limit,
            expression: expression.trim().to_string(),
        })
    }

    pub fn metric(&self) -> BuiltinMetric {
        self.metric
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// The aggregate this threshold compares, or `None` if the metric has no samples.
    pub fn observe(&self, metrics: &RunMetrics) -> Option<f64> {
        if let Some(trend) = metrics.trend(self.metric) {
            return match self.aggregation {
                Aggregation::Avg => trend.avg(),
                Aggregation::Min => trend.min(),
                Aggregation::Max => trend.max(),
                Aggregation::Med => trend.med(),
                Aggregation::Percentile(p) => trend.percentile(p),
                Aggregation::Rate | Aggregation::Count => None,
            };
        }

        if let Some(rate) = metrics.rate(self.metric) {
            return rate.rate();
        }

        let counter = metrics.counter(self.metric)?;
        match self.aggregation {
            Aggregation::Rate => counter.rate(),
            _ => counter.count(),
        }
    }

    /// Compare the observed aggregate against the limit.
    ///
    /// A metric without samples has nothing to breach, so the verdict passes and is marked as
    /// having no data.
    pub fn evaluate(&self, metrics: &RunMetrics) -> ThresholdVerdict {
        let observed = self.observe(metrics);
        ThresholdVerdict {
            metric: self.metric.name().to_string(),
            expression: self.expression.clone(),
            observed,
            passed: observed
                .map(|observed| self.comparison.holds(observed, self.limit))
                .unwrap_or(true),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdVerdict {
    pub metric: String,
    pub expression: String,
    pub observed: Option<f64>,
    pub passed: bool,
}

impl ThresholdVerdict {
    pub fn is_no_data(&self) -> bool {
        self.observed.is_none()
    }

    pub(crate) fn to_row(&self) -> ThresholdRow {
        ThresholdRow {
            metric: self.metric.clone(),
            threshold: self.expression.clone(),
            observed: self
                .observed
                .map(|observed| format!("{observed:.4}"))
                .unwrap_or_else(|| "no data".to_string()),
            result: if self.passed { "pass" } else { "FAIL" }.to_string(),
        }
    }
}

/// Evaluate every threshold over the same aggregates. Pure, so evaluating twice gives the same
/// verdicts.
pub fn evaluate_thresholds(thresholds: &[Threshold], metrics: &RunMetrics) -> Vec<ThresholdVerdict> {
    thresholds
        .iter()
        .map(|threshold| threshold.evaluate(metrics))
        .collect()
}
