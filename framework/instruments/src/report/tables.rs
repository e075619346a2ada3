use tabled::Tabled;

#[derive(Tabled)]
pub struct RequestRow {
    pub name: String,
    pub requests: usize,
    pub failed: usize,
    #[tabled(display = "float2")]
    pub avg_ms: f64,
    #[tabled(display = "float2")]
    pub min_ms: f64,
    #[tabled(display = "float2")]
    pub med_ms: f64,
    #[tabled(display = "float2")]
    pub p95_ms: f64,
    #[tabled(display = "float2")]
    pub max_ms: f64,
}

#[derive(Tabled)]
pub struct CheckRow {
    pub check: String,
    pub passed: usize,
    pub failed: usize,
    #[tabled(display = "percent")]
    pub rate: f64,
}

/// One line of the thresholds table. The runner fills these in from its verdicts.
#[derive(Tabled, Debug, Clone, PartialEq)]
pub struct ThresholdRow {
    pub metric: String,
    pub threshold: String,
    pub observed: String,
    pub result: String,
}

fn float2(n: &f64) -> String {
    format!("{:.2}", n)
}

fn percent(n: &f64) -> String {
    format!("{:.2}%", n * 100.0)
}
