/// The scenario definition is invalid. Fatal, the run does not start.
///
/// All problems found while validating a definition are collected so that they can be fixed in
/// one go rather than one per attempt.
#[derive(derive_more::Error, derive_more::Display, Debug, Clone, PartialEq)]
#[display("Invalid scenario configuration: {}", problems.join("; "))]
pub struct ConfigError {
    problems: Vec<String>,
}

impl ConfigError {
    pub fn new(problem: impl Into<String>) -> Self {
        Self {
            problems: vec![problem.into()],
        }
    }

    pub fn from_problems(problems: Vec<String>) -> Self {
        Self { problems }
    }

    pub fn problems(&self) -> &[String] {
        &self.problems
    }
}

/// An HTTP call could not be completed, because of a connection failure, a timeout or an
/// unreadable response.
///
/// By the time a script sees this error the failed call has already been recorded as a failed
/// HTTP outcome, so the runner does not record it again.
#[derive(derive_more::Error, derive_more::Display, Debug, Clone, PartialEq)]
#[display("Request [{request}] failed: {reason}")]
pub struct RequestError {
    request: String,
    reason: String,
}

impl RequestError {
    pub fn new(request: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            reason: reason.into(),
        }
    }

    pub fn request(&self) -> &str {
        &self.request
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// A required check evaluated to false. The failed check is recorded before this is returned.
#[derive(derive_more::Error, derive_more::Display, Debug, Clone, PartialEq)]
#[display("Check [{check}] failed")]
pub struct AssertionFailure {
    check: String,
}

impl AssertionFailure {
    pub fn new(check: impl Into<String>) -> Self {
        Self {
            check: check.into(),
        }
    }

    pub fn check(&self) -> &str {
        &self.check
    }
}

/// One or more thresholds were not met at the end of a run.
#[derive(derive_more::Error, derive_more::Display, Debug, Clone, PartialEq)]
#[display("{} threshold(s) breached: {}", breached.len(), breached.join(", "))]
pub struct ThresholdBreach {
    breached: Vec<String>,
}

impl ThresholdBreach {
    pub fn new(breached: Vec<String>) -> Self {
        Self { breached }
    }

    pub fn breached(&self) -> &[String] {
        &self.breached
    }
}
