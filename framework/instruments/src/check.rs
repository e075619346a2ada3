/// A named predicate over some value a request script has obtained, usually a response.
pub trait Check<T: ?Sized>: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(&self, subject: &T) -> bool;
}

/// A [Check] built from a closure. See [named].
pub struct NamedCheck<F> {
    name: String,
    predicate: F,
}

impl<F> NamedCheck<F> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T, F> Check<T> for NamedCheck<F>
where
    T: ?Sized,
    F: Fn(&T) -> bool + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, subject: &T) -> bool {
        (self.predicate)(subject)
    }
}

/// Create a check from a name and a predicate.
///
/// ```rust
/// use stampede_instruments::{named, Check};
///
/// let status_ok = named("status 200", |status: &u16| *status == 200);
/// assert_eq!(status_ok.name(), "status 200");
///
/// let check: &dyn Check<u16> = &status_ok;
/// assert!(check.evaluate(&200));
/// assert!(!check.evaluate(&500));
/// ```
pub fn named<T, F>(name: impl Into<String>, predicate: F) -> NamedCheck<F>
where
    T: ?Sized,
    F: Fn(&T) -> bool + Send + Sync,
{
    NamedCheck {
        name: name.into(),
        predicate,
    }
}
