/// Return this error from a request script to retire the virtual user that is running it.
///
/// Ordinary errors are recorded and the virtual user carries on with its next iteration. Bailing
/// is for the case where the script knows that every further iteration would fail in the same
/// way, for example when it could not obtain the credentials it needs. The rest of the run is
/// not affected.
#[derive(derive_more::Error, derive_more::Display, Debug)]
pub struct VuBailError {
    msg: String,
}

impl VuBailError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

impl Default for VuBailError {
    fn default() -> Self {
        Self {
            msg: "Virtual user is bailing".to_string(),
        }
    }
}
