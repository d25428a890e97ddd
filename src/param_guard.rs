/// A set of parameters whose values have not been checked for validity. A
/// reference to the checked parameters can only be obtained after checking has
/// completed.
///
/// The validation done in `check_ref()` and `check()` must be identical.
pub trait ParamGuard {
    /// The checked parameters
    type Checked;
    /// Error type resulting from failed checking
    type Error: std::error::Error;

    /// Checks the parameters and returns a reference to the checked
    /// parameters if successful
    fn check_ref(&self) -> Result<&Self::Checked, Self::Error>;

    /// Checks the parameters and returns the checked parameters if successful
    fn check(self) -> Result<Self::Checked, Self::Error>;

    /// Calls `check()` and unwraps the result
    fn check_unwrap(self) -> Self::Checked
    where
        Self: Sized,
    {
        self.check().unwrap()
    }
}
