/// Classification for retry policy.
///
/// Used by the monitor to decide what happens to an entity after a failure
/// has been reported against it.
///
/// # Behavior Summary
///
/// | Class | Re-arm entity? | Entity outcome |
/// |-------|----------------|----------------|
/// | `WithBackoff` | Yes, once the backoff delay elapses | `Retrying` |
/// | `Never` | No | `Failed` |
/// | `Exhausted` | No | `Failed` |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Transient failure (timeout, provider throttle, stall).
    ///
    /// The entity is flipped to `Retrying` after the backoff delay computed by
    /// the retry policy has passed since the error was recorded.
    WithBackoff,

    /// Never retry - bad credentials, forbidden, unknown or invalid entity,
    /// or a critical failure. Retrying won't help.
    Never,

    /// The error was retryable but has used up its attempt budget.
    Exhausted,
}

impl RetryClass {
    /// Whether the error should be re-armed.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::WithBackoff)
    }
}
