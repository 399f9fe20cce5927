/// Classification of a provider failure for the executor.
///
/// # Behavior Summary
///
/// | Class | Consumes retry budget? | Next step |
/// |-------|------------------------|-----------|
/// | `WithBackoff` | Yes | Same provider after a backoff, or the next candidate once the budget is spent |
/// | `NextProvider` | No | Next candidate immediately |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Transient: network, timeout, rate limit, 5xx.
    WithBackoff,

    /// Permanent for this provider: validation, auth, 4xx, panics.
    /// Retrying the same envelope cannot help, so skip straight to fallback.
    NextProvider,
}
