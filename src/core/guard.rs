// Safe-word comparison for discreet cancellation.

/// Case-insensitive exact match after trimming surrounding whitespace from
/// both operands. The trim absorbs the trailing space phone keyboards like
/// to append.
///
/// This is a low-friction discreet cancel, not an authentication boundary.
/// No lockout, no rate limiting, no hashing.
pub fn check(input: &str, configured: &str) -> bool {
    input.trim().to_lowercase() == configured.trim().to_lowercase()
}
