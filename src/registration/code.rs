use rand::Rng;
use time::{Duration, OffsetDateTime};

/// Number of digits in an activation code.
pub const CODE_LENGTH: usize = 4;

/// Generate a numeric activation code, zero-padded to [`CODE_LENGTH`]
/// digits and uniform over the full range.
///
/// Uniqueness against other live codes is enforced by the store's unique
/// constraint at insertion; the caller retries on collision.
pub fn generate() -> String {
    let n = rand::thread_rng().gen_range(0..10u32.pow(CODE_LENGTH as u32));
    format!("{:0width$}", n, width = CODE_LENGTH)
}

/// A code older than `ttl` is no longer accepted.
pub fn is_expired(created_at: OffsetDateTime, now: OffsetDateTime, ttl: Duration) -> bool {
    now - created_at > ttl
}
