//! Name and backoff helpers shared across the crate.
use std::time::Duration;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ConfigError;

const NAME_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const GENERATED_NAME_LENGTH: usize = 8;
const MAX_NAME_LENGTH: usize = 255;

/// Checks a stream or consumer name against the engine's naming rules.
///
/// Names are used as subject tokens, so they may not be empty, may not
/// contain subject separators or wildcards (`.`, `*`, `>`), path separators
/// or whitespace, and are bounded in length.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LENGTH
        && !name
            .chars()
            .any(|c| matches!(c, '.' | '*' | '>' | '/' | '\\') || c.is_whitespace())
}

/// Generates a short collision-resistant name for ephemeral consumers.
///
/// A random token is digested with SHA-256 and the first eight digest bytes
/// are mapped onto a 62-symbol alphanumeric alphabet. The result is not a
/// security token, only a name unlikely to collide.
pub fn generate_consumer_name() -> String {
    let token = Uuid::new_v4().to_string();
    let digest = Sha256::digest(token.as_bytes());
    digest
        .iter()
        .take(GENERATED_NAME_LENGTH)
        .map(|b| NAME_ALPHABET[(b % NAME_ALPHABET.len() as u8) as usize] as char)
        .collect()
}

/// Produces `steps` retry delays growing linearly from `min` to `max`.
///
/// With a single step only `min` is produced.
pub fn linear_backoff_periods(
    steps: u32,
    min: Duration,
    max: Duration,
) -> Result<Vec<Duration>, ConfigError> {
    if steps == 0 {
        return Err(ConfigError::InvalidBackoff(
            "steps must be more than 0".to_string(),
        ));
    }
    if min.is_zero() {
        return Err(ConfigError::InvalidBackoff(
            "minimum retry can not be 0".to_string(),
        ));
    }
    if max <= min {
        return Err(ConfigError::InvalidBackoff(
            "maximum retry must exceed the minimum".to_string(),
        ));
    }

    if steps == 1 {
        return Ok(vec![min]);
    }

    let increment = (max - min) / (steps - 1);
    Ok((0..steps).map(|i| min + increment * i).collect())
}
