//! License validation and key generation
//!
//! Pure functions over caller-supplied license records. Nothing here touches
//! the store: the usage-counter increment that accompanies a successful
//! consumption is a conditional update at the SQL layer (see the consume
//! handler), since two concurrent consumptions would otherwise race on a
//! read-modify-write.

use rand::Rng;
use serde::{Deserialize, Serialize};
use themeloft_shared::License;
use time::OffsetDateTime;

/// Why a license is not currently usable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidReason {
    /// The expiry timestamp is strictly in the past
    Expired,
    /// The usage counter has reached the download ceiling
    Limit,
}

impl std::fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Expired => write!(f, "expired"),
            Self::Limit => write!(f, "limit"),
        }
    }
}

/// Validity verdict for a license record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LicenseVerdict {
    Valid,
    Invalid(InvalidReason),
}

impl LicenseVerdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    pub fn reason(&self) -> Option<InvalidReason> {
        match self {
            Self::Valid => None,
            Self::Invalid(reason) => Some(*reason),
        }
    }
}

/// Evaluate whether a license is currently usable.
///
/// Expiry is checked before the limit; a license failing both reports
/// `Expired`. A license expiring exactly at `now` is still valid (invalidity
/// requires the expiry to be strictly earlier).
pub fn validate_license(license: &License, now: OffsetDateTime) -> LicenseVerdict {
    if let Some(expires_at) = license.expires_at {
        if expires_at < now {
            return LicenseVerdict::Invalid(InvalidReason::Expired);
        }
    }

    if let Some(max_downloads) = license.max_downloads {
        if license.download_count >= max_downloads {
            return LicenseVerdict::Invalid(InvalidReason::Limit);
        }
    }

    LicenseVerdict::Valid
}

const KEY_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const KEY_SEGMENT_LEN: usize = 8;
const KEY_SEGMENTS: usize = 3;

/// Generate a human-readable license key of the form
/// `PREFIX-XXXXXXXX-XXXXXXXX-XXXXXXXX`.
///
/// This is a generator, not an allocator: the unique constraint on
/// `licenses.license_key` is what enforces uniqueness.
pub fn generate_license_key(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let mut key = String::with_capacity(prefix.len() + KEY_SEGMENTS * (KEY_SEGMENT_LEN + 1));
    key.push_str(prefix);

    for _ in 0..KEY_SEGMENTS {
        key.push('-');
        for _ in 0..KEY_SEGMENT_LEN {
            let idx = rng.gen_range(0..KEY_CHARSET.len());
            key.push(KEY_CHARSET[idx] as char);
        }
    }

    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;
    use uuid::Uuid;

    fn license(
        max_downloads: Option<i32>,
        download_count: i32,
        expires_at: Option<OffsetDateTime>,
    ) -> License {
        let now = OffsetDateTime::now_utc();
        License {
            id: Uuid::new_v4(),
            account_id: Uuid::new_v4(),
            theme_id: Uuid::new_v4(),
            license_key: "THEME-AAAAAAAA-BBBBBBBB-CCCCCCCC".to_string(),
            license_type: "single".to_string(),
            max_downloads,
            download_count,
            expires_at,
            created_at: now,
        }
    }

    #[test]
    fn test_expired_license_is_invalid_regardless_of_usage() {
        let now = OffsetDateTime::now_utc();
        let past = now - Duration::days(1);

        let lic = license(Some(100), 0, Some(past));
        assert_eq!(
            validate_license(&lic, now),
            LicenseVerdict::Invalid(InvalidReason::Expired)
        );
    }

    #[test]
    fn test_expiry_reported_before_limit() {
        // Failing both checks reports expired, not limit
        let now = OffsetDateTime::now_utc();
        let past = now - Duration::hours(1);

        let lic = license(Some(5), 5, Some(past));
        assert_eq!(
            validate_license(&lic, now).reason(),
            Some(InvalidReason::Expired)
        );
    }

    #[test]
    fn test_usage_at_ceiling_is_invalid() {
        let now = OffsetDateTime::now_utc();
        let future = now + Duration::days(30);

        let lic = license(Some(5), 5, Some(future));
        assert_eq!(
            validate_license(&lic, now),
            LicenseVerdict::Invalid(InvalidReason::Limit)
        );

        let lic = license(Some(5), 6, None);
        assert_eq!(
            validate_license(&lic, now).reason(),
            Some(InvalidReason::Limit)
        );
    }

    #[test]
    fn test_usage_below_ceiling_is_valid() {
        let now = OffsetDateTime::now_utc();
        let lic = license(Some(5), 4, None);
        assert!(validate_license(&lic, now).is_valid());
    }

    #[test]
    fn test_no_ceiling_no_expiry_is_valid() {
        let now = OffsetDateTime::now_utc();
        let lic = license(None, 1_000_000, None);
        assert!(validate_license(&lic, now).is_valid());
    }

    #[test]
    fn test_expiry_exactly_now_is_still_valid() {
        let now = OffsetDateTime::now_utc();
        let lic = license(None, 0, Some(now));
        assert!(validate_license(&lic, now).is_valid());
    }

    #[test]
    fn test_key_format() {
        let key = generate_license_key("THEME");
        let parts: Vec<&str> = key.split('-').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "THEME");
        for segment in &parts[1..] {
            assert_eq!(segment.len(), 8);
            assert!(segment
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_consecutive_keys_differ() {
        let a = generate_license_key("THEME");
        let b = generate_license_key("THEME");
        assert_ne!(a, b);
    }

    #[test]
    fn test_custom_prefix() {
        let key = generate_license_key("LOFT");
        assert!(key.starts_with("LOFT-"));
    }
}
