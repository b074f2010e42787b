use std::time::Duration;

use chrono::{DateTime, FixedOffset, Local, TimeZone, Utc};

use crate::config::{ExpiryMode, MarriageConfig};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);
const MIN_TTL: Duration = Duration::from_secs(1);

/// How long a pairing made at `now` stays valid.
pub fn pairing_ttl(config: &MarriageConfig, now: DateTime<Utc>) -> Duration {
    match config.expiry {
        ExpiryMode::Rolling => Duration::from_secs(config.rolling_hours.saturating_mul(3600)),
        ExpiryMode::Midnight => match config.utc_offset_minutes {
            Some(minutes) => FixedOffset::east_opt(minutes * 60)
                .map(|tz| until_next_midnight(&now.with_timezone(&tz)))
                .unwrap_or(DAY),
            None => until_next_midnight(&now.with_timezone(&Local)),
        },
    }
}

pub(crate) fn until_next_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> Duration {
    let tz = now.timezone();
    let next = now
        .date_naive()
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .and_then(|midnight| tz.from_local_datetime(&midnight).earliest());

    match next {
        Some(next) => next
            .signed_duration_since(now)
            .to_std()
            .unwrap_or(MIN_TTL)
            .max(MIN_TTL),
        // Midnight skipped by a zone transition.
        None => DAY,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{FixedOffset, TimeZone, Utc};

    use super::{pairing_ttl, until_next_midnight};
    use crate::config::{ExpiryMode, MarriageConfig};

    #[test]
    fn half_an_hour_before_midnight() {
        let tz = FixedOffset::east_opt(0).unwrap();
        let now = tz.with_ymd_and_hms(2024, 5, 1, 23, 30, 0).unwrap();
        assert_eq!(until_next_midnight(&now), Duration::from_secs(30 * 60));
    }

    #[test]
    fn exactly_midnight_lasts_a_full_day() {
        let tz = FixedOffset::east_opt(0).unwrap();
        let now = tz.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        assert_eq!(until_next_midnight(&now), Duration::from_secs(86_400));
    }

    #[test]
    fn configured_offset_moves_the_deadline() {
        let config = MarriageConfig {
            utc_offset_minutes: Some(8 * 60),
            ..MarriageConfig::default()
        };
        // 15:00 UTC is 23:00 at +08:00.
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 15, 0, 0).unwrap();
        assert_eq!(pairing_ttl(&config, now), Duration::from_secs(3600));
    }

    #[test]
    fn negative_offset_crosses_the_utc_date() {
        let config = MarriageConfig {
            utc_offset_minutes: Some(-5 * 60),
            ..MarriageConfig::default()
        };
        // 02:00 UTC on the 2nd is 21:00 on the 1st at -05:00.
        let now = Utc.with_ymd_and_hms(2024, 5, 2, 2, 0, 0).unwrap();
        assert_eq!(pairing_ttl(&config, now), Duration::from_secs(3 * 3600));
    }

    #[test]
    fn rolling_expiry_uses_configured_hours() {
        let config = MarriageConfig {
            expiry: ExpiryMode::Rolling,
            rolling_hours: 6,
            ..MarriageConfig::default()
        };
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 23, 59, 0).unwrap();
        assert_eq!(pairing_ttl(&config, now), Duration::from_secs(6 * 3600));
    }
}
