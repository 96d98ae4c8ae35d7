//! # Observation Timestamp
//!
//! Combines a measurement's `date` and `timeSlot` into the instant written
//! as `observedAt`: the end of the slot plus a small random jitter, so that
//! a batch of measurements for the same slot does not collapse onto one
//! timestamp.
//!
//! `"2024-02-01"` + `"00:00-01:00"` → `2024-02-01T01:00:00Z` + `[0, jitter]` min.
//! A slot ending at `24:00` rolls over to `00:00` of the next day.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use rand::Rng;

use crate::{Error, Result};

/// Wire format of `observedAt` values.
pub const OBSERVED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// End of `time_slot` on `date`, shifted by `0..=max_jitter_minutes` minutes.
pub fn observation_time<R: Rng>(
    date: &str,
    time_slot: &str,
    max_jitter_minutes: u32,
    rng: &mut R,
) -> Result<DateTime<Utc>> {
    let day = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|e| invalid(format!("date {date:?}: {e}")))?;
    let (hour, minute) = slot_end(time_slot)?;

    let end = if hour == 24 {
        let next = day.succ_opt().ok_or_else(|| invalid(format!("date {date:?} out of range")))?;
        next.and_time(NaiveTime::MIN)
    } else {
        let t = NaiveTime::from_hms_opt(hour, minute, 0)
            .ok_or_else(|| invalid(format!("time slot {time_slot:?}")))?;
        day.and_time(t)
    };

    let jitter = match max_jitter_minutes {
        0 => 0,
        max => rng.random_range(0..=max),
    };
    Ok(Utc.from_utc_datetime(&end) + Duration::minutes(i64::from(jitter)))
}

/// `"HH:MM-HH:MM"` → end `(hour, minute)`; `24:00` is accepted.
fn slot_end(time_slot: &str) -> Result<(u32, u32)> {
    let bad = || invalid(format!("time slot {time_slot:?}, expected HH:MM-HH:MM"));
    let (_, end) = time_slot.trim().split_once('-').ok_or_else(bad)?;
    let (h, m) = end.trim().split_once(':').ok_or_else(bad)?;
    let hour: u32 = h.parse().map_err(|_| bad())?;
    let minute: u32 = m.parse().map_err(|_| bad())?;
    match (hour, minute) {
        (24, 0) => Ok((24, 0)),
        (0..=23, 0..=59) => Ok((hour, minute)),
        _ => Err(bad()),
    }
}

fn invalid(msg: String) -> Error {
    Error::InvalidMeasurement(msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_end_of_slot_without_jitter() {
        let at = observation_time("2024-02-01", "00:00-01:00", 0, &mut rng()).unwrap();
        assert_eq!(at.format(OBSERVED_AT_FORMAT).to_string(), "2024-02-01T01:00:00Z");
    }

    #[test]
    fn test_jitter_is_bounded() {
        let base = Utc.with_ymd_and_hms(2024, 2, 1, 1, 0, 0).unwrap();
        let mut rng = rng();
        for _ in 0..200 {
            let at = observation_time("2024-02-01", "00:00-01:00", 10, &mut rng).unwrap();
            let offset = (at - base).num_minutes();
            assert!((0..=10).contains(&offset), "offset {offset}");
        }
    }

    #[test]
    fn test_midnight_rolls_over() {
        let at = observation_time("2024-02-29", "23:00-24:00", 0, &mut rng()).unwrap();
        assert_eq!(at.format(OBSERVED_AT_FORMAT).to_string(), "2024-03-01T00:00:00Z");
    }

    #[test]
    fn test_rejects_malformed_input() {
        for (date, slot) in [
            ("2024-02-30", "00:00-01:00"),
            ("01/02/2024", "00:00-01:00"),
            ("2024-02-01", "01:00"),
            ("2024-02-01", "00:00-25:00"),
            ("2024-02-01", "23:00-24:30"),
        ] {
            let err = observation_time(date, slot, 0, &mut rng()).unwrap_err();
            assert!(matches!(err, Error::InvalidMeasurement(_)), "{date} {slot}");
        }
    }
}
