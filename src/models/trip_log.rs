//! Append-only trip event log

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TripEventType {
    Start,
    Stop,
    Resume,
    End,
}

impl TripEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripEventType::Start => "start",
            TripEventType::Stop => "stop",
            TripEventType::Resume => "resume",
            TripEventType::End => "end",
        }
    }
}

impl std::fmt::Display for TripEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TripEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(TripEventType::Start),
            "stop" => Ok(TripEventType::Stop),
            "resume" => Ok(TripEventType::Resume),
            "end" => Ok(TripEventType::End),
            _ => Err(format!("Invalid trip event type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TripLogRow {
    id: Uuid,
    trip_id: Uuid,
    event_type: String,
    recorded_at: DateTime<Utc>,
    reason: Option<String>,
    notes: Option<String>,
}

impl TryFrom<TripLogRow> for TripLogEntry {
    type Error = AppError;

    fn try_from(row: TripLogRow) -> Result<Self, Self::Error> {
        Ok(TripLogEntry {
            id: row.id,
            trip_id: row.trip_id,
            event_type: row.event_type.parse().map_err(AppError::Internal)?,
            timestamp: row.recorded_at,
            reason: row.reason,
            notes: row.notes,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TripLogEntry {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub event_type: TripEventType,
    /// Server-stamped; strictly increasing within a trip
    pub timestamp: DateTime<Utc>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

/// Event waiting to be appended; the store assigns id and timestamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTripEvent {
    pub event_type: TripEventType,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

impl NewTripEvent {
    pub fn into_entry(self, trip_id: Uuid, timestamp: DateTime<Utc>) -> TripLogEntry {
        TripLogEntry {
            id: Uuid::new_v4(),
            trip_id,
            event_type: self.event_type,
            timestamp,
            reason: self.reason,
            notes: self.notes,
        }
    }
}

/// Driver-submitted stop/resume event
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LogTripEvent {
    pub event_type: TripEventType,
    /// Required for stop events
    pub reason: Option<String>,
    pub notes: Option<String>,
}

/// Checks that `next` may follow `last` in a trip's log.
///
/// The log opens with a single start, stops alternate with resumes and a
/// single end closes it.
pub fn ensure_can_append(last: Option<TripEventType>, next: TripEventType) -> AppResult<()> {
    use TripEventType as T;

    let allowed = match (last, next) {
        (None, T::Start) => true,
        (None, _) | (Some(_), T::Start) | (Some(T::End), _) => false,
        (Some(T::Stop), T::Stop) => false,
        (Some(_), T::Stop) => true,
        (Some(T::Stop), T::Resume) => true,
        (Some(_), T::Resume) => false,
        (Some(_), T::End) => true,
    };

    if allowed {
        return Ok(());
    }

    let message = match (last, next) {
        (Some(T::Stop), T::Stop) => {
            "Trip is already stopped; resume before stopping again".to_string()
        }
        (Some(_), T::Resume) => "Trip is not stopped; nothing to resume".to_string(),
        (Some(T::End), _) => "Trip has already ended".to_string(),
        (None, event) => format!("A trip log must open with start, not {}", event),
        (Some(_), event) => format!("Cannot record {} at this point of the trip", event),
    };
    Err(AppError::StateConflict(message))
}

/// Server-side stamp for the next entry, strictly after `last`.
///
/// Stamps carry microsecond precision so they survive storage unchanged.
pub fn next_timestamp(last: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    let now = now.trunc_subsecs(6);
    match last {
        Some(last) if now <= last => last + Duration::microseconds(1),
        _ => now,
    }
}

/// On-duty versus stopped time reconstructed from a trip log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DutySummary {
    pub on_duty_seconds: i64,
    pub stopped_seconds: i64,
    pub stop_count: u32,
}

impl DutySummary {
    /// Open intervals (active trips, unresumed stops) are measured up to `as_of`.
    pub fn from_entries(entries: &[TripLogEntry], as_of: DateTime<Utc>) -> Self {
        let mut summary = DutySummary {
            on_duty_seconds: 0,
            stopped_seconds: 0,
            stop_count: 0,
        };

        let Some(first) = entries.first() else {
            return summary;
        };

        let mut stopped_since: Option<DateTime<Utc>> = None;
        let mut stopped = Duration::zero();
        let mut finished_at = None;

        for entry in entries {
            match entry.event_type {
                TripEventType::Start => {}
                TripEventType::Stop => {
                    summary.stop_count += 1;
                    stopped_since = Some(entry.timestamp);
                }
                TripEventType::Resume => {
                    if let Some(since) = stopped_since.take() {
                        stopped = stopped + (entry.timestamp - since);
                    }
                }
                TripEventType::End => {
                    if let Some(since) = stopped_since.take() {
                        stopped = stopped + (entry.timestamp - since);
                    }
                    finished_at = Some(entry.timestamp);
                }
            }
        }

        let until = finished_at.unwrap_or(as_of).max(first.timestamp);
        if let Some(since) = stopped_since {
            stopped = stopped + (until.max(since) - since);
        }

        let total = until - first.timestamp;
        summary.stopped_seconds = stopped.num_seconds();
        summary.on_duty_seconds = (total - stopped).num_seconds().max(0);
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 8, minute, 0).unwrap()
    }

    fn entry(event_type: TripEventType, minute: u32) -> TripLogEntry {
        NewTripEvent {
            event_type,
            reason: None,
            notes: None,
        }
        .into_entry(Uuid::nil(), at(minute))
    }

    #[test]
    fn test_log_must_open_with_start() {
        use TripEventType as T;
        assert!(ensure_can_append(None, T::Start).is_ok());
        for event in [T::Stop, T::Resume, T::End] {
            assert!(matches!(ensure_can_append(None, event), Err(AppError::StateConflict(_))));
        }
        assert!(ensure_can_append(Some(T::Resume), T::Start).is_err());
    }

    #[test]
    fn test_no_stop_after_stop() {
        use TripEventType as T;
        assert!(ensure_can_append(Some(T::Start), T::Stop).is_ok());
        assert!(matches!(
            ensure_can_append(Some(T::Stop), T::Stop),
            Err(AppError::StateConflict(_))
        ));
        assert!(ensure_can_append(Some(T::Stop), T::Resume).is_ok());
        assert!(ensure_can_append(Some(T::Resume), T::Stop).is_ok());
    }

    #[test]
    fn test_resume_requires_stop() {
        use TripEventType as T;
        assert!(ensure_can_append(Some(T::Start), T::Resume).is_err());
        assert!(ensure_can_append(Some(T::Resume), T::Resume).is_err());
    }

    #[test]
    fn test_end_is_final() {
        use TripEventType as T;
        assert!(ensure_can_append(Some(T::Start), T::End).is_ok());
        assert!(ensure_can_append(Some(T::Stop), T::End).is_ok());
        for event in [T::Start, T::Stop, T::Resume, T::End] {
            assert!(ensure_can_append(Some(T::End), event).is_err());
        }
    }

    #[test]
    fn test_next_timestamp_corrects_skew() {
        let last = at(10);
        assert_eq!(next_timestamp(Some(last), at(5)), last + Duration::microseconds(1));
        assert_eq!(next_timestamp(Some(last), last), last + Duration::microseconds(1));
        assert_eq!(next_timestamp(Some(last), at(11)), at(11));
        assert_eq!(next_timestamp(None, at(3)), at(3));
    }

    #[test]
    fn test_duty_summary_completed_trip() {
        use TripEventType as T;
        let entries = vec![
            entry(T::Start, 0),
            entry(T::Stop, 10),
            entry(T::Resume, 25),
            entry(T::Stop, 40),
            entry(T::End, 50),
        ];
        let summary = DutySummary::from_entries(&entries, at(59));
        assert_eq!(summary.stop_count, 2);
        assert_eq!(summary.stopped_seconds, 25 * 60);
        assert_eq!(summary.on_duty_seconds, 25 * 60);
    }

    #[test]
    fn test_duty_summary_active_trip_measures_to_now() {
        use TripEventType as T;
        let entries = vec![entry(T::Start, 0), entry(T::Stop, 20)];
        let summary = DutySummary::from_entries(&entries, at(30));
        assert_eq!(summary.on_duty_seconds, 20 * 60);
        assert_eq!(summary.stopped_seconds, 10 * 60);
    }

    #[test]
    fn test_duty_summary_empty_log() {
        let summary = DutySummary::from_entries(&[], at(0));
        assert_eq!(summary.on_duty_seconds, 0);
        assert_eq!(summary.stop_count, 0);
    }
}
