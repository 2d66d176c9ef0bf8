use chrono::{DateTime, TimeZone, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// One user's stored intent. `when_phrase` is the original temporal phrase,
/// kept verbatim for re-display and recurrence detection.
#[derive(Debug, Clone)]
pub struct Reminder {
    pub id: String,
    pub team_id: String,
    pub user_id: String,
    pub target: String,
    pub message: String,
    pub when_phrase: String,
    pub completed: Option<DateTime<Utc>>,
}

/// A single scheduled firing. `repeat` is empty for one-shot occurrences,
/// else a copy of the parent reminder's phrase. `snoozed` overrides
/// `occurrence` as a "fire no earlier than" hint.
#[derive(Debug, Clone)]
pub struct Occurrence {
    pub id: String,
    pub user_id: String,
    pub reminder_id: String,
    pub repeat: String,
    pub occurrence: DateTime<Utc>,
    pub snoozed: Option<DateTime<Utc>>,
}

/// Transient input container for a schedule request.
#[derive(Debug, Clone)]
pub struct ReminderRequest {
    pub team_id: String,
    pub user_id: String,
    pub payload: String,
}

/// Read model for reminders. The sentinel string only exists at this
/// boundary; domain structs carry `Option` instead.
#[derive(Debug, Clone, FromRow)]
pub struct ReminderRow {
    pub id: String,
    pub team_id: String,
    pub user_id: String,
    pub target: String,
    pub message: String,
    pub when_phrase: String,
    pub completed: DateTime<Utc>,
}

impl ReminderRow {
    pub fn into_reminder(self) -> Reminder {
        Reminder {
            id: self.id,
            team_id: self.team_id,
            user_id: self.user_id,
            target: self.target,
            message: self.message,
            when_phrase: self.when_phrase,
            completed: unset_if_never(self.completed),
        }
    }
}

/// Read model for occurrences.
#[derive(Debug, Clone, FromRow)]
pub struct OccurrenceRow {
    pub id: String,
    pub user_id: String,
    pub reminder_id: String,
    pub repeat: String,
    pub occurrence: DateTime<Utc>,
    pub snoozed: DateTime<Utc>,
}

impl OccurrenceRow {
    pub fn into_occurrence(self) -> Occurrence {
        Occurrence {
            id: self.id,
            user_id: self.user_id,
            reminder_id: self.reminder_id,
            repeat: self.repeat,
            occurrence: self.occurrence,
            snoozed: unset_if_never(self.snoozed),
        }
    }
}

/// The fixed "never" instant (year 1, February 2) used on the wire and in
/// the database to mean "unset". Equality against this value is the only
/// unset test.
pub fn never() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(1, 2, 2, 0, 0, 0)
        .single()
        .expect("sentinel instant is valid")
}

pub fn unset_if_never(t: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if t == never() { None } else { Some(t) }
}

pub fn never_if_unset(t: Option<DateTime<Utc>>) -> DateTime<Utc> {
    t.unwrap_or_else(never)
}

/// Canonical stored timestamp form: RFC3339 UTC with second precision.
/// The dispatcher's fire-time query relies on exact string equality, so
/// every timestamp bind goes through this.
pub fn format_ts(t: DateTime<Utc>) -> String {
    t.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

const BASE32HEX: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";

/// 26-character lexicographically ordered identifier: the 128 bits of a
/// UUIDv7 in base32hex, lowercase, unpadded. The timestamp-prefixed v7
/// layout keeps creation order and string order aligned.
pub fn new_id() -> String {
    encode_base32hex(Uuid::now_v7().as_bytes())
}

fn encode_base32hex(bytes: &[u8; 16]) -> String {
    let mut out = String::with_capacity(26);
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    for &b in bytes {
        acc = (acc << 8) | b as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(BASE32HEX[((acc >> bits) & 0x1f) as usize] as char);
        }
    }
    if bits > 0 {
        out.push(BASE32HEX[((acc << (5 - bits)) & 0x1f) as usize] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_26_chars_and_ordered() {
        let a = new_id();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = new_id();
        assert_eq!(a.len(), 26);
        assert_eq!(b.len(), 26);
        assert!(a < b, "ids must sort in creation order: {a} vs {b}");
    }

    #[test]
    fn sentinel_round_trip() {
        assert_eq!(unset_if_never(never()), None);
        let t = Utc.with_ymd_and_hms(2019, 1, 14, 10, 0, 0).unwrap();
        assert_eq!(unset_if_never(t), Some(t));
        assert_eq!(never_if_unset(None), never());
        assert_eq!(never_if_unset(Some(t)), t);
    }

    #[test]
    fn stored_form_is_second_precision_utc() {
        let t = Utc.with_ymd_and_hms(2019, 1, 14, 10, 30, 0).unwrap();
        assert_eq!(format_ts(t), "2019-01-14T10:30:00Z");
        assert_eq!(format_ts(never()), "0001-02-02T00:00:00Z");
    }
}
