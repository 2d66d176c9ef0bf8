use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc, Weekday};
use chrono_tz::Tz;

use crate::error::ParseError;
use crate::lexicon::Lexicon;

/// Everything the parser needs from the environment. Injecting `now` keeps
/// parsing deterministic for a fixed (now, timezone, locale).
#[derive(Debug, Clone)]
pub struct ParseContext {
    pub now: DateTime<Utc>,
    pub tz: Tz,
    pub timezone_aware: bool,
    pub lexicon: Arc<Lexicon>,
}

impl ParseContext {
    /// Wall-clock arithmetic happens in the user's timezone only when the
    /// host's timezone display preference is enabled.
    pub fn effective_tz(&self) -> Tz {
        if self.timezone_aware { self.tz } else { chrono_tz::UTC }
    }

    pub fn local_now(&self) -> DateTime<Tz> {
        self.now.with_timezone(&self.effective_tz())
    }

    /// Resolve a local wall-clock datetime to UTC, skipping forward over
    /// DST gaps.
    pub fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        let tz = self.effective_tz();
        if let Some(t) = tz.from_local_datetime(&local).earliest() {
            return t.with_timezone(&Utc);
        }
        // Spring-forward gap: try the same wall clock on following days.
        for day_offset in 1..4 {
            let shifted = local + Duration::days(day_offset);
            if let Some(t) = tz.from_local_datetime(&shifted).earliest() {
                return t.with_timezone(&Utc);
            }
        }
        Utc.from_utc_datetime(&local)
    }
}

/// A normalized date phrase, before it is anchored to an instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSpec {
    /// The bare word "day" (only meaningful inside `every`).
    Day,
    Today,
    Tomorrow,
    Everyday,
    Weekday(Weekday),
    PluralWeekday(Weekday),
    Date(NaiveDate),
}

/// A normalized clock phrase. `explicit` hours are already on the 24-hour
/// scale; ambiguous hours (no am/pm, ≤ 12) still need `choose_closest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSpec {
    pub hour: u32,
    pub minute: u32,
    pub explicit: bool,
}

impl ClockSpec {
    /// Resolve an ambiguous hour against the current half of the day in
    /// the user's timezone (the way "at 3" means 3 PM in the afternoon).
    pub fn hour24(&self, ctx: &ParseContext) -> u32 {
        if self.explicit {
            return self.hour;
        }
        if ctx.local_now().hour() >= 12 {
            self.hour % 12 + 12
        } else {
            self.hour % 12
        }
    }
}

/// Parse a clock expression: `noon`, `midnight`, word-numeral hours, bare
/// digit hours, `H:MM`, `H:MMam`, `Hpm`, `HHMM`.
pub fn normalize_time(text: &str, lexicon: &Lexicon) -> Result<ClockSpec, ParseError> {
    let raw = text.trim().to_lowercase();
    if raw.is_empty() {
        return Err(ParseError::UnparseableTime(text.to_string()));
    }

    if raw == lexicon.noon_kw {
        return Ok(ClockSpec { hour: 12, minute: 0, explicit: true });
    }
    if raw == lexicon.midnight_kw {
        return Ok(ClockSpec { hour: 0, minute: 0, explicit: true });
    }

    // Word-numeral hour: "three" → 3, disambiguated later.
    if let Some(n) = lexicon.ones_number(&raw) {
        if (1..=12).contains(&n) {
            return Ok(ClockSpec { hour: n as u32, minute: 0, explicit: false });
        }
        return Err(ParseError::UnparseableTime(text.to_string()));
    }

    // Trailing am/pm, with or without a separating space.
    let compact: String = raw.split_whitespace().collect::<Vec<_>>().join("");
    for (suffix, pm) in [(lexicon.am_kw.as_str(), false), (lexicon.pm_kw.as_str(), true)] {
        if let Some(body) = compact.strip_suffix(suffix) {
            let (hour, minute) = split_clock_digits(body)
                .ok_or_else(|| ParseError::UnparseableTime(text.to_string()))?;
            if !(1..=12).contains(&hour) || minute > 59 {
                return Err(ParseError::UnparseableTime(text.to_string()));
            }
            let hour = match (hour, pm) {
                (12, false) => 0,
                (12, true) => 12,
                (h, false) => h,
                (h, true) => h + 12,
            };
            return Ok(ClockSpec { hour, minute, explicit: true });
        }
    }

    // H:MM on the 24-hour scale; hours above 12 are unambiguous.
    if let Some((h, m)) = compact.split_once(':') {
        let hour: u32 = h.parse().map_err(|_| ParseError::UnparseableTime(text.to_string()))?;
        let minute: u32 = m.parse().map_err(|_| ParseError::UnparseableTime(text.to_string()))?;
        if hour > 23 || minute > 59 {
            return Err(ParseError::UnparseableTime(text.to_string()));
        }
        let explicit = hour > 12 || hour == 0;
        return Ok(ClockSpec { hour, minute, explicit });
    }

    // All-digit forms: bare hour, or military HMM/HHMM.
    if compact.chars().all(|c| c.is_ascii_digit()) {
        match compact.len() {
            1 | 2 => {
                let hour: u32 = compact.parse().map_err(|_| ParseError::UnparseableTime(text.to_string()))?;
                if hour > 23 {
                    return Err(ParseError::UnparseableTime(text.to_string()));
                }
                let explicit = hour > 12 || hour == 0;
                return Ok(ClockSpec { hour, minute: 0, explicit });
            }
            3 | 4 => {
                let split = compact.len() - 2;
                let hour: u32 = compact[..split].parse().map_err(|_| ParseError::UnparseableTime(text.to_string()))?;
                let minute: u32 = compact[split..].parse().map_err(|_| ParseError::UnparseableTime(text.to_string()))?;
                if hour > 23 || minute > 59 {
                    return Err(ParseError::UnparseableTime(text.to_string()));
                }
                return Ok(ClockSpec { hour, minute, explicit: true });
            }
            _ => return Err(ParseError::UnparseableTime(text.to_string())),
        }
    }

    Err(ParseError::UnparseableTime(text.to_string()))
}

fn split_clock_digits(body: &str) -> Option<(u32, u32)> {
    if let Some((h, m)) = body.split_once(':') {
        return Some((h.parse().ok()?, m.parse().ok()?));
    }
    if body.is_empty() || !body.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    match body.len() {
        1 | 2 => Some((body.parse().ok()?, 0)),
        3 | 4 => {
            let split = body.len() - 2;
            Some((body[..split].parse().ok()?, body[split..].parse().ok()?))
        }
        _ => None,
    }
}

/// Parse a date phrase: relative words, weekday names (plus abbreviations
/// and plurals), month-day[-year], numeric M/D[/Y], or a bare ordinal day.
pub fn normalize_date(text: &str, ctx: &ParseContext) -> Result<DateSpec, ParseError> {
    let lexicon = &ctx.lexicon;
    let raw = text.trim().to_lowercase();
    if raw.is_empty() {
        return Err(ParseError::UnparseableDate(text.to_string()));
    }

    if raw == lexicon.day_kw {
        return Ok(DateSpec::Day);
    }
    if raw == lexicon.today_kw {
        return Ok(DateSpec::Today);
    }
    if raw == lexicon.tomorrow_kw {
        return Ok(DateSpec::Tomorrow);
    }
    if raw == lexicon.everyday_kw {
        return Ok(DateSpec::Everyday);
    }
    if let Some(wd) = lexicon.weekday(&raw) {
        return Ok(DateSpec::Weekday(wd));
    }
    if let Some(wd) = lexicon.plural_weekday(&raw) {
        return Ok(DateSpec::PluralWeekday(wd));
    }

    let cleaned = raw.replace(',', "");
    let parts: Vec<&str> = cleaned.split_whitespace().collect();

    // Month-day[-year] phrases ("january 31st", "jan 31 2020").
    if parts.iter().any(|p| lexicon.month(p).is_some()) {
        let month = lexicon
            .month(parts[0])
            .ok_or_else(|| ParseError::MonthNotFound(text.to_string()))?;
        if parts.len() < 2 || parts.len() > 3 {
            return Err(ParseError::UnparseableDate(text.to_string()));
        }
        let day = parse_day_token(parts[1], lexicon)?;
        let year = match parts.get(2) {
            Some(y) => y
                .parse::<i32>()
                .map_err(|_| ParseError::UnparseableDate(text.to_string()))?,
            None => ctx.local_now().year(),
        };
        return NaiveDate::from_ymd_opt(year, month, day)
            .map(DateSpec::Date)
            .ok_or_else(|| ParseError::UnparseableDate(text.to_string()));
    }

    // Numeric M/D, M/D/Y, M/D/YY.
    if cleaned.contains('/') || (cleaned.contains('-') && cleaned.split('-').all(|p| p.chars().all(|c| c.is_ascii_digit()))) {
        let fields: Vec<&str> = cleaned.split(['/', '-']).collect();
        if fields.len() == 2 || fields.len() == 3 {
            let month: u32 = fields[0]
                .parse()
                .map_err(|_| ParseError::UnparseableDate(text.to_string()))?;
            let day: u32 = fields[1]
                .parse()
                .map_err(|_| ParseError::UnparseableDate(text.to_string()))?;
            let year = match fields.get(2) {
                Some(y) => {
                    let mut n: i32 = y
                        .parse()
                        .map_err(|_| ParseError::UnparseableDate(text.to_string()))?;
                    if y.len() == 2 {
                        n += 2000;
                    }
                    n
                }
                None => ctx.local_now().year(),
            };
            return NaiveDate::from_ymd_opt(year, month, day)
                .map(DateSpec::Date)
                .ok_or_else(|| ParseError::UnparseableDate(text.to_string()));
        }
        return Err(ParseError::UnparseableDate(text.to_string()));
    }

    // Bare day of the current month ("23rd", "twenty-third", "7"); a day
    // already behind us rolls forward one month.
    if parts.len() == 1 {
        let day = parse_day_token(parts[0], lexicon)?;
        let today = ctx.local_now().date_naive();
        let mut date = NaiveDate::from_ymd_opt(today.year(), today.month(), day)
            .ok_or_else(|| ParseError::UnparseableDate(text.to_string()))?;
        if date < today {
            date = date
                .checked_add_months(Months::new(1))
                .ok_or_else(|| ParseError::UnparseableDate(text.to_string()))?;
        }
        return Ok(DateSpec::Date(date));
    }

    Err(ParseError::UnparseableDate(text.to_string()))
}

/// "23", "23rd", or "twenty-third" → 23.
fn parse_day_token(token: &str, lexicon: &Lexicon) -> Result<u32, ParseError> {
    let stripped = lexicon.strip_ordinal_suffix(token).unwrap_or(token);
    if let Ok(n) = stripped.parse::<u32>() {
        if (1..=31).contains(&n) {
            return Ok(n);
        }
        return Err(ParseError::UnparseableDate(token.to_string()));
    }
    let n = word_to_number(token, lexicon)?;
    if (1..=31).contains(&n) {
        Ok(n as u32)
    } else {
        Err(ParseError::UnparseableDate(token.to_string()))
    }
}

/// Left-to-right word-number accumulator: ones and ordinals add directly,
/// tens add, scale words multiply the running previous value. Zero total
/// means nothing matched.
pub fn word_to_number(text: &str, lexicon: &Lexicon) -> Result<i64, ParseError> {
    let mut sum: i64 = 0;
    let mut previous: i64 = 0;

    for split in text.to_lowercase().split_whitespace() {
        if let Some(n) = lexicon.ones_number(split) {
            sum += n;
            previous += n;
        } else if let Some(scale) = lexicon.scale_number(split) {
            if sum != 0 {
                sum -= previous;
            }
            sum += previous * scale;
            previous = 0;
        } else if let Some(n) = lexicon.tens_number(split) {
            sum += n;
        }
    }

    if sum == 0 {
        return Err(ParseError::CouldNotFormatNumber(text.to_string()));
    }
    Ok(sum)
}

/// Disambiguate a same-day wall-clock candidate against "now": keep it if
/// it is still ahead; with an explicit am/pm roll a whole day; otherwise
/// try the other half of the day before rolling.
pub fn choose_closest(ctx: &ParseContext, candidate: NaiveDateTime, day_interval: bool) -> DateTime<Utc> {
    let chosen = ctx.to_utc(candidate);
    if chosen >= ctx.now {
        return chosen;
    }
    if day_interval {
        return chosen + Duration::hours(24);
    }
    if chosen + Duration::hours(12) < ctx.now {
        chosen + Duration::hours(24)
    } else {
        chosen + Duration::hours(12)
    }
}

/// Days until the next occurrence of `target`, counting a same-day hit as
/// a full week out.
pub fn days_until_weekday(today: Weekday, target: Weekday) -> i64 {
    let ahead = (target.num_days_from_monday() as i64 - today.num_days_from_monday() as i64 + 7) % 7;
    if ahead == 0 { 7 } else { ahead }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::Catalog;

    fn ctx() -> ParseContext {
        // Monday 2019-01-14 10:00 UTC, the reference instant used across
        // the parser tests.
        ParseContext {
            now: Utc.with_ymd_and_hms(2019, 1, 14, 10, 0, 0).unwrap(),
            tz: chrono_tz::UTC,
            timezone_aware: true,
            lexicon: Catalog::builtin("en").unwrap().get("en"),
        }
    }

    fn clock(hour: u32, minute: u32, explicit: bool) -> ClockSpec {
        ClockSpec { hour, minute, explicit }
    }

    #[test]
    fn normalizes_clock_forms() {
        let lex = ctx().lexicon.clone();
        assert_eq!(normalize_time("noon", &lex).unwrap(), clock(12, 0, true));
        assert_eq!(normalize_time("midnight", &lex).unwrap(), clock(0, 0, true));
        assert_eq!(normalize_time("3:30pm", &lex).unwrap(), clock(15, 30, true));
        assert_eq!(normalize_time("3:30 pm", &lex).unwrap(), clock(15, 30, true));
        assert_eq!(normalize_time("12:15am", &lex).unwrap(), clock(0, 15, true));
        assert_eq!(normalize_time("7pm", &lex).unwrap(), clock(19, 0, true));
        assert_eq!(normalize_time("1400", &lex).unwrap(), clock(14, 0, true));
        assert_eq!(normalize_time("130", &lex).unwrap(), clock(1, 30, true));
        assert_eq!(normalize_time("9:45", &lex).unwrap(), clock(9, 45, false));
        assert_eq!(normalize_time("three", &lex).unwrap(), clock(3, 0, false));
        assert_eq!(normalize_time("3", &lex).unwrap(), clock(3, 0, false));
    }

    #[test]
    fn hour_13_is_pm_hour_25_is_error() {
        let lex = ctx().lexicon.clone();
        let thirteen = normalize_time("13", &lex).unwrap();
        assert_eq!(thirteen, clock(13, 0, true));
        assert!(matches!(
            normalize_time("25", &lex),
            Err(ParseError::UnparseableTime(_))
        ));
        assert!(matches!(
            normalize_time("9:61", &lex),
            Err(ParseError::UnparseableTime(_))
        ));
    }

    #[test]
    fn ambiguous_hour_takes_current_half_of_day() {
        let c = ctx(); // 10:00, morning
        assert_eq!(normalize_time("3", &c.lexicon).unwrap().hour24(&c), 3);
        let mut afternoon = ctx();
        afternoon.now = Utc.with_ymd_and_hms(2019, 1, 14, 14, 0, 0).unwrap();
        assert_eq!(normalize_time("3", &afternoon.lexicon).unwrap().hour24(&afternoon), 15);
    }

    #[test]
    fn normalizes_date_words_and_weekdays() {
        let c = ctx();
        assert_eq!(normalize_date("today", &c).unwrap(), DateSpec::Today);
        assert_eq!(normalize_date("tomorrow", &c).unwrap(), DateSpec::Tomorrow);
        assert_eq!(normalize_date("wed", &c).unwrap(), DateSpec::Weekday(Weekday::Wed));
        assert_eq!(
            normalize_date("saturdays", &c).unwrap(),
            DateSpec::PluralWeekday(Weekday::Sat)
        );
    }

    #[test]
    fn normalizes_month_day_phrases() {
        let c = ctx();
        assert_eq!(
            normalize_date("january 31st", &c).unwrap(),
            DateSpec::Date(NaiveDate::from_ymd_opt(2019, 1, 31).unwrap())
        );
        assert_eq!(
            normalize_date("jan 31, 2020", &c).unwrap(),
            DateSpec::Date(NaiveDate::from_ymd_opt(2020, 1, 31).unwrap())
        );
        assert_eq!(
            normalize_date("may twenty-third", &c).unwrap(),
            DateSpec::Date(NaiveDate::from_ymd_opt(2019, 5, 23).unwrap())
        );
        assert!(matches!(
            normalize_date("31st january", &c),
            Err(ParseError::MonthNotFound(_))
        ));
    }

    #[test]
    fn normalizes_numeric_dates() {
        let c = ctx();
        assert_eq!(
            normalize_date("2/14", &c).unwrap(),
            DateSpec::Date(NaiveDate::from_ymd_opt(2019, 2, 14).unwrap())
        );
        assert_eq!(
            normalize_date("2/14/21", &c).unwrap(),
            DateSpec::Date(NaiveDate::from_ymd_opt(2021, 2, 14).unwrap())
        );
        assert_eq!(
            normalize_date("12/31/2020", &c).unwrap(),
            DateSpec::Date(NaiveDate::from_ymd_opt(2020, 12, 31).unwrap())
        );
        assert!(matches!(
            normalize_date("13/40", &c),
            Err(ParseError::UnparseableDate(_))
        ));
    }

    #[test]
    fn bare_day_rolls_forward_when_past() {
        let c = ctx(); // Jan 14
        assert_eq!(
            normalize_date("23rd", &c).unwrap(),
            DateSpec::Date(NaiveDate::from_ymd_opt(2019, 1, 23).unwrap())
        );
        // The 7th already passed this month.
        assert_eq!(
            normalize_date("7th", &c).unwrap(),
            DateSpec::Date(NaiveDate::from_ymd_opt(2019, 2, 7).unwrap())
        );
    }

    #[test]
    fn word_numbers_accumulate() {
        let lex = ctx().lexicon.clone();
        assert_eq!(word_to_number("five", &lex).unwrap(), 5);
        assert_eq!(word_to_number("twenty three", &lex).unwrap(), 23);
        assert_eq!(word_to_number("twenty-third", &lex).unwrap(), 23);
        assert_eq!(word_to_number("one hundred", &lex).unwrap(), 100);
        assert_eq!(word_to_number("two thousand", &lex).unwrap(), 2000);
        assert!(matches!(
            word_to_number("gibberish", &lex),
            Err(ParseError::CouldNotFormatNumber(_))
        ));
    }

    #[test]
    fn choose_closest_policy() {
        let c = ctx(); // now = 10:00
        let date = c.local_now().date_naive();

        // Still ahead today.
        let at_15 = date.and_hms_opt(15, 0, 0).unwrap();
        assert_eq!(choose_closest(&c, at_15, false), c.now + Duration::hours(5));

        // Explicit am/pm already elapsed: same clock tomorrow.
        let at_9 = date.and_hms_opt(9, 0, 0).unwrap();
        assert_eq!(choose_closest(&c, at_9, true), c.now + Duration::hours(23));

        // Ambiguous elapsed hour: the other half of the day comes first.
        assert_eq!(choose_closest(&c, at_9, false), c.now + Duration::hours(11));

        // Other half also elapsed: roll a full day.
        let mut evening = ctx();
        evening.now = Utc.with_ymd_and_hms(2019, 1, 14, 22, 0, 0).unwrap();
        let at_3 = date.and_hms_opt(3, 0, 0).unwrap();
        assert_eq!(
            choose_closest(&evening, at_3, false),
            Utc.with_ymd_and_hms(2019, 1, 15, 3, 0, 0).unwrap()
        );
    }

    #[test]
    fn weekday_distance_counts_same_day_as_next_week() {
        assert_eq!(days_until_weekday(Weekday::Mon, Weekday::Mon), 7);
        assert_eq!(days_until_weekday(Weekday::Mon, Weekday::Tue), 1);
        assert_eq!(days_until_weekday(Weekday::Wed, Weekday::Mon), 5);
        assert_eq!(days_until_weekday(Weekday::Sun, Weekday::Mon), 1);
    }
}
