use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};

use crate::clock::{self, ClockSpec, DateSpec, ParseContext};
use crate::error::ParseError;
use crate::lexicon::Unit;

/// Default clock for date-only phrases ("on january 31st").
const DEFAULT_TIME: &str = "9:00am";

/// Output of a successful parse: the delivery target, the free-text
/// message, the verbatim temporal phrase, and the materialized fire
/// instants.
#[derive(Debug, Clone)]
pub struct ParsedReminder {
    pub target: String,
    pub message: String,
    pub when: String,
    pub times: Vec<DateTime<Utc>>,
    pub repeating: bool,
}

/// Parse a raw payload like `me "buy milk" in 10 minutes` or
/// `@alex standup every monday at 9am`.
pub fn parse(payload: &str, ctx: &ParseContext) -> Result<ParsedReminder, ParseError> {
    let payload = payload.trim();
    let lexicon = &ctx.lexicon;

    let target = payload
        .split_whitespace()
        .next()
        .ok_or(ParseError::UnrecognizedTarget)?;
    if target != lexicon.me_kw && !target.starts_with('@') && !target.starts_with('~') {
        return Err(ParseError::UnrecognizedTarget);
    }
    let target = target.to_string();

    let (message, when) = split_message_when(payload, &target, ctx)?;

    let (times, repeating) = materialize_when(&when, ctx)?;

    Ok(ParsedReminder {
        target,
        message,
        when,
        times,
        repeating,
    })
}

/// Quoted mode when the payload carries a quoted message; otherwise locate
/// the temporal phrase and treat the remainder as the message.
fn split_message_when(payload: &str, target: &str, ctx: &ParseContext) -> Result<(String, String), ParseError> {
    if let (Some(first), Some(last)) = (payload.find('"'), payload.rfind('"'))
        && first != last
    {
        let quoted = &payload[first..=last];
        let message = quoted.trim_matches('"').to_string();
        let when = payload
            .replacen(quoted, "", 1)
            .replacen(target, "", 1)
            .trim()
            .to_string();
        return Ok((message, when));
    }

    let when = find_when(payload, ctx)?;
    let message = payload
        .replacen(&when, "", 1)
        .replacen(target, "", 1)
        .trim()
        .trim_matches('"')
        .trim()
        .to_string();
    Ok((message, when))
}

/// Locate the temporal phrase inside an unquoted payload: an ordered
/// keyword scan, then tail heuristics over the last tokens.
fn find_when(payload: &str, ctx: &ParseContext) -> Result<String, ParseError> {
    let lexicon = &ctx.lexicon;
    let tokens = tokens_with_offsets(payload);
    let pos = |kw: &str| {
        tokens
            .iter()
            .position(|(_, t)| t.eq_ignore_ascii_case(kw))
    };
    let suffix_from = |i: usize| payload[tokens[i].0..].trim().to_string();

    // `in` wins outright.
    if let Some(i) = pos(&lexicon.in_kw)
        && i + 1 < tokens.len()
    {
        return Ok(suffix_from(i));
    }

    // The earlier of `every`/`at`, with `every` checked first.
    let every_idx = pos(&lexicon.every_kw).filter(|&i| i + 1 < tokens.len());
    let at_idx = pos(&lexicon.at_kw).filter(|&i| i + 1 < tokens.len());
    if let Some(e) = every_idx
        && at_idx.is_none_or(|a| a > e)
    {
        return Ok(suffix_from(e));
    }

    if let Some(i) = pos(&lexicon.on_kw)
        && i + 1 < tokens.len()
    {
        return Ok(suffix_from(i));
    }

    // Date words only anchor the phrase when a later `at` follows
    // ("lunch tomorrow at noon"); a bare trailing date word is left to the
    // tail heuristics.
    let mut date_words: Vec<&str> = vec![&lexicon.everyday_kw, &lexicon.today_kw, &lexicon.tomorrow_kw];
    date_words.extend(lexicon.weekday_names().iter().map(|(name, _)| name.as_str()));
    for word in date_words {
        if let Some(i) = pos(word)
            && at_idx.is_some_and(|a| a > i)
        {
            return Ok(suffix_from(i));
        }
    }

    if let Some(a) = at_idx {
        return Ok(suffix_from(a));
    }

    // Tail heuristics: the last two tokens as a date, then the last token,
    // then the forward rule on the token right after the target.
    if tokens.len() >= 2 {
        let last_two = format!("{} {}", tokens[tokens.len() - 2].1, tokens[tokens.len() - 1].1);
        if clock::normalize_date(&last_two, ctx).is_ok() {
            return Ok(last_two);
        }
    }
    if let Some(&(_, last)) = tokens.last() {
        let lower = last.to_lowercase();
        if lower == lexicon.tomorrow_kw
            || lower == lexicon.everyday_kw
            || lexicon.plural_weekday(&lower).is_some()
            || clock::normalize_date(last, ctx).is_ok()
        {
            return Ok(last.to_string());
        }
    }
    if tokens.len() >= 3 {
        let second = tokens[1].1.to_lowercase();
        if second == lexicon.at_kw {
            return Ok(format!("{} {}", tokens[1].1, tokens[2].1));
        }
        if (second == lexicon.in_kw || second == lexicon.on_kw) && tokens.len() >= 4 {
            return Ok(format!("{} {} {}", tokens[1].1, tokens[2].1, tokens[3].1));
        }
        if second == lexicon.tomorrow_kw || lexicon.weekday(&second).is_some() {
            return Ok(tokens[1].1.to_string());
        }
    }

    Err(ParseError::UnableToFindWhen)
}

fn tokens_with_offsets(s: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut cursor = 0;
    for token in s.split_whitespace() {
        let start = s[cursor..]
            .find(token)
            .map(|i| i + cursor)
            .unwrap_or(cursor);
        cursor = start + token.len();
        out.push((start, token));
    }
    out
}

/// Materialize a when-phrase into concrete fire instants. Also used by the
/// dispatcher to advance a recurring occurrence past its fire time.
pub fn materialize_when(when: &str, ctx: &ParseContext) -> Result<(Vec<DateTime<Utc>>, bool), ParseError> {
    let when = when.trim();
    let lexicon = &ctx.lexicon;
    let leading = when
        .split_whitespace()
        .next()
        .ok_or(ParseError::UnableToFindWhen)?
        .to_lowercase();

    let times = if leading == lexicon.in_kw {
        in_phrase(when, ctx)?
    } else if leading == lexicon.at_kw {
        at_phrase(when, ctx)?
    } else if leading == lexicon.on_kw {
        on_phrase(when, ctx)?
    } else if leading == lexicon.every_kw {
        every_phrase(when, ctx)?
    } else {
        free_form(when, ctx)?
    };

    Ok((times, is_repeating(when, ctx)))
}

/// A phrase recurs when it contains `every`/`everyday` or a pluralized
/// weekday.
fn is_repeating(when: &str, ctx: &ParseContext) -> bool {
    let lexicon = &ctx.lexicon;
    when.split_whitespace().any(|t| {
        t.eq_ignore_ascii_case(&lexicon.every_kw) || t.eq_ignore_ascii_case(&lexicon.everyday_kw)
    }) || lexicon.contains_plural_weekday(when)
}

/// `in <N> <unit>`: a plain duration from now.
fn in_phrase(when: &str, ctx: &ParseContext) -> Result<Vec<DateTime<Utc>>, ParseError> {
    let lexicon = &ctx.lexicon;
    let tokens: Vec<&str> = when.split_whitespace().collect();
    if tokens.len() < 3 {
        return Err(ParseError::UnparseableTime(when.to_string()));
    }

    let unit_token = tokens[tokens.len() - 1];
    let unit = lexicon
        .unit(unit_token)
        .ok_or_else(|| ParseError::UnitNotRecognized(unit_token.to_string()))?;

    let value_text = tokens[1..tokens.len() - 1].join(" ");
    let n = match value_text.parse::<i64>() {
        Ok(n) => n,
        Err(_) => clock::word_to_number(&value_text, lexicon)?,
    };

    let duration = match unit {
        Unit::Seconds => Duration::seconds(n),
        Unit::Minutes => Duration::minutes(n),
        Unit::Hours => Duration::hours(n),
        Unit::Days => Duration::days(n),
        Unit::Weeks => Duration::weeks(n),
        Unit::Months => Duration::days(30 * n),
        Unit::Years => Duration::days(365 * n),
    };

    let base = ctx.now.with_nanosecond(0).unwrap_or(ctx.now);
    Ok(vec![base + duration])
}

/// `at <clock>`: today's closest matching wall-clock instant. Delegates to
/// `every` when the phrase also recurs ("at 9am every monday").
fn at_phrase(when: &str, ctx: &ParseContext) -> Result<Vec<DateTime<Utc>>, ParseError> {
    let lexicon = &ctx.lexicon;

    let every_sep = format!(" {} ", lexicon.every_kw);
    if let Some((clock_part, days_part)) = when.split_once(&every_sep) {
        let reordered = format!("{} {} {}", lexicon.every_kw, days_part.trim(), clock_part.trim());
        return every_phrase(&reordered, ctx);
    }

    let tokens: Vec<&str> = when.split_whitespace().collect();
    if tokens.len() < 2 {
        return Err(ParseError::UnparseableTime(when.to_string()));
    }
    let mut clock_text = tokens[1].to_string();
    if let Some(suffix) = tokens.get(2)
        && (suffix.eq_ignore_ascii_case(&lexicon.am_kw) || suffix.eq_ignore_ascii_case(&lexicon.pm_kw))
    {
        clock_text.push(' ');
        clock_text.push_str(suffix);
    }

    let spec = clock::normalize_time(&clock_text, lexicon)?;
    Ok(vec![closest_today(&spec, ctx)])
}

fn closest_today(spec: &ClockSpec, ctx: &ParseContext) -> DateTime<Utc> {
    let today = ctx.local_now().date_naive();
    let candidate = today
        .and_hms_opt(spec.hour24(ctx), spec.minute, 0)
        .unwrap_or_else(|| today.and_hms_opt(0, 0, 0).expect("midnight exists"));
    clock::choose_closest(ctx, candidate, spec.explicit)
}

/// `on <date> [at <clock>]`.
fn on_phrase(when: &str, ctx: &ParseContext) -> Result<Vec<DateTime<Utc>>, ParseError> {
    let lexicon = &ctx.lexicon;
    let tokens: Vec<&str> = when.split_whitespace().collect();
    if tokens.len() < 2 {
        return Err(ParseError::UnparseableDate(when.to_string()));
    }

    let rest = tokens[1..].join(" ").to_lowercase();
    let (date_text, time_text) = split_date_time(&rest, ctx);

    let date = clock::normalize_date(&date_text, ctx)?;
    let spec = clock::normalize_time(&time_text, lexicon)?;

    match date {
        DateSpec::Weekday(wd) | DateSpec::PluralWeekday(wd) => Ok(vec![next_weekday_at(wd, &spec, ctx)]),
        DateSpec::Today => Ok(vec![closest_today(&spec, ctx)]),
        DateSpec::Tomorrow => Ok(vec![date_at(
            ctx.local_now().date_naive() + Duration::days(1),
            &spec,
            ctx,
        )]),
        DateSpec::Date(d) => Ok(vec![date_at(d, &spec, ctx)]),
        DateSpec::Day | DateSpec::Everyday => Err(ParseError::UnparseableDate(when.to_string())),
    }
}

/// `every <day-list> [at <clock>]`: one occurrence per listed day.
fn every_phrase(when: &str, ctx: &ParseContext) -> Result<Vec<DateTime<Utc>>, ParseError> {
    let lexicon = &ctx.lexicon;
    let tokens: Vec<&str> = when.split_whitespace().collect();
    if tokens.len() < 2 {
        return Err(ParseError::UnparseableDate(when.to_string()));
    }

    let mut rest = tokens[1..].join(" ").to_lowercase();
    let mut every_other = false;
    if let Some(stripped) = rest.strip_prefix(&format!("{} ", lexicon.other_kw)) {
        rest = stripped.to_string();
        every_other = true;
    }

    let (date_list, time_text) = split_date_time(&rest, ctx);
    let spec = clock::normalize_time(&time_text, lexicon)?;

    let and_sep = format!(" {} ", lexicon.and_kw);
    let mut times = Vec::new();
    for part in date_list.split(',') {
        for day_text in part.split(&and_sep) {
            let day_text = day_text.trim();
            if day_text.is_empty() {
                continue;
            }
            match clock::normalize_date(day_text, ctx)? {
                DateSpec::Day | DateSpec::Everyday | DateSpec::Today => {
                    let ahead = if every_other { 2 } else { 1 };
                    times.push(date_at(
                        ctx.local_now().date_naive() + Duration::days(ahead),
                        &spec,
                        ctx,
                    ));
                }
                DateSpec::Tomorrow => {
                    times.push(date_at(
                        ctx.local_now().date_naive() + Duration::days(1),
                        &spec,
                        ctx,
                    ));
                }
                DateSpec::Weekday(wd) | DateSpec::PluralWeekday(wd) => {
                    times.push(next_weekday_at(wd, &spec, ctx));
                }
                DateSpec::Date(d) => {
                    times.push(date_at(d, &spec, ctx));
                }
            }
        }
    }

    if times.is_empty() {
        return Err(ParseError::UnparseableDate(when.to_string()));
    }
    Ok(times)
}

/// A bare leading date word ("tomorrow at 3pm", "mondays", "everyday at
/// noon") rewritten into the corresponding `at`/`on`/`every` shape.
fn free_form(when: &str, ctx: &ParseContext) -> Result<Vec<DateTime<Utc>>, ParseError> {
    let lexicon = &ctx.lexicon;
    let rest = when.trim().to_lowercase();
    let (date_text, time_text) = split_date_time(&rest, ctx);

    let date = clock::normalize_date(&date_text, ctx)?;
    let spec = clock::normalize_time(&time_text, lexicon)?;

    match date {
        DateSpec::Today => Ok(vec![closest_today(&spec, ctx)]),
        DateSpec::Tomorrow => Ok(vec![date_at(
            ctx.local_now().date_naive() + Duration::days(1),
            &spec,
            ctx,
        )]),
        DateSpec::Everyday | DateSpec::Day => Ok(vec![date_at(
            ctx.local_now().date_naive() + Duration::days(1),
            &spec,
            ctx,
        )]),
        DateSpec::Weekday(wd) | DateSpec::PluralWeekday(wd) => Ok(vec![next_weekday_at(wd, &spec, ctx)]),
        DateSpec::Date(d) => Ok(vec![date_at(d, &spec, ctx)]),
    }
}

/// Split "…[ at <clock>]" into the date part and the clock part, with the
/// default 9:00AM when no clock is given.
fn split_date_time(text: &str, ctx: &ParseContext) -> (String, String) {
    let at_sep = format!(" {} ", ctx.lexicon.at_kw);
    match text.split_once(&at_sep) {
        Some((date, time)) => (date.trim().to_string(), time.trim().to_string()),
        None => (text.trim().to_string(), DEFAULT_TIME.to_string()),
    }
}

fn next_weekday_at(target: chrono::Weekday, spec: &ClockSpec, ctx: &ParseContext) -> DateTime<Utc> {
    let today = ctx.local_now().date_naive();
    let ahead = clock::days_until_weekday(today.weekday(), target);
    date_at(today + Duration::days(ahead), spec, ctx)
}

fn date_at(date: NaiveDate, spec: &ClockSpec, ctx: &ParseContext) -> DateTime<Utc> {
    let candidate = date
        .and_hms_opt(spec.hour24(ctx), spec.minute, 0)
        .unwrap_or_else(|| date.and_hms_opt(0, 0, 0).expect("midnight exists"));
    ctx.to_utc(candidate)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::lexicon::Catalog;

    /// Monday 2019-01-14 10:00 UTC.
    fn ctx() -> ParseContext {
        ParseContext {
            now: Utc.with_ymd_and_hms(2019, 1, 14, 10, 0, 0).unwrap(),
            tz: chrono_tz::UTC,
            timezone_aware: true,
            lexicon: Catalog::builtin("en").unwrap().get("en"),
        }
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn quoted_in_minutes() {
        let r = parse("me \"ping\" in 30 minutes", &ctx()).unwrap();
        assert_eq!(r.target, "me");
        assert_eq!(r.message, "ping");
        assert_eq!(r.when, "in 30 minutes");
        assert_eq!(r.times, vec![utc(2019, 1, 14, 10, 30, 0)]);
        assert!(!r.repeating);
    }

    #[test]
    fn quoted_every_weekday() {
        let r = parse("@alex \"standup\" every monday at 9am", &ctx()).unwrap();
        assert_eq!(r.target, "@alex");
        assert_eq!(r.message, "standup");
        assert_eq!(r.when, "every monday at 9am");
        assert_eq!(r.times, vec![utc(2019, 1, 21, 9, 0, 0)]);
        assert!(r.repeating);
    }

    #[test]
    fn quoted_on_ordinal_date_defaults_to_nine() {
        let r = parse("~general \"release\" on january 31st", &ctx()).unwrap();
        assert_eq!(r.target, "~general");
        assert_eq!(r.times, vec![utc(2019, 1, 31, 9, 0, 0)]);
        assert!(!r.repeating);
    }

    #[test]
    fn quoted_at_noon() {
        let r = parse("me \"lunch\" at noon", &ctx()).unwrap();
        assert_eq!(r.times, vec![utc(2019, 1, 14, 12, 0, 0)]);
    }

    #[test]
    fn quoted_tomorrow_at_clock() {
        let r = parse("me \"test\" tomorrow at 3pm", &ctx()).unwrap();
        assert_eq!(r.when, "tomorrow at 3pm");
        assert_eq!(r.times, vec![utc(2019, 1, 15, 15, 0, 0)]);
    }

    #[test]
    fn unquoted_trailing_date_word() {
        let r = parse("me call mom tomorrow", &ctx()).unwrap();
        assert_eq!(r.message, "call mom");
        assert_eq!(r.when, "tomorrow");
        assert_eq!(r.times, vec![utc(2019, 1, 15, 9, 0, 0)]);
    }

    #[test]
    fn unquoted_when_locator_prefers_in() {
        let r = parse("me file the report in 2 hours", &ctx()).unwrap();
        assert_eq!(r.message, "file the report");
        assert_eq!(r.when, "in 2 hours");
        assert_eq!(r.times, vec![utc(2019, 1, 14, 12, 0, 0)]);
    }

    #[test]
    fn word_number_duration() {
        let r = parse("me \"stretch\" in five minutes", &ctx()).unwrap();
        assert_eq!(r.times, vec![utc(2019, 1, 14, 10, 5, 0)]);
    }

    #[test]
    fn years_are_365_days() {
        let r = parse("me \"renew\" in 1 year", &ctx()).unwrap();
        assert_eq!(r.times, vec![utc(2019, 1, 14, 10, 0, 0) + Duration::days(365)]);
    }

    #[test]
    fn at_reorders_trailing_every() {
        let r = parse("me \"review\" at 9am every monday", &ctx()).unwrap();
        assert_eq!(r.times, vec![utc(2019, 1, 21, 9, 0, 0)]);
        assert!(r.repeating);
    }

    #[test]
    fn every_day_list_gets_one_time_per_day() {
        let r = parse("me \"sync\" every monday and thursday at 2pm", &ctx()).unwrap();
        assert_eq!(
            r.times,
            vec![utc(2019, 1, 21, 14, 0, 0), utc(2019, 1, 17, 14, 0, 0)]
        );
        assert!(r.repeating);
    }

    #[test]
    fn every_other_day_fires_day_after_tomorrow() {
        let r = parse("me \"water plants\" every other day at 9am", &ctx()).unwrap();
        assert_eq!(r.times, vec![utc(2019, 1, 16, 9, 0, 0)]);
        assert!(r.repeating);
    }

    #[test]
    fn on_same_weekday_advances_a_full_week() {
        // Today is a Monday.
        let r = parse("me \"1:1\" on monday", &ctx()).unwrap();
        assert_eq!(r.times, vec![utc(2019, 1, 21, 9, 0, 0)]);
        assert!(!r.repeating);
    }

    #[test]
    fn plural_weekday_is_recurring() {
        let r = parse("me \"retro\" fridays", &ctx()).unwrap();
        assert_eq!(r.times, vec![utc(2019, 1, 18, 9, 0, 0)]);
        assert!(r.repeating);
    }

    #[test]
    fn elapsed_bare_hour_rolls_to_next_half_day() {
        // now = 16:00: "at 3" means 3 AM tomorrow.
        let mut c = ctx();
        c.now = utc(2019, 1, 14, 16, 0, 0);
        let r = parse("me \"pick up\" at 3", &c).unwrap();
        assert_eq!(r.times, vec![utc(2019, 1, 15, 3, 0, 0)]);

        // now = 14:00: "at 3" means 3 PM today.
        let mut c = ctx();
        c.now = utc(2019, 1, 14, 14, 0, 0);
        let r = parse("me \"pick up\" at 3", &c).unwrap();
        assert_eq!(r.times, vec![utc(2019, 1, 14, 15, 0, 0)]);
    }

    #[test]
    fn all_times_are_in_the_future() {
        let c = ctx();
        for payload in [
            "me \"a\" in 1 second",
            "me \"b\" at 11",
            "me \"c\" at midnight",
            "me \"d\" on friday",
            "me \"e\" every day",
            "me \"f\" tomorrow",
            "me \"g\" on 1/15",
        ] {
            let r = parse(payload, &c).unwrap();
            for t in &r.times {
                assert!(*t > c.now, "{payload} produced non-future {t}");
            }
        }
    }

    #[test]
    fn rejects_unknown_target() {
        assert!(matches!(
            parse("everyone \"hi\" in 5 minutes", &ctx()),
            Err(ParseError::UnrecognizedTarget)
        ));
    }

    #[test]
    fn rejects_payload_without_when() {
        assert!(matches!(
            parse("me just some words", &ctx()),
            Err(ParseError::UnableToFindWhen)
        ));
    }

    #[test]
    fn rejects_bad_unit_and_bad_hour() {
        assert!(matches!(
            parse("me \"x\" in 5 fortnights", &ctx()),
            Err(ParseError::UnitNotRecognized(_))
        ));
        assert!(matches!(
            parse("me \"x\" at 25", &ctx()),
            Err(ParseError::UnparseableTime(_))
        ));
    }

    #[test]
    fn deterministic_for_fixed_inputs() {
        let c = ctx();
        let a = parse("me \"ping\" every monday at 9am", &c).unwrap();
        let b = parse("me \"ping\" every monday at 9am", &c).unwrap();
        assert_eq!(a.times, b.times);
        assert_eq!(a.when, b.when);
    }
}
