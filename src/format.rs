use chrono::{DateTime, Datelike, Utc};

use crate::clock::ParseContext;
use crate::models::{Occurrence, Reminder};

/// Listing buckets. The partition is exclusive: recurring wins over
/// upcoming, upcoming over past, so an occurrence renders at most once.
#[derive(Debug, Default)]
pub struct ListBuckets {
    pub upcoming: Vec<(Reminder, Occurrence)>,
    pub recurring: Vec<(Reminder, Occurrence)>,
    pub past: Vec<(Reminder, Occurrence)>,
}

/// Render a kitchen clock ("9:05AM") plus an end date relative to "now":
/// `today`, `tomorrow`, or `Weekday, Month ordinal`.
fn clock_and_date(ctx: &ParseContext, occurrence: DateTime<Utc>) -> (String, String) {
    let lexicon = &ctx.lexicon;
    let local = occurrence.with_timezone(&ctx.effective_tz());
    let now = ctx.local_now();

    let kitchen = local.format("%-I:%M%p").to_string();
    let end_date = if local.ordinal() == now.ordinal() && local.year() == now.year() {
        lexicon.today_kw.clone()
    } else if local.date_naive() == now.date_naive() + chrono::Duration::days(1) {
        lexicon.tomorrow_kw.clone()
    } else {
        format!(
            "{}, {} {}",
            local.format("%A"),
            local.format("%B"),
            lexicon.ordinal_suffix(local.day())
        )
    };
    (kitchen, end_date)
}

/// Render a when-phrase together with its resolved instant, the way the
/// acknowledgement and the listing display it. The prefix of the original
/// phrase decides the shape.
pub fn format_when(ctx: &ParseContext, when: &str, occurrence: DateTime<Utc>) -> String {
    let lexicon = &ctx.lexicon;
    let lower = when.trim().to_lowercase();
    let (kitchen, end_date) = clock_and_date(ctx, occurrence);

    if lower.starts_with(&format!("{} ", lexicon.in_kw)) {
        return format!("{} {} {} {}.", when.trim(), lexicon.at_kw, kitchen, end_date);
    }

    if lower.starts_with(&format!("{} ", lexicon.every_kw)) {
        let at_sep = format!(" {} ", lexicon.at_kw);
        let repeat = lower
            .split(&at_sep)
            .next()
            .unwrap_or(&lower)
            .trim_start_matches(&lexicon.every_kw)
            .trim();
        return format!(
            "{} {} {} {}.",
            lexicon.at_kw,
            kitchen,
            lexicon.every_kw,
            title_case(repeat)
        );
    }

    // `at`, `on`, and free-form phrases all collapse to the same shape.
    format!("{} {} {}.", lexicon.at_kw, kitchen, end_date)
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Partition a user's occurrences for the listing.
pub fn bucket_occurrences(
    now: DateTime<Utc>,
    reminders: &[Reminder],
    occurrences_of: impl Fn(&Reminder) -> Vec<Occurrence>,
) -> ListBuckets {
    let mut buckets = ListBuckets::default();

    for reminder in reminders {
        let completed = reminder.completed.is_some();
        for occurrence in occurrences_of(reminder) {
            let future = occurrence.occurrence > now;
            let snoozed_future = occurrence.snoozed.is_some_and(|s| s > now);

            if !occurrence.repeat.is_empty() && future {
                buckets.recurring.push((reminder.clone(), occurrence));
            } else if !completed && ((occurrence.repeat.is_empty() && future) || snoozed_future) {
                buckets.upcoming.push((reminder.clone(), occurrence));
            } else if !completed && !future && occurrence.snoozed.is_none() {
                buckets.past.push((reminder.clone(), occurrence));
            }
        }
    }

    buckets
}

/// Render the full localized listing: one section per non-empty bucket,
/// then the footer.
pub fn render_list(ctx: &ParseContext, buckets: &ListBuckets) -> String {
    let lexicon = &ctx.lexicon;
    let mut out = String::new();

    let sections: [(&str, &str, &Vec<(Reminder, Occurrence)>); 3] = [
        ("list_upcoming", "list_element_upcoming", &buckets.upcoming),
        ("list_recurring", "list_element_recurring", &buckets.recurring),
        ("list_past_and_incomplete", "list_element_past", &buckets.past),
    ];

    for (header_key, element_key, items) in sections {
        if items.is_empty() {
            continue;
        }
        out.push('\n');
        out.push_str(&lexicon.render(header_key, &[]));
        for (reminder, occurrence) in items {
            let rendered_when = format_when(ctx, &reminder.when_phrase, occurrence.occurrence);
            out.push('\n');
            out.push_str(&lexicon.render(
                element_key,
                &[("Message", &reminder.message), ("Occurrence", &rendered_when)],
            ));
        }
        out.push('\n');
    }

    out.push_str(&lexicon.render("list_footer", &[]));
    out
}
