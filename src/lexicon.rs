use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Weekday;
use serde::Deserialize;
use tracing::debug;

/// Locale catalogs compiled into the binary. Adding a locale means adding
/// a file here and listing it in `BUILTIN`.
const EN: &str = include_str!("../locales/en.toml");

const BUILTIN: &[(&str, &str)] = &[("en", EN)];

/// Message template keys every locale must define.
const REQUIRED_MESSAGES: &[&str] = &[
    "response",
    "message",
    "exception",
    "ok_deleted",
    "list_upcoming",
    "list_recurring",
    "list_past_and_incomplete",
    "list_element_upcoming",
    "list_element_recurring",
    "list_element_past",
    "list_footer",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Years,
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    chrono: RawChrono,
    messages: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawChrono {
    #[serde(rename = "in")]
    in_: String,
    at: String,
    on: String,
    every: String,
    other: String,
    everyday: String,
    today: String,
    tomorrow: String,
    day: String,
    noon: String,
    midnight: String,
    am: String,
    pm: String,
    me: String,
    you: String,
    to: String,
    and: String,
    ordinal_suffixes: Vec<String>,
    weekdays: HashMap<String, Vec<String>>,
    plural_weekdays: HashMap<String, String>,
    months: HashMap<String, Vec<String>>,
    units: HashMap<String, Vec<String>>,
    numbers: RawNumbers,
}

#[derive(Debug, Deserialize)]
struct RawNumbers {
    ones: HashMap<String, i64>,
    tens: HashMap<String, i64>,
    scales: HashMap<String, i64>,
}

/// Precomputed token tables for one locale. The parser resolves every
/// keyword through a single lookup here instead of comparing against the
/// translation catalog per phrase.
#[derive(Debug)]
pub struct Lexicon {
    pub locale: String,

    pub in_kw: String,
    pub at_kw: String,
    pub on_kw: String,
    pub every_kw: String,
    pub other_kw: String,
    pub everyday_kw: String,
    pub today_kw: String,
    pub tomorrow_kw: String,
    pub day_kw: String,
    pub noon_kw: String,
    pub midnight_kw: String,
    pub am_kw: String,
    pub pm_kw: String,
    pub me_kw: String,
    pub you_kw: String,
    pub to_kw: String,
    pub and_kw: String,

    weekdays: HashMap<String, Weekday>,
    weekday_names: Vec<(String, Weekday)>,
    plural_weekdays: HashMap<String, Weekday>,
    months: HashMap<String, u32>,
    units: HashMap<String, Unit>,
    ones: HashMap<String, i64>,
    tens: HashMap<String, i64>,
    scales: HashMap<String, i64>,
    ordinal_suffixes: Vec<String>,
    messages: HashMap<String, String>,
}

impl Lexicon {
    fn from_toml(locale: &str, content: &str) -> Result<Self> {
        let raw: RawCatalog =
            toml::from_str(content).with_context(|| format!("parsing locale catalog '{locale}'"))?;

        for key in REQUIRED_MESSAGES {
            if !raw.messages.contains_key(*key) {
                bail!("locale '{locale}': missing message template '{key}'");
            }
        }
        if raw.chrono.ordinal_suffixes.len() != 32 {
            bail!(
                "locale '{locale}': ordinal_suffixes must have 32 entries, got {}",
                raw.chrono.ordinal_suffixes.len()
            );
        }

        let mut weekdays = HashMap::new();
        let mut weekday_names = Vec::new();
        let mut plural_weekdays = HashMap::new();
        for (canonical, variants) in &raw.chrono.weekdays {
            let wd = parse_weekday_key(canonical)
                .with_context(|| format!("locale '{locale}': unknown weekday key '{canonical}'"))?;
            if let Some(full) = variants.first() {
                weekday_names.push((full.to_lowercase(), wd));
            }
            for v in variants {
                weekdays.insert(v.to_lowercase(), wd);
            }
        }
        for (canonical, plural) in &raw.chrono.plural_weekdays {
            let wd = parse_weekday_key(canonical)
                .with_context(|| format!("locale '{locale}': unknown weekday key '{canonical}'"))?;
            plural_weekdays.insert(plural.to_lowercase(), wd);
        }

        let mut months = HashMap::new();
        for (number, variants) in &raw.chrono.months {
            let n: u32 = number
                .parse()
                .with_context(|| format!("locale '{locale}': month key '{number}' is not a number"))?;
            if !(1..=12).contains(&n) {
                bail!("locale '{locale}': month key '{number}' out of range");
            }
            for v in variants {
                months.insert(v.to_lowercase(), n);
            }
        }

        let mut units = HashMap::new();
        for (canonical, variants) in &raw.chrono.units {
            let unit = match canonical.as_str() {
                "seconds" => Unit::Seconds,
                "minutes" => Unit::Minutes,
                "hours" => Unit::Hours,
                "days" => Unit::Days,
                "weeks" => Unit::Weeks,
                "months" => Unit::Months,
                "years" => Unit::Years,
                other => bail!("locale '{locale}': unknown unit key '{other}'"),
            };
            for v in variants {
                units.insert(v.to_lowercase(), unit);
            }
        }

        Ok(Self {
            locale: locale.to_string(),
            in_kw: raw.chrono.in_,
            at_kw: raw.chrono.at,
            on_kw: raw.chrono.on,
            every_kw: raw.chrono.every,
            other_kw: raw.chrono.other,
            everyday_kw: raw.chrono.everyday,
            today_kw: raw.chrono.today,
            tomorrow_kw: raw.chrono.tomorrow,
            day_kw: raw.chrono.day,
            noon_kw: raw.chrono.noon,
            midnight_kw: raw.chrono.midnight,
            am_kw: raw.chrono.am,
            pm_kw: raw.chrono.pm,
            me_kw: raw.chrono.me,
            you_kw: raw.chrono.you,
            to_kw: raw.chrono.to,
            and_kw: raw.chrono.and,
            weekdays,
            weekday_names,
            plural_weekdays,
            months,
            units,
            ones: lowercase_keys(raw.chrono.numbers.ones),
            tens: lowercase_keys(raw.chrono.numbers.tens),
            scales: lowercase_keys(raw.chrono.numbers.scales),
            ordinal_suffixes: raw.chrono.ordinal_suffixes,
            messages: raw.messages,
        })
    }

    pub fn weekday(&self, token: &str) -> Option<Weekday> {
        self.weekdays.get(&token.to_lowercase()).copied()
    }

    /// Canonical (full) weekday names, for the when-locator's keyword scan.
    pub fn weekday_names(&self) -> &[(String, Weekday)] {
        &self.weekday_names
    }

    pub fn plural_weekday(&self, token: &str) -> Option<Weekday> {
        self.plural_weekdays.get(&token.to_lowercase()).copied()
    }

    /// True when the phrase names any pluralized weekday (recurrence test).
    pub fn contains_plural_weekday(&self, phrase: &str) -> bool {
        phrase
            .split_whitespace()
            .any(|t| self.plural_weekday(t.trim_matches(',')).is_some())
    }

    pub fn month(&self, token: &str) -> Option<u32> {
        self.months.get(&token.to_lowercase()).copied()
    }

    pub fn unit(&self, token: &str) -> Option<Unit> {
        self.units.get(&token.to_lowercase()).copied()
    }

    pub fn ones_number(&self, token: &str) -> Option<i64> {
        self.ones.get(&token.to_lowercase()).copied()
    }

    pub fn tens_number(&self, token: &str) -> Option<i64> {
        self.tens.get(&token.to_lowercase()).copied()
    }

    pub fn scale_number(&self, token: &str) -> Option<i64> {
        self.scales.get(&token.to_lowercase()).copied()
    }

    /// "23rd" → "23" when the suffix matches this locale's ordinal table.
    pub fn strip_ordinal_suffix<'a>(&self, token: &'a str) -> Option<&'a str> {
        let lower = token.to_lowercase();
        for suffix in &self.ordinal_suffixes {
            if lower == *suffix {
                return Some(&token[..token.len() - 2]);
            }
        }
        None
    }

    /// Day-of-month → "1st", "22nd", ... for display.
    pub fn ordinal_suffix(&self, day: u32) -> &str {
        self.ordinal_suffixes
            .get(day as usize)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Render a message template, substituting `{Name}` placeholders.
    pub fn render(&self, key: &str, params: &[(&str, &str)]) -> String {
        let mut out = self
            .messages
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string());
        for (name, value) in params {
            out = out.replace(&format!("{{{name}}}"), value);
        }
        out
    }
}

fn parse_weekday_key(key: &str) -> Result<Weekday> {
    Ok(match key {
        "monday" => Weekday::Mon,
        "tuesday" => Weekday::Tue,
        "wednesday" => Weekday::Wed,
        "thursday" => Weekday::Thu,
        "friday" => Weekday::Fri,
        "saturday" => Weekday::Sat,
        "sunday" => Weekday::Sun,
        other => bail!("not a weekday: {other}"),
    })
}

fn lowercase_keys(map: HashMap<String, i64>) -> HashMap<String, i64> {
    map.into_iter().map(|(k, v)| (k.to_lowercase(), v)).collect()
}

/// All loaded locales, with a configured fallback.
#[derive(Debug)]
pub struct Catalog {
    locales: HashMap<String, Arc<Lexicon>>,
    default_locale: String,
}

impl Catalog {
    pub fn builtin(default_locale: &str) -> Result<Self> {
        let mut locales = HashMap::new();
        for (name, content) in BUILTIN {
            let lexicon = Lexicon::from_toml(name, content)?;
            locales.insert((*name).to_string(), Arc::new(lexicon));
        }
        if !locales.contains_key(default_locale) {
            bail!("default locale '{default_locale}' is not a built-in locale");
        }
        Ok(Self {
            locales,
            default_locale: default_locale.to_string(),
        })
    }

    /// Lexicon for a user locale, falling back to the default.
    pub fn get(&self, locale: &str) -> Arc<Lexicon> {
        if let Some(lexicon) = self.locales.get(locale) {
            return lexicon.clone();
        }
        debug!(locale = %locale, fallback = %self.default_locale, "locale not shipped, using fallback");
        self.locales
            .get(&self.default_locale)
            .cloned()
            .expect("catalog always contains the default locale")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn en() -> Arc<Lexicon> {
        Catalog::builtin("en").unwrap().get("en")
    }

    #[test]
    fn loads_builtin_english() {
        let lex = en();
        assert_eq!(lex.in_kw, "in");
        assert_eq!(lex.weekday("mon"), Some(Weekday::Mon));
        assert_eq!(lex.weekday("Wednesday"), Some(Weekday::Wed));
        assert_eq!(lex.plural_weekday("fridays"), Some(Weekday::Fri));
        assert_eq!(lex.month("jan"), Some(1));
        assert_eq!(lex.month("december"), Some(12));
        assert_eq!(lex.unit("hrs"), Some(Unit::Hours));
        assert_eq!(lex.unit("minute"), Some(Unit::Minutes));
    }

    #[test]
    fn unknown_locale_falls_back_to_default() {
        let catalog = Catalog::builtin("en").unwrap();
        assert_eq!(catalog.get("xx").locale, "en");
    }

    #[test]
    fn ordinal_suffixes_round_trip() {
        let lex = en();
        assert_eq!(lex.strip_ordinal_suffix("23rd"), Some("23"));
        assert_eq!(lex.strip_ordinal_suffix("1st"), Some("1"));
        assert_eq!(lex.strip_ordinal_suffix("23"), None);
        assert_eq!(lex.ordinal_suffix(31), "31st");
    }

    #[test]
    fn renders_templates() {
        let lex = en();
        let out = lex.render(
            "response",
            &[
                ("Target", "you"),
                ("UseTo", ""),
                ("Message", "ping"),
                ("When", "in 30 minutes at 10:30AM today."),
            ],
        );
        assert_eq!(out, "I will remind you \"ping\" in 30 minutes at 10:30AM today.");
    }

    #[test]
    fn detects_plural_weekdays_in_phrase() {
        let lex = en();
        assert!(lex.contains_plural_weekday("every mondays at 9"));
        assert!(!lex.contains_plural_weekday("every monday at 9"));
    }
}
