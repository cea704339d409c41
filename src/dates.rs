// =============================================================================
// dates.rs — THE CARRIER DATE ROSETTA STONE
// =============================================================================
//
// Every carrier has its own idea of how to write "the fifteenth of March".
// We try a short, ordered list of matchers and take the first one that
// works. If nothing matches, the caller keeps the raw text for display and
// the shipment sorts as if it had no ETA at all.
//
// Matchers accept trailing junk (times, timezones, "(estimated)") because
// the date is always at the front and the rest never matters for sorting.
// =============================================================================

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tracing::trace;

type Matcher = fn(&str) -> Option<NaiveDate>;

/// Tried in order. First hit wins.
const MATCHERS: &[(&str, Matcher)] = &[
    ("month-abbr-dash", month_abbr_dash),
    ("day-month-year-slash", day_month_year_slash),
    ("iso", iso_year_month_day),
    ("fallback", fallback),
];

/// Parse a carrier date string into a calendar date, or `None` if it is
/// not something we recognise.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    for (name, matcher) in MATCHERS {
        if let Some(date) = matcher(text) {
            trace!(raw = text, matcher = *name, %date, "date parsed");
            return Some(date);
        }
    }

    trace!(raw = text, "no date matcher accepted input");
    None
}

/// Convenience for `Option<String>` fields like `eta`.
pub fn parse_optional(raw: Option<&str>) -> Option<NaiveDate> {
    raw.and_then(parse_date)
}

fn leading(text: &str, fmt: &str) -> Option<NaiveDate> {
    NaiveDate::parse_and_remainder(text, fmt)
        .ok()
        .map(|(date, _rest)| date)
}

/// `MAR-15-2026`, `Mar-15-2026 08:00`
fn month_abbr_dash(text: &str) -> Option<NaiveDate> {
    leading(text, "%b-%d-%Y")
}

/// `15/03/2026`
fn day_month_year_slash(text: &str) -> Option<NaiveDate> {
    leading(text, "%d/%m/%Y")
}

/// `2026-03-15`, `2026-03-15T10:30:00Z`
fn iso_year_month_day(text: &str) -> Option<NaiveDate> {
    leading(text, "%Y-%m-%d")
}

/// Whatever else the carriers come up with that we have seen in the wild.
fn fallback(text: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y/%m/%d %H:%M") {
        return Some(dt.date());
    }

    const DATE_FORMATS: &[&str] = &[
        "%Y/%m/%d",
        "%m/%d/%Y",
        "%d-%b-%Y",
        "%d %b %Y",
        "%b %d, %Y",
        "%d.%m.%Y",
        "%Y%m%d",
    ];
    DATE_FORMATS.iter().find_map(|fmt| leading(text, fmt))
}
