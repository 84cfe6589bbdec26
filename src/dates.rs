//! Date normalisation: turn the date shapes found on scanned letters into
//! sortable `YYYY-MM-DD` strings.
//!
//! Four shapes are recognised, checked in this order:
//!
//! | Shape        | Example      | Result        |
//! |--------------|--------------|---------------|
//! | `YYYY-MM-DD` | `2023-10-27` | unchanged     |
//! | `DD.MM.YYYY` | `27.10.2023` | `2023-10-27`  |
//! | `DD.MM.YY`   | `27.10.23`   | heuristic     |
//! | `YYYYMMDD`   | `20231027`   | `2023-10-27`  |
//!
//! Anything else passes through untouched; an unrecognised token is not an
//! error.
//!
//! ## The two-digit-year heuristic
//!
//! `xx.xx.xx` may be `yy.mm.dd`, `dd.mm.yy`, `mm.dd.yy` or `yy.dd.mm`. The
//! groups are read left to right as (year, month, day). If the month exceeds
//! 12, month and day are swapped; *then*, if the day exceeds 31, year and day
//! are swapped. Some inputs cannot be recovered from the digits alone:
//! `10.27.33` becomes `2010-33-27`. Callers rely on exactly this output, so
//! the rule is kept as is.

use once_cell::sync::Lazy;
use regex::Regex;

static RE_ISO: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").unwrap());
static RE_DOTTED_LONG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{2}\.[0-9]{2}\.[0-9]{4}$").unwrap());
static RE_DOTTED_SHORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]{2}\.[0-9]{2}\.[0-9]{2}$").unwrap());
static RE_COMPACT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]{8}$").unwrap());

/// The date layouts [`sortable_date`] understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateShape {
    /// `YYYY-MM-DD`
    Iso,
    /// `DD.MM.YYYY`
    DottedLong,
    /// `DD.MM.YY` (ambiguous field order)
    DottedShort,
    /// `YYYYMMDD`
    Compact,
}

impl DateShape {
    /// Detect the shape of `token`, first match wins.
    pub fn detect(token: &str) -> Option<Self> {
        if RE_ISO.is_match(token) {
            Some(DateShape::Iso)
        } else if RE_DOTTED_LONG.is_match(token) {
            Some(DateShape::DottedLong)
        } else if RE_DOTTED_SHORT.is_match(token) {
            Some(DateShape::DottedShort)
        } else if RE_COMPACT.is_match(token) {
            Some(DateShape::Compact)
        } else {
            None
        }
    }
}

/// True if `token` has one of the four recognised date shapes.
pub fn is_date_string(token: &str) -> bool {
    DateShape::detect(token).is_some()
}

/// Convert a date token to `YYYY-MM-DD`, or return it unchanged.
pub fn sortable_date(token: &str) -> String {
    // All shapes are pure ASCII digits and separators, so byte slicing is safe.
    match DateShape::detect(token) {
        Some(DateShape::Iso) => token.to_string(),
        Some(DateShape::DottedLong) => {
            format!("{}-{}-{}", &token[6..10], &token[3..5], &token[0..2])
        }
        Some(DateShape::DottedShort) => resolve_two_digit_year(token),
        Some(DateShape::Compact) => {
            format!("{}-{}-{}", &token[0..4], &token[4..6], &token[6..8])
        }
        None => token.to_string(),
    }
}

fn resolve_two_digit_year(token: &str) -> String {
    let mut groups = token.split('.');
    let (Some(mut year), Some(mut month), Some(mut day)) =
        (groups.next(), groups.next(), groups.next())
    else {
        return token.to_string();
    };

    if numeric(month) > 12 {
        std::mem::swap(&mut month, &mut day);
    }
    if numeric(day) > 31 {
        std::mem::swap(&mut year, &mut day);
    }
    format!("20{year}-{month}-{day}")
}

fn numeric(group: &str) -> u32 {
    group.parse().unwrap_or(0)
}
