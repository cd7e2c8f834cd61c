// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Number and unit formatting for badge text.

/// Unit label with singular and plural forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unit {
    pub singular: &'static str,
    pub plural: &'static str,
}

impl Unit {
    pub const fn new(singular: &'static str, plural: &'static str) -> Self {
        Self { singular, plural }
    }

    /// Same label regardless of count (karma, reputation).
    pub const fn uncountable(label: &'static str) -> Self {
        Self {
            singular: label,
            plural: label,
        }
    }

    pub fn label(&self, value: f64) -> &'static str {
        if value == 1.0 {
            self.singular
        } else {
            self.plural
        }
    }
}

pub const FOLLOWERS: Unit = Unit::new("follower", "followers");
pub const STARS: Unit = Unit::new("star", "stars");
pub const SUBSCRIBERS: Unit = Unit::new("subscriber", "subscribers");
pub const PATRONS: Unit = Unit::new("patron", "patrons");
pub const SUPPORTERS: Unit = Unit::new("supporter", "supporters");
pub const EDITS: Unit = Unit::new("edit", "edits");
pub const DOWNLOADS: Unit = Unit::new("download", "downloads");
pub const KARMA: Unit = Unit::uncountable("karma");
pub const REPUTATION: Unit = Unit::uncountable("reputation");
pub const SECONDS: Unit = Unit::new("second", "seconds");
pub const MINUTES: Unit = Unit::new("minute", "minutes");
pub const HOURS: Unit = Unit::new("hour", "hours");

/// Round to one decimal place.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// One decimal, with a trailing `.0` dropped.
pub fn one_decimal(value: f64) -> String {
    let rounded = round1(value);
    if rounded.fract() == 0.0 {
        format!("{}", rounded as i64)
    } else {
        format!("{:.1}", rounded)
    }
}

/// `950` → `"950"`, `1234` → `"1.2K"`, `2_500_000` → `"2.5M"`.
pub fn compact_number(value: f64) -> String {
    const SUFFIXES: [(f64, &str); 3] = [(1e9, "B"), (1e6, "M"), (1e3, "K")];

    let sign = if value < 0.0 { "-" } else { "" };
    let abs = value.abs();

    if abs < 1000.0 {
        return format!("{}{}", sign, abs.round() as i64);
    }

    // Pick the unit after rounding so 999_950 becomes "1M", not "1000K".
    for (i, (scale, suffix)) in SUFFIXES.iter().enumerate() {
        if abs >= *scale {
            let scaled = round1(abs / scale);
            if scaled >= 1000.0 && i > 0 {
                let (bigger, bigger_suffix) = SUFFIXES[i - 1];
                return format!("{}{}{}", sign, one_decimal(abs / bigger), bigger_suffix);
            }
            return format!("{}{}{}", sign, one_decimal(scaled), suffix);
        }
    }

    format!("{}{}", sign, abs.round() as i64)
}

/// Convert seconds to the display magnitude and unit.
///
/// Under a minute is whole seconds; under an hour is minutes; otherwise hours.
pub fn duration_parts(total_seconds: f64) -> (f64, Unit) {
    if total_seconds < 60.0 {
        (total_seconds.round(), SECONDS)
    } else if total_seconds < 3600.0 {
        (round1(total_seconds / 60.0), MINUTES)
    } else {
        (round1(total_seconds / 3600.0), HOURS)
    }
}
