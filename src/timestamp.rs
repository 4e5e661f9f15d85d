//! Target-instant resolution: timestamp literals, the atime/mtime selector,
//! and reference-file timestamps.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};

use crate::error::{Conflict, Error};
use crate::inode::InodeSnapshot;

const DELIM: char = ':';
const DOT: char = '.';

/// A point in time with microsecond resolution.
///
/// `(0, 0)` doubles as the distinguished "unset" value, meaning "derive the
/// instant at mutation time". A genuine midnight-epoch instant is therefore
/// indistinguishable from unset. This matches the tool's historical behavior
/// and is kept deliberately rather than fixed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Instant {
    pub sec: i64,
    /// Sub-second fraction, in `[0, 1_000_000)`.
    pub usec: i64,
}

impl Instant {
    pub const UNSET: Self = Self { sec: 0, usec: 0 };

    pub fn new(sec: i64, usec: i64) -> Self {
        Self { sec, usec }
    }

    /// Whether this instant carries an explicit value. See the type-level
    /// note about the midnight-epoch ambiguity.
    pub fn is_set(&self) -> bool {
        *self != Self::UNSET
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Local.timestamp_opt(self.sec, self.usec as u32 * 1000).single() {
            Some(datetime) => write!(f, "{}", datetime.format("%Y-%m-%d %H:%M:%S%.6f")),
            None => write!(f, "{}.{:06}", self.sec, self.usec),
        }
    }
}

/// Which of a file's own timestamps supplies a dynamically derived instant.
///
/// Constructed once from the command line and passed by value; `None` means
/// a reference file contributes its ctime, and a target file mutated without
/// any explicit instant just gets the current time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeSource {
    #[default]
    None,
    AccessTime,
    ModificationTime,
}

/// Produces the target instant from the mutually exclusive sources, before
/// any file is touched.
///
/// At most one of the literal, the selector, and the reference file may
/// determine the instant. A selector combined with a reference file is legal:
/// it picks which of the reference's timestamps to copy (ctime when no
/// selector is given). A selector alone returns [`Instant::UNSET`], deferring
/// derivation to each target file.
pub fn resolve(
    literal: Option<&str>,
    source: TimeSource,
    reference: Option<&Path>,
) -> Result<Instant, Error> {
    if literal.is_some() && source != TimeSource::None {
        return Err(Error::ConfigConflict(Conflict::SelectorWithExplicitTime));
    }

    if literal.is_some() && reference.is_some() {
        return Err(Error::ConfigConflict(Conflict::ReferenceWithExplicitTime));
    }

    if let Some(literal) = literal {
        return parse_literal(literal);
    }

    if let Some(reference) = reference {
        let snapshot = InodeSnapshot::capture(reference)?;

        return Ok(match source {
            TimeSource::None => snapshot.ctime,
            TimeSource::AccessTime => snapshot.atime,
            TimeSource::ModificationTime => snapshot.mtime,
        });
    }

    Ok(Instant::UNSET)
}

/// Parses `[[[YYYY:]MM:]DD:]hh:mm:ss[.uuuuuu]` against the current local
/// date and time.
pub fn parse_literal(literal: &str) -> Result<Instant, Error> {
    parse_literal_at(literal, Local::now())
}

/// Like [`parse_literal`], with an explicit "now" supplying the omitted
/// leading fields.
///
/// The delimiter count decides which of year, month, day, hour and minute are
/// present; the rest default to `now`'s local value. Numeric fields are read
/// with `atoi` semantics: leading digits count and anything after them is
/// ignored, so a field with no digits at all silently parses as zero. That is
/// historical behavior callers rely on. Only two things are hard errors: a
/// seconds field with no digits, and components that don't form a valid local
/// datetime after defaulting. The latter diverges from C's `mktime`, which
/// normalizes out-of-range components instead of rejecting them (a zeroed
/// month would mean December of the prior year); such literals are rejected
/// here.
fn parse_literal_at(literal: &str, now: DateTime<Local>) -> Result<Instant, Error> {
    let delimiters = literal.matches(DELIM).count();
    let format_error = || Error::Format(literal.to_string());

    let mut year = i64::from(now.year());
    // months are 0-based internally, like struct tm, but 1-based in the literal
    let mut month = i64::from(now.month0());
    let mut day = i64::from(now.day());
    let mut hour = i64::from(now.hour());
    let mut minute = i64::from(now.minute());

    let mut rest = literal;
    if delimiters > 4 {
        year = atoi(rest);
        rest = skip_field(rest);
    }
    if delimiters > 3 {
        month = atoi(rest) - 1;
        rest = skip_field(rest);
    }
    if delimiters > 2 {
        day = atoi(rest);
        rest = skip_field(rest);
    }
    if delimiters > 1 {
        hour = atoi(rest);
        rest = skip_field(rest);
    }
    if delimiters > 0 {
        minute = atoi(rest);
        rest = skip_field(rest);
    }

    if !rest.starts_with(|c: char| c.is_ascii_digit()) {
        return Err(format_error());
    }
    let second = atoi(rest);

    let datetime = Local
        .with_ymd_and_hms(
            i32::try_from(year).map_err(|_| format_error())?,
            u32::try_from(month + 1).map_err(|_| format_error())?,
            u32::try_from(day).map_err(|_| format_error())?,
            u32::try_from(hour).map_err(|_| format_error())?,
            u32::try_from(minute).map_err(|_| format_error())?,
            u32::try_from(second).map_err(|_| format_error())?,
        )
        .single()
        .ok_or_else(format_error)?;

    // the fraction's digits are taken as a literal microsecond count, so
    // ".5" means 5us, not half a second
    let mut usec = 0;
    if let Some(dot) = rest.find(DOT) {
        let fraction = &rest[dot + 1..];
        if !fraction.is_empty() {
            usec = atoi(fraction);
        }
    }

    if !(0..1_000_000).contains(&usec) {
        return Err(format_error());
    }

    Ok(Instant::new(datetime.timestamp(), usec))
}

/// `atoi`: the value of the leading ASCII digits, or zero if there are none.
fn atoi(s: &str) -> i64 {
    let end = s
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(s.len());

    s[..end].parse().unwrap_or(0)
}

fn skip_field(s: &str) -> &str {
    match s.split_once(DELIM) {
        Some((_, remainder)) => remainder,
        None => s,
    }
}
