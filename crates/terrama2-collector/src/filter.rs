//! File name masks and per-item collection filters.
//!
//! Masks are file names with date wildcards:
//!
//! | wildcard | meaning                     |
//! |----------|-----------------------------|
//! | `%A`     | 4-digit year                |
//! | `%a`     | 2-digit year (2000-based)   |
//! | `%M`     | month                       |
//! | `%d`     | day                         |
//! | `%h`     | hour                        |
//! | `%m`     | minute                      |
//! | `%s`     | second                      |
//! | `%.`     | any single character        |
//! | `*`      | any run of characters       |
//!
//! Date parts read from a name are interpreted in UTC.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use geo::algorithm::contains::Contains;
use geo::{Coord, LineString, MultiPolygon, Point, Polygon};

use terrama2_core::models::{DataSetItem, Filter, Region};

use crate::error::{CollectorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Year4,
    Year2,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl Field {
    fn width(self) -> usize {
        match self {
            Field::Year4 => 4,
            _ => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Literal(char),
    Field(Field),
    AnyChar,
    AnyRun,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct DateParts {
    year: Option<i32>,
    month: Option<u32>,
    day: Option<u32>,
    hour: Option<u32>,
    minute: Option<u32>,
    second: Option<u32>,
}

impl DateParts {
    fn set(&mut self, field: Field, value: u32) {
        match field {
            Field::Year4 => self.year = Some(value as i32),
            Field::Year2 => self.year = Some(2000 + value as i32),
            Field::Month => self.month = Some(value),
            Field::Day => self.day = Some(value),
            Field::Hour => self.hour = Some(value),
            Field::Minute => self.minute = Some(value),
            Field::Second => self.second = Some(value),
        }
    }

    /// `None` without a year, `Some(None)` for an impossible date
    fn timestamp(&self) -> Option<Option<DateTime<Utc>>> {
        let year = self.year?;
        let naive = NaiveDate::from_ymd_opt(year, self.month.unwrap_or(1), self.day.unwrap_or(1))
            .and_then(|date| {
                date.and_hms_opt(
                    self.hour.unwrap_or(0),
                    self.minute.unwrap_or(0),
                    self.second.unwrap_or(0),
                )
            });
        Some(naive.map(|n| Utc.from_utc_datetime(&n)))
    }
}

/// Compiled file name mask
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    source: String,
    tokens: Vec<Token>,
}

impl Mask {
    pub fn parse(mask: &str) -> Result<Self> {
        let invalid = |reason: &str| CollectorError::InvalidMask {
            mask: mask.to_string(),
            reason: reason.to_string(),
        };

        let mut tokens = Vec::new();
        let mut chars = mask.chars();
        while let Some(c) = chars.next() {
            let token = match c {
                '*' => Token::AnyRun,
                '%' => match chars.next() {
                    Some('A') => Token::Field(Field::Year4),
                    Some('a') => Token::Field(Field::Year2),
                    Some('M') => Token::Field(Field::Month),
                    Some('d') => Token::Field(Field::Day),
                    Some('h') => Token::Field(Field::Hour),
                    Some('m') => Token::Field(Field::Minute),
                    Some('s') => Token::Field(Field::Second),
                    Some('.') => Token::AnyChar,
                    Some(other) => return Err(invalid(&format!("unknown wildcard %{}", other))),
                    None => return Err(invalid("dangling %")),
                },
                literal => Token::Literal(literal),
            };
            if token == Token::AnyRun && tokens.last() == Some(&Token::AnyRun) {
                continue;
            }
            tokens.push(token);
        }

        if tokens.is_empty() {
            return Err(invalid("empty mask"));
        }

        Ok(Self {
            source: mask.to_string(),
            tokens,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True when the mask has wildcards and cannot name a single file
    pub fn has_wildcards(&self) -> bool {
        self.tokens.iter().any(|t| !matches!(t, Token::Literal(_)))
    }

    /// True when the mask carries date parts
    pub fn has_date(&self) -> bool {
        self.tokens.iter().any(|t| matches!(t, Token::Field(_)))
    }

    /// Whether `name` matches the whole mask
    pub fn matches(&self, name: &str) -> bool {
        self.capture(name).is_some()
    }

    /// Timestamp encoded in `name`.
    ///
    /// `None` when the name does not match, the mask has no year, or the date
    /// is impossible.
    pub fn timestamp(&self, name: &str) -> Option<DateTime<Utc>> {
        self.capture(name)?.timestamp().flatten()
    }

    fn capture(&self, name: &str) -> Option<DateParts> {
        let chars: Vec<char> = name.chars().collect();
        Matcher::new(&self.tokens, &chars).run(0, 0, DateParts::default())
    }
}

/// Backtracking matcher, shortest run first.
///
/// Whether the tokens from `token` on match the name from `pos` on does not
/// depend on the date parts read so far, so a failed pair is never retried.
struct Matcher<'a> {
    tokens: &'a [Token],
    name: &'a [char],
    failed: Vec<bool>,
}

impl<'a> Matcher<'a> {
    fn new(tokens: &'a [Token], name: &'a [char]) -> Self {
        Self {
            tokens,
            name,
            failed: vec![false; (tokens.len() + 1) * (name.len() + 1)],
        }
    }

    fn run(&mut self, token: usize, pos: usize, parts: DateParts) -> Option<DateParts> {
        let slot = token * (self.name.len() + 1) + pos;
        if self.failed[slot] {
            return None;
        }
        let found = self.step(token, pos, parts);
        if found.is_none() {
            self.failed[slot] = true;
        }
        found
    }

    fn step(&mut self, token: usize, pos: usize, mut parts: DateParts) -> Option<DateParts> {
        let Some(current) = self.tokens.get(token).copied() else {
            return (pos == self.name.len()).then_some(parts);
        };
        let rest = &self.name[pos..];

        match current {
            Token::Literal(expected) => {
                if rest.first() != Some(&expected) {
                    return None;
                }
                self.run(token + 1, pos + 1, parts)
            }
            Token::AnyChar => {
                if rest.is_empty() {
                    return None;
                }
                self.run(token + 1, pos + 1, parts)
            }
            Token::AnyRun => {
                let end = self.name.len();
                (pos..=end).find_map(|next| self.run(token + 1, next, parts))
            }
            Token::Field(field) => {
                let width = field.width();
                if rest.len() < width {
                    return None;
                }
                let mut value = 0u32;
                for d in &rest[..width] {
                    value = value * 10 + d.to_digit(10)?;
                }
                parts.set(field, value);
                self.run(token + 1, pos + width, parts)
            }
        }
    }
}

/// Decides which files of a dataset item get collected
#[derive(Debug, Clone)]
pub struct DataFilter {
    mask: Mask,
    filter: Filter,
    last_collected: Option<DateTime<Utc>>,
    region: Option<MultiPolygon<f64>>,
}

impl DataFilter {
    /// Build the filter of `item`.
    ///
    /// `last_collected` is the newest data timestamp already collected for
    /// the item; only newer data passes.
    pub fn new(item: &DataSetItem, last_collected: Option<DateTime<Utc>>) -> Result<Self> {
        Ok(Self {
            mask: Mask::parse(&item.mask)?,
            region: item.filter.region.as_ref().map(region_to_geo),
            filter: item.filter.clone(),
            last_collected,
        })
    }

    pub fn mask(&self) -> &Mask {
        &self.mask
    }

    pub fn last_collected(&self) -> Option<DateTime<Utc>> {
        self.last_collected
    }

    pub fn matches_name(&self, name: &str) -> bool {
        let Some(parts) = self.mask.capture(name) else {
            return false;
        };

        match parts.timestamp() {
            None => true,
            Some(None) => false,
            Some(Some(timestamp)) => self.accepts_timestamp(&timestamp),
        }
    }

    /// Names accepted by the filter, in input order
    pub fn filter_names<I, S>(&self, names: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .filter(|name| self.matches_name(name.as_ref()))
            .map(|name| name.as_ref().to_string())
            .collect()
    }

    pub fn accepts_timestamp(&self, timestamp: &DateTime<Utc>) -> bool {
        if let Some(last) = &self.last_collected {
            if timestamp <= last {
                return false;
            }
        }
        self.filter.accepts_timestamp(timestamp)
    }

    /// Whether a position lies in the area of interest (always true without one)
    pub fn contains_position(&self, lon: f64, lat: f64) -> bool {
        match &self.region {
            Some(region) => region.contains(&Point::new(lon, lat)),
            None => true,
        }
    }
}

fn ring_to_geo(ring: &[[f64; 2]]) -> LineString<f64> {
    LineString::new(ring.iter().map(|c| Coord { x: c[0], y: c[1] }).collect())
}

fn rings_to_polygon(rings: &[Vec<[f64; 2]>]) -> Option<Polygon<f64>> {
    let (exterior, interiors) = rings.split_first()?;
    Some(Polygon::new(
        ring_to_geo(exterior),
        interiors.iter().map(|r| ring_to_geo(r)).collect(),
    ))
}

fn region_to_geo(region: &Region) -> MultiPolygon<f64> {
    match region {
        Region::Polygon { coordinates } => {
            MultiPolygon::new(rings_to_polygon(coordinates).into_iter().collect())
        }
        Region::MultiPolygon { coordinates } => {
            MultiPolygon::new(coordinates.iter().filter_map(|p| rings_to_polygon(p)).collect())
        }
    }
}
