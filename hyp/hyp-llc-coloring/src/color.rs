//! LLC colors and the textual color-set syntax.
//!
//! ```text
//! SPEC  ::= TERM (',' TERM)*
//! TERM  ::= COLOR | COLOR '-' COLOR
//! COLOR ::= integer, base detected from its prefix (0x.., 0.., decimal)
//! ```
//!
//! `"0,2-6,15-16"` expands to `[0, 2, 3, 4, 5, 6, 15, 16]`. Terms expand in
//! order of appearance, ranges ascending. Empty terms (including a trailing
//! comma) are malformed.

use crate::error::ColorConfigError;
use crate::num::parse_uint_prefix;
use alloc::vec::Vec;
use core::fmt;

/// Index of one LLC color.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct Color(u32);

impl Color {
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u32> for Color {
    fn from(index: u32) -> Self {
        Self(index)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Color({})", self.0)
    }
}

/// Parse a color set, accepting at most `max_colors` entries.
///
/// The whole input is checked and the expansion size computed before any
/// color is produced. Duplicates are kept; [`validate`] rejects them.
///
/// # Errors
/// [`ColorConfigError::Empty`] for an empty string, [`ColorConfigError::Malformed`]
/// on a syntax error, [`ColorConfigError::InvertedRange`] for `start > end`,
/// [`ColorConfigError::TooManyColors`] if the expansion exceeds `max_colors`,
/// and [`ColorConfigError::ColorOutOfRange`] for values beyond `u32`.
pub fn parse_color_config(spec: &str, max_colors: usize) -> Result<Vec<Color>, ColorConfigError> {
    let terms = parse_terms(spec)?;

    let mut count: u64 = 0;
    for &(start, end) in &terms {
        count = count.saturating_add(u64::from(end - start) + 1);
        if count > max_colors as u64 {
            return Err(ColorConfigError::TooManyColors {
                count,
                max: max_colors,
            });
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    let mut colors = Vec::with_capacity(count as usize);
    for (start, end) in terms {
        colors.extend((start..=end).map(Color));
    }
    Ok(colors)
}

/// Syntax pass: the `(start, end)` pair of every term, `start == end` for singles.
fn parse_terms(spec: &str) -> Result<Vec<(u32, u32)>, ColorConfigError> {
    let bytes = spec.as_bytes();
    if bytes.is_empty() {
        return Err(ColorConfigError::Empty);
    }

    let mut terms = Vec::new();
    let mut pos = 0;
    loop {
        let start = parse_color(bytes, &mut pos)?;
        let end = if bytes.get(pos) == Some(&b'-') {
            pos += 1;
            parse_color(bytes, &mut pos)?
        } else {
            start
        };
        if start > end {
            return Err(ColorConfigError::InvertedRange {
                start: u64::from(start),
                end: u64::from(end),
            });
        }
        terms.push((start, end));

        match bytes.get(pos) {
            None => return Ok(terms),
            Some(b',') => pos += 1,
            Some(_) => return Err(ColorConfigError::Malformed { position: pos }),
        }
    }
}

fn parse_color(bytes: &[u8], pos: &mut usize) -> Result<u32, ColorConfigError> {
    let (value, len) = parse_uint_prefix(&bytes[*pos..])
        .ok_or(ColorConfigError::Malformed { position: *pos })?;
    *pos += len;
    u32::try_from(value).map_err(|_| ColorConfigError::ColorOutOfRange {
        color: value,
        max: u32::MAX as usize,
    })
}

/// Whether `colors` can be bound to a domain: at most `max_colors` entries,
/// each below `max_colors`, no duplicates.
#[must_use]
pub fn validate(colors: &[Color], max_colors: usize) -> bool {
    check(colors, max_colors).is_ok()
}

/// [`validate`] with the reason for a rejection.
///
/// # Errors
/// The first problem found, in the order: count, range, duplicates.
pub fn check(colors: &[Color], max_colors: usize) -> Result<(), ColorConfigError> {
    if colors.len() > max_colors {
        return Err(ColorConfigError::TooManyColors {
            count: colors.len() as u64,
            max: max_colors,
        });
    }
    if let Some(c) = colors.iter().find(|c| c.index() >= max_colors) {
        return Err(ColorConfigError::ColorOutOfRange {
            color: u64::from(c.as_u32()),
            max: max_colors,
        });
    }

    let mut seen = alloc::vec![false; max_colors];
    for &c in colors {
        if core::mem::replace(&mut seen[c.index()], true) {
            return Err(ColorConfigError::DuplicateColor(c));
        }
    }
    Ok(())
}

/// Every color, ascending: `[0, 1, .., max_colors - 1]`.
#[must_use]
pub fn default_colors(max_colors: u32) -> Vec<Color> {
    (0..max_colors).map(Color).collect()
}

/// Renders colors with ascending runs collapsed, e.g. `0-3, 8, 10-11`.
pub struct ColorRanges<'a>(pub &'a [Color]);

impl fmt::Display for ColorRanges<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rest = self.0;
        let mut first = true;
        while let Some((&start, tail)) = rest.split_first() {
            let run = tail
                .iter()
                .zip(start.0 + 1..)
                .take_while(|(c, expected)| c.0 == *expected)
                .count();
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            if run == 0 {
                write!(f, "{start}")?;
            } else {
                write!(f, "{start}-{}", tail[run - 1])?;
            }
            rest = &tail[run..];
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn colors(v: &[u32]) -> Vec<Color> {
        v.iter().copied().map(Color::new).collect()
    }

    #[test]
    fn parses_singles_and_ranges_in_order() {
        assert_eq!(
            parse_color_config("0,2-6,15-16", 32).unwrap(),
            colors(&[0, 2, 3, 4, 5, 6, 15, 16])
        );
        assert_eq!(parse_color_config("7,1", 8).unwrap(), colors(&[7, 1]));
        assert_eq!(parse_color_config("0x10-0x11,010", 32).unwrap(), colors(&[16, 17, 8]));
    }

    #[test]
    fn rejects_bad_syntax() {
        assert_eq!(parse_color_config("", 8), Err(ColorConfigError::Empty));
        assert_eq!(
            parse_color_config("abc", 8),
            Err(ColorConfigError::Malformed { position: 0 })
        );
        assert_eq!(
            parse_color_config("0,1,", 8),
            Err(ColorConfigError::Malformed { position: 4 })
        );
        assert_eq!(
            parse_color_config("1-", 8),
            Err(ColorConfigError::Malformed { position: 2 })
        );
        assert_eq!(
            parse_color_config("1 ,2", 8),
            Err(ColorConfigError::Malformed { position: 1 })
        );
        assert_eq!(
            parse_color_config("1-2-3", 8),
            Err(ColorConfigError::Malformed { position: 3 })
        );
    }

    #[test]
    fn rejects_inverted_range() {
        assert_eq!(
            parse_color_config("5-2", 8),
            Err(ColorConfigError::InvertedRange { start: 5, end: 2 })
        );
    }

    #[test]
    fn overflow_is_detected_before_expansion() {
        assert_eq!(
            parse_color_config("0-3,4-8", 8),
            Err(ColorConfigError::TooManyColors { count: 9, max: 8 })
        );
        // A huge range must not be expanded just to be rejected.
        assert_eq!(
            parse_color_config("0-4000000000", 1024),
            Err(ColorConfigError::TooManyColors {
                count: 4_000_000_001,
                max: 1024
            })
        );
        assert_eq!(
            parse_color_config("4294967296", 8),
            Err(ColorConfigError::ColorOutOfRange {
                color: 4_294_967_296,
                max: u32::MAX as usize
            })
        );
    }

    #[test]
    fn parse_keeps_duplicates_validate_rejects_them() {
        let parsed = parse_color_config("1-3,2", 8).unwrap();
        assert_eq!(parsed, colors(&[1, 2, 3, 2]));
        assert!(!validate(&parsed, 8));
        assert_eq!(
            check(&parsed, 8),
            Err(ColorConfigError::DuplicateColor(Color::new(2)))
        );
    }

    #[test]
    fn validate_bounds() {
        assert!(validate(&colors(&[0, 7]), 8));
        assert!(validate(&[], 8));
        assert!(!validate(&colors(&[8]), 8));
        assert!(!validate(&colors(&[0, 1, 2]), 2));
    }

    #[test]
    fn default_set_is_ascending() {
        assert_eq!(default_colors(8), colors(&[0, 1, 2, 3, 4, 5, 6, 7]));
        assert!(validate(&default_colors(8), 8));
    }

    #[test]
    fn ranges_collapse_runs() {
        let c = colors(&[0, 1, 2, 3, 8, 10, 11, 5]);
        assert_eq!(ColorRanges(&c).to_string(), "0-3, 8, 10-11, 5");
        assert_eq!(ColorRanges(&[]).to_string(), "");
        assert_eq!(ColorRanges(&colors(&[4])).to_string(), "4");
    }
}
