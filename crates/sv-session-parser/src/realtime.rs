// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! RealTime string parser using nom combinators
//!
//! Transform elements write times as `[-]sec[.fraction][R]`, e.g.
//! `1.500000000R`. The fraction is decimal seconds, truncated to
//! nanosecond precision.

use nom::{
    character::complete::{char, digit1, multispace0},
    combinator::{all_consuming, opt},
    sequence::preceded,
    IResult, Parser,
};
use sv_session_model::RealTime;

fn sign(input: &str) -> IResult<&str, bool> {
    let (input, minus) = opt(char('-')).parse(input)?;
    Ok((input, minus.is_some()))
}

/// Parse the fractional digits into nanoseconds
fn nanos(digits: &str) -> i32 {
    let mut nsec: i32 = 0;
    for b in digits.bytes().take(9) {
        nsec = nsec * 10 + i32::from(b - b'0');
    }
    let shown = digits.len().min(9) as u32;
    nsec * 10_i32.pow(9 - shown)
}

fn real_time(input: &str) -> IResult<&str, RealTime> {
    let (input, _) = multispace0(input)?;
    let (input, negative) = sign(input)?;
    let (input, sec) = digit1(input)?;
    let (input, frac) = opt(preceded(char('.'), digit1)).parse(input)?;
    let (input, _) = opt(char('R')).parse(input)?;
    let (input, _) = multispace0(input)?;

    let sec: i32 = lexical_core::parse(sec.as_bytes()).unwrap_or(i32::MAX);
    let nsec = frac.map(nanos).unwrap_or(0);

    let rt = if negative {
        RealTime::new(-sec, -nsec)
    } else {
        RealTime::new(sec, nsec)
    };
    Ok((input, rt))
}

/// Parse a RealTime string; `None` if the text is not of that form
pub fn parse_real_time(input: &str) -> Option<RealTime> {
    all_consuming(real_time)
        .parse(input)
        .ok()
        .map(|(_, rt)| rt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_written_form() {
        assert_eq!(
            parse_real_time("1.500000000R"),
            Some(RealTime::new(1, 500_000_000))
        );
        assert_eq!(parse_real_time("0.000000000R"), Some(RealTime::ZERO));
    }

    #[test]
    fn test_parse_loose_forms() {
        assert_eq!(parse_real_time("2"), Some(RealTime::new(2, 0)));
        assert_eq!(parse_real_time(" 0.25 "), Some(RealTime::new(0, 250_000_000)));
        assert_eq!(
            parse_real_time("-3.1R"),
            Some(RealTime::new(-3, -100_000_000))
        );
        assert_eq!(
            parse_real_time("0.1234567891"),
            Some(RealTime::new(0, 123_456_789))
        );
    }

    #[test]
    fn test_reject_garbage() {
        assert_eq!(parse_real_time(""), None);
        assert_eq!(parse_real_time("R"), None);
        assert_eq!(parse_real_time("1.5s"), None);
        assert_eq!(parse_real_time(".5"), None);
    }

    #[test]
    fn test_display_round_trip() {
        let rt = RealTime::new(-0, -42);
        assert_eq!(parse_real_time(&rt.to_string()), Some(rt));
        let rt = RealTime::new(12, 345_000_000);
        assert_eq!(parse_real_time(&rt.to_string()), Some(rt));
    }
}
