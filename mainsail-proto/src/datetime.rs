//! Date-time parsing: IMAP `date-time` (INTERNALDATE) and the RFC 2822/5322
//! `date-time` found in envelopes and message headers.

use abnf_core::{is_digit, streaming::sp};
use chrono::{
    DateTime, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone,
};
use nom::{
    branch::alt,
    bytes::streaming::{tag, tag_no_case, take_while_m_n},
    character::streaming::char,
    combinator::{map, opt, value},
    sequence::{delimited, preceded, terminated, tuple},
};

use crate::decode::{ParseErrorKind, ProtoParseError, ProtoResult};

/// `date-month = "Jan" / "Feb" / "Mar" / "Apr" / "May" / "Jun" /
///               "Jul" / "Aug" / "Sep" / "Oct" / "Nov" / "Dec"`
fn date_month(input: &[u8]) -> ProtoResult<'_, u32> {
    alt((
        value(1, tag_no_case(b"Jan")),
        value(2, tag_no_case(b"Feb")),
        value(3, tag_no_case(b"Mar")),
        value(4, tag_no_case(b"Apr")),
        value(5, tag_no_case(b"May")),
        value(6, tag_no_case(b"Jun")),
        value(7, tag_no_case(b"Jul")),
        value(8, tag_no_case(b"Aug")),
        value(9, tag_no_case(b"Sep")),
        value(10, tag_no_case(b"Oct")),
        value(11, tag_no_case(b"Nov")),
        value(12, tag_no_case(b"Dec")),
    ))(input)
}

fn digits_n(min: usize, max: usize) -> impl Fn(&[u8]) -> ProtoResult<'_, u32> {
    move |input| {
        map(take_while_m_n(min, max, is_digit), |bytes: &[u8]| {
            bytes.iter().fold(0u32, |acc, b| acc * 10 + u32::from(b - b'0'))
        })(input)
    }
}

/// `zone = ("+" / "-") 4DIGIT`
fn numeric_zone(input: &[u8]) -> ProtoResult<'_, Option<FixedOffset>> {
    let (remaining, (sign, hh, mm)) =
        tuple((alt((char('+'), char('-'))), digits_n(2, 2), digits_n(2, 2)))(input)?;

    let offset = 3600 * (hh as i32) + 60 * (mm as i32);

    let zone = match sign {
        '+' => FixedOffset::east_opt(offset),
        '-' => FixedOffset::west_opt(offset),
        _ => unreachable!(),
    };

    Ok((remaining, zone))
}

/// `date-day-fixed = (SP DIGIT) / 2DIGIT`
fn date_day_fixed(input: &[u8]) -> ProtoResult<'_, u32> {
    alt((preceded(sp, digits_n(1, 1)), digits_n(2, 2)))(input)
}

/// `time = 2DIGIT ":" 2DIGIT ":" 2DIGIT`
fn time(input: &[u8]) -> ProtoResult<'_, Option<NaiveTime>> {
    let (remaining, (h, _, m, _, s)) = tuple((
        digits_n(2, 2),
        tag(b":"),
        digits_n(2, 2),
        tag(b":"),
        digits_n(2, 2),
    ))(input)?;

    Ok((remaining, NaiveTime::from_hms_opt(h, m, s)))
}

/// IMAP `date-time`, as found in INTERNALDATE:
///
/// ```abnf
/// date-time = DQUOTE date-day-fixed "-" date-month "-" date-year SP
///             time SP zone DQUOTE
/// ```
pub fn date_time(input: &[u8]) -> ProtoResult<'_, DateTime<FixedOffset>> {
    let mut parser = delimited(
        tag(b"\""),
        tuple((
            date_day_fixed,
            tag(b"-"),
            date_month,
            tag(b"-"),
            digits_n(4, 4),
            sp,
            time,
            sp,
            numeric_zone,
        )),
        tag(b"\""),
    );

    let (remaining, (d, _, m, _, y, _, time, _, zone)) = parser(input)?;

    let date = NaiveDate::from_ymd_opt(y as i32, m, d);

    match (date, time, zone) {
        (Some(date), Some(time), Some(zone)) => {
            let local = NaiveDateTime::new(date, time);
            if let LocalResult::Single(datetime) = zone.from_local_datetime(&local) {
                Ok((remaining, datetime))
            } else {
                Err(ProtoParseError::failure(input, ParseErrorKind::BadDateTime))
            }
        }
        _ => Err(ProtoParseError::failure(input, ParseErrorKind::BadDateTime)),
    }
}

/// An obsolete RFC 2822 named zone, or a single-letter military zone.
///
/// The military zones are defined with wrong signs in RFC 822 and are
/// therefore specified to carry zero offset; the named US zones keep their
/// historical meaning.
fn obsolete_zone(input: &[u8]) -> ProtoResult<'_, Option<FixedOffset>> {
    let named = alt((
        value(0, tag_no_case(b"UT")),
        value(0, tag_no_case(b"GMT")),
        value(-5, tag_no_case(b"EST")),
        value(-4, tag_no_case(b"EDT")),
        value(-6, tag_no_case(b"CST")),
        value(-5, tag_no_case(b"CDT")),
        value(-7, tag_no_case(b"MST")),
        value(-6, tag_no_case(b"MDT")),
        value(-8, tag_no_case(b"PST")),
        value(-7, tag_no_case(b"PDT")),
    ));

    alt((
        map(named, |hours: i32| FixedOffset::east_opt(hours * 3600)),
        map(
            take_while_m_n(1, 1, |b: u8| {
                b.is_ascii_alphabetic() && !matches!(b, b'j' | b'J')
            }),
            |_| FixedOffset::east_opt(0),
        ),
    ))(input)
}

/// RFC 2822/5322 `date-time`:
///
/// ```abnf
/// date-time   = [ day-of-week "," ] date time [CFWS]
/// date        = day month year
/// time        = time-of-day zone
/// zone        = (("+" / "-") 4DIGIT) / obs-zone
/// ```
///
/// Folding whitespace is reduced to plain spaces by the caller (header
/// unfolding happens in [`crate::rfc5322`]); comments are not supported.
/// A missing zone and missing seconds are tolerated, both defaulting the
/// way the obsolete grammar reads (zone = +0000, seconds = 0).
pub fn rfc2822_date_time(input: &[u8]) -> ProtoResult<'_, DateTime<FixedOffset>> {
    let day_of_week = tuple((
        opt(sp),
        alt((
            tag_no_case(b"Mon"),
            tag_no_case(b"Tue"),
            tag_no_case(b"Wed"),
            tag_no_case(b"Thu"),
            tag_no_case(b"Fri"),
            tag_no_case(b"Sat"),
            tag_no_case(b"Sun"),
        )),
        tag(b","),
    ));

    let mut parser = tuple((
        opt(day_of_week),
        delimited(take_spaces, digits_n(1, 2), take_spaces),
        terminated(date_month, take_spaces),
        terminated(digits_n(2, 4), take_spaces),
        digits_n(2, 2),
        preceded(tuple((take_spaces, tag(b":"), take_spaces)), digits_n(2, 2)),
        opt(preceded(
            tuple((take_spaces, tag(b":"), take_spaces)),
            digits_n(2, 2),
        )),
        opt(preceded(take_spaces1, alt((numeric_zone, obsolete_zone)))),
    ));

    let (remaining, (_, day, month, year, hours, minutes, seconds, zone)) = parser(input)?;

    // Two-digit years per the obsolete grammar: 00..=49 means 20xx.
    let year = match year {
        0..=49 => year + 2000,
        50..=999 => year + 1900,
        _ => year,
    };

    let date = NaiveDate::from_ymd_opt(year as i32, month, day);
    let time = NaiveTime::from_hms_opt(hours, minutes, seconds.unwrap_or(0));
    let zone = zone
        .unwrap_or_else(|| FixedOffset::east_opt(0))
        .or_else(|| FixedOffset::east_opt(0));

    match (date, time, zone) {
        (Some(date), Some(time), Some(zone)) => {
            match zone.from_local_datetime(&NaiveDateTime::new(date, time)) {
                LocalResult::Single(datetime) => Ok((remaining, datetime)),
                _ => Err(ProtoParseError::failure(input, ParseErrorKind::BadDateTime)),
            }
        }
        _ => Err(ProtoParseError::failure(input, ParseErrorKind::BadDateTime)),
    }
}

fn take_spaces(input: &[u8]) -> ProtoResult<'_, &[u8]> {
    nom::bytes::streaming::take_while(|b| b == b' ')(input)
}

fn take_spaces1(input: &[u8]) -> ProtoResult<'_, &[u8]> {
    nom::bytes::streaming::take_while1(|b| b == b' ')(input)
}
