//! Parse-error plumbing shared by every parser in this crate.

use std::num::{ParseIntError, TryFromIntError};

use nom::error::{ErrorKind, FromExternalError, ParseError};

/// An extended version of [`nom::IResult`].
///
/// Carries the remaining input on success and a positioned
/// [`ProtoParseError`] on failure.
pub type ProtoResult<'a, O> = Result<(&'a [u8], O), nom::Err<ProtoParseError<'a>>>;

/// An extended version of [`nom::error::Error`].
///
/// `input` is the suffix of the line at which parsing stalled; the byte
/// offset within the original line is recovered by the caller as
/// `line.len() - input.len()`.
#[derive(Debug)]
pub struct ProtoParseError<'a> {
    pub input: &'a [u8],
    pub kind: ParseErrorKind,
}

/// What went wrong while parsing, in terms the task layer understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// The grammar needed more bytes than the line contains.
    NoData,
    /// The line contains trailing garbage after a complete response.
    TooMuchData,
    /// A token that is valid elsewhere appeared in the wrong place.
    UnexpectedHere,
    /// A run of digits did not fit the target integer type.
    BadNumber,
    /// A date or date-time did not resolve to a valid instant.
    BadDateTime,
    /// Nesting deeper than the recursion limit.
    RecursionLimitExceeded,
    /// Anything nom reports that has no more precise kind above.
    Other,
}

impl<'a> ProtoParseError<'a> {
    pub(crate) fn new(input: &'a [u8], kind: ParseErrorKind) -> Self {
        Self { input, kind }
    }

    pub(crate) fn failure(input: &'a [u8], kind: ParseErrorKind) -> nom::Err<Self> {
        nom::Err::Failure(Self::new(input, kind))
    }
}

impl<'a> ParseError<&'a [u8]> for ProtoParseError<'a> {
    fn from_error_kind(input: &'a [u8], kind: ErrorKind) -> Self {
        let kind = match kind {
            ErrorKind::Eof | ErrorKind::Complete => ParseErrorKind::NoData,
            _ => ParseErrorKind::Other,
        };

        Self { input, kind }
    }

    fn append(input: &'a [u8], kind: ErrorKind, _: Self) -> Self {
        Self::from_error_kind(input, kind)
    }
}

impl<'a> FromExternalError<&'a [u8], ParseIntError> for ProtoParseError<'a> {
    fn from_external_error(input: &'a [u8], _: ErrorKind, _: ParseIntError) -> Self {
        Self {
            input,
            kind: ParseErrorKind::BadNumber,
        }
    }
}

impl<'a> FromExternalError<&'a [u8], TryFromIntError> for ProtoParseError<'a> {
    fn from_external_error(input: &'a [u8], _: ErrorKind, _: TryFromIntError) -> Self {
        Self {
            input,
            kind: ParseErrorKind::BadNumber,
        }
    }
}
