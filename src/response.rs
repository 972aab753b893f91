//! SMTP response, containing a mandatory return code and an optional text
//! message

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::result;
use std::str::FromStr;

use nom::{
    branch::alt,
    bytes::streaming::{tag, take_until},
    combinator::{complete, map},
    multi::many0,
    sequence::{preceded, terminated, tuple},
    IResult,
};

use crate::error::Error;

/// First digit indicates severity
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Severity {
    /// 2yx
    PositiveCompletion = 2,
    /// 3yz
    PositiveIntermediate = 3,
    /// 4yz
    TransientNegativeCompletion = 4,
    /// 5yz
    PermanentNegativeCompletion = 5,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", *self as u8)
    }
}

/// Second digit
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Category {
    /// x0z
    Syntax = 0,
    /// x1z
    Information = 1,
    /// x2z
    Connections = 2,
    /// x3z
    Unspecified3 = 3,
    /// x4z
    Unspecified4 = 4,
    /// x5z
    MailSystem = 5,
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", *self as u8)
    }
}

/// The detail digit of a response code (third digit)
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct Detail(pub u8);

impl Display for Detail {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

/// Represents a 3 digit SMTP response code
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct Code {
    /// First digit of the response code
    pub severity: Severity,
    /// Second digit of the response code
    pub category: Category,
    /// Third digit
    pub detail: Detail,
}

impl Display for Code {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}{}{}", self.severity, self.category, self.detail)
    }
}

impl Code {
    /// Creates a new `Code` structure
    pub fn new(severity: Severity, category: Category, detail: Detail) -> Code {
        Code {
            severity,
            category,
            detail,
        }
    }

    /// The code as a plain number, e.g. `250`
    pub fn value(self) -> u16 {
        u16::from(self.severity as u8) * 100
            + u16::from(self.category as u8) * 10
            + u16::from(self.detail.0)
    }
}

/// Contains an SMTP reply, with separated code and message
///
/// The text message is optional, only the code is mandatory
#[derive(PartialEq, Eq, Clone, Debug)]
pub struct Response {
    /// Response code
    pub code: Code,
    /// Server response string (optional)
    /// Handle multiline responses
    pub message: Vec<String>,
}

impl FromStr for Response {
    type Err = Error;

    fn from_str(s: &str) -> result::Result<Response, Error> {
        match parse_response(s) {
            Ok((_, response)) => Ok(response),
            Err(nom::Err::Incomplete(_)) => Err(Error::Malformed("incomplete response")),
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => Err(Error::Syntax(e.code)),
        }
    }
}

impl Response {
    /// Creates a new `Response`
    pub fn new(code: Code, message: Vec<String>) -> Response {
        Response { code, message }
    }

    /// Tells if the response is positive
    pub fn is_positive(&self) -> bool {
        matches!(
            self.code.severity,
            Severity::PositiveCompletion | Severity::PositiveIntermediate
        )
    }

    /// Tests code equality
    pub fn has_code(&self, code: u16) -> bool {
        self.code.value() == code
    }

    /// Returns only the first word of the message if possible
    pub fn first_word(&self) -> Option<&str> {
        self.message
            .first()
            .and_then(|line| line.split_whitespace().next())
    }

    /// Returns only the line of the message if possible
    pub fn first_line(&self) -> Option<&str> {
        self.message.first().map(String::as_str)
    }
}

fn parse_severity(i: &str) -> IResult<&str, Severity> {
    alt((
        map(tag("2"), |_| Severity::PositiveCompletion),
        map(tag("3"), |_| Severity::PositiveIntermediate),
        map(tag("4"), |_| Severity::TransientNegativeCompletion),
        map(tag("5"), |_| Severity::PermanentNegativeCompletion),
    ))(i)
}

fn parse_category(i: &str) -> IResult<&str, Category> {
    alt((
        map(tag("0"), |_| Category::Syntax),
        map(tag("1"), |_| Category::Information),
        map(tag("2"), |_| Category::Connections),
        map(tag("3"), |_| Category::Unspecified3),
        map(tag("4"), |_| Category::Unspecified4),
        map(tag("5"), |_| Category::MailSystem),
    ))(i)
}

fn parse_detail(i: &str) -> IResult<&str, Detail> {
    alt((
        map(tag("0"), |_| Detail(0)),
        map(tag("1"), |_| Detail(1)),
        map(tag("2"), |_| Detail(2)),
        map(tag("3"), |_| Detail(3)),
        map(tag("4"), |_| Detail(4)),
        map(tag("5"), |_| Detail(5)),
        map(tag("6"), |_| Detail(6)),
        map(tag("7"), |_| Detail(7)),
        map(tag("8"), |_| Detail(8)),
        map(tag("9"), |_| Detail(9)),
    ))(i)
}

fn parse_code(i: &str) -> IResult<&str, Code> {
    map(
        tuple((parse_severity, parse_category, parse_detail)),
        |(severity, category, detail)| Code {
            severity,
            category,
            detail,
        },
    )(i)
}

/// Parses one complete reply out of `i`.
///
/// Returns `nom::Err::Incomplete` while the final line has not arrived yet, so
/// callers can keep reading from the wire.
pub fn parse_response(i: &str) -> IResult<&str, Response> {
    let (i, lines) = many0(tuple((
        parse_code,
        preceded(tag("-"), take_until("\r\n")),
        tag("\r\n"),
    )))(i)?;
    let (i, (last_code, last_line)) = tuple((
        parse_code,
        terminated(
            alt((preceded(tag(" "), take_until("\r\n")), complete(tag("")))),
            tag("\r\n"),
        ),
    ))(i)?;

    // Check that all codes are equal.
    if !lines.iter().all(|&(code, _, _)| code == last_code) {
        return Err(nom::Err::Failure(nom::error::Error::new(
            "",
            nom::error::ErrorKind::Not,
        )));
    }

    // Extract text from lines, and append last line.
    let mut lines: Vec<String> = lines
        .into_iter()
        .map(|(_, text, _)| text.to_string())
        .collect();
    lines.push(last_line.to_string());

    Ok((
        i,
        Response {
            code: last_code,
            message: lines,
        },
    ))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_severity_fmt() {
        assert_eq!(format!("{}", Severity::PositiveCompletion), "2");
    }

    #[test]
    fn test_code_display() {
        let code = Code {
            severity: Severity::TransientNegativeCompletion,
            category: Category::MailSystem,
            detail: Detail(1),
        };
        assert_eq!(code.to_string(), "451");
        assert_eq!(code.value(), 451);
    }

    #[test]
    fn test_response_from_str() {
        let raw_response = "250-me\r\n250-8BITMIME\r\n250-SIZE 42\r\n250 AUTH PLAIN CRAM-MD5\r\n";
        assert_eq!(
            raw_response.parse::<Response>().unwrap(),
            Response {
                code: Code {
                    severity: Severity::PositiveCompletion,
                    category: Category::MailSystem,
                    detail: Detail(0),
                },
                message: vec![
                    "me".to_string(),
                    "8BITMIME".to_string(),
                    "SIZE 42".to_string(),
                    "AUTH PLAIN CRAM-MD5".to_string(),
                ],
            }
        );

        let wrong_code = "2506-me\r\n250-8BITMIME\r\n250-SIZE 42\r\n250 AUTH PLAIN CRAM-MD5\r\n";
        assert!(wrong_code.parse::<Response>().is_err());

        let wrong_end = "250-me\r\n250-8BITMIME\r\n250-SIZE 42\r\n250-AUTH PLAIN CRAM-MD5\r\n";
        assert!(wrong_end.parse::<Response>().is_err());

        let mixed_codes = "250-me\r\n251 done\r\n";
        assert!(mixed_codes.parse::<Response>().is_err());
    }

    #[test]
    fn test_partial_response_is_incomplete() {
        assert!(matches!(
            parse_response("250-me\r\n250-8BITMIME\r\n"),
            Err(nom::Err::Incomplete(_))
        ));
        assert!(matches!(parse_response("22"), Err(nom::Err::Incomplete(_))));
    }

    #[test]
    fn test_bare_code() {
        let response = "354\r\n".parse::<Response>().unwrap();
        assert!(response.has_code(354));
        assert!(response.is_positive());
        assert_eq!(response.first_line(), Some(""));
    }

    #[test]
    fn test_response_helpers() {
        let response = "334 VXNlcm5hbWU6\r\n".parse::<Response>().unwrap();
        assert!(response.has_code(334));
        assert!(!response.has_code(335));
        assert_eq!(response.first_word(), Some("VXNlcm5hbWU6"));

        let rejected = "550 5.1.1 no such user\r\n".parse::<Response>().unwrap();
        assert!(!rejected.is_positive());
        assert_eq!(rejected.first_word(), Some("5.1.1"));
        assert_eq!(rejected.first_line(), Some("5.1.1 no such user"));
    }
}
