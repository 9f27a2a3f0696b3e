use nom::{
    branch::alt,
    bytes::complete::tag_no_case,
    character::complete::{char, digit1, hex_digit1, space0},
    combinator::{all_consuming, map_res, opt, rest},
    sequence::{delimited, pair, preceded},
    IResult,
};
use thiserror::Error;

use crate::pattern::AccessPattern;

#[derive(Error, Debug, PartialEq, Eq)]
#[error("line {line}: expected an address, found `{text}`")]
pub struct ParseTraceError {
    pub line: usize,
    pub text: String,
}

fn hex(i: &str) -> IResult<&str, usize> {
    map_res(preceded(tag_no_case("0x"), hex_digit1), |s| {
        usize::from_str_radix(s, 16)
    })(i)
}

fn dec(i: &str) -> IResult<&str, usize> {
    map_res(digit1, str::parse::<usize>)(i)
}

fn comment(i: &str) -> IResult<&str, &str> {
    preceded(char('#'), rest)(i)
}

/// `[addr] [# comment]`, surrounded by optional blanks
fn line(i: &str) -> IResult<&str, Option<usize>> {
    all_consuming(delimited(
        space0,
        opt(alt((hex, dec))),
        pair(space0, opt(comment)),
    ))(i)
}

/// One address per line, decimal or `0x` hex. Blank lines and `#` comments are skipped.
pub fn parse_trace(src: &str) -> Result<Vec<usize>, ParseTraceError> {
    let mut addresses = Vec::new();
    for (n, l) in src.lines().enumerate() {
        let l = l.trim_end_matches('\r');
        match line(l) {
            Ok((_, Some(a))) => addresses.push(a),
            Ok((_, None)) => {}
            Err(_) => {
                return Err(ParseTraceError {
                    line: n + 1,
                    text: l.trim().to_string(),
                })
            }
        }
    }
    Ok(addresses)
}

impl AccessPattern {
    pub fn from_trace(name: impl Into<String>, src: &str) -> Result<Self, ParseTraceError> {
        Ok(AccessPattern::Trace {
            name: name.into(),
            addresses: parse_trace(src)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trace() {
        let src = "# warm-up\n0\n  0x40  \n\n128 # third\n0XC0\n";
        assert_eq!(Ok(vec![0, 64, 128, 192]), parse_trace(src));
    }
    #[test]
    fn test_parse_error_line() {
        let src = "0x10\n\nzzz\n";
        assert_eq!(
            Err(ParseTraceError {
                line: 3,
                text: "zzz".to_string()
            }),
            parse_trace(src)
        );
        assert_eq!(1, parse_trace("0x").unwrap_err().line);
        assert_eq!(1, parse_trace("12 34").unwrap_err().line);
    }
    #[test]
    fn test_trace_pattern() {
        let p = AccessPattern::from_trace("replay", "1\n2\n").unwrap();
        assert_eq!("replay", p.name());
        assert_eq!(2, p.addresses().len());
    }
}
