//! Fixed-width date masks such as `yyyyMMdd_HHmm`.
//!
//! Supported fields: `yyyy`/`yy` (year), `MM` (month), `dd` (day of month),
//! `DDD` (day of year), `HH` (hour), `mm` (minute), `ss` (second) and
//! `SSS` (millisecond). Every field is parsed as exactly as many digits as
//! letters in the mask. Text inside single quotes is literal (`''` is a
//! quote), and any non-letter character is a literal that must match verbatim.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Year,
    Month,
    Day,
    DayOfYear,
    Hour,
    Minute,
    Second,
    Millis,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(char),
    Field(Field, usize),
}

/// A compiled date mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatePattern {
    text: String,
    tokens: Vec<Token>,
}

impl DatePattern {
    pub fn compile(mask: &str) -> Result<Self, String> {
        let chars: Vec<char> = mask.chars().collect();
        let mut tokens = Vec::new();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            if c == '\'' {
                // quoted literal run; '' is an escaped quote
                if chars.get(i + 1) == Some(&'\'') {
                    tokens.push(Token::Literal('\''));
                    i += 2;
                    continue;
                }
                let mut j = i + 1;
                loop {
                    match chars.get(j) {
                        None => return Err(format!("Unterminated quote in date mask '{}'", mask)),
                        Some('\'') if chars.get(j + 1) == Some(&'\'') => {
                            tokens.push(Token::Literal('\''));
                            j += 2;
                        }
                        Some('\'') => break,
                        Some(&lit) => {
                            tokens.push(Token::Literal(lit));
                            j += 1;
                        }
                    }
                }
                i = j + 1;
                continue;
            }

            if c.is_ascii_alphabetic() {
                let mut run = 1;
                while chars.get(i + run) == Some(&c) {
                    run += 1;
                }
                let field = match c {
                    'y' => Field::Year,
                    'M' => Field::Month,
                    'd' => Field::Day,
                    'D' => Field::DayOfYear,
                    'H' => Field::Hour,
                    'm' => Field::Minute,
                    's' => Field::Second,
                    'S' => Field::Millis,
                    other => {
                        return Err(format!(
                            "Unsupported date field '{}' in date mask '{}'",
                            other, mask
                        ))
                    }
                };
                if field == Field::Year && run != 2 && run != 4 {
                    return Err(format!("Year field must be yy or yyyy in date mask '{}'", mask));
                }
                tokens.push(Token::Field(field, run));
                i += run;
                continue;
            }

            tokens.push(Token::Literal(c));
            i += 1;
        }

        if !tokens.iter().any(|t| matches!(t, Token::Field(..))) {
            return Err(format!("Date mask '{}' has no date fields", mask));
        }

        Ok(Self {
            text: mask.to_string(),
            tokens,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of characters of input this pattern consumes.
    pub fn width(&self) -> usize {
        self.tokens
            .iter()
            .map(|t| match t {
                Token::Literal(_) => 1,
                Token::Field(_, n) => *n,
            })
            .sum()
    }

    /// Parse a date at the start of `text`.
    ///
    /// Returns the date and the number of bytes consumed, or `None` if the
    /// text does not match the mask or names an impossible calendar date.
    pub fn parse_prefix(&self, text: &str) -> Option<(DateTime<Utc>, usize)> {
        let mut chars = text.char_indices().peekable();
        let mut year: i32 = 1970;
        let mut month: u32 = 1;
        let mut day: u32 = 1;
        let mut day_of_year: Option<u32> = None;
        let mut hour: u32 = 0;
        let mut minute: u32 = 0;
        let mut second: u32 = 0;
        let mut millis: u32 = 0;

        for token in &self.tokens {
            match token {
                Token::Literal(expected) => {
                    let (_, c) = chars.next()?;
                    if c != *expected {
                        return None;
                    }
                }
                Token::Field(field, width) => {
                    let mut value: u32 = 0;
                    for _ in 0..*width {
                        let (_, c) = chars.next()?;
                        let digit = c.to_digit(10)?;
                        value = value.checked_mul(10)?.checked_add(digit)?;
                    }
                    match field {
                        Field::Year if *width == 2 => {
                            // POSIX pivot: 69-99 -> 19xx, 00-68 -> 20xx
                            year = if value >= 69 { 1900 + value as i32 } else { 2000 + value as i32 };
                        }
                        Field::Year => year = value as i32,
                        Field::Month => month = value,
                        Field::Day => day = value,
                        Field::DayOfYear => day_of_year = Some(value),
                        Field::Hour => hour = value,
                        Field::Minute => minute = value,
                        Field::Second => second = value,
                        Field::Millis => millis = value,
                    }
                }
            }
        }

        let consumed = chars.peek().map(|(idx, _)| *idx).unwrap_or(text.len());
        let date = match day_of_year {
            Some(doy) => NaiveDate::from_yo_opt(year, doy)?,
            None => NaiveDate::from_ymd_opt(year, month, day)?,
        };
        let naive = date.and_hms_milli_opt(hour, minute, second, millis)?;
        Some((Utc.from_utc_datetime(&naive), consumed))
    }

    /// Parse `text` in full; trailing characters are a mismatch.
    pub fn parse(&self, text: &str) -> Option<DateTime<Utc>> {
        match self.parse_prefix(text) {
            Some((date, consumed)) if consumed == text.len() => Some(date),
            _ => None,
        }
    }
}

impl fmt::Display for DatePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
