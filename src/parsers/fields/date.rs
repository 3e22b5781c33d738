/*
 * Copyright Stalwart Labs Ltd. See the COPYING
 * file at the top-level directory of this distribution.
 *
 * Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
 * https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
 * <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
 * option. This file may not be copied, modified, or distributed
 * except according to those terms.
 */

use crate::{
    core::{
        datetime::{DateTime, MONTH},
        header::HeaderValue,
        options::{ParserOptions, Warning},
    },
    parsers::MessageStream,
};

/// Named zones mapped to their `±HHMM` offsets, US zones and the
/// single-letter military forms included.
static TZ_NAMES: &[(&[u8], i32)] = &[
    (b"UT", 0),
    (b"GMT", 0),
    (b"EST", -500),
    (b"EDT", -400),
    (b"CST", -600),
    (b"CDT", -500),
    (b"MST", -700),
    (b"MDT", -600),
    (b"PST", -800),
    (b"PDT", -700),
    (b"Z", 0),
    (b"A", -100),
    (b"M", -1200),
    (b"N", 100),
    (b"Y", 1200),
];

/// Calendar fields picked out of the date tokens one at a time. The
/// weekday and anything else unrecognizable is left where it lies.
#[derive(Default)]
struct DateBuilder {
    day: Option<u32>,
    month: Option<u32>,
    year: Option<u32>,
    time: Option<(u32, u32, u32)>,
    /// Signed `HHMM` zone value.
    tz: Option<i32>,
}

impl DateBuilder {
    fn feed(&mut self, token: &str) {
        if token.is_empty() {
            return;
        }

        if token.contains(':') {
            if self.time.is_none() {
                self.time = parse_time(token);
            }
        } else if token.starts_with('+') || token.starts_with('-') {
            if self.tz.is_none() {
                if let Ok(value) = token[1..].parse::<i32>() {
                    self.tz = Some(if token.starts_with('-') { -value } else { value });
                }
            }
        } else if token.bytes().all(|ch| ch.is_ascii_digit()) {
            // bare numbers fill day, month and year in the order the
            // grammar puts them; a month name takes the middle slot
            let number = token.parse().ok();
            if self.day.is_none() {
                self.day = number;
            } else if self.month.is_none() {
                self.month = number;
            } else if self.year.is_none() {
                self.year = number;
            }
        } else if self.month.is_none() && month_number(token).is_some() {
            self.month = month_number(token);
        } else if self.time.is_some() && self.tz.is_none() {
            self.tz = zone_offset(token);
        }
    }

    /// Starts over; the date of a Received field follows its final `;`.
    fn reset(&mut self) {
        *self = DateBuilder::default();
    }

    fn build(&self) -> Option<DateTime> {
        let (hour, minute, second) = self.time?;
        let year = match self.year? {
            year @ 1..=99 => year + 1900,
            year => year,
        };
        // the epoch era starts at 1969, anything earlier is noise
        if year < 1969 {
            return None;
        }

        let tz = self.tz.unwrap_or(0);
        let datetime = DateTime {
            year: year as u16,
            month: self.month? as u8,
            day: self.day? as u8,
            hour: hour as u8,
            minute: minute as u8,
            second: second as u8,
            tz_before_gmt: tz < 0,
            tz_hour: (tz.unsigned_abs() / 100) as u8,
            tz_minute: (tz.unsigned_abs() % 100) as u8,
        };
        datetime.is_valid().then_some(datetime)
    }
}

/// `HH:MM` or `HH:MM:SS`.
fn parse_time(token: &str) -> Option<(u32, u32, u32)> {
    let mut parts = token.split(':');
    let hour = parts.next()?.parse().ok()?;
    let minute = parts.next()?.parse().ok()?;
    let second = match parts.next() {
        Some(second) => second.parse().ok()?,
        None => 0,
    };
    parts.next().is_none().then_some((hour, minute, second))
}

/// Matches the first three letters against the month names.
fn month_number(token: &str) -> Option<u32> {
    let prefix = token.get(..3)?;
    MONTH
        .iter()
        .position(|month| month.eq_ignore_ascii_case(prefix))
        .map(|index| index as u32 + 1)
}

fn zone_offset(token: &str) -> Option<i32> {
    TZ_NAMES
        .iter()
        .find(|(name, _)| token.as_bytes().eq_ignore_ascii_case(name))
        .map(|&(_, offset)| offset)
}

impl<'x> MessageStream<'x> {
    /// Parses an RFC 822/5322 date in two passes: the header text is
    /// cut into tokens (commas, comments and folds dropped), then each
    /// token is matched by shape against the calendar fields. Two-digit
    /// years get 1900 added and anything assembling to before 1969 is
    /// rejected; a `;` restarts collection so the date trailing a
    /// Received field wins. On failure the epoch is returned and a
    /// warning recorded.
    pub fn parse_date(&mut self, options: &ParserOptions) -> HeaderValue<'x> {
        let start_offset = self.offset();
        let mut builder = DateBuilder::default();
        let mut token = String::new();

        'scan: while let Some(&ch) = self.next() {
            match ch {
                b'\n' => {
                    builder.feed(&token);
                    token.clear();
                    if !self.try_next_is_space() {
                        break;
                    }
                }
                b' ' | b'\t' | b'\r' | b',' => {
                    builder.feed(&token);
                    token.clear();
                }
                b';' => {
                    token.clear();
                    builder.reset();
                }
                b'(' => {
                    builder.feed(&token);
                    token.clear();
                    // comments nest and may span folded lines
                    let mut depth = 1;
                    while depth > 0 {
                        match self.next() {
                            Some(&b'(') => depth += 1,
                            Some(&b')') => depth -= 1,
                            Some(&b'\\') => {
                                self.next();
                            }
                            Some(&b'\n') => {
                                if !self.try_next_is_space() {
                                    break 'scan;
                                }
                            }
                            Some(_) => (),
                            None => break 'scan,
                        }
                    }
                }
                _ => token.push(ch as char),
            }
        }
        builder.feed(&token);

        match builder.build() {
            Some(datetime) => HeaderValue::DateTime(datetime),
            None => {
                options.warn(start_offset as i64, Warning::InvalidDate, "");
                HeaderValue::DateTime(DateTime::from_timestamp(0, 0))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        core::{header::HeaderValue, options::ParserOptions},
        parsers::MessageStream,
    };

    fn parse(input: &str) -> crate::core::datetime::DateTime {
        match MessageStream::new(input.as_bytes()).parse_date(&ParserOptions::default()) {
            HeaderValue::DateTime(datetime) => datetime,
            other => panic!("expected a datetime for {input:?}, got {other:?}"),
        }
    }

    #[test]
    fn parse_dates() {
        for (input, expected) in [
            ("Tue, 1 Jul 2003 10:52:37 +0200", "2003-07-01T10:52:37+02:00"),
            (
                "Fri, 21 Nov 1997 09:55:06 -0600",
                "1997-11-21T09:55:06-06:00",
            ),
            (
                "Thu, 13 Feb 1969 23:32:54 -0330",
                "1969-02-13T23:32:54-03:30",
            ),
            (
                "Thu,\n   13\n  Feb\n    1969\n  23:32\n  -0330 (Newfoundland Time)\n",
                "1969-02-13T23:32:00-03:30",
            ),
            (
                " 1 Jul 2003 (comment about date) 10:52:37 +0200",
                "2003-07-01T10:52:37+02:00",
            ),
            ("21 Nov 97 09:55:06 GMT", "1997-11-21T09:55:06Z"),
            (" Wed, 27 Jun 99 04:11 +0900 ", "1999-06-27T04:11:00+09:00"),
            ("20 11 79 05:34:27 -0300", "1979-11-20T05:34:27-03:00"),
            ("1 jan 2021 09:55:06 +0200", "2021-01-01T09:55:06+02:00"),
            ("12 dec 2021 09:55:06 +0200", "2021-12-12T09:55:06+02:00"),
            ("5 May 2021 09:55:06", "2021-05-05T09:55:06Z"),
            (
                "Thu, 01 Jan 1970 00:00:00 +0000",
                "1970-01-01T00:00:00Z",
            ),
        ] {
            assert_eq!(parse(input).to_rfc3339(), expected, "failed for {input:?}");
        }
    }

    #[test]
    fn parse_named_zones() {
        for (input, hour, before_gmt) in [
            ("21 Nov 1997 09:55:06 EST", 5, true),
            ("21 Nov 1997 09:55:06 pdt", 7, true),
            ("21 Nov 1997 09:55:06 UT", 0, false),
            ("21 Nov 1997 09:55:06 Y", 12, false),
        ] {
            let datetime = parse(input);
            assert_eq!(datetime.tz_hour, hour, "failed for {input:?}");
            if hour > 0 {
                assert_eq!(datetime.tz_before_gmt, before_gmt, "failed for {input:?}");
            }
        }
    }

    #[test]
    fn received_date_after_semicolon() {
        let input = concat!(
            "by mail.example.com with SMTP id abc123;\n",
            "\tMon, 10 Oct 2022 10:31:15 -0700 (PDT)\n"
        );
        assert_eq!(parse(input).to_rfc3339(), "2022-10-10T10:31:15-07:00");
    }

    #[test]
    fn invalid_dates_fall_back_to_epoch() {
        use std::{cell::Cell, rc::Rc};

        let warned = Rc::new(Cell::new(0));
        let warned_clone = warned.clone();
        let options = ParserOptions::default()
            .with_warnings(move |_, _, _| warned_clone.set(warned_clone.get() + 1));

        for input in [
            "not a date at all",
            "some numbers 0 1 2 but invalid",
            // years before 1969 are rejected
            "21 Nov 65 09:55:06 GMT",
            // a comment swallowing the rest of the header
            "Tue, 1 Jul 2003 ((invalid)\ncomment) 10:52:37 +0200",
        ] {
            let result = MessageStream::new(input.as_bytes()).parse_date(&options);
            match result {
                HeaderValue::DateTime(datetime) => {
                    assert_eq!(datetime.to_timestamp(), 0, "failed for {input:?}")
                }
                other => panic!("expected epoch for {input:?}, got {other:?}"),
            }
        }
        assert_eq!(warned.get(), 4);
    }
}
