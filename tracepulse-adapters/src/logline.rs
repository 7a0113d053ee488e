//! Structuring of raw text log lines.
//!
//! Lines look like
//!
//! ```text
//! 2024-01-01 10:00:00 Service API-Gateway received request: GET /users/42 from 10.0.0.5
//! 2024-01-01 10:00:02 Service API-Gateway response sent for /users/42, status: 200, time: 150ms
//! ```
//!
//! A line is split into a timestamp (two tokens), a service token and the
//! free-text message. The message then goes through an ordered list of
//! independent extraction rules; each rule fills the fields it recognizes
//! and leaves everything else untouched.

use chrono::{NaiveDateTime, TimeZone, Utc};
use regex::{Captures, Regex};
use tracing::debug;

use tracepulse_types::StructuredRecord;

use crate::ParseError;

/// Format of the leading timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Marker word that may precede the service name.
const SERVICE_MARKER: &str = "Service";

/// Identifiers copied into [`StructuredRecord::extra`].
pub const IDENTIFIER_FIELDS: [&str; 4] = ["userID", "productID", "orderID", "transactionID"];

type Apply = fn(&Captures<'_>, &mut StructuredRecord);

/// A pattern and the fields it fills.
struct Rule {
    /// Substring that must be present for the rule to run, if any.
    marker: Option<&'static str>,
    pattern: Regex,
    apply: Apply,
}

impl Rule {
    fn new(marker: Option<&'static str>, pattern: &str, apply: Apply) -> Self {
        Self {
            marker,
            pattern: Regex::new(pattern).expect("extraction pattern is valid"),
            apply,
        }
    }

    fn matches_marker(&self, message: &str) -> bool {
        self.marker.map_or(true, |m| message.contains(m))
    }

    fn run(&self, message: &str, record: &mut StructuredRecord) -> bool {
        match self.pattern.captures(message) {
            Some(caps) => {
                (self.apply)(&caps, record);
                true
            }
            None => false,
        }
    }
}

/// Turns raw log lines into [`StructuredRecord`]s.
///
/// Construct once and reuse; the regular expressions are compiled up front.
///
/// # Example
///
/// ```rust
/// use tracepulse_adapters::LogLineParser;
///
/// let parser = LogLineParser::new();
/// let record = parser
///     .parse("2024-01-01 10:00:02 Service API-Gateway response sent for /users/42, status: 200, time: 150ms")
///     .unwrap();
///
/// assert_eq!(record.endpoint.as_deref(), Some("/users/42"));
/// assert_eq!(record.status_code, Some(200));
/// assert_eq!(record.response_time_ms, Some(150));
/// ```
#[derive(Debug)]
pub struct LogLineParser {
    header: Regex,
    /// Applied independently, every one that matches contributes.
    fields: Vec<Rule>,
    /// Message shapes; the first whose marker is present wins.
    shapes: Vec<Rule>,
    identifiers: Vec<(&'static str, Regex)>,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule")
            .field("marker", &self.marker)
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

impl Default for LogLineParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LogLineParser {
    /// Create a parser with the standard rule set.
    pub fn new() -> Self {
        let header = Regex::new(r"^(\S+\s+\S+)\s+(?:Service\s+)?(\S+)\s*(.*)$")
            .expect("header pattern is valid");

        let fields = vec![
            Rule::new(None, r"(?:response time|time): (\d+)ms", |caps, record| {
                record.response_time_ms = caps[1].parse().ok();
            }),
            Rule::new(None, r"status: (\d+)", |caps, record| {
                record.status_code = caps[1].parse().ok();
            }),
        ];

        let shapes = vec![
            Rule::new(
                Some("received request"),
                r"received request: (\w+) (/\S+) from (\S+)",
                |caps, record| {
                    record.http_method = Some(caps[1].to_string());
                    record.endpoint = Some(caps[2].to_string());
                    record.client_ip = Some(caps[3].to_string());
                },
            ),
            Rule::new(
                Some("response sent"),
                r"response sent for (?:\w+ )?(/\S+?),",
                |caps, record| {
                    record.endpoint = Some(caps[1].to_string());
                },
            ),
        ];

        let identifiers = IDENTIFIER_FIELDS
            .iter()
            .map(|name| {
                let pattern = Regex::new(&format!(r"{}=(\d+)", name))
                    .expect("identifier pattern is valid");
                (*name, pattern)
            })
            .collect();

        Self {
            header,
            fields,
            shapes,
            identifiers,
        }
    }

    /// Structure a single line.
    pub fn parse(&self, line: &str) -> Result<StructuredRecord, ParseError> {
        let line = line.trim();

        let tokens = line.split_whitespace().count();
        if tokens < 4 {
            return Err(ParseError::TooFewTokens(tokens));
        }

        let caps = self
            .header
            .captures(line)
            .ok_or_else(|| ParseError::Timestamp(line.to_string()))?;

        let stamp = &caps[1];
        let naive = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
            .map_err(|_| ParseError::Timestamp(stamp.to_string()))?;

        let mut record = StructuredRecord::new(Utc.from_utc_datetime(&naive));
        record.service = Some(caps[2].to_string());

        if let Some(message) = caps.get(3).map(|m| m.as_str()).filter(|m| !m.is_empty()) {
            self.extract(message, &mut record);
            record.message = Some(message.to_string());
        }

        Ok(record)
    }

    /// Structure many lines, skipping the ones that fail.
    ///
    /// Blank lines are ignored silently; malformed lines are logged at debug
    /// level and dropped.
    pub fn parse_lines<'a, I>(&self, lines: I) -> Vec<StructuredRecord>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut records = Vec::new();
        for (index, line) in lines.into_iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match self.parse(line) {
                Ok(record) => records.push(record),
                Err(e) => debug!(line = index + 1, error = %e, "skipping malformed log line"),
            }
        }
        records
    }

    fn extract(&self, message: &str, record: &mut StructuredRecord) {
        for rule in &self.fields {
            rule.run(message, record);
        }

        if let Some(shape) = self.shapes.iter().find(|s| s.matches_marker(message)) {
            shape.run(message, record);
        }

        for (name, pattern) in &self.identifiers {
            if let Some(caps) = pattern.captures(message) {
                record.extra.insert((*name).to_string(), caps[1].to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn parser() -> LogLineParser {
        LogLineParser::new()
    }

    #[test]
    fn parses_received_request() {
        let record = parser()
            .parse("2024-01-01 10:00:00 Service API-Gateway received request: GET /users/42 from 10.0.0.5")
            .unwrap();

        assert_eq!(record.timestamp.year(), 2024);
        assert_eq!(record.timestamp.hour(), 10);
        assert_eq!(record.timestamp.second(), 0);
        assert_eq!(record.service.as_deref(), Some("API-Gateway"));
        assert_eq!(record.http_method.as_deref(), Some("GET"));
        assert_eq!(record.endpoint.as_deref(), Some("/users/42"));
        assert_eq!(record.client_ip.as_deref(), Some("10.0.0.5"));
        assert_eq!(record.status_code, None);
        assert_eq!(record.response_time_ms, None);
        assert!(record.extra.is_empty());
        assert_eq!(
            record.message.as_deref(),
            Some("received request: GET /users/42 from 10.0.0.5")
        );
    }

    #[test]
    fn parses_response_sent() {
        let record = parser()
            .parse("2024-01-01 10:00:02 Service API-Gateway response sent for /users/42, status: 200, time: 150ms")
            .unwrap();

        assert_eq!(record.endpoint.as_deref(), Some("/users/42"));
        assert_eq!(record.status_code, Some(200));
        assert_eq!(record.response_time_ms, Some(150));
        assert_eq!(record.http_method, None);
        assert_eq!(record.client_ip, None);
    }

    #[test]
    fn response_sent_with_method_prefix() {
        let record = parser()
            .parse("2024-01-01 10:00:04 Service API-Gateway response sent for POST /orders, status: 401, time: 88ms")
            .unwrap();

        assert_eq!(record.endpoint.as_deref(), Some("/orders"));
        assert_eq!(record.status_code, Some(401));
        assert_eq!(record.response_time_ms, Some(88));
        assert_eq!(record.http_method, None);
    }

    #[test]
    fn capitalized_response_time_phrase() {
        let record = parser()
            .parse("2024-01-01 10:00:03 Service User-Service Response time: 320ms, status: 500")
            .unwrap();

        assert_eq!(record.service.as_deref(), Some("User-Service"));
        assert_eq!(record.response_time_ms, Some(320));
        assert_eq!(record.status_code, Some(500));
        assert_eq!(record.endpoint, None);
    }

    #[test]
    fn extracts_identifiers() {
        let record = parser()
            .parse("2024-01-01 10:00:01 Service Auth-Service validating JWT token for userID=4242")
            .unwrap();

        assert_eq!(record.extra.len(), 1);
        assert_eq!(record.extra.get("userID").map(String::as_str), Some("4242"));
    }

    #[test]
    fn extracts_several_identifiers() {
        let record = parser()
            .parse("2024-01-01 10:00:01 Service Order-Service placed orderID=77 for userID=12 productID=9")
            .unwrap();

        assert_eq!(record.extra.len(), 3);
        assert_eq!(record.extra["orderID"], "77");
        assert_eq!(record.extra["userID"], "12");
        assert_eq!(record.extra["productID"], "9");
    }

    #[test]
    fn service_without_marker_word() {
        let record = parser()
            .parse("2024-01-01 10:00:01 Auth-Service token validation successful")
            .unwrap();

        assert_eq!(record.service.as_deref(), Some("Auth-Service"));
        assert_eq!(record.message.as_deref(), Some("token validation successful"));
    }

    #[test]
    fn plain_message_leaves_fields_absent() {
        let record = parser()
            .parse("2024-01-01 10:00:01 Service Auth-Service token validation successful")
            .unwrap();

        assert_eq!(record.status_code, None);
        assert_eq!(record.response_time_ms, None);
        assert_eq!(record.http_method, None);
        assert_eq!(record.endpoint, None);
        assert_eq!(record.client_ip, None);
        assert!(record.extra.is_empty());
    }

    #[test]
    fn header_only_line_has_no_message() {
        let record = parser().parse("2024-01-01 10:00:00 Service X").unwrap();

        assert_eq!(record.service.as_deref(), Some("X"));
        assert_eq!(record.message, None);
    }

    #[test]
    fn too_few_tokens() {
        assert_eq!(
            parser().parse("2024-01-01 10:00:00 Service"),
            Err(ParseError::TooFewTokens(3))
        );
        assert_eq!(parser().parse(""), Err(ParseError::TooFewTokens(0)));
    }

    #[test]
    fn bad_timestamp_fails_whole_line() {
        let err = parser()
            .parse("2024/01/01 10:00:00 Service API-Gateway response sent for /x, status: 200, time: 1ms")
            .unwrap_err();
        assert!(matches!(err, ParseError::Timestamp(_)));

        let err = parser()
            .parse("2024-01-01T10:00:00 extra Service API-Gateway ok")
            .unwrap_err();
        assert!(matches!(err, ParseError::Timestamp(_)));
    }

    #[test]
    fn parse_lines_skips_malformed_and_blank() {
        let input = "\
2024-01-01 10:00:00 Service API-Gateway received request: GET /users/42 from 10.0.0.5

garbage
2024-13-01 10:00:00 Service API-Gateway bad month here
2024-01-01 10:00:02 Service API-Gateway response sent for /users/42, status: 200, time: 150ms
";
        let records = parser().parse_lines(input.lines());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].http_method.as_deref(), Some("GET"));
        assert_eq!(records[1].response_time_ms, Some(150));
    }
}
