//! Pulling an IPv4 address out of a response body

use ddns_core::{Error, Result};
use regex::Regex;
use serde_json::Value;
use std::net::Ipv4Addr;

/// Message used whenever a body holds no usable address
const NOT_AN_IP: &str = "Not a normal IP address";

/// How to find the address in a response body
#[derive(Debug, Clone)]
pub enum IpExtractor {
    /// The whole (trimmed) body is the address
    PlainText,
    /// First capture group of a regex, or the whole match if it has none
    Pattern(Regex),
    /// A string at a JSON pointer (RFC 6901), e.g. `/data/ip`
    JsonPointer(String),
}

impl IpExtractor {
    /// Compile a pattern extractor
    pub fn pattern(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(IpExtractor::Pattern)
            .map_err(|e| Error::config(format!("Invalid IP pattern {:?}: {}", pattern, e)))
    }

    /// JSON pointer extractor
    pub fn json_pointer(pointer: impl Into<String>) -> Self {
        IpExtractor::JsonPointer(pointer.into())
    }

    /// Extract the address from `body`
    pub fn extract(&self, body: &str) -> Result<Ipv4Addr> {
        let body = body.trim();

        let candidate = match self {
            IpExtractor::PlainText => body.to_string(),
            IpExtractor::Pattern(regex) => {
                let captures = regex
                    .captures(body)
                    .ok_or_else(|| Error::parse(NOT_AN_IP))?;
                captures
                    .get(1)
                    .or_else(|| captures.get(0))
                    .map(|m| m.as_str().to_string())
                    .ok_or_else(|| Error::parse(NOT_AN_IP))?
            }
            IpExtractor::JsonPointer(pointer) => {
                let json: Value = serde_json::from_str(body)?;
                json.pointer(pointer)
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| Error::parse(NOT_AN_IP))?
            }
        };

        candidate
            .trim()
            .parse::<Ipv4Addr>()
            .map_err(|_| Error::parse(NOT_AN_IP))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_trimmed() {
        let ip = IpExtractor::PlainText.extract("  203.0.113.7\n").unwrap();
        assert_eq!(ip, Ipv4Addr::new(203, 0, 113, 7));
    }

    #[test]
    fn plain_text_rejects_html() {
        let err = IpExtractor::PlainText
            .extract("<html>503 Service Unavailable</html>")
            .unwrap_err();
        assert!(matches!(err, Error::Parse(ref m) if m == NOT_AN_IP));
    }

    #[test]
    fn pattern_uses_first_group() {
        let extractor = IpExtractor::pattern(r"<h2>(\d{1,3}(?:\.\d{1,3}){3})</h2>").unwrap();
        let ip = extractor
            .extract("<body><h1>Your IP</h1><h2>198.51.100.23</h2></body>")
            .unwrap();
        assert_eq!(ip, Ipv4Addr::new(198, 51, 100, 23));
    }

    #[test]
    fn pattern_without_group_uses_whole_match() {
        let extractor = IpExtractor::pattern(r"\d{1,3}(?:\.\d{1,3}){3}").unwrap();
        let ip = extractor.extract("you are 192.0.2.1, welcome").unwrap();
        assert_eq!(ip, Ipv4Addr::new(192, 0, 2, 1));
    }

    #[test]
    fn out_of_range_octets_are_rejected() {
        let extractor = IpExtractor::pattern(r"\[(\d{1,3}(?:\.\d{1,3}){3})\]").unwrap();
        assert!(matches!(
            extractor.extract("您的IP是：[999.1.1.1]"),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn json_pointer() {
        let extractor = IpExtractor::json_pointer("/data/ip");
        let ip = extractor
            .extract(r#"{"code":0,"data":{"ip":"203.0.113.9","country":"中国"}}"#)
            .unwrap();
        assert_eq!(ip, Ipv4Addr::new(203, 0, 113, 9));

        let err = extractor.extract(r#"{"code":1,"data":"invaild ip."}"#).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));

        let err = extractor.extract("not json").unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[test]
    fn invalid_pattern_is_a_config_error() {
        assert!(matches!(IpExtractor::pattern("(unclosed"), Err(Error::Config(_))));
    }
}
