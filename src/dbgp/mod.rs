pub mod feature;
pub mod template;

use crate::bridge::error::{Error, Result};
use std::collections::HashMap;

/// XML declaration prefixed to every response; the framed length includes it.
pub const XML_DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"iso-8859-1\"?>\n";

/// One parsed DBGp request: a command name followed by `-flag value` pairs.
///
/// The full request text is kept around because diversion commands are
/// forwarded to the replayed process verbatim.
#[derive(Debug, Clone)]
pub struct DbgpRequest {
    pub command: String,
    pub full_command: String,
    options: HashMap<String, String>,
    pub sequence: i64,
}

impl DbgpRequest {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parts = raw.split_whitespace();
        let command = parts
            .next()
            .ok_or_else(|| Error::Request("empty request".to_string()))?
            .to_string();

        let mut options = HashMap::new();
        let rest: Vec<&str> = parts.collect();
        for pair in rest.chunks(2) {
            let flag = pair[0].trim_start_matches('-').to_string();
            let value = pair.get(1).copied().unwrap_or_default().to_string();
            options.insert(flag, value);
        }

        let sequence = options
            .get("i")
            .ok_or_else(|| Error::Request("could not find sequence number".to_string()))?
            .parse()
            .map_err(|_| Error::Request("malformed sequence number".to_string()))?;

        Ok(DbgpRequest {
            command,
            full_command: raw.to_string(),
            options,
            sequence,
        })
    }

    pub fn option(&self, flag: &str) -> Option<&str> {
        self.options.get(flag).map(String::as_str)
    }

    pub fn require(&self, flag: &str, what: &str) -> Result<&str> {
        self.option(flag)
            .ok_or_else(|| Error::Request(format!("please provide the -{flag} option ({what})")))
    }
}

/// Frame a response: decimal byte length, NUL, the XML declaration, the
/// payload, NUL.
pub fn packet(payload: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(payload.len() + XML_DECLARATION.len() + 16);
    buf.extend_from_slice((payload.len() + XML_DECLARATION.len()).to_string().as_bytes());
    buf.push(0);
    buf.extend_from_slice(XML_DECLARATION.as_bytes());
    buf.extend_from_slice(payload.as_bytes());
    buf.push(0);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_with_options() {
        let req =
            DbgpRequest::parse("breakpoint_set -i 4 -t line -f file:///srv/a.php -n 17 -r 1")
                .unwrap();
        assert_eq!(req.command, "breakpoint_set");
        assert_eq!(req.sequence, 4);
        assert_eq!(req.option("t"), Some("line"));
        assert_eq!(req.option("f"), Some("file:///srv/a.php"));
        assert_eq!(req.option("n"), Some("17"));
        assert_eq!(req.option("r"), Some("1"));
        assert_eq!(req.option("x"), None);
        assert!(req.full_command.starts_with("breakpoint_set"));
    }

    #[test]
    fn trailing_flag_without_value() {
        let req = DbgpRequest::parse("status -i 12 -x").unwrap();
        assert_eq!(req.option("x"), Some(""));
    }

    #[test]
    fn missing_sequence_number_is_an_error() {
        assert!(matches!(
            DbgpRequest::parse("status -a 1"),
            Err(Error::Request(_))
        ));
        assert!(matches!(DbgpRequest::parse(""), Err(Error::Request(_))));
    }

    /// Inverse of [`packet`], for round-trip checks.
    fn decode(bytes: &[u8]) -> (usize, String) {
        let nul = bytes.iter().position(|b| *b == 0).unwrap();
        let len: usize = std::str::from_utf8(&bytes[..nul]).unwrap().parse().unwrap();
        assert_eq!(bytes.last(), Some(&0));
        let body = std::str::from_utf8(&bytes[nul + 1..bytes.len() - 1]).unwrap();
        (len, body.to_string())
    }

    #[test]
    fn framing_round_trip() {
        let payload = "<response transaction_id=\"7\" command=\"property_set\" success=\"0\"></response>";
        let framed = packet(payload);
        let (len, body) = decode(&framed);
        assert_eq!(len, payload.len() + XML_DECLARATION.len());
        assert_eq!(body, format!("{XML_DECLARATION}{payload}"));
        assert_eq!(len, body.len());
    }
}
