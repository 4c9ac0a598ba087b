//! Device address hints: a `key=value,key=value` string carrying optional tuning knobs.

use std::collections::BTreeMap;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum HintsError {
    #[error("malformed hint {0:?}, expected key=value")]
    Malformed(String),

    #[error("hint {key} has invalid value {value:?}")]
    InvalidValue { key: String, value: String },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Hints {
    values: BTreeMap<String, String>,
}

impl Hints {
    /// Parse a comma separated list of `key=value` pairs. Whitespace around keys and values is
    /// ignored, empty entries are skipped, later keys override earlier ones.
    pub fn parse(hints: &str) -> Result<Hints, HintsError> {
        let mut values = BTreeMap::new();

        for entry in hints.split(',') {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }

            let mut kv = entry.splitn(2, '=');
            let key = kv.next().unwrap_or_default().trim();
            let value = match kv.next() {
                Some(value) if !key.is_empty() => value.trim(),
                _ => return Err(HintsError::Malformed(entry.to_string())),
            };

            values.insert(key.to_string(), value.to_string());
        }

        Ok(Hints { values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Read a size hint. Fractional values are accepted and truncated, so `1e3` and `1000.0`
    /// both mean 1000.
    pub fn get_usize(&self, key: &str, default: usize) -> Result<usize, HintsError> {
        let value = match self.get(key) {
            Some(value) => value,
            None => return Ok(default),
        };

        if let Ok(n) = value.parse::<usize>() {
            return Ok(n);
        }

        match value.parse::<f64>() {
            Ok(n) if n.is_finite() && n >= 0.0 && n <= usize::MAX as f64 => Ok(n as usize),
            _ => Err(HintsError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool, HintsError> {
        match self.get(key) {
            None => Ok(default),
            Some("1") | Some("true") | Some("yes") => Ok(true),
            Some("0") | Some("false") | Some("no") => Ok(false),
            Some(value) => Err(HintsError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Hints, HintsError};

    #[test]
    fn parse_pairs() {
        let h = Hints::parse(" recv_frame_size = 1500 ,num_recv_frames=4,, ").unwrap();

        assert_eq!(h.get("recv_frame_size"), Some("1500"));
        assert_eq!(h.get("num_recv_frames"), Some("4"));
        assert_eq!(h.get("send_frame_size"), None);
    }

    #[test]
    fn empty_string() {
        assert_eq!(Hints::parse("").unwrap(), Hints::default());
    }

    #[test]
    fn malformed() {
        assert_eq!(
            Hints::parse("a=1,oops"),
            Err(HintsError::Malformed("oops".to_string()))
        );
        assert!(Hints::parse("=3").is_err());
    }

    #[test]
    fn sizes() {
        let h = Hints::parse("a=1000,b=1e3,c=12.9,d=-1,e=lots").unwrap();

        assert_eq!(h.get_usize("a", 0), Ok(1000));
        assert_eq!(h.get_usize("b", 0), Ok(1000));
        assert_eq!(h.get_usize("c", 0), Ok(12));
        assert_eq!(h.get_usize("missing", 7), Ok(7));
        assert!(h.get_usize("d", 0).is_err());
        assert!(h.get_usize("e", 0).is_err());
    }

    #[test]
    fn bools() {
        let h = Hints::parse("a=true,b=0,c=maybe").unwrap();

        assert_eq!(h.get_bool("a", false), Ok(true));
        assert_eq!(h.get_bool("b", true), Ok(false));
        assert_eq!(h.get_bool("z", true), Ok(true));
        assert!(h.get_bool("c", false).is_err());
    }
}
