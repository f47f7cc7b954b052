use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How much of each record to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadOptions {
    /// Decode only reference, position, quality, flags and length.
    #[serde(default)]
    pub light: bool,
    /// Also decode the read name in light mode.
    #[serde(default)]
    pub include_name: bool,
}

/// A genomic region: `name`, `name:start-end` or `name:start-`.
///
/// Coordinates are 0-based and inclusive, as queries take them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    #[serde(rename = "referenceName")]
    pub reference_name: String,
    pub start: Option<u64>,
    pub end: Option<u64>,
}

impl Region {
    pub fn bounds(&self) -> Result<(i64, i64)> {
        let min = self.start.unwrap_or(0);
        let max = self.end.unwrap_or(i32::MAX as u64);
        if max < min {
            return Err(Error::InvalidRange(format!(
                "{}: end {} before start {}",
                self.reference_name, max, min
            )));
        }
        Ok((min as i64, max as i64))
    }
}

impl FromStr for Region {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, span) = match s.rsplit_once(':') {
            Some((name, span)) if !name.is_empty() => (name, Some(span)),
            _ => (s, None),
        };
        if name.is_empty() {
            return Err(Error::InvalidRange("empty reference name".to_string()));
        }

        let parse = |v: &str| {
            v.replace(',', "")
                .parse::<u64>()
                .map_err(|e| Error::InvalidRange(format!("bad coordinate {:?} in {}: {}", v, s, e)))
        };

        let (start, end) = match span {
            None => (None, None),
            Some(span) => match span.split_once('-') {
                Some((a, "")) => (Some(parse(a)?), None),
                Some((a, b)) => (Some(parse(a)?), Some(parse(b)?)),
                None => {
                    let pos = parse(span)?;
                    (Some(pos), Some(pos))
                }
            },
        };

        Ok(Self {
            reference_name: name.to_string(),
            start,
            end,
        })
    }
}
