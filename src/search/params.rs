//! Grid-capable hyperparameter values
//!
//! A parameter is always a non-empty list; a scalar is a list of one. In
//! configuration files it may be written as a number, an array, a comma
//! list (`"0.4,0.6,0.8"`) or a range with step (`"0.4..1,0.2"`, stop
//! exclusive).

use crate::error::{FoldrankError, Result};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Upper bound on the values a range expression may expand to
pub const MAX_RANGE_VALUES: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawParam")]
pub struct ParamList(Vec<f64>);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawParam {
    Number(f64),
    List(Vec<f64>),
    Text(String),
}

impl TryFrom<RawParam> for ParamList {
    type Error = FoldrankError;

    fn try_from(raw: RawParam) -> Result<Self> {
        match raw {
            RawParam::Number(value) => Ok(Self::single(value)),
            RawParam::List(values) => Self::new(values),
            RawParam::Text(text) => text.parse(),
        }
    }
}

impl ParamList {
    /// Non-empty list without repeated values; repeats would name two grid
    /// points alike
    pub fn new(values: Vec<f64>) -> Result<Self> {
        if values.is_empty() {
            return Err(FoldrankError::InvalidArgument(
                "parameter list cannot be empty".to_string(),
            ));
        }
        for (i, value) in values.iter().enumerate() {
            if values[..i].contains(value) {
                return Err(FoldrankError::InvalidArgument(format!(
                    "parameter value {} is listed twice",
                    value
                )));
            }
        }
        Ok(Self(values))
    }

    /// Built-in defaults and generated steps, non-empty and distinct by
    /// construction
    pub(crate) fn from_known(values: Vec<f64>) -> Self {
        debug_assert!(!values.is_empty());
        Self(values)
    }

    pub fn single(value: f64) -> Self {
        Self(vec![value])
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Never true for a constructed list
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Values as separate command-line arguments
    pub fn to_args(&self) -> Vec<String> {
        self.0.iter().map(|v| v.to_string()).collect()
    }

    fn parse_range(start: &str, rest: &str) -> Result<Self> {
        let invalid = || FoldrankError::InvalidArgument(format!("invalid range '{}..{}'", start, rest));
        let (stop, step) = rest.split_once(',').ok_or_else(invalid)?;
        let start: f64 = start.trim().parse().map_err(|_| invalid())?;
        let stop: f64 = stop.trim().parse().map_err(|_| invalid())?;
        let step: f64 = step.trim().parse().map_err(|_| invalid())?;
        if !start.is_finite() || !stop.is_finite() || !step.is_finite() || step <= 0.0 {
            return Err(invalid());
        }

        let span = ((stop - start) / step).ceil().max(0.0);
        if span > MAX_RANGE_VALUES as f64 {
            return Err(FoldrankError::InvalidArgument(format!(
                "range '{}..{}' expands to more than {} values",
                start, rest, MAX_RANGE_VALUES
            )));
        }

        let values: Vec<f64> = (0..=span as usize)
            .map(|i| round10(start + step * i as f64))
            .take_while(|value| *value < stop - 1e-9)
            .collect();
        Self::new(values)
    }
}

fn round10(value: f64) -> f64 {
    (value * 1e10).round() / 1e10
}

impl FromStr for ParamList {
    type Err = FoldrankError;

    fn from_str(s: &str) -> Result<Self> {
        if let Some((start, rest)) = s.split_once("..") {
            return Self::parse_range(start, rest);
        }

        let values = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<f64>().map_err(|_| {
                    FoldrankError::InvalidArgument(format!("invalid parameter value '{}'", part))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        Self::new(values)
    }
}

impl fmt::Display for ParamList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.to_args();
        f.write_str(&parts.join(","))
    }
}

impl Serialize for ParamList {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if self.0.len() == 1 {
            serializer.serialize_f64(self.0[0])
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl From<f64> for ParamList {
    fn from(value: f64) -> Self {
        Self::single(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comma_list() {
        let list: ParamList = "0.4, 0.6,0.8".parse().unwrap();
        assert_eq!(list.values(), &[0.4, 0.6, 0.8]);
    }

    #[test]
    fn test_range_excludes_stop() {
        let list: ParamList = "0.4..1,0.2".parse().unwrap();
        assert_eq!(list.values(), &[0.4, 0.6, 0.8]);
    }

    #[test]
    fn test_invalid_values() {
        assert!("".parse::<ParamList>().is_err());
        assert!("0.4..1".parse::<ParamList>().is_err());
        assert!("0.4..1,0".parse::<ParamList>().is_err());
        assert!("a,b".parse::<ParamList>().is_err());
    }

    #[test]
    fn test_repeated_values_are_rejected() {
        assert!("0.9,0.9".parse::<ParamList>().is_err());
        assert!(ParamList::new(vec![0.4, 0.6, 0.4]).is_err());
        assert!(toml::from_str::<Holder>("k1 = [0.9, 0.9]\nb = 0.4\nmu = 1\nlam = 1").is_err());
    }

    #[test]
    fn test_unbounded_ranges_are_rejected() {
        assert!("0..inf,1".parse::<ParamList>().is_err());
        assert!("-inf..1,0.1".parse::<ParamList>().is_err());
        assert!("NaN..1,0.1".parse::<ParamList>().is_err());
        assert!("0..1e9,0.001".parse::<ParamList>().is_err());

        let widest = format!("0..{},1", MAX_RANGE_VALUES);
        assert_eq!(widest.parse::<ParamList>().unwrap().len(), MAX_RANGE_VALUES);
    }

    #[test]
    fn test_empty_range() {
        assert!("1..0.5,0.1".parse::<ParamList>().is_err());
    }

    #[derive(Deserialize)]
    struct Holder {
        k1: ParamList,
        b: ParamList,
        mu: ParamList,
        lam: ParamList,
    }

    #[test]
    fn test_deserialize_shapes() {
        let holder: Holder =
            toml::from_str("k1 = 0.9\nb = [0.4, 0.6]\nmu = \"500,1000\"\nlam = 1000").unwrap();
        assert_eq!(holder.k1.values(), &[0.9]);
        assert_eq!(holder.b.values(), &[0.4, 0.6]);
        assert_eq!(holder.mu.values(), &[500.0, 1000.0]);
        assert_eq!(holder.lam.values(), &[1000.0]);
    }

    #[test]
    fn test_integral_values_print_without_fraction() {
        let list = ParamList::new(vec![65.0, 70.0]).unwrap();
        assert_eq!(list.to_args(), vec!["65", "70"]);
    }
}
