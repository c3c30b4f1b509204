//! Wire-ready data points and the per-tick batch, encoded as InfluxDB v1
//! line protocol with second-precision timestamps.

use std::collections::BTreeMap;

use chrono::Utc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PointError {
    #[error("empty measurement key")]
    EmptyKey,
    #[error("empty key or value in tag {0:?}")]
    EmptyTag(String),
    #[error("non-finite field value {0}")]
    NonFiniteValue(f64),
}

/// A single named, tagged, timestamped observation. The timestamp is unix
/// seconds, matching the `precision=s` write query.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub key: String,
    pub tags: BTreeMap<String, String>,
    pub value: f64,
    pub timestamp: i64,
}

impl Point {
    /// `measurement,tag=value value=42.5 1700000000`. Tags are emitted in
    /// key order; measurement names and tags are escaped per the line
    /// protocol rules.
    pub fn to_line_protocol(&self) -> String {
        let mut line = escape_measurement(&self.key);
        for (key, value) in &self.tags {
            line.push(',');
            line.push_str(&escape_tag(key));
            line.push('=');
            line.push_str(&escape_tag(value));
        }
        line.push_str(&format!(" value={} {}", self.value, self.timestamp));
        line
    }
}

/// The points accumulated within one tick, written to the sink in a single
/// call. Holds at most one point per metric because the cycle visits each
/// metric once.
#[derive(Debug, Default)]
pub struct Batch {
    points: Vec<Point>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, point: Point) {
        self.points.push(point);
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn to_line_protocol(&self) -> String {
        self.points
            .iter()
            .map(Point::to_line_protocol)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Builds points with the process-wide tag set attached. The host identity
/// and any extra static tags are resolved once at startup and reused for
/// every point in every tick.
#[derive(Debug, Clone)]
pub struct PointBuilder {
    base_tags: BTreeMap<String, String>,
}

impl PointBuilder {
    pub fn new(host: String, extra_tags: BTreeMap<String, String>) -> Result<Self, PointError> {
        let mut base_tags = extra_tags;
        base_tags.insert("host".to_string(), host);
        for (key, value) in &base_tags {
            if key.is_empty() || value.is_empty() {
                return Err(PointError::EmptyTag(key.clone()));
            }
        }
        Ok(Self { base_tags })
    }

    pub fn build(&self, key: &str, value: f64) -> Result<Point, PointError> {
        if key.is_empty() {
            return Err(PointError::EmptyKey);
        }
        if !value.is_finite() {
            return Err(PointError::NonFiniteValue(value));
        }
        Ok(Point {
            key: key.to_string(),
            tags: self.base_tags.clone(),
            value,
            timestamp: Utc::now().timestamp(),
        })
    }
}

fn escape_measurement(raw: &str) -> String {
    raw.replace(',', "\\,").replace(' ', "\\ ")
}

fn escape_tag(raw: &str) -> String {
    raw.replace(',', "\\,").replace('=', "\\=").replace(' ', "\\ ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> PointBuilder {
        PointBuilder::new("sensorpi".to_string(), BTreeMap::new()).expect("valid tags")
    }

    #[test]
    fn every_point_carries_the_host_tag() {
        let extra = BTreeMap::from([("room".to_string(), "attic".to_string())]);
        let builder = PointBuilder::new("sensorpi".to_string(), extra).expect("valid tags");

        let point = builder.build("temperature", 21.7).expect("valid point");
        assert_eq!(point.tags.get("host").map(String::as_str), Some("sensorpi"));
        assert_eq!(point.tags.get("room").map(String::as_str), Some("attic"));
        assert_eq!(point.value, 21.7);
    }

    #[test]
    fn empty_key_is_rejected() {
        assert_eq!(builder().build("", 1.0), Err(PointError::EmptyKey));
    }

    #[test]
    fn non_finite_value_is_rejected() {
        assert!(matches!(
            builder().build("light", f64::NAN),
            Err(PointError::NonFiniteValue(_))
        ));
    }

    #[test]
    fn empty_tag_entries_are_rejected() {
        let extra = BTreeMap::from([("room".to_string(), String::new())]);
        let err = PointBuilder::new("sensorpi".to_string(), extra).expect_err("empty tag value");
        assert_eq!(err, PointError::EmptyTag("room".to_string()));
    }

    #[test]
    fn line_protocol_format_is_stable() {
        let point = Point {
            key: "temperature".to_string(),
            tags: BTreeMap::from([("host".to_string(), "sensorpi".to_string())]),
            value: 21.5,
            timestamp: 1_700_000_000,
        };
        assert_eq!(
            point.to_line_protocol(),
            "temperature,host=sensorpi value=21.5 1700000000"
        );
    }

    #[test]
    fn line_protocol_escapes_separators() {
        let point = Point {
            key: "outside air".to_string(),
            tags: BTreeMap::from([("rack".to_string(), "a=1,b 2".to_string())]),
            value: 1.0,
            timestamp: 0,
        };
        assert_eq!(
            point.to_line_protocol(),
            "outside\\ air,rack=a\\=1\\,b\\ 2 value=1 0"
        );
    }

    #[test]
    fn batch_joins_points_with_newlines() {
        let mut batch = Batch::new();
        assert!(batch.is_empty());

        let builder = builder();
        batch.push(builder.build("light", 120.0).expect("valid"));
        batch.push(builder.build("humidity", 45.2).expect("valid"));

        assert_eq!(batch.len(), 2);
        let body = batch.to_line_protocol();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("light,host=sensorpi value=120 "));
        assert!(lines[1].starts_with("humidity,host=sensorpi value=45.2 "));
    }
}
