// Request and response types for the HTTP API

use chrono::{DateTime, NaiveDateTime};
use serde::{de, Deserialize, Deserializer, Serialize};

use crate::services::ranking::Recommendation;

/// A recommended post as returned to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostGet {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub topic: String,
}

impl PostGet {
    pub fn from_recommendation(rec: Recommendation, include_text: bool) -> Self {
        Self {
            id: rec.post_id,
            text: if include_text { rec.text } else { None },
            topic: rec.topic,
        }
    }
}

/// Query parameters for GET /post/recommendations/
#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    /// User to recommend for
    pub id: i64,

    /// Request time; its hour and month are model inputs
    #[serde(deserialize_with = "deserialize_request_time")]
    pub time: NaiveDateTime,

    /// Number of posts to return
    pub limit: Option<usize>,
}

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Offsets written without a colon (`+0300`)
const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// Parse the `time` parameter.
///
/// Timestamps with an offset keep their local wall clock; bare numbers are
/// Unix seconds, fractions allowed.
pub fn parse_request_time(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }

    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(raw, format) {
            return Some(dt.naive_local());
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }

    parse_unix_seconds(raw)
}

fn parse_unix_seconds(raw: &str) -> Option<NaiveDateTime> {
    let secs = raw.parse::<f64>().ok().filter(|s| s.is_finite())?;
    let whole = secs.floor();
    if whole < i64::MIN as f64 || whole > i64::MAX as f64 {
        return None;
    }
    let nanos = ((secs - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos).map(|dt| dt.naive_utc())
}

fn deserialize_request_time<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_request_time(&raw)
        .ok_or_else(|| de::Error::custom(format!("invalid time '{}'", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_naive_formats() {
        let dt = parse_request_time("2021-12-20T14:35:10").unwrap();
        assert_eq!((dt.month(), dt.hour()), (12, 14));

        let dt = parse_request_time("2021-01-03 07:00:00.123456").unwrap();
        assert_eq!((dt.month(), dt.hour()), (1, 7));

        // seconds may be omitted
        let dt = parse_request_time("2021-12-20T14:35").unwrap();
        assert_eq!((dt.hour(), dt.minute(), dt.second()), (14, 35, 0));

        let dt = parse_request_time("2021-12-20 14:35").unwrap();
        assert_eq!((dt.hour(), dt.minute()), (14, 35));
    }

    #[test]
    fn test_parse_offset_keeps_wall_clock() {
        let dt = parse_request_time("2021-12-31T23:30:00+03:00").unwrap();
        assert_eq!((dt.month(), dt.hour()), (12, 23));

        let dt = parse_request_time("2021-06-01T05:00:00Z").unwrap();
        assert_eq!(dt.hour(), 5);

        let dt = parse_request_time("2021-12-20T14:35:00+0300").unwrap();
        assert_eq!((dt.hour(), dt.minute()), (14, 35));

        let dt = parse_request_time("2021-12-20 14:35:00+03:00").unwrap();
        assert_eq!(dt.hour(), 14);
    }

    #[test]
    fn test_parse_unix_seconds() {
        // 2021-12-20 14:00:00 UTC
        let dt = parse_request_time("1640008800").unwrap();
        assert_eq!((dt.month(), dt.hour()), (12, 14));

        let dt = parse_request_time("1640008800.5").unwrap();
        assert_eq!((dt.hour(), dt.second()), (14, 0));
        assert_eq!(dt.and_utc().timestamp_subsec_millis(), 500);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_request_time("yesterday").is_none());
        assert!(parse_request_time("2021-13-01T00:00:00").is_none());
        assert!(parse_request_time("").is_none());
        assert!(parse_request_time("2021-12-20T25:00").is_none());
        assert!(parse_request_time("NaN").is_none());
        assert!(parse_request_time("1e300").is_none());
    }

    #[test]
    fn test_post_get_serialization() {
        let post = PostGet {
            id: 7,
            text: None,
            topic: "movie".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&post).unwrap(),
            serde_json::json!({"id": 7, "topic": "movie"})
        );

        let post = PostGet {
            text: Some("hello".to_string()),
            ..post
        };
        assert_eq!(
            serde_json::to_value(&post).unwrap(),
            serde_json::json!({"id": 7, "text": "hello", "topic": "movie"})
        );
    }

    #[test]
    fn test_text_dropped_when_disabled() {
        let rec = Recommendation {
            post_id: 3,
            topic: "covid".to_string(),
            text: Some("stay home".to_string()),
            score: 0.9,
        };
        assert_eq!(PostGet::from_recommendation(rec.clone(), false).text, None);
        assert_eq!(
            PostGet::from_recommendation(rec, true).text.as_deref(),
            Some("stay home")
        );
    }
}
