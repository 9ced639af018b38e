use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Join pool, optional namespace and image into an image spec.
///
/// Empty segments are skipped, so a present-but-empty namespace yields the
/// same spec as no namespace at all.
pub fn path_join(pool: &str, namespace: Option<&str>, image: &str) -> String {
    [Some(pool), namespace, Some(image)]
        .into_iter()
        .flatten()
        .map(|segment| segment.trim_matches('/'))
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// `None` for absent, null or empty namespaces.
pub(crate) fn normalize_namespace(namespace: Option<&str>) -> Option<String> {
    namespace.filter(|ns| !ns.is_empty()).map(str::to_string)
}

/// Timestamps that are not RFC 3339 (or naive ISO 8601) decode as `None`.
pub(crate) fn lenient_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::String(text)) => DateTime::parse_from_rfc3339(&text)
            .map(|t| t.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(&text, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|t| t.and_utc())
            }),
        _ => None,
    })
}

/// `null` decodes like a missing key.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Exception codes arrive as `"17"` or `17` depending on the component.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::String(text)) => Some(text),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Namespaces arrive as a string, `null`, or occasionally another JSON type.
pub(crate) fn optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(Value::String(text)) => Some(text),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_null_decodes_as_default() {
        #[derive(Deserialize)]
        struct Named {
            #[serde(default, deserialize_with = "null_as_default")]
            name: String,
            #[serde(default, deserialize_with = "null_as_default")]
            done: bool,
        }

        let named: Named = serde_json::from_str(r#"{"name": null, "done": null}"#).unwrap();
        assert_eq!(named.name, "");
        assert!(!named.done);

        let named: Named = serde_json::from_str(r#"{"name": "vol1", "done": true}"#).unwrap();
        assert_eq!(named.name, "vol1");
        assert!(named.done);
    }

    #[test]
    fn test_path_join() {
        assert_eq!(path_join("pool", None, "img"), "pool/img");
        assert_eq!(path_join("pool", Some(""), "img"), "pool/img");
        assert_eq!(path_join("pool", Some("ns"), "img"), "pool/ns/img");
        assert_eq!(path_join("", None, "img"), "img");
    }

    #[test]
    fn test_normalize_namespace() {
        assert_eq!(normalize_namespace(None), None);
        assert_eq!(normalize_namespace(Some("")), None);
        assert_eq!(normalize_namespace(Some("ns")), Some("ns".to_string()));
    }

    #[derive(Deserialize)]
    struct Stamped {
        #[serde(default, deserialize_with = "lenient_time")]
        at: Option<DateTime<Utc>>,
        #[serde(default, deserialize_with = "string_or_number")]
        code: Option<String>,
    }

    #[test]
    fn test_lenient_decoding() {
        let s: Stamped =
            serde_json::from_str(r#"{"at": "2021-03-04T10:20:30.123456Z", "code": 17}"#).unwrap();
        let at = s.at.unwrap();
        assert_eq!((at.year(), at.hour(), at.second()), (2021, 10, 30));
        assert_eq!(s.code.as_deref(), Some("17"));

        let s: Stamped = serde_json::from_str(r#"{"at": "2021-03-04T10:20:30.5"}"#).unwrap();
        assert!(s.at.is_some());

        let s: Stamped = serde_json::from_str(r#"{"at": "yesterday", "code": null}"#).unwrap();
        assert!(s.at.is_none());
        assert!(s.code.is_none());

        let s: Stamped = serde_json::from_str("{}").unwrap();
        assert!(s.at.is_none());
    }
}
