//! Querystring encoding for subscription connection params.
//!
//! Values are loosely typed JSON so that every protocol can describe its params the same way:
//!
//! - strings pass through unchanged
//! - numbers and booleans are stringified
//! - arrays repeat the key once per element (nested arrays are flattened)
//! - `null` encodes to an empty string
//! - objects can't be encoded and are an error

use serde_json::Value;
use url::form_urlencoded;

use crate::error::QueryEncodeError;

/// Encode `(key, value)` params into an `application/x-www-form-urlencoded` querystring.
///
/// Keys keep the order they were given in.
pub fn encode_query_params(params: &[(&str, Value)]) -> Result<String, QueryEncodeError> {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        for encoded in encode_query_param(value)? {
            serializer.append_pair(key, &encoded);
        }
    }
    Ok(serializer.finish())
}

fn encode_query_param(value: &Value) -> Result<Vec<String>, QueryEncodeError> {
    match value {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Number(n) => Ok(vec![n.to_string()]),
        Value::Bool(b) => Ok(vec![if *b { "true" } else { "false" }.to_string()]),
        Value::Null => Ok(vec![String::new()]),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.extend(encode_query_param(item)?);
            }
            Ok(out)
        }
        Value::Object(_) => Err(QueryEncodeError::UnsupportedType("object")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalars() -> anyhow::Result<()> {
        let q = encode_query_params(&[
            ("cursor", json!(1743526687419798u64)),
            ("compress", json!(false)),
            ("wantedCollections", json!("app.bsky.feed.post")),
        ])?;
        assert_eq!(
            q,
            "cursor=1743526687419798&compress=false&wantedCollections=app.bsky.feed.post"
        );
        Ok(())
    }

    #[test]
    fn test_arrays_repeat_the_key() -> anyhow::Result<()> {
        let q = encode_query_params(&[(
            "wantedCollections",
            json!(["app.bsky.feed.post", ["app.bsky.feed.like"]]),
        )])?;
        assert_eq!(
            q,
            "wantedCollections=app.bsky.feed.post&wantedCollections=app.bsky.feed.like"
        );
        Ok(())
    }

    #[test]
    fn test_null_is_empty() -> anyhow::Result<()> {
        assert_eq!(encode_query_params(&[("cursor", Value::Null)])?, "cursor=");
        Ok(())
    }

    #[test]
    fn test_strings_are_escaped_not_altered() -> anyhow::Result<()> {
        let q = encode_query_params(&[("q", json!("a b&c"))])?;
        assert_eq!(q, "q=a+b%26c");
        Ok(())
    }

    #[test]
    fn test_objects_are_an_error() {
        assert_eq!(
            encode_query_params(&[("nope", json!({"a": 1}))]),
            Err(QueryEncodeError::UnsupportedType("object"))
        );
        assert_eq!(
            encode_query_params(&[("nope", json!([1, {"a": 1}]))]),
            Err(QueryEncodeError::UnsupportedType("object"))
        );
    }
}
