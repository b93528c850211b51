//! CBOR encoding for document payloads.

use crate::error::{CoreError, CoreResult};
use ciborium::Value;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes `value` to CBOR bytes.
///
/// # Errors
///
/// Returns a codec error if `value` cannot be serialized.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> CoreResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes).map_err(|e| CoreError::codec(e.to_string()))?;
    Ok(bytes)
}

/// Decodes a value from CBOR bytes.
///
/// # Errors
///
/// Returns a codec error if the bytes do not describe a `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CoreResult<T> {
    ciborium::from_reader(bytes).map_err(|e| CoreError::codec(e.to_string()))
}

/// Overlays the top-level fields of `partial` onto `base`.
///
/// Both values must serialize to maps. Keys present in `partial` replace
/// the same keys in `base`; keys absent from `partial` are kept. Use
/// `#[serde(skip_serializing_if = "Option::is_none")]` on a partial struct
/// to leave fields untouched.
///
/// # Errors
///
/// Returns `InvalidOperation` if either side is not a map, or a codec
/// error if the merged map is not a valid `S`.
///
/// # Example
///
/// ```rust
/// use docket_core::merge_fields;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize, Debug, PartialEq)]
/// struct User { name: String, age: u32 }
///
/// #[derive(Serialize)]
/// struct AgeOnly { age: u32 }
///
/// let base = User { name: "ada".into(), age: 36 };
/// let merged = merge_fields(&base, &AgeOnly { age: 37 }).unwrap();
/// assert_eq!(merged, User { name: "ada".into(), age: 37 });
/// ```
pub fn merge_fields<S, P>(base: &S, partial: &P) -> CoreResult<S>
where
    S: Serialize + DeserializeOwned,
    P: Serialize + ?Sized,
{
    let base = Value::serialized(base).map_err(|e| CoreError::codec(e.to_string()))?;
    let partial = Value::serialized(partial).map_err(|e| CoreError::codec(e.to_string()))?;

    let (Value::Map(mut fields), Value::Map(updates)) = (base, partial) else {
        return Err(CoreError::invalid_operation(
            "patch requires map-shaped state and partial",
        ));
    };

    for (key, value) in updates {
        match fields.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, slot)) => *slot = value,
            None => fields.push((key, value)),
        }
    }

    Value::Map(fields)
        .deserialized()
        .map_err(|e| CoreError::codec(e.to_string()))
}
