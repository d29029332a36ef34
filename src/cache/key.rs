use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Hex characters of the sha256 digest kept in a cache key
pub const FINGERPRINT_LEN: usize = 12;

/// Derive the cache key for a fetch: `{type}_{12 hex chars}`.
///
/// The hashed payload is `{"type": type, ...params}` serialized with recursively
/// sorted object keys, so params that differ only in key insertion order map to
/// the same key. Non-object params are hashed under a `params` field.
pub fn generate_key(cache_type: &str, params: &Value) -> String {
    let mut payload = Map::new();
    payload.insert("type".to_string(), Value::String(cache_type.to_string()));
    match params {
        Value::Object(fields) => {
            for (k, v) in fields {
                payload.insert(k.clone(), v.clone());
            }
        }
        Value::Null => {}
        other => {
            payload.insert("params".to_string(), other.clone());
        }
    }

    let canonical = stable_serialize(&Value::Object(payload));
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{}_{}", cache_type, &digest[..FINGERPRINT_LEN])
}

/// Whether `name` can be used as a single file or directory name under the cache root.
///
/// Rejects empty names, `.`/`..`, and anything holding a path separator or `..`.
pub fn is_safe_component(name: &str) -> bool {
    !name.is_empty()
        && !name.contains("..")
        && !name.contains(['/', '\\', '\0'])
        && name != "."
}

/// JSON text with object keys sorted at every depth
pub fn stable_serialize(value: &Value) -> String {
    let mut out = String::new();
    write_stable(value, &mut out);
    out
}

fn write_stable(value: &Value, out: &mut String) {
    match value {
        Value::Object(fields) => {
            let mut keys: Vec<&String> = fields.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_stable(&fields[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_stable(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
