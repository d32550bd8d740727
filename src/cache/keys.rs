//! Key construction helpers

use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::store::{StoreError, StoreResult};

/// Hex characters kept from the parameter digest
const HASH_LEN: usize = 16;

/// Build `namespace:hash(params)`.
///
/// The hash covers a canonical JSON rendering with object keys sorted at every
/// depth, so equal parameter objects produce the same key whatever order their
/// fields were inserted in.
pub fn namespaced_key<P: Serialize + ?Sized>(namespace: &str, params: &P) -> StoreResult<String> {
    Ok(format!("{}:{}", namespace, hash_params(params)?))
}

pub fn hash_params<P: Serialize + ?Sized>(params: &P) -> StoreResult<String> {
    let value = serde_json::to_value(params)?;
    let canonical = serde_json::to_string(&canonicalize(value)).map_err(StoreError::from)?;

    let digest = Sha256::digest(canonical.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    Ok(hex[..HASH_LEN].to_string())
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k, canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}

/// Escape glob metacharacters so `literal` only matches itself
pub fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Pattern matching exactly the keys [`namespaced_key`] builds under
/// `namespace`. The hash segment has a fixed width, so a namespace that
/// extends this one (`user:1:x` for `user:1`) never matches.
pub fn namespace_pattern(namespace: &str) -> String {
    format!("{}:{}", escape_glob(namespace), "?".repeat(HASH_LEN))
}

/// Redis-style glob match supporting `*`, `?` and `\` escapes
pub fn glob_match(pattern: &str, key: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let k: Vec<char> = key.chars().collect();

    let (mut pi, mut ki) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ki < k.len() {
        if pi < p.len() {
            match p[pi] {
                '*' => {
                    star = Some((pi, ki));
                    pi += 1;
                    continue;
                }
                '?' => {
                    pi += 1;
                    ki += 1;
                    continue;
                }
                '\\' if pi + 1 < p.len() && p[pi + 1] == k[ki] => {
                    pi += 2;
                    ki += 1;
                    continue;
                }
                c if c != '\\' && c == k[ki] => {
                    pi += 1;
                    ki += 1;
                    continue;
                }
                _ => {}
            }
        }

        // Mismatch: backtrack to the last star, letting it absorb one more char
        match star {
            Some((sp, sk)) => {
                pi = sp + 1;
                ki = sk + 1;
                star = Some((sp, sk + 1));
            }
            None => return false,
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
