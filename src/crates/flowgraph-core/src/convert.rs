//! Socket type names and value coercion
//!
//! Socket types are identified by short names derived from the Rust type
//! ([`type_name_of`]). The [`SocketTypeRegistry`] maps those names to
//! optional converters used by the typed accessors: a read tries an exact
//! `serde_json` deserialization first, then a registered converter for the
//! `(stored, requested)` pair, then falls back to the type's default.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

/// Converter from one socket type's payload to another's
pub type ValueConverter = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

/// Short type name for a socket payload type
///
/// Strips module paths from `std::any::type_name`, including inside
/// generic arguments: `alloc::string::String` becomes `String`,
/// `alloc::vec::Vec<alloc::string::String>` becomes `Vec<String>`.
pub fn type_name_of<T: ?Sized>() -> String {
    strip_paths(std::any::type_name::<T>())
}

fn strip_paths(full: &str) -> String {
    let mut out = String::with_capacity(full.len());
    let mut segment = String::new();
    for ch in full.chars() {
        match ch {
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | ';' => {
                out.push_str(last_segment(&segment));
                segment.clear();
                out.push(ch);
            }
            _ => segment.push(ch),
        }
    }
    out.push_str(last_segment(&segment));
    out
}

fn last_segment(segment: &str) -> &str {
    segment.rsplit("::").next().unwrap_or(segment)
}

/// Registry of socket type names and cross-type converters
///
/// Extensions register their payload types so editors can render them and
/// so `get_input` can coerce between connected sockets of different but
/// convertible types.
#[derive(Default)]
pub struct SocketTypeRegistry {
    /// Registered type names (display registry for editors)
    types: Vec<String>,
    /// (from, to) -> converter
    converters: HashMap<(String, String), ValueConverter>,
}

impl SocketTypeRegistry {
    /// Create a registry pre-loaded with the standard conversions
    ///
    /// Numeric widening/narrowing between `i64` and `f64`, and `to_string`
    /// renderings of both into `String`.
    pub fn with_standard_conversions() -> Self {
        let mut registry = Self::default();
        registry.register_type::<bool>();
        registry.register_type::<i64>();
        registry.register_type::<f64>();
        registry.register_type::<String>();

        registry.register_converter("i64", "f64", |v| v.as_i64().map(|i| Value::from(i as f64)));
        registry.register_converter("f64", "i64", |v| v.as_f64().map(|f| Value::from(f as i64)));
        registry.register_converter("i64", "String", |v| {
            v.as_i64().map(|i| Value::from(i.to_string()))
        });
        registry.register_converter("f64", "String", |v| {
            v.as_f64().map(|f| Value::from(f.to_string()))
        });
        registry.register_converter("String", "i64", |v| {
            v.as_str().and_then(|s| s.parse::<i64>().ok()).map(Value::from)
        });
        registry.register_converter("String", "f64", |v| {
            v.as_str().and_then(|s| s.parse::<f64>().ok()).map(Value::from)
        });
        registry
    }

    /// Register a payload type by its Rust type
    pub fn register_type<T: ?Sized>(&mut self) {
        let name = type_name_of::<T>();
        if !self.types.contains(&name) {
            self.types.push(name);
        }
    }

    /// Registered type names, in registration order
    pub fn type_names(&self) -> &[String] {
        &self.types
    }

    /// Register a converter between two type names
    pub fn register_converter(
        &mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        converter: impl Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    ) {
        self.converters
            .insert((from.into(), to.into()), Arc::new(converter));
    }

    /// Convert a payload between type names, if a converter is registered
    pub fn convert(&self, from: &str, to: &str, value: &Value) -> Option<Value> {
        if from == to {
            return Some(value.clone());
        }
        self.converters.get(&(from.to_string(), to.to_string()))?(value)
    }
}

impl std::fmt::Debug for SocketTypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketTypeRegistry")
            .field("types", &self.types)
            .field("converters", &self.converters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_name_strips_paths() {
        assert_eq!(type_name_of::<String>(), "String");
        assert_eq!(type_name_of::<f64>(), "f64");
        assert_eq!(type_name_of::<Vec<String>>(), "Vec<String>");
    }

    #[test]
    fn test_standard_string_to_number() {
        let registry = SocketTypeRegistry::with_standard_conversions();
        assert_eq!(
            registry.convert("String", "i64", &json!("17")),
            Some(json!(17))
        );
        assert_eq!(registry.convert("String", "i64", &json!("nope")), None);
    }

    #[test]
    fn test_same_type_is_identity() {
        let registry = SocketTypeRegistry::default();
        assert_eq!(registry.convert("f64", "f64", &json!(2.5)), Some(json!(2.5)));
    }

    #[test]
    fn test_unregistered_pair_is_none() {
        let registry = SocketTypeRegistry::default();
        assert_eq!(registry.convert("bool", "String", &json!(true)), None);
    }
}
