//! Field naming and value rendering shared by the sinks
//!
//! Records carry canonical snake_case names (`temperature_c`). Each sink picks
//! a [`KeyStyle`] and may rename individual fields, so an existing dashboard
//! keeps working when a feed was created under a different key.

use std::collections::BTreeMap;

use atmos_core::FieldValue;

/// Default spelling of keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStyle {
    /// `temperature-c`
    Kebab,
    /// `temperature_c`
    Snake,
}

/// Canonical name to backend key mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMap {
    style: KeyStyle,
    renames: BTreeMap<String, String>,
}

impl FieldMap {
    /// Kebab-case keys (Adafruit IO feeds)
    pub fn kebab() -> Self {
        Self { style: KeyStyle::Kebab, renames: BTreeMap::new() }
    }

    /// Snake-case keys (InfluxDB fields)
    pub fn snake() -> Self {
        Self { style: KeyStyle::Snake, renames: BTreeMap::new() }
    }

    /// Send `canonical` under `key` instead of the styled default
    pub fn rename(mut self, canonical: impl Into<String>, key: impl Into<String>) -> Self {
        self.renames.insert(canonical.into(), key.into());
        self
    }

    /// Apply every rename in `renames`
    pub fn with_renames<I, K, V>(mut self, renames: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.renames.extend(renames.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Backend key for a canonical field name
    pub fn key_for(&self, canonical: &str) -> String {
        if let Some(key) = self.renames.get(canonical) {
            return key.clone();
        }
        match self.style {
            KeyStyle::Kebab => canonical.replace('_', "-"),
            KeyStyle::Snake => canonical.to_string(),
        }
    }
}

/// Round half away from zero to `decimals`
pub fn round_to(value: f32, decimals: u8) -> f64 {
    let scale = 10f64.powi(i32::from(decimals));
    (f64::from(value) * scale).round() / scale
}

/// JSON rendering; non-finite floats become `null`
pub fn json_value(value: &FieldValue) -> serde_json::Value {
    match value {
        FieldValue::Float { value, decimals } => serde_json::Number::from_f64(round_to(*value, *decimals))
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        FieldValue::Integer(n) => serde_json::Value::from(*n),
        FieldValue::Text(text) => serde_json::Value::String(text.clone()),
    }
}

/// Plain text rendering with fixed decimals
pub fn text_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Float { value, decimals } => format!("{:.*}", usize::from(*decimals), value),
        FieldValue::Integer(n) => n.to_string(),
        FieldValue::Text(text) => text.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn styles_and_renames() {
        let map = FieldMap::kebab().rename("humidity_pct", "rh");
        assert_eq!(map.key_for("temperature_c"), "temperature-c");
        assert_eq!(map.key_for("humidity_pct"), "rh");

        let map = FieldMap::snake().with_renames([("battery_v", "vbat")]);
        assert_eq!(map.key_for("battery_v"), "vbat");
        assert_eq!(map.key_for("dewpoint_c"), "dewpoint_c");
    }

    #[test]
    fn rounding() {
        assert_eq!(round_to(21.456, 2), 21.46);
        assert_eq!(round_to(0.007_257, 5), 0.00726);
        assert_eq!(text_value(&FieldValue::Float { value: 3.9123, decimals: 3 }), "3.912");
    }

    #[test]
    fn json_rendering() {
        assert_eq!(json_value(&FieldValue::Integer(12_346)), serde_json::json!(12_346));
        assert_eq!(json_value(&FieldValue::Text("clean".into())), serde_json::json!("clean"));
        assert_eq!(json_value(&FieldValue::Float { value: f32::NAN, decimals: 2 }), serde_json::Value::Null);
        assert_eq!(json_value(&FieldValue::Float { value: 81.54, decimals: 1 }), serde_json::json!(81.5));
    }
}
