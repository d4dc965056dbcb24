use serde_json::Value;

/// Sanitizes sensitive fields in JSON payloads for logging
pub fn sanitize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            // Daraja callback metadata: {"Name": "PhoneNumber", "Value": 2547...}
            let masks_value = map
                .get("Name")
                .and_then(Value::as_str)
                .map(is_sensitive_field)
                .unwrap_or(false);

            let mut sanitized = serde_json::Map::new();
            for (key, val) in map {
                let sanitized_val = if is_sensitive_field(key) || (masks_value && key == "Value") {
                    mask_value(val)
                } else {
                    sanitize_json(val)
                };
                sanitized.insert(key.clone(), sanitized_val);
            }
            Value::Object(sanitized)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sanitize_json).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_field(key: &str) -> bool {
    matches!(
        key.to_lowercase().as_str(),
        "phone"
            | "phonenumber"
            | "partya"
            | "password"
            | "secret"
            | "consumer_secret"
            | "pass_key"
            | "token"
            | "access_token"
            | "authorization"
    )
}

fn mask_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(mask_text(s)),
        Value::Number(n) => Value::String(mask_text(&n.to_string())),
        _ => Value::String("****".to_string()),
    }
}

fn mask_text(s: &str) -> String {
    if s.len() > 8 && s.is_ascii() {
        format!("{}****{}", &s[..4], &s[s.len() - 4..])
    } else {
        "****".to_string()
    }
}

/// Masks the middle of a phone number for log lines: `2547****5678`.
pub fn mask_phone(phone: &str) -> String {
    mask_text(phone)
}
