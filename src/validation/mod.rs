use std::fmt;

pub const MSISDN_LEN: usize = 12;
pub const COUNTRY_CODE: &str = "254";
/// Daraja refuses single STK pushes above this many KES.
pub const MAX_PUSH_AMOUNT: u64 = 250_000;
pub const DESTINATION_ACCOUNT_MAX_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_required(field: &'static str, value: &str) -> ValidationResult {
    if value.trim().is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }

    Ok(())
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

/// Normalises a Kenyan mobile number to `2547XXXXXXXX` / `2541XXXXXXXX`.
/// Accepts `+254…`, `254…`, `07…`/`01…` and bare `7…`/`1…` forms.
pub fn normalize_msisdn(phone: &str) -> Result<String, ValidationError> {
    let phone: String = sanitize_string(phone)
        .chars()
        .filter(|ch| !ch.is_whitespace() && *ch != '-')
        .collect();
    validate_required("phone", &phone)?;

    let digits = phone.strip_prefix('+').unwrap_or(&phone);
    if !digits.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(ValidationError::new("phone", "must contain only digits"));
    }

    let normalized = if digits.len() == 10 && digits.starts_with('0') {
        format!("{}{}", COUNTRY_CODE, &digits[1..])
    } else if digits.len() == 9 {
        format!("{}{}", COUNTRY_CODE, digits)
    } else {
        digits.to_string()
    };

    if normalized.len() != MSISDN_LEN {
        return Err(ValidationError::new(
            "phone",
            format!("must be a {}-digit number starting with {}", MSISDN_LEN, COUNTRY_CODE),
        ));
    }
    if !(normalized.starts_with("2547") || normalized.starts_with("2541")) {
        return Err(ValidationError::new("phone", "must be a Kenyan mobile number"));
    }

    Ok(normalized)
}

/// Parses a normalised MSISDN into the numeric form the gateway expects.
pub fn msisdn_number(normalized: &str) -> Result<u64, ValidationError> {
    normalized
        .parse::<u64>()
        .map_err(|_| ValidationError::new("phone", "must be a valid integer"))
}

/// The push amount must be a positive whole number of KES within the gateway ceiling.
pub fn validate_push_amount(amount: f64) -> Result<u64, ValidationError> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ValidationError::new("amount_source", "must be greater than zero"));
    }
    if amount.fract() != 0.0 {
        return Err(ValidationError::new("amount_source", "must be a whole number"));
    }
    if amount > MAX_PUSH_AMOUNT as f64 {
        return Err(ValidationError::new(
            "amount_source",
            format!("must be at most {}", MAX_PUSH_AMOUNT),
        ));
    }

    Ok(amount as u64)
}

/// Settlement-network account id in `shard.realm.num` form, e.g. `0.0.4512345`.
pub fn validate_destination_account(account: &str) -> Result<String, ValidationError> {
    let account = sanitize_string(account);
    validate_required("destination_account", &account)?;
    validate_max_len("destination_account", &account, DESTINATION_ACCOUNT_MAX_LEN)?;

    let parts: Vec<&str> = account.split('.').collect();
    let well_formed = parts.len() == 3
        && parts
            .iter()
            .all(|part| !part.is_empty() && part.chars().all(|ch| ch.is_ascii_digit()));
    if !well_formed {
        return Err(ValidationError::new(
            "destination_account",
            "must look like shard.realm.num (e.g. 0.0.12345)",
        ));
    }

    Ok(account)
}
