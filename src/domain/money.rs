use std::fmt;

/// Money is represented as integer cents to avoid floating-point precision
/// issues. $25.00 owed = 2500 cents.
pub type Cents = i64;

/// Format cents as a decimal currency string.
/// Example: 2500 -> "25.00", -40 -> "-0.40"
pub fn format_cents(cents: Cents) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Parse a decimal string into cents.
/// Example: "25.00" -> 2500, "25" -> 2500, "0.4" -> 40
pub fn parse_cents(input: &str) -> Result<Cents, ParseAmountError> {
    let input = input.trim();
    let (negative, digits) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input),
    };

    let (units_str, decimal_str) = match digits.split_once('.') {
        None => (digits, ""),
        Some((units, decimal)) => (units, decimal),
    };

    // Only ASCII digits past this point; this also rejects a second '.'
    // and keeps the byte slicing below on char boundaries.
    if units_str.is_empty() && decimal_str.is_empty() {
        return Err(ParseAmountError::InvalidFormat);
    }
    if !units_str.bytes().all(|b| b.is_ascii_digit())
        || !decimal_str.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(ParseAmountError::InvalidFormat);
    }

    let units: i64 = if units_str.is_empty() {
        0
    } else {
        units_str
            .parse()
            .map_err(|_| ParseAmountError::InvalidFormat)?
    };

    // Pad or truncate the decimal part to two digits.
    let decimal: i64 = match decimal_str.len() {
        0 => 0,
        1 => {
            decimal_str
                .parse::<i64>()
                .map_err(|_| ParseAmountError::InvalidFormat)?
                * 10
        }
        _ => decimal_str[..2]
            .parse()
            .map_err(|_| ParseAmountError::InvalidFormat)?,
    };

    let cents = units
        .checked_mul(100)
        .and_then(|c| c.checked_add(decimal))
        .ok_or(ParseAmountError::InvalidFormat)?;
    Ok(if negative { -cents } else { cents })
}

/// Parse a ledger amount: same format as [`parse_cents`] but must be
/// strictly positive. Transaction amounts are never zero or negative.
pub fn parse_amount(input: &str) -> Result<Cents, ParseAmountError> {
    let cents = parse_cents(input)?;
    if cents <= 0 {
        return Err(ParseAmountError::NotPositive);
    }
    Ok(cents)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseAmountError {
    InvalidFormat,
    NotPositive,
}

impl fmt::Display for ParseAmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseAmountError::InvalidFormat => write!(f, "invalid money format"),
            ParseAmountError::NotPositive => write!(f, "amount must be positive"),
        }
    }
}

impl std::error::Error for ParseAmountError {}
