//! Phone number canonicalization.
//!
//! Mexican mobile numbers arrive in two shapes: `52` + 10 digits (how most
//! people type them) and `521` + 10 digits (how WhatsApp reports the sender).
//! Both collapse to the 13-digit form so that client records and conversation
//! keys built from either shape match.

const COUNTRY_CODE: &str = "52";
const MOBILE_INDICATOR: char = '1';
const NATIONAL_LEN: usize = 10;

/// Strict variant: removes formatting characters and a leading `+`, then
/// applies the mobile-indicator rule. Anything unrecognized passes through.
pub fn normalize_phone(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_plus = trimmed.strip_prefix('+').unwrap_or(trimmed);
    let stripped: String = without_plus
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '(' | ')' | '.'))
        .collect();
    insert_mobile_indicator(stripped)
}

/// Loose variant used to key conversations: keeps digits only.
pub fn contact_key(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    insert_mobile_indicator(digits)
}

/// `+`-prefixed canonical form for labels. Empty input stays empty.
pub fn display_phone(raw: &str) -> String {
    let canonical = normalize_phone(raw);
    if canonical.is_empty() {
        canonical
    } else {
        format!("+{}", canonical)
    }
}

fn insert_mobile_indicator(digits: String) -> String {
    let is_short_mx = digits.len() == COUNTRY_CODE.len() + NATIONAL_LEN
        && digits.starts_with(COUNTRY_CODE)
        && digits.chars().all(|c| c.is_ascii_digit());
    if !is_short_mx {
        return digits;
    }
    let mut canonical = String::with_capacity(digits.len() + 1);
    canonical.push_str(COUNTRY_CODE);
    canonical.push(MOBILE_INDICATOR);
    canonical.push_str(&digits[COUNTRY_CODE.len()..]);
    canonical
}
