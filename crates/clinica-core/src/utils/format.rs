/// Normalize a Chilean RUT to `digits-DV`: dots and spaces removed, check
/// digit uppercased, dash inserted when missing.
pub fn normalize_rut(rut: &str) -> String {
    let cleaned: String = rut
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if cleaned.len() < 2 {
        return cleaned;
    }
    let (body, dv) = cleaned.split_at(cleaned.len() - 1);
    format!("{}-{}", body, dv)
}

/// Format a RUT for display: 12345678-5 -> 12.345.678-5
pub fn format_rut(rut: &str) -> String {
    let normalized = normalize_rut(rut);
    match normalized.split_once('-') {
        Some((body, dv)) if body.chars().all(|c| c.is_ascii_digit()) => {
            format!("{}-{}", group_thousands(body), dv)
        }
        _ => rut.to_string(), // Return original if can't format
    }
}

/// Format an amount of Chilean pesos: 1234567 -> $1.234.567
pub fn format_clp(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    if amount < 0 {
        format!("-${}", group_thousands(&digits))
    } else {
        format!("${}", group_thousands(&digits))
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(c);
    }
    out
}

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Format a date string to DD-MM-YYYY, the format used on clinic forms
pub fn format_date(date: &str) -> String {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(date) {
        dt.format("%d-%m-%Y").to_string()
    } else if let Ok(d) = chrono::NaiveDate::parse_from_str(date.get(..10).unwrap_or(date), "%Y-%m-%d") {
        d.format("%d-%m-%Y").to_string()
    } else {
        date.to_string()
    }
}
