// Parsing and formatting helpers.
//
// Backend rows and CSV exports carry amounts as numbers, plain strings or
// Brazilian-formatted strings ("1.234,56"). Everything is normalised here so
// the rest of the code works with plain `f64` and `NaiveDate`.
use chrono::NaiveDate;
use num_format::{Locale, ToFormattedString};

/// Parse a string-like amount into `f64`.
///
/// - Trims whitespace and a leading `R$`.
/// - Rejects values with other alphabetic characters.
/// - When both `.` and `,` appear, the last one is the decimal separator.
/// - A lone `,` is a decimal separator; repeated `.` are thousands separators.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    let s = s.strip_prefix("R$").unwrap_or(s).trim();
    if s.is_empty() {
        return None;
    }
    if s.chars().any(|c| c.is_alphabetic()) {
        return None;
    }
    let s: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    let last_dot = s.rfind('.');
    let last_comma = s.rfind(',');
    let normalized = match (last_dot, last_comma) {
        (Some(d), Some(c)) if c > d => s.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => s.replace(',', ""),
        (None, Some(_)) => s.replace('.', "").replace(',', "."),
        (Some(_), None) if s.matches('.').count() > 1 => s.replace('.', ""),
        _ => s,
    };
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Dates are ISO `YYYY-MM-DD`; a trailing time part (`T..` or ` ..`) is ignored.
pub fn parse_date_safe(s: Option<&str>) -> Option<NaiveDate> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    let day = s.split(&['T', ' '][..]).next().unwrap_or(s);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

/// Brazilian Real with exactly two decimals: `R$ 1.234,56`, `-R$ 10,00`.
///
/// Display only; the model keeps plain `f64` amounts.
pub fn format_brl(amount: f64) -> String {
    let cents = if amount.is_finite() {
        (amount.abs() * 100.0).round() as i64
    } else {
        0
    };
    let neg = amount.is_sign_negative() && cents > 0;
    let int_part = (cents / 100).to_formatted_string(&Locale::pt);
    let res = format!("R$ {},{:02}", int_part, cents % 100);
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

/// Fixed decimals with a comma separator, e.g. `12,50`.
pub fn format_decimal(n: f64, decimals: usize) -> String {
    let n = if n.is_finite() { n } else { 0.0 };
    format!("{:.*}", decimals, n).replace('.', ",")
}

pub fn format_percent(p: f64) -> String {
    format!("{}%", format_decimal(p, 1))
}

pub fn format_area(hectares: f64) -> String {
    format_decimal(hectares, 2)
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    n.to_formatted_string(&Locale::pt)
}
