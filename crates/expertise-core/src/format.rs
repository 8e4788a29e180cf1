//! Deterministic text rendering for comparison reports.
//!
//! Rendered strings end up in TaskSummary documents that downstream tools diff
//! against golden outputs, so every function here is byte-stable.

/// Default number of decimals for percentages in profiling reports.
pub const DEFAULT_PERCENT_PRECISION: usize = 2;

/// Signed percentage with a dead zone around zero.
///
/// Values whose magnitude is below half a unit of the last displayed decimal
/// render unsigned as zero (`0.0%` for `precision = 1`); every other value
/// carries an explicit sign.
pub fn render_percent(value: f64, precision: usize) -> String {
    let magnitude = format!("{:.*}", precision, (value * 100.0).abs());
    if magnitude.chars().all(|c| c == '0' || c == '.') {
        return magnitude + "%";
    }
    let sign = if value < 0.0 { '-' } else { '+' };
    format!("{sign}{magnitude}%")
}

/// Integer with an explicit sign, except for zero.
pub fn render_int(value: i64) -> String {
    if value == 0 {
        "0".to_string()
    } else {
        format!("{:+}", value)
    }
}

/// Unsigned percentage with six decimals (`0.000123` -> `0.012300%`).
pub fn render_plain_percent(value: f64) -> String {
    format!("{:.6}%", value * 100.0)
}

/// `%g`-style rendering with six significant digits and an explicit sign.
pub fn render_signed_general(value: f64) -> String {
    render_general(value, true)
}

/// `%g`-style rendering: six significant digits, scientific notation when the
/// decimal exponent is below -4 or at least 6, trailing zeros removed.
pub fn render_general(value: f64, signed: bool) -> String {
    const SIGNIFICANT_DIGITS: i32 = 6;

    let sign = if value.is_sign_negative() && !value.is_nan() {
        "-"
    } else if signed {
        "+"
    } else {
        ""
    };
    let magnitude = value.abs();

    if magnitude.is_nan() {
        return format!("{}nan", if signed { "+" } else { "" });
    }
    if magnitude.is_infinite() {
        return format!("{sign}inf");
    }
    if magnitude == 0.0 {
        return format!("{sign}0");
    }

    let scientific = format!("{:.*e}", (SIGNIFICANT_DIGITS - 1) as usize, magnitude);
    let (mantissa, exponent) = scientific
        .split_once('e')
        .map(|(mantissa, exponent)| (mantissa.to_string(), exponent.parse::<i32>().unwrap_or(0)))
        .unwrap_or((scientific.clone(), 0));

    if exponent < -4 || exponent >= SIGNIFICANT_DIGITS {
        let exponent_sign = if exponent < 0 { '-' } else { '+' };
        return format!(
            "{sign}{}e{}{:02}",
            trim_fraction_zeros(&mantissa),
            exponent_sign,
            exponent.abs()
        );
    }

    let decimals = (SIGNIFICANT_DIGITS - 1 - exponent).max(0) as usize;
    let fixed = format!("{:.*}", decimals, magnitude);
    format!("{sign}{}", trim_fraction_zeros(&fixed))
}

/// Shortest round-trip rendering: positional for decimal exponents in
/// `[-4, 16)`, scientific otherwise; integral values keep a `.0`.
pub fn render_shortest(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    let sign = if value.is_sign_negative() { "-" } else { "" };
    let magnitude = value.abs();
    if magnitude == 0.0 {
        return format!("{sign}0.0");
    }

    let scientific = format!("{:e}", magnitude);
    let (mantissa, exponent) = scientific
        .split_once('e')
        .map(|(mantissa, exponent)| (mantissa.to_string(), exponent.parse::<i32>().unwrap_or(0)))
        .unwrap_or((scientific.clone(), 0));

    if !(-4..16).contains(&exponent) {
        let exponent_sign = if exponent < 0 { '-' } else { '+' };
        return format!("{sign}{mantissa}e{exponent_sign}{:02}", exponent.abs());
    }
    let fixed = magnitude.to_string();
    if fixed.contains('.') {
        format!("{sign}{fixed}")
    } else {
        format!("{sign}{fixed}.0")
    }
}

/// Memory amount given in kilobytes, rendered in gigabytes with one decimal.
pub fn render_memory_gb(kilobytes: f64, signed: bool) -> String {
    let gigabytes = kilobytes / 1024.0 / 1024.0;
    if signed {
        format!("{:+.1}Gb", gigabytes)
    } else {
        format!("{:.1}Gb", gigabytes)
    }
}

/// Reads back a value rendered by [`render_memory_gb`], in kilobytes.
pub fn parse_memory_gb(rendered: &str) -> Option<f64> {
    let gigabytes = rendered.trim().strip_suffix("Gb")?.parse::<f64>().ok()?;
    Some(gigabytes * 1024.0 * 1024.0)
}

/// Reads back a percentage such as `12.5%` or `+0.010%` as a fraction.
pub fn parse_percent(rendered: &str) -> Option<f64> {
    let number = rendered.trim().strip_suffix('%')?.parse::<f64>().ok()?;
    Some(number / 100.0)
}

fn trim_fraction_zeros(number: &str) -> String {
    if !number.contains('.') {
        return number.to_string();
    }
    number
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}
