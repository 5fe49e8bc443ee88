//! Number rendering and printf-style formatting of formula results
//!
//! Supported format syntax: `%[flags][width][.precision]conversion` with
//! flags `- + 0 ,` and space, conversions `f e E d s`, plus `%%` and `%n`.
//! A format may consume the value at most once.

/// Largest magnitude below which every integral `f64` is exact
const EXACT_INTEGER_LIMIT: f64 = 9_007_199_254_740_992.0;

/// Render a number the way cells show it: whole values without a fraction.
///
/// Output is always positional decimal, never scientific notation, so
/// `1e-7` renders as `0.0000001`. Use an `%e` format on the calculation
/// when exponent form is wanted.
pub fn render_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < EXACT_INTEGER_LIMIT {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Lenient numeric parse used for formula inputs.
///
/// Thousands separators are stripped. Blank, unparseable or non-finite text
/// reads as `0.0`.
pub fn parse_number(text: &str) -> f64 {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => v,
        _ => 0.0,
    }
}

/// Error for an unusable format string
#[derive(Debug, Clone, PartialEq)]
pub struct FormatError {
    pub message: String,
}

impl FormatError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FormatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid format: {}", self.message)
    }
}

impl std::error::Error for FormatError {}

#[derive(Debug, Default)]
struct Spec {
    left: bool,
    plus: bool,
    space: bool,
    zero: bool,
    group: bool,
    width: Option<usize>,
    precision: Option<usize>,
    conversion: char,
}

/// Apply a printf-style `format` to `value`
pub fn apply_format(format: &str, value: f64) -> Result<String, FormatError> {
    let mut out = String::new();
    let mut chars = format.chars().peekable();
    let mut consumed = false;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        match chars.peek() {
            Some('%') => {
                chars.next();
                out.push('%');
                continue;
            }
            Some('n') => {
                chars.next();
                out.push('\n');
                continue;
            }
            None => return Err(FormatError::new("dangling '%'")),
            _ => {}
        }

        let mut spec = Spec::default();
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => spec.left = true,
                '+' => spec.plus = true,
                ' ' => spec.space = true,
                '0' => spec.zero = true,
                ',' => spec.group = true,
                _ => break,
            }
            chars.next();
        }

        spec.width = read_digits(&mut chars);
        if chars.peek() == Some(&'.') {
            chars.next();
            spec.precision = Some(
                read_digits(&mut chars).ok_or_else(|| FormatError::new("missing precision"))?,
            );
        }

        spec.conversion = chars
            .next()
            .ok_or_else(|| FormatError::new("missing conversion"))?;

        if consumed {
            return Err(FormatError::new("format consumes more than one value"));
        }
        consumed = true;
        out.push_str(&format_spec(&spec, value)?);
    }

    Ok(out)
}

fn read_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<usize> {
    let mut digits = String::new();
    while let Some(&c) = chars.peek() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c);
        chars.next();
    }
    digits.parse().ok()
}

fn format_spec(spec: &Spec, value: f64) -> Result<String, FormatError> {
    if (spec.left || spec.zero) && spec.width.is_none() {
        return Err(FormatError::new("'-' and '0' flags need a width"));
    }
    if spec.left && spec.zero {
        return Err(FormatError::new("'-' and '0' flags are exclusive"));
    }
    if spec.plus && spec.space {
        return Err(FormatError::new("'+' and ' ' flags are exclusive"));
    }

    let body = match spec.conversion {
        'f' => round_half_up(value.abs(), spec.precision.unwrap_or(6)),
        'd' => round_half_up(value.abs(), 0),
        'e' | 'E' => scientific(value.abs(), spec.precision.unwrap_or(6), spec.conversion == 'E'),
        's' => {
            let mut text = render_number(value);
            if let Some(p) = spec.precision {
                text = text.chars().take(p).collect();
            }
            return Ok(pad(String::new(), text, spec));
        }
        other => {
            return Err(FormatError::new(format!(
                "unsupported conversion '{}'",
                other
            )))
        }
    };

    let body = if spec.group && spec.conversion != 'e' && spec.conversion != 'E' {
        group_thousands(&body)
    } else {
        body
    };

    let sign = if value < 0.0 {
        "-"
    } else if spec.plus {
        "+"
    } else if spec.space {
        " "
    } else {
        ""
    };

    Ok(pad(sign.to_string(), body, spec))
}

fn pad(sign: String, body: String, spec: &Spec) -> String {
    let len = sign.chars().count() + body.chars().count();
    let width = spec.width.unwrap_or(0);
    if len >= width {
        return sign + &body;
    }
    let fill = width - len;
    if spec.left {
        format!("{}{}{}", sign, body, " ".repeat(fill))
    } else if spec.zero {
        format!("{}{}{}", sign, "0".repeat(fill), body)
    } else {
        format!("{}{}{}", " ".repeat(fill), sign, body)
    }
}

/// Round a non-negative value to `precision` decimals, halves away from zero,
/// working on its shortest decimal representation.
fn round_half_up(magnitude: f64, precision: usize) -> String {
    let repr = format!("{}", magnitude);
    let (int_part, frac_part) = repr.split_once('.').unwrap_or((repr.as_str(), ""));

    if frac_part.len() <= precision {
        let mut out = int_part.to_string();
        if precision > 0 {
            out.push('.');
            out.push_str(frac_part);
            out.push_str(&"0".repeat(precision - frac_part.len()));
        }
        return out;
    }

    let mut digits: Vec<u8> = int_part
        .bytes()
        .chain(frac_part.bytes().take(precision))
        .map(|b| b - b'0')
        .collect();
    let round_up = frac_part.as_bytes()[precision] >= b'5';

    if round_up {
        let mut i = digits.len();
        loop {
            if i == 0 {
                digits.insert(0, 1);
                break;
            }
            i -= 1;
            if digits[i] == 9 {
                digits[i] = 0;
            } else {
                digits[i] += 1;
                break;
            }
        }
    }

    let int_len = digits.len() - precision;
    let mut out: String = digits[..int_len].iter().map(|d| (b'0' + d) as char).collect();
    if precision > 0 {
        out.push('.');
        out.extend(digits[int_len..].iter().map(|d| (b'0' + d) as char));
    }
    out
}

/// `1.234500e+01` style: exponent with sign and at least two digits
fn scientific(magnitude: f64, precision: usize, upper: bool) -> String {
    let raw = format!("{:.*e}", precision, magnitude);
    let (mantissa, exponent) = raw.split_once('e').unwrap_or((raw.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if exponent < 0 { '-' } else { '+' };
    let marker = if upper { 'E' } else { 'e' };
    format!("{}{}{}{:02}", mantissa, marker, sign, exponent.abs())
}

fn group_thousands(body: &str) -> String {
    let (int_part, rest) = match body.find('.') {
        Some(pos) => body.split_at(pos),
        None => (body, ""),
    };
    let mut grouped = String::with_capacity(body.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped.push_str(rest);
    grouped
}
