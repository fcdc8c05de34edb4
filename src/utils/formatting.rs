//! printf-style template rendering and filename sanitization.
//!
//! Output name templates use named conversions (`%(SeriesNumber)03d`),
//! command line templates use positional ones (`-sigma %G`). Both accept
//! the same conversion specifiers, flags, width and precision.

use crate::error::{Error, Result};
use crate::model::meta::{MetaMap, MetaValue};

/// Replace every character outside `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_path_comp(comp: &str) -> String {
    comp.chars()
        .map(|c| match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}

/// Fill `%(key)...` conversions from a meta data dictionary.
pub fn format_named(template: &str, values: &MetaMap) -> Result<String> {
    render(template, |spec, _| match &spec.key {
        Some(key) => values
            .get(key)
            .ok_or_else(|| Error::format(template, format!("missing key `{key}`"))),
        None => Err(Error::format(
            template,
            "positional conversion in a named template",
        )),
    })
}

/// Fill positional conversions (`%s`, `%G`, ...) in order.
pub fn format_positional(template: &str, args: &[MetaValue]) -> Result<String> {
    let mut used = 0;
    let rendered = render(template, |_, index| {
        used = index + 1;
        args.get(index)
            .ok_or_else(|| Error::format(template, "not enough arguments"))
    })?;
    if used < args.len() {
        return Err(Error::format(
            template,
            format!("{} argument(s) given, {used} used", args.len()),
        ));
    }
    Ok(rendered)
}

/// Render a value the way `%s` does.
pub fn value_to_string(value: &MetaValue) -> String {
    match value {
        MetaValue::Null => "None".to_string(),
        MetaValue::Bool(true) => "True".to_string(),
        MetaValue::Bool(false) => "False".to_string(),
        MetaValue::Number(number) => match (number.as_i64(), number.as_u64()) {
            (Some(int), _) => int.to_string(),
            (None, Some(uint)) => uint.to_string(),
            _ => float_to_string(number.as_f64().unwrap_or(f64::NAN)),
        },
        MetaValue::String(text) => text.clone(),
        MetaValue::Array(items) => {
            let rendered = items.iter().map(value_repr).collect::<Vec<_>>();
            format!("[{}]", rendered.join(", "))
        }
        MetaValue::Object(map) => {
            let rendered = map
                .iter()
                .map(|(key, value)| format!("'{key}': {}", value_repr(value)))
                .collect::<Vec<_>>();
            format!("{{{}}}", rendered.join(", "))
        }
    }
}

fn value_repr(value: &MetaValue) -> String {
    match value {
        MetaValue::String(text) => format!("'{text}'"),
        other => value_to_string(other),
    }
}

fn float_to_string(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "inf" } else { "-inf" }.to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

#[derive(Debug, Default)]
struct ConversionSpec {
    key: Option<String>,
    left_align: bool,
    zero_pad: bool,
    plus_sign: bool,
    space_sign: bool,
    alternate: bool,
    width: usize,
    precision: Option<usize>,
    conversion: char,
}

fn render<'v, F>(template: &str, mut lookup: F) -> Result<String>
where
    F: FnMut(&ConversionSpec, usize) -> Result<&'v MetaValue>,
{
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut index = 0;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut spec = ConversionSpec::default();

        if chars.peek() == Some(&'(') {
            chars.next();
            let mut key = String::new();
            let mut depth = 1;
            loop {
                match chars.next() {
                    Some('(') => {
                        depth += 1;
                        key.push('(');
                    }
                    Some(')') => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                        key.push(')');
                    }
                    Some(other) => key.push(other),
                    None => return Err(Error::format(template, "incomplete format key")),
                }
            }
            spec.key = Some(key);
        }

        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => spec.left_align = true,
                '0' => spec.zero_pad = true,
                '+' => spec.plus_sign = true,
                ' ' => spec.space_sign = true,
                '#' => spec.alternate = true,
                _ => break,
            }
            chars.next();
        }

        while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
            spec.width = spec.width * 10 + digit as usize;
            chars.next();
        }

        if chars.peek() == Some(&'.') {
            chars.next();
            let mut precision = 0;
            while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
                precision = precision * 10 + digit as usize;
                chars.next();
            }
            spec.precision = Some(precision);
        }

        // Length modifiers are accepted and ignored.
        while matches!(chars.peek(), Some('h' | 'l' | 'L')) {
            chars.next();
        }

        spec.conversion = chars
            .next()
            .ok_or_else(|| Error::format(template, "incomplete format"))?;

        if spec.conversion == '%' && spec.key.is_none() {
            out.push('%');
            continue;
        }

        let value = lookup(&spec, index)?;
        index += 1;
        let body = convert(template, &spec, value)?;
        out.push_str(&pad(&spec, body));
    }

    Ok(out)
}

fn convert(template: &str, spec: &ConversionSpec, value: &MetaValue) -> Result<String> {
    match spec.conversion {
        's' => {
            let text = value_to_string(value);
            Ok(match spec.precision {
                Some(precision) => text.chars().take(precision).collect(),
                None => text,
            })
        }
        'r' => Ok(value_repr(value)),
        'd' | 'i' | 'u' => {
            let number = as_number(template, spec, value)?;
            Ok(signed(spec, number < 0.0, format!("{}", number.trunc().abs() as i128)))
        }
        'x' | 'X' | 'o' => {
            let number = as_number(template, spec, value)?.trunc();
            let magnitude = number.abs() as u128;
            let digits = match spec.conversion {
                'x' => format!("{magnitude:x}"),
                'X' => format!("{magnitude:X}"),
                _ => format!("{magnitude:o}"),
            };
            Ok(signed(spec, number < 0.0, digits))
        }
        'f' | 'F' => {
            let number = as_number(template, spec, value)?;
            let precision = spec.precision.unwrap_or(6);
            Ok(signed(
                spec,
                number.is_sign_negative(),
                format!("{:.*}", precision, number.abs()),
            ))
        }
        'e' | 'E' => {
            let number = as_number(template, spec, value)?;
            let precision = spec.precision.unwrap_or(6);
            let body = exponential(number.abs(), precision, spec.conversion == 'E');
            Ok(signed(spec, number.is_sign_negative(), body))
        }
        'g' | 'G' => {
            let number = as_number(template, spec, value)?;
            let body = general(number.abs(), spec, spec.conversion == 'G');
            Ok(signed(spec, number.is_sign_negative(), body))
        }
        other => Err(Error::format(
            template,
            format!("unsupported format character `{other}`"),
        )),
    }
}

fn as_number(template: &str, spec: &ConversionSpec, value: &MetaValue) -> Result<f64> {
    match value {
        MetaValue::Number(number) => number
            .as_f64()
            .ok_or_else(|| Error::format(template, "number out of range")),
        MetaValue::Bool(flag) => Ok(if *flag { 1.0 } else { 0.0 }),
        other => Err(Error::format(
            template,
            format!(
                "%{} format requires a number, not {}",
                spec.conversion,
                value_repr(other)
            ),
        )),
    }
}

fn signed(spec: &ConversionSpec, negative: bool, digits: String) -> String {
    if negative && digits.chars().any(|c| c.is_ascii_digit() && c != '0') {
        format!("-{digits}")
    } else if spec.plus_sign {
        format!("+{digits}")
    } else if spec.space_sign {
        format!(" {digits}")
    } else {
        digits
    }
}

/// Mantissa and exponent with at least two exponent digits, as C does.
fn exponential(value: f64, precision: usize, upper: bool) -> String {
    if !value.is_finite() {
        return non_finite(value, upper);
    }
    let rendered = format!("{:.*e}", precision, value);
    let (mantissa, exponent) = rendered.split_once('e').unwrap_or((&rendered, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if exponent < 0 { '-' } else { '+' };
    let marker = if upper { 'E' } else { 'e' };
    format!("{mantissa}{marker}{sign}{:02}", exponent.abs())
}

fn general(value: f64, spec: &ConversionSpec, upper: bool) -> String {
    if !value.is_finite() {
        return non_finite(value, upper);
    }
    let precision = match spec.precision {
        Some(0) => 1,
        Some(precision) => precision,
        None => 6,
    };

    let scientific = format!("{:.*e}", precision - 1, value);
    let exponent: i32 = scientific
        .split_once('e')
        .and_then(|(_, exponent)| exponent.parse().ok())
        .unwrap_or(0);

    if exponent < -4 || exponent >= precision as i32 {
        let rendered = exponential(value, precision - 1, upper);
        if spec.alternate {
            rendered
        } else {
            let marker = if upper { 'E' } else { 'e' };
            match rendered.split_once(marker) {
                Some((mantissa, exponent)) => {
                    format!("{}{marker}{exponent}", strip_zeros(mantissa))
                }
                None => rendered,
            }
        }
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        let rendered = format!("{:.*}", decimals, value);
        if spec.alternate {
            rendered
        } else {
            strip_zeros(&rendered).to_string()
        }
    }
}

fn strip_zeros(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}

fn non_finite(value: f64, upper: bool) -> String {
    let text = if value.is_nan() { "nan" } else { "inf" };
    if upper {
        text.to_uppercase()
    } else {
        text.to_string()
    }
}

fn pad(spec: &ConversionSpec, body: String) -> String {
    let len = body.chars().count();
    if len >= spec.width {
        return body;
    }
    let fill = spec.width - len;
    let numeric = !matches!(spec.conversion, 's' | 'r');

    if spec.left_align {
        format!("{body}{}", " ".repeat(fill))
    } else if spec.zero_pad && numeric {
        let sign_len = body
            .chars()
            .next()
            .filter(|c| matches!(c, '-' | '+' | ' '))
            .map_or(0, |_| 1);
        let (sign, digits) = body.split_at(sign_len);
        format!("{sign}{}{digits}", "0".repeat(fill))
    } else {
        format!("{}{body}", " ".repeat(fill))
    }
}
