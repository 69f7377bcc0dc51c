//! The format engine (spec.md §4.5), driving `@STRFMT`/`@IDFMT`. Parses a
//! printf-style format string character by character through the states
//! `INIT → FLAG? → WIDTH? → (.PREC)? → SPEC`, matching `std::fmt`'s own
//! layered-option style rather than a regex.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FmtError {
    #[error("unterminated format specifier")]
    Unterminated,
    #[error("unknown format specifier `%{0}`")]
    UnknownSpec(char),
    #[error("not enough arguments for format string")]
    MissingArg,
    #[error("`%s` requires a string argument, `%{0}` requires a numeric one")]
    WrongArgKind(char),
}

/// One `@STRFMT`/`@IDFMT` argument: either a constant integer (already
/// solved by the expression engine) or a string/identifier's text.
#[derive(Clone, Debug)]
pub enum FmtArg {
    Int(i64),
    Text(String),
}

#[derive(Default, Clone, Copy)]
struct Flags {
    left: bool,
    plus: bool,
    space: bool,
    alt: bool,
    zero: bool,
}

/// Run the format engine over `fmt`, consuming from `args` in order.
/// Returns the synthesized text handed to the `FMT` frame as a single
/// `STR`/`ID` token.
pub fn format(fmt: &str, args: &[FmtArg]) -> Result<String, FmtError> {
    let chars: Vec<char> = fmt.chars().collect();
    let mut i = 0;
    let mut arg_i = 0;
    let mut out = String::new();

    let mut next_arg = |arg_i: &mut usize| -> Result<&FmtArg, FmtError> {
        let a = args.get(*arg_i).ok_or(FmtError::MissingArg)?;
        *arg_i += 1;
        Ok(a)
    };

    while i < chars.len() {
        if chars[i] != '%' {
            out.push(chars[i]);
            i += 1;
            continue;
        }
        i += 1;
        if i >= chars.len() {
            return Err(FmtError::Unterminated);
        }
        if chars[i] == '%' {
            out.push('%');
            i += 1;
            continue;
        }

        // FLAG*
        let mut flags = Flags::default();
        loop {
            match chars.get(i) {
                Some('-') => {
                    flags.left = true;
                    i += 1;
                }
                Some('+') => {
                    flags.plus = true;
                    i += 1;
                }
                Some(' ') => {
                    flags.space = true;
                    i += 1;
                }
                Some('#') => {
                    flags.alt = true;
                    i += 1;
                }
                Some('0') => {
                    flags.zero = true;
                    i += 1;
                }
                _ => break,
            }
        }

        // WIDTH?
        let width = parse_count(&chars, &mut i, &mut arg_i, args)?;

        // (.PREC)?
        let prec = if chars.get(i) == Some(&'.') {
            i += 1;
            Some(parse_count(&chars, &mut i, &mut arg_i, args)?.unwrap_or(0))
        } else {
            None
        };

        let spec = *chars.get(i).ok_or(FmtError::Unterminated)?;
        i += 1;

        let rendered = match spec {
            'c' => {
                let a = next_arg(&mut arg_i)?;
                let FmtArg::Int(n) = a else {
                    return Err(FmtError::WrongArgKind('c'));
                };
                let mut buf = [0u8; 4];
                let len = sm83asm_core::utf8::encode(*n as u32, &mut buf);
                String::from_utf8_lossy(&buf[..len]).into_owned()
            }
            'b' | 'd' | 'i' | 'u' | 'x' | 'X' => {
                let a = next_arg(&mut arg_i)?;
                let FmtArg::Int(n) = a else {
                    return Err(FmtError::WrongArgKind(spec));
                };
                render_int(*n, spec, flags, prec)
            }
            's' => {
                let a = next_arg(&mut arg_i)?;
                let FmtArg::Text(s) = a else {
                    return Err(FmtError::WrongArgKind('s'));
                };
                match prec {
                    Some(p) => s.chars().take(p).collect(),
                    None => s.clone(),
                }
            }
            other => return Err(FmtError::UnknownSpec(other)),
        };

        out.push_str(&pad(&rendered, width.unwrap_or(0), flags));
    }
    Ok(out)
}

fn parse_count(
    chars: &[char],
    i: &mut usize,
    arg_i: &mut usize,
    args: &[FmtArg],
) -> Result<Option<usize>, FmtError> {
    if chars.get(*i) == Some(&'*') {
        *i += 1;
        let a = args.get(*arg_i).ok_or(FmtError::MissingArg)?;
        *arg_i += 1;
        let FmtArg::Int(n) = a else {
            return Err(FmtError::WrongArgKind('*'));
        };
        return Ok(Some((*n).max(0) as usize));
    }
    let start = *i;
    while chars.get(*i).is_some_and(|c| c.is_ascii_digit()) {
        *i += 1;
    }
    if *i == start {
        return Ok(None);
    }
    let s: String = chars[start..*i].iter().collect();
    Ok(s.parse().ok())
}

fn render_int(n: i64, spec: char, flags: Flags, prec: Option<usize>) -> String {
    let (neg, mag) = if n < 0 { (true, (-(n as i128)) as u128) } else { (false, n as u128) };
    let mut digits = match spec {
        'b' => format_radix(mag, 2),
        'x' => format_radix(mag, 16),
        'X' => format_radix(mag, 16).to_uppercase(),
        _ => mag.to_string(),
    };
    if let Some(p) = prec {
        while digits.len() < p {
            digits.insert(0, '0');
        }
    }
    let prefix = if flags.alt {
        match spec {
            'x' => "0x",
            'X' => "0X",
            'b' => "0b",
            _ => "",
        }
    } else {
        ""
    };
    let sign = if neg {
        "-"
    } else if flags.plus && matches!(spec, 'd' | 'i') {
        "+"
    } else if flags.space && matches!(spec, 'd' | 'i') {
        " "
    } else {
        ""
    };
    format!("{}{}{}", sign, prefix, digits)
}

fn format_radix(mut n: u128, radix: u32) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        let d = (n % radix as u128) as u32;
        digits.push(std::char::from_digit(d, radix).unwrap());
        n /= radix as u128;
    }
    digits.iter().rev().collect()
}

fn pad(s: &str, width: usize, flags: Flags) -> String {
    if s.len() >= width {
        return s.to_string();
    }
    let fill = if flags.zero && !flags.left { '0' } else { ' ' };
    let padding: String = std::iter::repeat(fill).take(width - s.len()).collect();
    if flags.left {
        format!("{}{}", s, padding)
    } else if fill == '0' && (s.starts_with('-') || s.starts_with('+')) {
        format!("{}{}{}", &s[..1], padding, &s[1..])
    } else {
        format!("{}{}", padding, s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_text_passes_through() {
        assert_eq!(format("hello", &[]).unwrap(), "hello");
    }

    #[test]
    fn percent_literal() {
        assert_eq!(format("100%%", &[]).unwrap(), "100%");
    }

    #[test]
    fn decimal_with_width_and_zero_pad() {
        assert_eq!(format("%04d", &[FmtArg::Int(7)]).unwrap(), "0007");
    }

    #[test]
    fn hex_uppercase_with_alt_prefix() {
        assert_eq!(format("%#X", &[FmtArg::Int(255)]).unwrap(), "0XFF");
    }

    #[test]
    fn left_justify_with_space_fill() {
        assert_eq!(format("[%-5d]", &[FmtArg::Int(3)]).unwrap(), "[3    ]");
    }

    #[test]
    fn string_precision_truncates() {
        assert_eq!(
            format("%.3s", &[FmtArg::Text("hello".into())]).unwrap(),
            "hel"
        );
    }

    #[test]
    fn star_width_pulls_argument() {
        assert_eq!(
            format("%*d", &[FmtArg::Int(6), FmtArg::Int(9)]).unwrap(),
            "     9"
        );
    }

    #[test]
    fn plus_flag_forces_sign_on_positive() {
        assert_eq!(format("%+d", &[FmtArg::Int(5)]).unwrap(), "+5");
    }

    #[test]
    fn missing_argument_is_an_error() {
        assert!(format("%d", &[]).is_err());
    }
}
