//! Compose-style durations (`1m30s`, `500ms`, `1.5s`).

use std::time::Duration;

/// Parses a descriptor duration.
///
/// Anything `humantime` accepts is taken as is. Compose also allows a
/// fractional number per unit (`1.5s`, `0.5m`), which humantime rejects;
/// those go through [`parse_fractional`]. A bare `0` is accepted; any other
/// unitless value is rejected.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim();
    if input == "0" {
        return Some(Duration::ZERO);
    }
    humantime::parse_duration(input)
        .ok()
        .or_else(|| parse_fractional(input))
}

/// `<number><unit>` groups with fractional numbers. Units: `us`, `ms`, `s`, `m`, `h`.
fn parse_fractional(input: &str) -> Option<Duration> {
    if input.is_empty() {
        return None;
    }

    let mut total_nanos = 0u128;
    let mut rest = input;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if number_len == 0 {
            return None;
        }
        let value: f64 = rest[..number_len].parse().ok()?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let factor = match &rest[..unit_len] {
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };
        rest = &rest[unit_len..];
        total_nanos += (value * factor).round() as u128;
    }

    let secs = u64::try_from(total_nanos / 1_000_000_000).ok()?;
    Some(Duration::new(secs, (total_nanos % 1_000_000_000) as u32))
}

/// `serialize_with` helper so durations show up as `30s` in JSON output.
pub(crate) fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_str(&humantime::format_duration(*duration))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_units() {
        assert_eq!(parse_duration("10s"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration("250us"), Some(Duration::from_micros(250)));
    }

    #[test]
    fn parses_compound_and_fractional() {
        assert_eq!(parse_duration("1m30s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("1m 30s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("1.5s"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_duration("0.5m"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("0"), Some(Duration::ZERO));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("10"), None);
        assert_eq!(parse_duration("s"), None);
        assert_eq!(parse_duration("soon"), None);
        assert_eq!(parse_duration("1.5x"), None);
    }

    #[test]
    fn renders_with_humantime() {
        let render = |d: Duration| humantime::format_duration(d).to_string();
        assert_eq!(render(Duration::from_secs(5)), "5s");
        assert_eq!(render(Duration::from_secs(90)), "1m 30s");
        assert_eq!(render(Duration::from_millis(500)), "500ms");
        assert_eq!(parse_duration(&render(Duration::from_secs(3605))), Some(Duration::from_secs(3605)));
    }
}
