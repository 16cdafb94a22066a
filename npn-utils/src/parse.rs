/// Longest campaign duration accepted from commands (30 days).
pub const MAX_CAMPAIGN_DURATION_SECONDS: u64 = 30 * 86_400;

fn unit_seconds(unit: char) -> Option<u64> {
    match unit.to_ascii_lowercase() {
        's' => Some(1),
        'm' => Some(60),
        'h' => Some(3_600),
        'd' => Some(86_400),
        'w' => Some(604_800),
        _ => None,
    }
}

/// Parse a compact duration like `30s`, `10m`, `1h30m`, `2d` or plain seconds.
///
/// A bare number is only accepted as the whole input; zero durations are
/// rejected.
pub fn parse_duration_seconds(raw: &str) -> Option<u64> {
    let compact: String = raw.chars().filter(|ch| !ch.is_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }

    if let Ok(seconds) = compact.parse::<u64>() {
        return (seconds > 0).then_some(seconds);
    }

    let mut total = 0_u64;
    let mut digits = String::new();

    for ch in compact.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }

        let value = digits.parse::<u64>().ok().filter(|value| *value > 0)?;
        total = total.checked_add(value.checked_mul(unit_seconds(ch)?)?)?;
        digits.clear();
    }

    if !digits.is_empty() || total == 0 {
        return None;
    }
    Some(total)
}

/// Parse a campaign duration, rejecting anything above
/// [`MAX_CAMPAIGN_DURATION_SECONDS`].
pub fn parse_campaign_duration(raw: &str) -> Option<u64> {
    parse_duration_seconds(raw).filter(|seconds| *seconds <= MAX_CAMPAIGN_DURATION_SECONDS)
}

/// Split poll options on `;` or `|`, dropping blanks.
pub fn parse_poll_options(raw: &str) -> Vec<String> {
    raw.split([';', '|'])
        .map(str::trim)
        .filter(|option| !option.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Accept raw ids or `<@&id>` role mentions, separated by spaces or commas.
pub fn parse_role_ids(raw: &str) -> Option<Vec<u64>> {
    raw.split(|ch: char| ch.is_whitespace() || ch == ',')
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .strip_prefix("<@&")
                .and_then(|rest| rest.strip_suffix('>'))
                .unwrap_or(token)
                .parse::<u64>()
                .ok()
        })
        .collect()
}

/// Accept a raw message id or a message link.
pub fn parse_message_id(raw: &str) -> Option<u64> {
    let trimmed = raw.trim().trim_end_matches('/');
    trimmed
        .rsplit('/')
        .next()
        .and_then(|last| last.parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations() {
        assert_eq!(parse_duration_seconds("90"), Some(90));
        assert_eq!(parse_duration_seconds("30s"), Some(30));
        assert_eq!(parse_duration_seconds("10m"), Some(600));
        assert_eq!(parse_duration_seconds("1h 30m"), Some(5_400));
        assert_eq!(parse_duration_seconds("2D"), Some(172_800));
        assert_eq!(parse_duration_seconds("1w"), Some(604_800));
        assert_eq!(parse_duration_seconds("0"), None);
        assert_eq!(parse_duration_seconds("0m"), None);
        assert_eq!(parse_duration_seconds("1h30"), None);
        assert_eq!(parse_duration_seconds("5x"), None);
        assert_eq!(parse_duration_seconds("m"), None);
        assert_eq!(parse_duration_seconds(""), None);
    }

    #[test]
    fn campaign_durations_are_capped() {
        assert_eq!(parse_campaign_duration("30d"), Some(2_592_000));
        assert_eq!(parse_campaign_duration("31d"), None);
    }

    #[test]
    fn poll_options() {
        assert_eq!(
            parse_poll_options(" Rust ; Go || Zig "),
            vec!["Rust".to_owned(), "Go".to_owned(), "Zig".to_owned()]
        );
        assert!(parse_poll_options(" | ").is_empty());
    }

    #[test]
    fn role_ids() {
        assert_eq!(parse_role_ids("<@&10>, 20 <@&30>"), Some(vec![10, 20, 30]));
        assert_eq!(parse_role_ids(""), Some(vec![]));
        assert_eq!(parse_role_ids("<@&10> nope"), None);
    }

    #[test]
    fn message_ids() {
        assert_eq!(parse_message_id("123"), Some(123));
        assert_eq!(
            parse_message_id("https://discord.com/channels/1/2/345"),
            Some(345)
        );
        assert_eq!(parse_message_id("abc"), None);
    }
}
