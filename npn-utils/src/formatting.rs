use npn_core::campaigns::OptionResult;

/// Format seconds into a compact human-readable duration (e.g. 59s, 1m, 1h, 1d, 1h 30m).
pub fn format_compact_duration(total_seconds: u64) -> String {
    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3_600;
    let minutes = (total_seconds % 3_600) / 60;
    let seconds = total_seconds % 60;

    let parts: Vec<String> = if days > 0 {
        [(days, 'd'), (hours, 'h')]
            .iter()
            .filter(|(value, _)| *value > 0)
            .map(|(value, unit)| format!("{value}{unit}"))
            .collect()
    } else {
        [(hours, 'h'), (minutes, 'm'), (seconds, 's')]
            .iter()
            .filter(|(value, _)| *value > 0)
            .map(|(value, unit)| format!("{value}{unit}"))
            .collect()
    };

    if parts.is_empty() {
        "0s".to_owned()
    } else {
        parts.join(" ")
    }
}

/// Fixed-width bar for a percentage, e.g. `██████░░░░` for 60%.
pub fn progress_bar(percentage: f64, width: usize) -> String {
    let clamped = percentage.clamp(0.0, 100.0);
    let filled = ((clamped / 100.0) * width as f64).round() as usize;
    let filled = filled.min(width);
    format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
}

/// `<@a>, <@b>` for a list of user ids.
pub fn mention_list(user_ids: &[u64]) -> String {
    user_ids
        .iter()
        .map(|id| format!("<@{id}>"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn ticket_label(number: u64) -> String {
    format!("#{number:04}")
}

/// One line per option: label, bar, votes and share.
pub fn poll_result_lines(results: &[OptionResult]) -> String {
    results
        .iter()
        .map(|result| {
            format!(
                "**{}**\n{} {} vote{} ({:.1}%)",
                result.label,
                progress_bar(result.percentage, 10),
                result.votes,
                if result.votes == 1 { "" } else { "s" },
                result.percentage
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Discord relative timestamp markup.
pub fn relative_time(unix_secs: u64) -> String {
    format!("<t:{unix_secs}:R>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_duration_formatting() {
        assert_eq!(format_compact_duration(0), "0s");
        assert_eq!(format_compact_duration(59), "59s");
        assert_eq!(format_compact_duration(60), "1m");
        assert_eq!(format_compact_duration(61), "1m 1s");
        assert_eq!(format_compact_duration(3600), "1h");
        assert_eq!(format_compact_duration(3670), "1h 1m 10s");
        assert_eq!(format_compact_duration(3605), "1h 5s");
        assert_eq!(format_compact_duration(86400), "1d");
        assert_eq!(format_compact_duration(90061), "1d 1h");
    }

    #[test]
    fn bars_scale_with_percentage() {
        assert_eq!(progress_bar(0.0, 10), "░░░░░░░░░░");
        assert_eq!(progress_bar(60.0, 10), "██████░░░░");
        assert_eq!(progress_bar(100.0, 10), "██████████");
        assert_eq!(progress_bar(250.0, 4), "████");
    }

    #[test]
    fn mentions_and_labels() {
        assert_eq!(mention_list(&[1, 2]), "<@1>, <@2>");
        assert_eq!(mention_list(&[]), "");
        assert_eq!(ticket_label(7), "#0007");
    }

    #[test]
    fn poll_lines_pluralize_votes() {
        let lines = poll_result_lines(&[
            OptionResult {
                index: 0,
                label: "Rust".into(),
                votes: 1,
                percentage: 100.0,
            },
            OptionResult {
                index: 1,
                label: "Go".into(),
                votes: 0,
                percentage: 0.0,
            },
        ]);
        assert!(lines.contains("1 vote (100.0%)"));
        assert!(lines.contains("0 votes (0.0%)"));
    }
}
