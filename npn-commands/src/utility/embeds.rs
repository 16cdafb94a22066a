use crate::CommandMeta;

pub fn unknown_query_message(query: &str, valid_categories: &[&str]) -> String {
    let valid = valid_categories
        .iter()
        .map(|category| display_category(category))
        .collect::<Vec<_>>()
        .join(", ");

    format!("No command or category named `{query}`.\nCategories: {valid}")
}

pub fn no_commands_message(category: Option<&str>) -> String {
    match category {
        Some(cat) => format!("No commands found in category: {}", display_category(cat)),
        None => "No commands are registered.".to_owned(),
    }
}

pub fn command_usage_message(command: &CommandMeta) -> String {
    format!("**{}**: {}\nUsage: `{}`", command.name, command.desc, command.usage)
}

pub fn grouped_help_description(commands: &[&CommandMeta]) -> String {
    let mut out = String::new();
    let mut current_category: Option<&str> = None;

    for command in commands {
        if current_category != Some(command.category) {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(&format!("**{}**\n", display_category(command.category)));
            current_category = Some(command.category);
        }

        out.push_str(&format!("`{}`: {}\n", command.name, command.desc));
    }

    if out.is_empty() {
        out.push_str("No commands available.");
    }

    out.trim_end().to_owned()
}

fn display_category(category: &str) -> String {
    let mut chars = category.chars();
    match chars.next() {
        Some(first) => format!("{}{}", first.to_uppercase(), chars.as_str()),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GSTART: CommandMeta = CommandMeta {
        name: "gstart",
        desc: "Start a giveaway.",
        category: "campaigns",
        usage: "!gstart <duration> <winners> <prize>",
    };
    const PING: CommandMeta = CommandMeta {
        name: "ping",
        desc: "Pong.",
        category: "utility",
        usage: "!ping",
    };

    #[test]
    fn groups_commands_under_category_headings() {
        assert_eq!(
            grouped_help_description(&[&GSTART, &PING]),
            "**Campaigns**\n`gstart`: Start a giveaway.\n\n**Utility**\n`ping`: Pong."
        );
    }

    #[test]
    fn unknown_query_lists_categories() {
        assert_eq!(
            unknown_query_message("nope", &["campaigns", "tickets"]),
            "No command or category named `nope`.\nCategories: Campaigns, Tickets"
        );
    }
}
