use npn_core::{Context, Error};
use npn_utils::embed::notice_embed;
use poise::CreateReply;

use crate::utility::embeds::{
    command_usage_message, grouped_help_description, no_commands_message, unknown_query_message,
};
use crate::{COMMANDS, CommandMeta};

pub const META: CommandMeta = CommandMeta {
    name: "help",
    desc: "List commands, or show usage for one.",
    category: "utility",
    usage: "!help [category|command]",
};

#[poise::command(prefix_command, slash_command, category = "Utility")]
pub async fn help(
    ctx: Context<'_>,
    #[description = "Category or command name"] query: Option<String>,
) -> Result<(), Error> {
    let query = query
        .as_deref()
        .map(|raw| raw.trim().trim_start_matches('!').to_ascii_lowercase())
        .filter(|raw| !raw.is_empty());

    if let Some(wanted) = query.as_deref()
        && let Some(command) = COMMANDS.iter().find(|command| command.name == wanted)
    {
        ctx.say(command_usage_message(command)).await?;
        return Ok(());
    }

    let mut categories: Vec<&str> = COMMANDS.iter().map(|c| c.category).collect();
    categories.sort_unstable();
    categories.dedup();

    if let Some(wanted) = query.as_deref()
        && !categories.contains(&wanted)
    {
        ctx.say(unknown_query_message(wanted, &categories)).await?;
        return Ok(());
    }

    let commands = sorted_commands(query.as_deref());
    if commands.is_empty() {
        ctx.say(no_commands_message(query.as_deref())).await?;
        return Ok(());
    }

    ctx.send(
        CreateReply::default().embed(notice_embed(
            "Available Commands",
            grouped_help_description(&commands),
        )),
    )
    .await?;
    Ok(())
}

fn sorted_commands(category: Option<&str>) -> Vec<&'static CommandMeta> {
    let mut filtered: Vec<&'static CommandMeta> = COMMANDS
        .iter()
        .filter(|cmd| category.is_none_or(|wanted| cmd.category == wanted))
        .collect();

    filtered.sort_unstable_by(|left, right| {
        left.category
            .cmp(right.category)
            .then_with(|| left.name.cmp(right.name))
    });

    filtered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_category_has_commands() {
        for category in COMMANDS.iter().map(|c| c.category) {
            assert!(!sorted_commands(Some(category)).is_empty());
        }
        assert_eq!(sorted_commands(None).len(), COMMANDS.len());
    }

    #[test]
    fn command_names_are_unique() {
        let mut names: Vec<&str> = COMMANDS.iter().map(|c| c.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), COMMANDS.len());
    }
}
