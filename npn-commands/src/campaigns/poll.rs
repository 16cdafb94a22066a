use npn_core::campaigns::{MAX_POLL_OPTIONS, MIN_POLL_OPTIONS};
use npn_core::time::now_unix_secs;
use npn_core::{Context, Error};
use npn_database::model::campaigns::CampaignPayload;
use npn_utils::embed::poll_embed;
use npn_utils::parse::{parse_campaign_duration, parse_poll_options};

use super::announce_and_start;
use crate::CommandMeta;
use crate::support::{guild_only_message, usage_message};

pub const META: CommandMeta = CommandMeta {
    name: "poll",
    desc: "Create a reaction poll with up to 10 options.",
    category: "campaigns",
    usage: "!poll \"<question>\" \"<option; option; ...>\" [duration]",
};

#[poise::command(prefix_command, slash_command, category = "Campaigns")]
pub async fn poll(
    ctx: Context<'_>,
    #[description = "The question to ask"] question: String,
    #[description = "Options separated by ;"] options: String,
    #[description = "Optional duration, e.g. 1h"] duration: Option<String>,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        ctx.say(guild_only_message()).await?;
        return Ok(());
    };

    let options = parse_poll_options(&options);
    if !(MIN_POLL_OPTIONS..=MAX_POLL_OPTIONS).contains(&options.len()) {
        ctx.say(format!(
            "A poll needs between {MIN_POLL_OPTIONS} and {MAX_POLL_OPTIONS} options.\n{}",
            usage_message(META.usage)
        ))
        .await?;
        return Ok(());
    }

    let duration_seconds = match duration.as_deref() {
        None => None,
        Some(raw) => match parse_campaign_duration(raw) {
            Some(seconds) => Some(seconds),
            None => {
                ctx.say(format!("Invalid duration `{raw}`.")).await?;
                return Ok(());
            }
        },
    };

    let question = question.trim();
    if question.is_empty() {
        ctx.say(usage_message(META.usage)).await?;
        return Ok(());
    }

    let ends_at = duration_seconds.map(|seconds| now_unix_secs() + seconds);
    let embed = poll_embed(question, &options, ends_at);
    let payload = CampaignPayload::Poll {
        question: question.to_owned(),
        options,
    };

    announce_and_start(ctx, guild_id, embed, duration_seconds, payload).await
}
