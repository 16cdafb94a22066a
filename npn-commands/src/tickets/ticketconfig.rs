use npn_core::{Context, Error};
use npn_database::impls::guild_config::{
    get_guild_config, set_support_roles, set_ticket_category,
};
use npn_utils::parse::parse_role_ids;
use poise::serenity_prelude as serenity;

use crate::CommandMeta;
use crate::support::{guild_only_message, require_permission, usage_message};

pub const META: CommandMeta = CommandMeta {
    name: "ticketconfig",
    desc: "Set the ticket category and support roles.",
    category: "tickets",
    usage: "!ticketconfig [category <id|clear>|roles <@role ...|clear>]",
};

#[poise::command(prefix_command, slash_command, category = "Tickets")]
pub async fn ticketconfig(
    ctx: Context<'_>,
    #[description = "category or roles"] setting: Option<String>,
    #[description = "New value, or 'clear'"]
    #[rest]
    value: Option<String>,
) -> Result<(), Error> {
    let Some(guild_id) = ctx.guild_id() else {
        ctx.say(guild_only_message()).await?;
        return Ok(());
    };

    if !require_permission(ctx, guild_id, serenity::Permissions::ADMINISTRATOR).await? {
        return Ok(());
    }

    let db = &ctx.data().db;
    let value = value.as_deref().map(str::trim).unwrap_or_default();
    let clear = value.eq_ignore_ascii_case("clear");

    match setting.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => {
            let config = get_guild_config(db, guild_id.get()).await?.tickets;
            let category = config
                .category_id
                .map_or_else(|| "none".to_owned(), |id| format!("<#{id}>"));
            let roles = if config.support_role_ids.is_empty() {
                "none".to_owned()
            } else {
                config
                    .support_role_ids
                    .iter()
                    .map(|id| format!("<@&{id}>"))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            ctx.say(format!("Ticket category: {category}\nSupport roles: {roles}"))
                .await?;
        }
        Some("category") if clear => {
            set_ticket_category(db, guild_id.get(), None).await?;
            ctx.say("Ticket category cleared.").await?;
        }
        Some("category") => {
            let Some(category_id) = value
                .trim_start_matches("<#")
                .trim_end_matches('>')
                .parse::<u64>()
                .ok()
            else {
                ctx.say(usage_message(META.usage)).await?;
                return Ok(());
            };
            set_ticket_category(db, guild_id.get(), Some(category_id)).await?;
            ctx.say(format!("New tickets will be created under <#{category_id}>."))
                .await?;
        }
        Some("roles") if clear => {
            set_support_roles(db, guild_id.get(), &[]).await?;
            ctx.say("Support roles cleared.").await?;
        }
        Some("roles") => {
            let Some(role_ids) = parse_role_ids(value).filter(|ids| !ids.is_empty()) else {
                ctx.say(usage_message(META.usage)).await?;
                return Ok(());
            };
            set_support_roles(db, guild_id.get(), &role_ids).await?;
            ctx.say(format!("Support roles set ({}).", role_ids.len()))
                .await?;
        }
        Some(_) => {
            ctx.say(usage_message(META.usage)).await?;
        }
    }

    Ok(())
}
