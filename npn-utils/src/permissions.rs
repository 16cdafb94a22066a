use npn_core::actions::AccessSet;
use poise::serenity_prelude as serenity;

/// Permissions granted to members and roles on a ticket channel.
pub fn ticket_member_permissions() -> serenity::Permissions {
    serenity::Permissions::VIEW_CHANNEL
        | serenity::Permissions::SEND_MESSAGES
        | serenity::Permissions::READ_MESSAGE_HISTORY
        | serenity::Permissions::ATTACH_FILES
        | serenity::Permissions::EMBED_LINKS
}

/// Channel overwrites for an access set: `@everyone` loses view access and
/// every listed member and role gets it back. Administrators bypass
/// overwrites, so they need no entry. `bot_user_id` keeps the bot able to
/// post into and delete the channel.
pub fn access_overwrites(
    guild_id: serenity::GuildId,
    access: &AccessSet,
    bot_user_id: Option<serenity::UserId>,
) -> Vec<serenity::PermissionOverwrite> {
    let allow = ticket_member_permissions();

    let mut overwrites = vec![serenity::PermissionOverwrite {
        allow: serenity::Permissions::empty(),
        deny: serenity::Permissions::VIEW_CHANNEL,
        kind: serenity::PermissionOverwriteType::Role(serenity::RoleId::new(guild_id.get())),
    }];

    let members = access
        .members
        .iter()
        .map(|id| serenity::UserId::new(*id))
        .chain(bot_user_id);
    overwrites.extend(members.map(|user_id| serenity::PermissionOverwrite {
        allow,
        deny: serenity::Permissions::empty(),
        kind: serenity::PermissionOverwriteType::Member(user_id),
    }));

    overwrites.extend(access.roles.iter().map(|id| serenity::PermissionOverwrite {
        allow,
        deny: serenity::Permissions::empty(),
        kind: serenity::PermissionOverwriteType::Role(serenity::RoleId::new(*id)),
    }));

    overwrites
}

/// Whether a member's roles grant administrator, using the gateway cache.
///
/// Returns `None` when the guild is not cached.
pub fn member_is_admin_cached(
    cache: &serenity::Cache,
    guild_id: serenity::GuildId,
    user_id: serenity::UserId,
    member_roles: &[serenity::RoleId],
) -> Option<bool> {
    let guild = cache.guild(guild_id)?;
    if guild.owner_id == user_id {
        return Some(true);
    }

    let everyone = serenity::RoleId::new(guild_id.get());
    let is_admin = guild.roles.values().any(|role| {
        (role.id == everyone || member_roles.contains(&role.id))
            && role.permissions.contains(serenity::Permissions::ADMINISTRATOR)
    });
    Some(is_admin)
}

/// Resolve a member's effective guild permissions over HTTP.
pub async fn resolve_user_permissions(
    http: &serenity::Http,
    guild_id: serenity::GuildId,
    user_id: serenity::UserId,
) -> anyhow::Result<serenity::Permissions> {
    let guild = guild_id.to_partial_guild(http).await?;
    if guild.owner_id == user_id {
        return Ok(serenity::Permissions::all());
    }

    let member = guild_id.member(http, user_id).await?;
    let everyone_role_id = serenity::RoleId::new(guild_id.get());

    Ok(guild
        .roles
        .values()
        .filter(|role| role.id == everyone_role_id || member.roles.contains(&role.id))
        .fold(serenity::Permissions::empty(), |acc, role| acc | role.permissions))
}

pub async fn has_user_permission(
    http: &serenity::Http,
    guild_id: serenity::GuildId,
    user_id: serenity::UserId,
    required: serenity::Permissions,
) -> anyhow::Result<bool> {
    let perms = resolve_user_permissions(http, guild_id, user_id).await?;
    Ok(perms.contains(serenity::Permissions::ADMINISTRATOR) || perms.contains(required))
}

/// Cache first, HTTP when the guild is not cached.
pub async fn member_is_admin(
    ctx: &serenity::Context,
    guild_id: serenity::GuildId,
    user_id: serenity::UserId,
    member_roles: &[serenity::RoleId],
) -> anyhow::Result<bool> {
    if let Some(is_admin) = member_is_admin_cached(&ctx.cache, guild_id, user_id, member_roles) {
        return Ok(is_admin);
    }

    let perms = resolve_user_permissions(&ctx.http, guild_id, user_id).await?;
    Ok(perms.contains(serenity::Permissions::ADMINISTRATOR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overwrites_hide_channel_from_everyone() {
        let guild_id = serenity::GuildId::new(1);
        let access = AccessSet {
            members: vec![10],
            roles: vec![20],
            administrators: true,
        };

        let overwrites = access_overwrites(guild_id, &access, Some(serenity::UserId::new(99)));
        assert_eq!(overwrites.len(), 4);

        let everyone = &overwrites[0];
        assert_eq!(
            everyone.kind,
            serenity::PermissionOverwriteType::Role(serenity::RoleId::new(1))
        );
        assert!(everyone.deny.contains(serenity::Permissions::VIEW_CHANNEL));

        assert!(overwrites[1..].iter().all(|overwrite| {
            overwrite.allow.contains(serenity::Permissions::VIEW_CHANNEL)
                && overwrite.deny.is_empty()
        }));
        assert!(overwrites.iter().any(|overwrite| overwrite.kind
            == serenity::PermissionOverwriteType::Member(serenity::UserId::new(99))));
    }
}
