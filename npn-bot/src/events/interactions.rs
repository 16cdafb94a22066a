use poise::serenity_prelude as serenity;
use tracing::{error, warn};

use npn_core::events::ButtonClicked;
use npn_core::{Data, InboundEvent};
use npn_utils::actions::take_notices;

use super::enqueue;

const ENGINE_BUTTON_PREFIX: &str = "npn:";

/// Handle clicks on engine-owned buttons. Notices are answered ephemerally,
/// everything else goes through the action queue.
pub async fn handle_component(
    ctx: &serenity::Context,
    data: &Data,
    component: &serenity::ComponentInteraction,
) {
    if !component.data.custom_id.starts_with(ENGINE_BUTTON_PREFIX) {
        return;
    }
    let Some(guild_id) = component.guild_id else {
        return;
    };

    let (user_is_admin, user_role_ids) = match component.member.as_ref() {
        Some(member) => (
            member
                .permissions
                .is_some_and(|permissions| permissions.administrator()),
            member.roles.iter().map(|role| role.get()).collect(),
        ),
        None => (false, Vec::new()),
    };

    let event = InboundEvent::ButtonClicked(ButtonClicked {
        guild_id: guild_id.get(),
        channel_id: component.channel_id.get(),
        user_id: component.user.id.get(),
        custom_id: component.data.custom_id.clone(),
        user_is_admin,
        user_role_ids,
    });

    let (notices, actions) = match data.dispatcher.dispatch(event).await {
        Ok(actions) => take_notices(actions),
        Err(err) => {
            error!(error = %err, custom_id = %component.data.custom_id, "button handling failed");
            (vec!["Something went wrong. Please try again.".to_owned()], Vec::new())
        }
    };

    let response = if notices.is_empty() {
        serenity::CreateInteractionResponse::Acknowledge
    } else {
        serenity::CreateInteractionResponse::Message(
            serenity::CreateInteractionResponseMessage::new()
                .content(notices.join("\n"))
                .ephemeral(true),
        )
    };

    if let Err(source) = component.create_response(&ctx.http, response).await {
        warn!(?source, "failed to answer button interaction");
    }

    enqueue(data, actions).await;
}
