pub mod closeticket;
pub mod list;
pub mod ticket;
pub mod ticketconfig;
pub mod ticketpanel;

use npn_core::{Context, Error, OutboundAction};
use npn_utils::actions::take_notices;

use crate::support::{queue_actions, reply_private};

/// Answer notices to the invoker and queue the rest.
pub(crate) async fn deliver(
    ctx: Context<'_>,
    actions: Vec<OutboundAction>,
    fallback: &str,
) -> Result<(), Error> {
    let (notices, rest) = take_notices(actions);
    queue_actions(ctx, rest).await?;

    let reply = if notices.is_empty() {
        fallback.to_owned()
    } else {
        notices.join("\n")
    };
    reply_private(ctx, reply).await
}
