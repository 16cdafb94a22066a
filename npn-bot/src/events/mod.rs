pub mod channels;
pub mod interactions;
pub mod members;
pub mod messages;
pub mod reactions;

use npn_core::{Data, InboundEvent, OutboundAction};
use tracing::{error, warn};

/// Run an event through the dispatcher and queue whatever it produces.
pub(crate) async fn forward(data: &Data, event: InboundEvent) {
    let name = event.name();
    match data.dispatcher.dispatch(event).await {
        Ok(actions) => enqueue(data, actions).await,
        Err(err) => error!(event = name, error = %err, "failed to handle event"),
    }
}

pub(crate) async fn enqueue(data: &Data, actions: Vec<OutboundAction>) {
    if actions.is_empty() {
        return;
    }

    if data.actions.send(actions).await.is_err() {
        warn!("action queue closed; dropping actions");
    }
}
