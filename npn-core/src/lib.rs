pub mod actions;
pub mod antispam;
pub mod campaigns;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod sticky;
pub mod sweep;
pub mod tickets;
pub mod time;

use npn_database::Database;

pub use actions::{ActionQueue, ActionReceipt, OutboundAction};
pub use dispatch::Dispatcher;
pub use error::{EngineError, EngineResult, ErrorKind};
pub use events::InboundEvent;

pub type Error = anyhow::Error;

#[derive(Clone, Debug)]
pub struct Data {
    pub db: Database,
    pub dispatcher: Dispatcher,
    /// Actions produced outside gateway handlers, executed by the bot.
    pub actions: ActionQueue,
}

pub type Context<'a> = poise::Context<'a, Data, Error>;
