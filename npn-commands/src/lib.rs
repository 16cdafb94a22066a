pub mod campaigns;
pub mod config;
pub mod support;
pub mod tickets;
pub mod utility;

use npn_core::{Data, Error};

pub struct CommandMeta {
    pub name: &'static str,
    pub desc: &'static str,
    pub category: &'static str,
    pub usage: &'static str,
}

pub const COMMANDS: &[CommandMeta] = &[
    utility::ping::META,
    utility::help::META,
    campaigns::gstart::META,
    campaigns::gend::META,
    campaigns::greroll::META,
    campaigns::poll::META,
    campaigns::endpoll::META,
    campaigns::list::META,
    tickets::ticket::META,
    tickets::closeticket::META,
    tickets::ticketpanel::META,
    tickets::list::META,
    tickets::ticketconfig::META,
    config::antispam::META,
    config::giveawayconfig::META,
    config::sticky::META,
    config::unsticky::META,
    config::stickytoggle::META,
];

pub fn commands() -> Vec<poise::Command<Data, Error>> {
    vec![
        utility::ping::ping(),
        utility::help::help(),
        campaigns::gstart::gstart(),
        campaigns::gend::gend(),
        campaigns::greroll::greroll(),
        campaigns::poll::poll(),
        campaigns::endpoll::endpoll(),
        campaigns::list::campaigns(),
        tickets::ticket::ticket(),
        tickets::closeticket::closeticket(),
        tickets::ticketpanel::ticketpanel(),
        tickets::list::tickets(),
        tickets::ticketconfig::ticketconfig(),
        config::antispam::antispam(),
        config::giveawayconfig::giveawayconfig(),
        config::sticky::sticky(),
        config::unsticky::unsticky(),
        config::stickytoggle::stickytoggle(),
    ]
}
