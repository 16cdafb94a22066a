pub mod campaigns;
pub mod guild_config;
pub mod spam;
pub mod sticky;
pub mod tickets;
