pub mod antispam;
pub mod giveawayconfig;
pub mod sticky;
pub mod stickytoggle;
pub mod unsticky;
