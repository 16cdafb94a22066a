use npn_core::campaigns::{GiveawayOutcome, Outcome, PollOutcome};
use npn_core::events::{GIVEAWAY_EMOJI, POLL_EMOJIS};
use poise::serenity_prelude as serenity;

use crate::formatting::{mention_list, poll_result_lines, relative_time};

/// Default embed color used across the bot UI.
pub const DEFAULT_EMBED_COLOR: u32 = 0x90_55_30;
pub const GIVEAWAY_COLOR: u32 = 0xF1_C4_0F;
pub const POLL_COLOR: u32 = 0x34_98_DB;
pub const ENDED_COLOR: u32 = 0x95_A5_A6;

pub fn giveaway_embed(
    prize: &str,
    winners_count: u32,
    ends_at: Option<u64>,
    host_id: u64,
) -> serenity::CreateEmbed {
    let ends = ends_at.map_or_else(
        || "when a moderator ends it".to_owned(),
        |at| format!("{} (<t:{at}:F>)", relative_time(at)),
    );

    serenity::CreateEmbed::new()
        .title(format!("{GIVEAWAY_EMOJI} GIVEAWAY {GIVEAWAY_EMOJI}"))
        .color(GIVEAWAY_COLOR)
        .description(format!(
            "**{prize}**\n\nReact with {GIVEAWAY_EMOJI} to enter!\nEnds: {ends}\nHosted by: <@{host_id}>"
        ))
        .footer(serenity::CreateEmbedFooter::new(format!(
            "{winners_count} winner{}",
            if winners_count == 1 { "" } else { "s" }
        )))
}

pub fn poll_embed(
    question: &str,
    options: &[String],
    ends_at: Option<u64>,
) -> serenity::CreateEmbed {
    let lines = options
        .iter()
        .zip(POLL_EMOJIS)
        .map(|(option, emoji)| format!("{emoji} {option}"))
        .collect::<Vec<_>>()
        .join("\n");

    let builder = serenity::CreateEmbed::new()
        .title(format!("📊 {question}"))
        .color(POLL_COLOR)
        .description(lines);

    match ends_at {
        Some(at) => builder.field("Ends", relative_time(at), false),
        None => builder.footer(serenity::CreateEmbedFooter::new("React to vote")),
    }
}

fn giveaway_result(outcome: &GiveawayOutcome) -> (String, serenity::CreateEmbed) {
    let title = if outcome.rerolled {
        "🎉 GIVEAWAY REROLLED 🎉"
    } else {
        "🎉 GIVEAWAY ENDED 🎉"
    };

    if outcome.winners.is_empty() {
        let embed = serenity::CreateEmbed::new()
            .title(title)
            .color(ENDED_COLOR)
            .description(format!("**{}**\n\nNo valid entries.", outcome.prize));
        return (
            format!("No valid entries for the giveaway of **{}**.", outcome.prize),
            embed,
        );
    }

    let winners = mention_list(&outcome.winners);
    let mut description = format!("**{}**\n\nWinners: {winners}", outcome.prize);
    if outcome.is_partial() {
        description.push_str(&format!(
            "\nOnly {} of {} prizes could be awarded ({} entrants).",
            outcome.winners.len(),
            outcome.requested,
            outcome.entrants
        ));
    }

    let embed = serenity::CreateEmbed::new()
        .title(title)
        .color(GIVEAWAY_COLOR)
        .description(description);

    (
        format!("🎉 Congratulations {winners}! You won **{}**!", outcome.prize),
        embed,
    )
}

fn poll_result(outcome: &PollOutcome) -> (String, serenity::CreateEmbed) {
    let body = if outcome.total_votes == 0 {
        "No votes were cast.".to_owned()
    } else {
        poll_result_lines(&outcome.results)
    };

    let embed = serenity::CreateEmbed::new()
        .title(format!("📊 Results: {}", outcome.question))
        .color(POLL_COLOR)
        .description(body)
        .footer(serenity::CreateEmbedFooter::new(format!(
            "Total votes: {}",
            outcome.total_votes
        )));

    ("📊 The poll has ended!".to_owned(), embed)
}

/// Message content and embed announcing a campaign result.
pub fn outcome_message(outcome: &Outcome) -> (String, serenity::CreateEmbed) {
    match outcome {
        Outcome::Giveaway(outcome) => giveaway_result(outcome),
        Outcome::Poll(outcome) => poll_result(outcome),
    }
}

/// Replacement embed for the original announcement once it has ended.
pub fn ended_announcement(outcome: &Outcome) -> serenity::CreateEmbed {
    match outcome {
        Outcome::Giveaway(outcome) => {
            let winners = if outcome.winners.is_empty() {
                "No valid entries".to_owned()
            } else {
                mention_list(&outcome.winners)
            };
            serenity::CreateEmbed::new()
                .title("🎉 GIVEAWAY ENDED 🎉")
                .color(ENDED_COLOR)
                .description(format!("**{}**\n\nWinners: {winners}", outcome.prize))
        }
        Outcome::Poll(outcome) => serenity::CreateEmbed::new()
            .title(format!("📊 {} (ended)", outcome.question))
            .color(ENDED_COLOR)
            .description(poll_result_lines(&outcome.results)),
    }
}

pub fn notice_embed(title: &str, description: impl Into<String>) -> serenity::CreateEmbed {
    serenity::CreateEmbed::new()
        .title(title.to_owned())
        .color(DEFAULT_EMBED_COLOR)
        .description(description)
}

pub fn ticket_panel_embed() -> serenity::CreateEmbed {
    notice_embed(
        "🎫 Support Tickets",
        "Press the button below to open a private ticket with the staff team.",
    )
}
