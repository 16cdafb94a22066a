mod events;

use std::env;
use std::time::Duration;

use poise::serenity_prelude as serenity;
use tracing::{debug, error, info, warn};
use tracing_subscriber::Layer;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use rustls::crypto::ring::default_provider;
use sqlx::postgres::PgPoolOptions;

use npn_core::actions::{ActionQueueReceiver, action_queue};
use npn_core::sweep::{DEFAULT_SWEEP_INTERVAL, spawn_sweeper};
use npn_core::{Data, Dispatcher, Error};
use npn_database::{CacheService, Database, MIGRATOR};
use npn_utils::actions::ActionExecutor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let fmt_layer = tracing_subscriber::fmt::layer().with_filter(filter_fn(|metadata| {
        let target = metadata.target();

        let within_info_level = *metadata.level() <= tracing::Level::INFO;
        if !within_info_level {
            return false;
        }

        !(target.starts_with("serenity::gateway::bridge::shard_manager")
            || target.starts_with("serenity::gateway::bridge::shard_runner"))
    }));

    tracing_subscriber::registry().with(fmt_layer).init();

    default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls ring provider"))?;

    dotenvy::dotenv().ok();

    let token = env::var("DISCORD_TOKEN")?;
    let guild_id = match env::var("DISCORD_GUILD_ID") {
        Ok(raw) => Some(raw.trim().parse::<u64>()?),
        Err(_) => None,
    };
    let sweep_interval = Duration::from_secs(
        env_u64("SWEEP_INTERVAL_SECONDS", DEFAULT_SWEEP_INTERVAL.as_secs()).max(1),
    );

    let db = match env::var("DATABASE_URL") {
        Ok(database_url) => {
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(&database_url)
                .await?;
            info!("PostgreSQL connection established.");

            let db = Database::with_cache(db_pool, build_cache().await);

            if env_bool("AUTO_RUN_MIGRATIONS", true) {
                if let Some(pool) = db.pool() {
                    MIGRATOR.run(pool).await?;
                    info!("Database migrations applied.");
                }
            } else {
                info!("Auto migrations disabled (set AUTO_RUN_MIGRATIONS=true to run at startup).");
            }
            db
        }
        Err(_) => {
            warn!("DATABASE_URL is not set; using the in-memory store. State will not survive a restart.");
            Database::in_memory()
        }
    };

    let intents = serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MESSAGE_REACTIONS
        | serenity::GatewayIntents::GUILD_MEMBERS;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: npn_commands::commands(),
            event_handler: |ctx, event, framework, data| {
                Box::pin(handle_event(ctx, event, framework, data))
            },
            on_error: |error| Box::pin(on_error(error)),
            prefix_options: poise::PrefixFrameworkOptions {
                prefix: Some(npn_utils::COMMAND_PREFIX.to_string()),
                mention_as_prefix: false,
                ..Default::default()
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            let db = db.clone();
            Box::pin(async move {
                info!(user = %ready.user.name, "NPN is ready.");

                match guild_id {
                    Some(guild_id) => {
                        poise::builtins::register_in_guild(
                            ctx,
                            &framework.options().commands,
                            serenity::GuildId::new(guild_id),
                        )
                        .await?;
                        info!(guild_id, "Commands registered in guild.");
                    }
                    None => {
                        poise::builtins::register_globally(ctx, &framework.options().commands)
                            .await?;
                        info!("Commands registered globally.");
                    }
                }

                let dispatcher = Dispatcher::new(db.clone());
                let (actions, receiver) = action_queue();
                let executor = ActionExecutor::new(ctx.http.clone(), Some(ready.user.id));

                tokio::spawn(run_action_queue(executor, dispatcher.clone(), receiver));
                spawn_sweeper(dispatcher.clone(), sweep_interval, actions.clone());

                Ok(Data {
                    db,
                    dispatcher,
                    actions,
                })
            })
        })
        .build();

    info!("NPN is connecting...");

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await?;

    client.start().await?;
    Ok(())
}

async fn build_cache() -> CacheService {
    let redis_key_prefix = env::var("REDIS_KEY_PREFIX").unwrap_or_else(|_| "npn:prod".to_string());

    if !env_bool("REDIS_ENABLED", false) {
        info!("Redis cache disabled (set REDIS_ENABLED=true to enable).");
        return CacheService::disabled(redis_key_prefix);
    }

    let cache = match env::var("REDIS_URL") {
        Ok(redis_url) => match CacheService::redis(&redis_url, redis_key_prefix.clone()) {
            Ok(cache) => {
                info!(key_prefix = %redis_key_prefix, "Redis cache enabled.");
                cache
            }
            Err(err) => {
                warn!(?err, key_prefix = %redis_key_prefix, "Failed to initialize Redis cache; continuing with DB-only mode.");
                return CacheService::disabled(redis_key_prefix);
            }
        },
        Err(_) => {
            warn!(key_prefix = %redis_key_prefix, "REDIS_ENABLED=true but REDIS_URL is missing; continuing with DB-only mode.");
            return CacheService::disabled(redis_key_prefix);
        }
    };

    if let Err(err) = cache.ping().await {
        warn!(
            ?err,
            "Redis cache ping failed; cache operations will continue with fallback behavior."
        );
    } else {
        info!("Redis cache health check passed.");
    }

    cache
}

/// Execute queued batches in order, feeding receipts back to the dispatcher.
async fn run_action_queue(
    executor: ActionExecutor,
    dispatcher: Dispatcher,
    mut receiver: ActionQueueReceiver,
) {
    while let Some(batch) = receiver.recv().await {
        executor.run(&dispatcher, batch).await;
    }
    info!("action queue closed");
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Err(_) => default,
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    match env::var(key) {
        Ok(value) => value.trim().parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!(?error, command = %ctx.command().qualified_name, "command error");

            let embed = serenity::CreateEmbed::new()
                .title("Command Error")
                .description("Something went wrong while running this command.")
                .color(npn_utils::embed::DEFAULT_EMBED_COLOR);

            let _ = ctx
                .send(poise::CreateReply::default().ephemeral(true).embed(embed))
                .await;
        }
        poise::FrameworkError::ArgumentParse { ctx, input, .. } => {
            let usage = npn_commands::COMMANDS
                .iter()
                .find(|meta| meta.name == ctx.command().name)
                .map_or_else(
                    || format!("!{}", ctx.command().qualified_name),
                    |meta| meta.usage.to_owned(),
                );
            let description = if let Some(input) = input {
                format!("Invalid argument: `{}`\nUsage: `{}`", input, usage)
            } else {
                format!("Missing required argument.\nUsage: `{}`", usage)
            };

            let _ = ctx.say(description).await;
        }
        poise::FrameworkError::UnknownCommand { .. } => {
            debug!("unknown command invocation");
        }
        other => {
            error!(?other, "framework error");
        }
    }
}

async fn handle_event(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Message { new_message } => {
            events::messages::handle_message(ctx, data, new_message).await;
        }
        serenity::FullEvent::ReactionAdd { add_reaction } => {
            events::reactions::handle_reaction(ctx, data, add_reaction, true).await;
        }
        serenity::FullEvent::ReactionRemove { removed_reaction } => {
            events::reactions::handle_reaction(ctx, data, removed_reaction, false).await;
        }
        serenity::FullEvent::InteractionCreate {
            interaction: serenity::Interaction::Component(component),
        } => {
            events::interactions::handle_component(ctx, data, component).await;
        }
        serenity::FullEvent::GuildMemberAddition { new_member } => {
            events::members::handle_member_joined(data, new_member).await;
        }
        serenity::FullEvent::GuildMemberRemoval { guild_id, user, .. } => {
            events::members::handle_member_left(data, *guild_id, user).await;
        }
        serenity::FullEvent::ChannelDelete { channel, .. } => {
            events::channels::handle_channel_deleted(data, channel).await;
        }
        _ => {}
    }

    Ok(())
}
