use anyhow::{Context, Result};
use clap::Parser;
use coach_points_bot::{config, db, handlers, processor::CommandProcessor};
use std::path::PathBuf;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Print an example config file and exit
    #[arg(long)]
    example_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if args.example_config {
        print!("{}", config::example());
        return Ok(());
    }

    let cfg = config::load(Some(&args.config))
        .with_context(|| format!("loading {}", args.config.display()))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let bot = Bot::new(cfg.telegram.bot_token.clone());
    let me = bot.get_me().await.context("fetching bot identity")?;
    let processor = Arc::new(CommandProcessor::new(
        pool,
        cfg.coach.secret.clone(),
        me.username(),
    ));

    info!(bot = me.username(), "starting telegram bot");
    teloxide::repl(bot, move |bot: Bot, msg: Message| {
        let processor = processor.clone();
        async move {
            if let Err(err) = handlers::handle_update(&bot, &processor, &msg).await {
                error!(?err, "failed to handle update");
            }
            respond(())
        }
    })
    .await;

    Ok(())
}
