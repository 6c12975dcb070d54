use std::sync::Arc;

use naval_duel::{
    init_logging, serve_connection, Bot, BotOutcome, BotReport, Client, FileUserStore, FleetRules,
    InMemoryTransport, MemoryMatchStore, ServerConfig, ServerContext, SessionRegistry,
};
use rand::{rngs::SmallRng, SeedableRng};
use serde_json::json;

/// Connect an in-process client to its own server-side connection task.
fn seat(ctx: &ServerContext) -> Client<InMemoryTransport> {
    let (near, far) = InMemoryTransport::pair();
    let ctx = ctx.clone();
    tokio::spawn(async move {
        if let Err(e) = serve_connection(far, ctx).await {
            log::debug!("Simulated connection ended: {}", e);
        }
    });
    Client::new(near)
}

async fn play(
    ctx: &ServerContext,
    user: &str,
    seed: u64,
    host: bool,
) -> anyhow::Result<BotReport> {
    let mut client = seat(ctx);
    client.authenticate(user, "simulacion", true).await?;
    let bot = Bot::new(client, user, SmallRng::seed_from_u64(seed), FleetRules::default());
    if host {
        bot.host().await
    } else {
        bot.join(None).await
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 3 {
        eprintln!("Usage: {} <seed1> <seed2>", args[0]);
        std::process::exit(1);
    }
    let seed1: u64 = args[1].parse()?;
    let seed2: u64 = args[2].parse()?;

    let ctx = ServerContext {
        registry: Arc::new(SessionRegistry::new(Arc::new(MemoryMatchStore::new()))),
        users: Arc::new(FileUserStore::in_memory()),
        config: Arc::new(ServerConfig::default()),
    };

    let (p1, p2) = tokio::try_join!(
        play(&ctx, "jugador1", seed1, true),
        play(&ctx, "jugador2", seed2, false),
    )?;

    let winner = [&p1, &p2]
        .iter()
        .find(|r| r.outcome == BotOutcome::Won)
        .map(|r| r.user.clone());

    let result = json!({
        "match": p1.match_id,
        "player1": p1,
        "player2": p2,
        "winner": winner,
    });

    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}
