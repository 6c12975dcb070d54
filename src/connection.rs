//! Per-socket command loop: authenticate once, then serve one command at a time.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::common::{AuthError, Coord, SessionError};
use crate::config::ServerConfig;
use crate::game::{Match, MatchId};
use crate::placement::{PlacementPhase, PlacementRequest};
use crate::protocol::{redact_credentials, Command, Reply};
use crate::registry::{MatchHandle, Outbox, SessionRegistry};
use crate::store::UserStore;
use crate::transport::{FrameReader, FrameWriter, Transport};

/// Shared services every connection needs.
#[derive(Clone)]
pub struct ServerContext {
    pub registry: Arc<SessionRegistry>,
    pub users: Arc<dyn UserStore>,
    pub config: Arc<ServerConfig>,
}

/// Serve one client until it terminates or its transport fails.
///
/// The transport is split: this task owns the read half, and a writer task
/// drains the connection's outbox so pushes from other players interleave
/// with replies in order.
pub async fn serve_connection<T: Transport>(transport: T, ctx: ServerContext) -> anyhow::Result<()> {
    let (reader, writer) = transport.into_split();
    let (outbox, queue) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(drain_outbox(writer, queue));

    let mut conn = Connection {
        ctx,
        reader,
        outbox,
        user: None,
    };
    let result = conn.run().await;
    conn.close();
    drop(conn);

    // Let queued frames go out before the socket is released.
    if let Err(e) = writer_task.await {
        warn!("Writer task failed: {}", e);
    }
    result
}

async fn drain_outbox<W: FrameWriter>(mut writer: W, mut queue: mpsc::UnboundedReceiver<String>) {
    while let Some(frame) = queue.recv().await {
        if let Err(e) = writer.send(&frame).await {
            debug!("Dropping outbound frames: {}", e);
            break;
        }
    }
}

struct Connection<R: FrameReader> {
    ctx: ServerContext,
    reader: R,
    outbox: Outbox,
    user: Option<String>,
}

impl<R: FrameReader> Connection<R> {
    fn reply(&self, reply: Reply) -> anyhow::Result<()> {
        self.outbox
            .send(reply.to_string())
            .map_err(|_| anyhow::anyhow!("Connection writer closed"))
    }

    fn registry(&self) -> &SessionRegistry {
        &self.ctx.registry
    }

    async fn run(&mut self) -> anyhow::Result<()> {
        let Some(user) = self.authenticate().await? else {
            return Ok(());
        };
        info!("{} authenticated", user);

        loop {
            let frame = self.reader.recv().await?;
            debug!("{} -> {}", user, redact_credentials(&frame));
            match frame.parse::<Command>() {
                Ok(Command::Terminate) => return Ok(()),
                Ok(cmd) => self.dispatch(&user, cmd)?,
                Err(e) => self.reply(Reply::ProtocolError(e.to_string()))?,
            }
        }
    }

    /// Deregister the user; any match they leave behind is settled by the registry.
    fn close(&mut self) {
        if let Some(user) = self.user.take() {
            self.registry().disconnect(&user);
            info!("{} disconnected", user);
        }
    }

    /// Returns the identity, or `None` when the client gave up or ran out of attempts.
    async fn authenticate(&mut self) -> anyhow::Result<Option<String>> {
        self.reply(Reply::AuthChallenge(
            "login|registro <usuario> <clave>".to_string(),
        ))?;
        for _ in 0..self.ctx.config.max_auth_attempts {
            let frame = self.reader.recv().await?;
            let (user, password, register) = match frame.parse::<Command>() {
                Ok(Command::Login { user, password }) => (user, password, false),
                Ok(Command::Register { user, password }) => (user, password, true),
                Ok(Command::Terminate) => return Ok(None),
                Ok(_) => {
                    self.reply(Reply::AuthFailed("authenticate first".to_string()))?;
                    continue;
                }
                Err(e) => {
                    self.reply(Reply::ProtocolError(e.to_string()))?;
                    continue;
                }
            };
            match check_credentials(self.ctx.users.clone(), user, password, register).await {
                Ok(identity) => match self.registry().connect(&identity, self.outbox.clone()) {
                    Ok(()) => {
                        self.user = Some(identity.clone());
                        self.reply(Reply::Authenticated(identity.clone()))?;
                        return Ok(Some(identity));
                    }
                    Err(e) => {
                        warn!("Refused login: {}", e);
                        self.reply(Reply::AuthFailed(e.to_string()))?;
                    }
                },
                Err(e) => {
                    info!("Authentication failed: {}", e);
                    self.reply(Reply::AuthFailed(e.to_string()))?;
                }
            }
        }
        self.reply(Reply::AuthFailed("too many attempts".to_string()))?;
        Ok(None)
    }

    fn dispatch(&self, user: &str, cmd: Command) -> anyhow::Result<()> {
        match cmd {
            Command::Login { .. } | Command::Register { .. } => {
                self.reply(Reply::Error("already authenticated".to_string()))
            }
            Command::CreateMatch => self.create_match(user),
            Command::ListMatches => self.list_matches(user),
            Command::SelectMatch(id) => self.join_match(user, id),
            Command::PlaceShip(req) => self.place_ship(user, req),
            Command::FinishPlacement => self.finish_placement(user),
            Command::CheckReady => self.check_ready(user),
            Command::WhoStarts => self.who_starts(user),
            Command::Attack(coord) => self.attack(user, coord),
            Command::ServerStatus => self.reply(Reply::ServerStatus {
                connected: self.registry().connected_count(),
                active: self.registry().active_match_count(),
            }),
            Command::Fleet => self.fleet(user),
            Command::History => self.history(user),
            Command::Terminate => Ok(()),
        }
    }

    fn create_match(&self, user: &str) -> anyhow::Result<()> {
        match self.registry().create_match(user) {
            Ok((id, handle)) => {
                self.reply(Reply::MatchCreated(id))?;
                tokio::spawn(await_rival(self.ctx.clone(), handle, id, user.to_string()));
                Ok(())
            }
            Err(e) => self.reply(Reply::Error(e.to_string())),
        }
    }

    fn list_matches(&self, user: &str) -> anyhow::Result<()> {
        let open = self.registry().open_matches(user);
        if open.is_empty() {
            self.reply(Reply::NoMatches("no open matches".to_string()))
        } else {
            self.reply(Reply::OpenMatches(open))
        }
    }

    fn join_match(&self, user: &str, id: MatchId) -> anyhow::Result<()> {
        match self.registry().join_match(id, user) {
            Ok(handle) => {
                let creator = handle.lock().primary().to_string();
                self.reply(Reply::Joined(format!("match {} against {}", id, creator)))?;
                tokio::spawn(await_placement_turn(self.ctx.clone(), handle, user.to_string()));
                Ok(())
            }
            Err(e) => self.reply(Reply::JoinFailed(e.to_string())),
        }
    }

    fn active(&self, user: &str) -> Option<Arc<MatchHandle>> {
        self.registry().active_match_of(user).map(|(_, h)| h)
    }

    fn place_ship(&self, user: &str, req: PlacementRequest) -> anyhow::Result<()> {
        let Some(handle) = self.active(user) else {
            return self.reply(Reply::PlacementFailed(SessionError::NoActiveMatch.to_string()));
        };
        let placed = {
            let mut game = handle.lock();
            game.place_ship(user, req).map(|_| {
                game.fleet(user)
                    .map(|f| f.remaining_summary())
                    .unwrap_or_default()
            })
        };
        match placed {
            Ok(remaining) => {
                self.reply(Reply::ShipPlaced(format!(
                    "{} at {} {:?}",
                    req.class, req.anchor, req.orientation
                )))?;
                self.reply(Reply::RemainingShips(remaining))
            }
            Err(e) => self.reply(Reply::PlacementFailed(e.to_string())),
        }
    }

    fn finish_placement(&self, user: &str) -> anyhow::Result<()> {
        let Some(handle) = self.active(user) else {
            return self.reply(Reply::PlacementFailed(SessionError::NoActiveMatch.to_string()));
        };
        let (outcome, primary) = {
            let mut game = handle.lock();
            (game.finish_placement(user), game.primary().to_string())
        };
        match outcome {
            Ok(PlacementPhase::MatchReady) => {
                handle.touch();
                info!("Match ready: {} vs {}", primary, user);
                self.reply(Reply::MatchReady("both fleets are in place".to_string()))?;
                self.registry()
                    .notify(&primary, Reply::MatchReady("rival fleet is in place".to_string()));
                Ok(())
            }
            Ok(_) => {
                handle.touch();
                self.reply(Reply::PlacementFinished(
                    "waiting for the rival fleet".to_string(),
                ))
            }
            Err(e) => self.reply(Reply::PlacementFailed(e.to_string())),
        }
    }

    fn check_ready(&self, user: &str) -> anyhow::Result<()> {
        let Some(handle) = self.active(user) else {
            return self.reply(Reply::Error(SessionError::NoActiveMatch.to_string()));
        };
        let (ready, placing) = {
            let game = handle.lock();
            let placing = match game.phase() {
                PlacementPhase::PlacingPrimary => game.primary() == user,
                PlacementPhase::PlacingOpponent => game.opponent() == Some(user),
                PlacementPhase::MatchReady => false,
            };
            (game.is_ready(), placing)
        };
        if ready {
            self.reply(Reply::MatchReady("both fleets are in place".to_string()))
        } else if placing {
            self.reply(Reply::StillWaiting("your fleet is not finished".to_string()))
        } else {
            self.reply(Reply::StillWaiting("rival is still placing".to_string()))
        }
    }

    fn who_starts(&self, user: &str) -> anyhow::Result<()> {
        let Some(handle) = self.active(user) else {
            return self.reply(Reply::Error(SessionError::NoActiveMatch.to_string()));
        };
        let holder = handle.lock().turn_holder().map(str::to_string);
        match holder {
            Some(h) if h == user => self.reply(Reply::YourTurn),
            Some(_) => self.reply(Reply::RivalTurn),
            None => self.reply(Reply::StillWaiting("match is not ready".to_string())),
        }
    }

    fn attack(&self, user: &str, coord: Coord) -> anyhow::Result<()> {
        let Some(handle) = self.active(user) else {
            return self.reply(Reply::AttackFailed(SessionError::NoActiveMatch.to_string()));
        };
        let resolved = {
            let mut game = handle.lock();
            game.attack(user, coord).map(|report| {
                let snapshot = report.finished.then(|| Match::clone(&game));
                (report, snapshot)
            })
        };
        let (report, snapshot) = match resolved {
            Ok(r) => r,
            Err(e) => return self.reply(Reply::AttackFailed(e.to_string())),
        };
        handle.touch();
        debug!("{} attacked {} at {}: {}", user, report.defender, coord, report.outcome);

        self.reply(Reply::AttackResult(report.outcome))?;
        self.registry()
            .notify(&report.defender, Reply::AttackReceived(coord, report.outcome));
        if let Some(snapshot) = snapshot {
            info!("Match {} won by {}", snapshot.id(), user);
            self.reply(Reply::GameOver("victoria".to_string()))?;
            self.registry()
                .notify(&report.defender, Reply::GameOver("derrota".to_string()));
            self.registry().conclude(snapshot);
        }
        Ok(())
    }

    fn fleet(&self, user: &str) -> anyhow::Result<()> {
        let Some(handle) = self.active(user) else {
            return self.reply(Reply::Error(SessionError::NoActiveMatch.to_string()));
        };
        let summary = handle
            .lock()
            .fleet(user)
            .map(|f| f.remaining_summary())
            .unwrap_or_default();
        self.reply(Reply::RemainingShips(summary))
    }

    fn history(&self, user: &str) -> anyhow::Result<()> {
        let Some(handle) = self.active(user) else {
            return self.reply(Reply::Error(SessionError::NoActiveMatch.to_string()));
        };
        let moves = handle.lock().moves().to_vec();
        self.reply(Reply::History(moves))
    }
}

/// Password hashing is CPU bound, so it runs off the async workers.
async fn check_credentials(
    users: Arc<dyn UserStore>,
    user: String,
    password: String,
    register: bool,
) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || {
        if register {
            users.register_user(&user, &password).map(|()| user)
        } else {
            users
                .validate_user(&user, &password)?
                .ok_or(AuthError::BadCredentials)
        }
    })
    .await
    .map_err(|e| AuthError::Store(e.to_string()))?
}

/// Tell the creator who joined, or withdraw the match if nobody does in time.
async fn await_rival(ctx: ServerContext, handle: Arc<MatchHandle>, id: MatchId, creator: String) {
    let limit = ctx.config.wait_timeout;
    let rival = handle
        .wait_for(limit, |game| game.opponent().map(str::to_string))
        .await;
    match rival {
        Some(name) => {
            ctx.registry.notify(&creator, Reply::RivalFound(name));
        }
        None => settle_unanswered(&ctx, &handle, id, &creator),
    }
}

/// The rival wait lapsed. A join can still land between the timeout and the
/// withdrawal, so the creator hears either `sin_rival` or `rival_encontrado`.
fn settle_unanswered(ctx: &ServerContext, handle: &MatchHandle, id: MatchId, creator: &str) {
    if ctx.registry.withdraw(id, creator) {
        info!("Match {} expired without a rival", id);
        ctx.registry
            .notify(creator, Reply::NoRival("no rival joined in time".to_string()));
        return;
    }
    if handle.is_closed() {
        return;
    }
    let rival = handle.lock().opponent().map(str::to_string);
    if let Some(name) = rival {
        ctx.registry.notify(creator, Reply::RivalFound(name));
    }
}

/// Tell the joiner when the creator has finished placing.
///
/// Waits as long as the match stays live; it only stops early when the match
/// is concluded or withdrawn.
async fn await_placement_turn(ctx: ServerContext, handle: Arc<MatchHandle>, joiner: String) {
    let limit = ctx.config.wait_timeout;
    loop {
        let turn = handle
            .wait_for(limit, |game| {
                (game.phase() != PlacementPhase::PlacingPrimary).then_some(())
            })
            .await;
        if turn.is_some() {
            ctx.registry.notify(
                &joiner,
                Reply::PlacementTurn("rival fleet is in place, place yours".to_string()),
            );
            return;
        }
        if handle.is_closed() {
            return;
        }
        debug!("{} still waiting for the rival fleet", joiner);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::FleetRules;
    use crate::store::{FileUserStore, MemoryMatchStore};

    fn context() -> ServerContext {
        let registry = SessionRegistry::new(Arc::new(MemoryMatchStore::new()))
            .with_rules(FleetRules::new([0, 0, 0, 1]));
        ServerContext {
            registry: Arc::new(registry),
            users: Arc::new(FileUserStore::in_memory()),
            config: Arc::new(ServerConfig::default()),
        }
    }

    #[test]
    fn lapsed_wait_withdraws_an_empty_match() {
        let ctx = context();
        let (tx, mut rx) = mpsc::unbounded_channel();
        ctx.registry.connect("ana", tx).unwrap();
        let (id, handle) = ctx.registry.create_match("ana").unwrap();

        settle_unanswered(&ctx, &handle, id, "ana");
        assert!(rx.try_recv().unwrap().starts_with("sin_rival:"));
        assert!(ctx.registry.get(id).is_none());
    }

    #[test]
    fn join_after_lapsed_wait_still_reaches_the_creator() {
        let ctx = context();
        let (tx, mut rx) = mpsc::unbounded_channel();
        ctx.registry.connect("ana", tx).unwrap();
        let (id, handle) = ctx.registry.create_match("ana").unwrap();
        ctx.registry.join_match(id, "bea").unwrap();

        settle_unanswered(&ctx, &handle, id, "ana");
        assert_eq!(rx.try_recv().unwrap(), "rival_encontrado:bea");
        assert!(rx.try_recv().is_err());
        assert!(ctx.registry.get(id).is_some());
    }
}
