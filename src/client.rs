//! Protocol client and a scripted bot that plays a full match with random moves.

use std::collections::VecDeque;
use std::time::Duration;

use log::debug;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use serde::Serialize;
use tokio::time::timeout;

use crate::board::Board;
use crate::common::{AttackOutcome, Coord};
use crate::config::SHIP_CLASSES;
use crate::fleet::{FleetCounter, FleetRules};
use crate::game::MatchId;
use crate::placement::{place_ship, PlacementRequest};
use crate::protocol::{redact_credentials, split_reply};
use crate::ship::Orientation;
use crate::transport::Transport;

const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(10);
const LIST_RETRIES: usize = 40;
const LIST_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Thin request/response wrapper over a transport.
///
/// Pushes that arrive while waiting for a specific reply are kept in a backlog
/// and handed out by later calls, so nothing the server sends is lost.
pub struct Client<T: Transport> {
    transport: T,
    backlog: VecDeque<String>,
    reply_timeout: Duration,
}

impl<T: Transport> Client<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            backlog: VecDeque::new(),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        }
    }

    pub fn with_reply_timeout(mut self, limit: Duration) -> Self {
        self.reply_timeout = limit;
        self
    }

    pub async fn send(&mut self, line: &str) -> anyhow::Result<()> {
        debug!("client -> {}", redact_credentials(line));
        self.transport.send(line).await
    }

    /// Next frame, backlog first.
    pub async fn recv(&mut self) -> anyhow::Result<String> {
        if let Some(frame) = self.backlog.pop_front() {
            return Ok(frame);
        }
        self.read_frame().await
    }

    async fn read_frame(&mut self) -> anyhow::Result<String> {
        let frame = timeout(self.reply_timeout, self.transport.recv())
            .await
            .map_err(|_| anyhow::anyhow!("No reply within {:?}", self.reply_timeout))??;
        debug!("client <- {}", frame);
        Ok(frame)
    }

    /// First frame whose prefix is one of `prefixes`; everything else is backlogged.
    pub async fn expect(&mut self, prefixes: &[&str]) -> anyhow::Result<String> {
        let matches = |frame: &str| prefixes.contains(&split_reply(frame).0);
        if let Some(pos) = self.backlog.iter().position(|f| matches(f.as_str())) {
            if let Some(frame) = self.backlog.remove(pos) {
                return Ok(frame);
            }
        }
        loop {
            let frame = self.read_frame().await?;
            if matches(frame.as_str()) {
                return Ok(frame);
            }
            self.backlog.push_back(frame);
        }
    }

    /// Send `line` and wait for one of the listed reply prefixes.
    pub async fn request(&mut self, line: &str, prefixes: &[&str]) -> anyhow::Result<String> {
        self.send(line).await?;
        self.expect(prefixes).await
    }

    /// Answer the server's challenge with `login` or `registro`.
    pub async fn authenticate(
        &mut self,
        user: &str,
        password: &str,
        register: bool,
    ) -> anyhow::Result<()> {
        self.expect(&["autenticacion"]).await?;
        let verb = if register { "registro" } else { "login" };
        let reply = self
            .request(
                &format!("{} {} {}", verb, user, password),
                &["autenticado", "error_autenticacion", "error_protocolo"],
            )
            .await?;
        match split_reply(&reply) {
            ("autenticado", _) => Ok(()),
            (_, reason) => Err(anyhow::anyhow!("Authentication refused: {}", reason)),
        }
    }

    pub fn into_inner(self) -> T {
        self.transport
    }
}

/// How a bot's match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BotOutcome {
    Won,
    Lost,
    WonByForfeit,
}

#[derive(Debug, Clone, Serialize)]
pub struct BotReport {
    pub user: String,
    pub match_id: Option<MatchId>,
    pub outcome: BotOutcome,
    pub shots: usize,
    pub hits: usize,
}

/// Plays one match with a random legal fleet and random untried shots.
pub struct Bot<T: Transport> {
    client: Client<T>,
    user: String,
    rng: SmallRng,
    rules: FleetRules,
    own: Board,
    targets: Vec<Coord>,
    match_id: Option<MatchId>,
    shots: usize,
    hits: usize,
}

impl<T: Transport> Bot<T> {
    pub fn new(client: Client<T>, user: &str, rng: SmallRng, rules: FleetRules) -> Self {
        Self {
            client,
            user: user.to_string(),
            rng,
            rules,
            own: Board::new(),
            targets: Vec::new(),
            match_id: None,
            shots: 0,
            hits: 0,
        }
    }

    /// Create a match, place first, then play it out.
    pub async fn host(mut self) -> anyhow::Result<BotReport> {
        let reply = self.client.request("crear_partida", &["partida_creada", "error"]).await?;
        let id = match split_reply(&reply) {
            ("partida_creada", id) => id.parse::<MatchId>()?,
            (_, reason) => anyhow::bail!("Could not create a match: {}", reason),
        };
        self.match_id = Some(id);
        self.place_fleet().await?;
        let reply = self
            .client
            .request("finalizar_colocacion", &["colocacion_finalizada", "error_colocacion"])
            .await?;
        if split_reply(&reply).0 != "colocacion_finalizada" {
            anyhow::bail!("Placement refused: {}", reply);
        }
        self.client.expect(&["partida_ready", "sin_rival"]).await.and_then(|f| {
            match split_reply(&f) {
                ("partida_ready", _) => Ok(()),
                (_, reason) => Err(anyhow::anyhow!("No rival: {}", reason)),
            }
        })?;
        self.play().await
    }

    /// Join `id`, or the first open match when `None`, then place and play.
    pub async fn join(mut self, id: Option<MatchId>) -> anyhow::Result<BotReport> {
        let id = match id {
            Some(id) => id,
            None => self.find_open_match().await?,
        };
        let reply = self
            .client
            .request(
                &format!("seleccionar_partida {}", id),
                &["unido_exitoso", "error_union", "error_protocolo"],
            )
            .await?;
        if split_reply(&reply).0 != "unido_exitoso" {
            anyhow::bail!("Join refused: {}", reply);
        }
        self.match_id = Some(id);
        self.client.expect(&["turno_colocacion"]).await?;
        self.place_fleet().await?;
        let reply = self
            .client
            .request("finalizar_colocacion", &["partida_ready", "error_colocacion"])
            .await?;
        if split_reply(&reply).0 != "partida_ready" {
            anyhow::bail!("Placement refused: {}", reply);
        }
        self.play().await
    }

    /// Poll the open-match list until something shows up.
    async fn find_open_match(&mut self) -> anyhow::Result<MatchId> {
        for _ in 0..LIST_RETRIES {
            let reply = self
                .client
                .request("unirse_partida", &["partidas_disponibles", "no_partidas"])
                .await?;
            if let Some(id) = first_listed_match(&reply) {
                return Ok(id);
            }
            tokio::time::sleep(LIST_RETRY_DELAY).await;
        }
        anyhow::bail!("No open matches after {} attempts", LIST_RETRIES)
    }

    /// Lay the whole fleet out locally first, then send it.
    async fn place_fleet(&mut self) -> anyhow::Result<()> {
        let layout = self.random_layout()?;
        for req in layout {
            let orient = match req.orientation {
                Orientation::Horizontal => "h",
                Orientation::Vertical => "v",
            };
            let line = format!(
                "colocar_barco {} {} {} {}",
                req.class.token(),
                req.anchor.row,
                req.anchor.col,
                orient
            );
            let reply = self
                .client
                .request(&line, &["barco_colocado", "error_colocacion"])
                .await?;
            if split_reply(&reply).0 != "barco_colocado" {
                anyhow::bail!("Server rejected {}: {}", line, reply);
            }
            self.client.expect(&["barcos_restantes"]).await?;
        }
        Ok(())
    }

    fn random_layout(&mut self) -> anyhow::Result<Vec<PlacementRequest>> {
        'attempt: for _ in 0..50 {
            let mut board = Board::new();
            let mut fleet = FleetCounter::new(self.rules);
            let mut layout = Vec::new();
            for class in SHIP_CLASSES {
                for _ in 0..self.rules.max(class) {
                    let Some((anchor, orientation)) = board.random_placement(&mut self.rng, class)
                    else {
                        continue 'attempt;
                    };
                    let req = PlacementRequest::new(class, anchor, orientation);
                    if place_ship(&mut board, &mut fleet, req).is_err() {
                        continue 'attempt;
                    }
                    layout.push(req);
                }
            }
            self.own = board;
            return Ok(layout);
        }
        anyhow::bail!("Could not find a legal fleet layout")
    }

    async fn play(mut self) -> anyhow::Result<BotReport> {
        let size = self.own.size();
        self.targets = (0..size)
            .flat_map(|r| (0..size).map(move |c| Coord::new(r, c)))
            .collect();
        self.targets.shuffle(&mut self.rng);

        let reply = self
            .client
            .request("quien_empieza", &["tu_turno", "turno_rival", "aun_esperando"])
            .await?;
        let mut my_turn = match split_reply(&reply).0 {
            "tu_turno" => true,
            "turno_rival" => false,
            _ => anyhow::bail!("Match is not ready: {}", reply),
        };
        let total = self.rules.total_cells();

        loop {
            if my_turn {
                let target = self
                    .targets
                    .pop()
                    .ok_or_else(|| anyhow::anyhow!("Ran out of targets"))?;
                let reply = self
                    .client
                    .request(
                        &format!("atacar {}", target),
                        &["resultado_ataque", "error_ataque", "fin_partida"],
                    )
                    .await?;
                let outcome = match split_reply(&reply) {
                    ("resultado_ataque", token) => token
                        .parse::<AttackOutcome>()
                        .map_err(|e| anyhow::anyhow!(e))?,
                    ("fin_partida", _) => return Ok(self.finish(&reply)),
                    _ => anyhow::bail!("Attack refused: {}", reply),
                };
                self.shots += 1;
                if outcome != AttackOutcome::Water {
                    self.hits += 1;
                }
                if self.hits == total {
                    let end = self.client.expect(&["fin_partida"]).await?;
                    return Ok(self.finish(&end));
                }
                my_turn = false;
            } else {
                let push = self.client.expect(&["ataque_recibido", "fin_partida"]).await?;
                match split_reply(&push) {
                    ("fin_partida", _) => return Ok(self.finish(&push)),
                    (_, payload) => {
                        if let Some(coord) = parse_incoming(payload) {
                            if let Err(e) = self.own.attack(coord) {
                                debug!("{} could not mirror attack at {}: {}", self.user, coord, e);
                            }
                        }
                        if self.own.all_ships_sunk() {
                            let end = self.client.expect(&["fin_partida"]).await?;
                            return Ok(self.finish(&end));
                        }
                        my_turn = true;
                    }
                }
            }
        }
    }

    fn finish(self, frame: &str) -> BotReport {
        let outcome = match split_reply(frame).1 {
            "victoria" => BotOutcome::Won,
            "victoria_por_abandono" => BotOutcome::WonByForfeit,
            _ => BotOutcome::Lost,
        };
        BotReport {
            user: self.user,
            match_id: self.match_id,
            outcome,
            shots: self.shots,
            hits: self.hits,
        }
    }
}

/// Id of the first entry in a `partidas_disponibles:<id> - <creator>|...` frame.
pub fn first_listed_match(frame: &str) -> Option<MatchId> {
    match split_reply(frame) {
        ("partidas_disponibles", list) => list
            .split('|')
            .next()
            .and_then(|entry| entry.split(" - ").next())
            .and_then(|id| id.trim().parse::<MatchId>().ok()),
        _ => None,
    }
}

/// Coordinate of an `ataque_recibido:<row>,<col>,<result>` payload.
fn parse_incoming(payload: &str) -> Option<Coord> {
    let mut parts = payload.split(',');
    let row = parts.next()?.parse::<u8>().ok()?;
    let col = parts.next()?.parse::<u8>().ok()?;
    Some(Coord::new(row, col))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::in_memory::InMemoryTransport;
    use crate::transport::FrameWriter;

    #[test]
    fn reads_first_listed_match() {
        assert_eq!(first_listed_match("partidas_disponibles:3 - ana|7 - bea"), Some(3));
        assert_eq!(first_listed_match("no_partidas:none"), None);
        assert_eq!(parse_incoming("2,5,tocado"), Some(Coord::new(2, 5)));
        assert_eq!(parse_incoming("2"), None);
    }

    #[tokio::test]
    async fn expect_keeps_unrelated_pushes() -> anyhow::Result<()> {
        let (near, mut far) = InMemoryTransport::pair();
        let mut client = Client::new(near);
        far.send("rival_encontrado:bea").await?;
        far.send("partida_ready:ok").await?;

        assert_eq!(client.expect(&["partida_ready"]).await?, "partida_ready:ok");
        assert_eq!(client.recv().await?, "rival_encontrado:bea");
        Ok(())
    }
}
