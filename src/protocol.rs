//! Text protocol: client commands in, `prefix:payload` replies out.

use std::borrow::Cow;

use core::fmt;
use core::str::FromStr;

use crate::common::{AttackOutcome, Coord, ProtocolError};
use crate::game::{MatchId, Move};
use crate::placement::PlacementRequest;
use crate::ship::{Orientation, ShipClass};

/// One client request, parsed from a single frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { user: String, password: String },
    Register { user: String, password: String },
    CreateMatch,
    ListMatches,
    SelectMatch(MatchId),
    PlaceShip(PlacementRequest),
    FinishPlacement,
    CheckReady,
    WhoStarts,
    Attack(Coord),
    ServerStatus,
    Fleet,
    History,
    Terminate,
}

fn malformed(command: &'static str, reason: impl Into<String>) -> ProtocolError {
    ProtocolError::Malformed {
        command,
        reason: reason.into(),
    }
}

fn parse_u8(command: &'static str, field: &str, raw: &str) -> Result<u8, ProtocolError> {
    raw.trim()
        .parse()
        .map_err(|_| malformed(command, format!("{} '{}' is not a number", field, raw)))
}

fn parse_credentials<'a, I>(command: &'static str, mut args: I) -> Result<(String, String), ProtocolError>
where
    I: Iterator<Item = &'a str>,
{
    match (args.next(), args.next(), args.next()) {
        (Some(user), Some(password), None) => Ok((user.to_string(), password.to_string())),
        _ => Err(malformed(command, "expected <user> <password>")),
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Err(ProtocolError::Empty);
        };
        let rest: Vec<&str> = words.collect();
        let no_args = |cmd: Command, name: &'static str| {
            if rest.is_empty() {
                Ok(cmd)
            } else {
                Err(malformed(name, "takes no arguments"))
            }
        };

        match head {
            "login" => {
                let (user, password) = parse_credentials("login", rest.iter().copied())?;
                Ok(Command::Login { user, password })
            }
            "registro" => {
                let (user, password) = parse_credentials("registro", rest.iter().copied())?;
                Ok(Command::Register { user, password })
            }
            "crear_partida" => no_args(Command::CreateMatch, "crear_partida"),
            "unirse_partida" => no_args(Command::ListMatches, "unirse_partida"),
            "seleccionar_partida" => match rest.as_slice() {
                [id] => id
                    .parse::<MatchId>()
                    .map(Command::SelectMatch)
                    .map_err(|_| malformed("seleccionar_partida", format!("bad match id '{}'", id))),
                _ => Err(malformed("seleccionar_partida", "expected <id>")),
            },
            "colocar_barco" => match rest.as_slice() {
                [class, row, col, orient] => {
                    let class = class
                        .parse::<ShipClass>()
                        .map_err(|e: String| malformed("colocar_barco", e))?;
                    let orientation = orient
                        .parse::<Orientation>()
                        .map_err(|e: String| malformed("colocar_barco", e))?;
                    let anchor = Coord::new(
                        parse_u8("colocar_barco", "row", row)?,
                        parse_u8("colocar_barco", "column", col)?,
                    );
                    Ok(Command::PlaceShip(PlacementRequest::new(class, anchor, orientation)))
                }
                _ => Err(malformed(
                    "colocar_barco",
                    "expected <class> <row> <col> <orientation>",
                )),
            },
            "finalizar_colocacion" => no_args(Command::FinishPlacement, "finalizar_colocacion"),
            "comprobar_listo" => no_args(Command::CheckReady, "comprobar_listo"),
            "quien_empieza" => no_args(Command::WhoStarts, "quien_empieza"),
            "atacar" => {
                // Accepts `atacar r,c` as well as `atacar r c`.
                let joined = rest.join(",");
                let parts: Vec<&str> = joined.split(',').filter(|p| !p.is_empty()).collect();
                match parts.as_slice() {
                    [row, col] => Ok(Command::Attack(Coord::new(
                        parse_u8("atacar", "row", row)?,
                        parse_u8("atacar", "column", col)?,
                    ))),
                    _ => Err(malformed("atacar", "expected <row>,<col>")),
                }
            }
            "estado_servidor" => no_args(Command::ServerStatus, "estado_servidor"),
            "mis_barcos" => no_args(Command::Fleet, "mis_barcos"),
            "historial" => no_args(Command::History, "historial"),
            "termina_servicio" => Ok(Command::Terminate),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

/// Everything the server writes, synchronous replies and pushes alike.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    AuthChallenge(String),
    Authenticated(String),
    AuthFailed(String),
    MatchCreated(MatchId),
    OpenMatches(Vec<(MatchId, String)>),
    NoMatches(String),
    Joined(String),
    JoinFailed(String),
    ShipPlaced(String),
    RemainingShips(String),
    PlacementFailed(String),
    PlacementFinished(String),
    MatchReady(String),
    StillWaiting(String),
    YourTurn,
    RivalTurn,
    AttackResult(AttackOutcome),
    AttackFailed(String),
    AttackReceived(Coord, AttackOutcome),
    GameOver(String),
    RivalFound(String),
    NoRival(String),
    PlacementTurn(String),
    ServerStatus { connected: usize, active: usize },
    History(Vec<Move>),
    Error(String),
    ProtocolError(String),
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::AuthChallenge(m) => write!(f, "autenticacion:{}", m),
            Reply::Authenticated(u) => write!(f, "autenticado:{}", u),
            Reply::AuthFailed(m) => write!(f, "error_autenticacion:{}", m),
            Reply::MatchCreated(id) => write!(f, "partida_creada:{}", id),
            Reply::OpenMatches(list) => {
                let entries: Vec<String> = list
                    .iter()
                    .map(|(id, creator)| format!("{} - {}", id, creator))
                    .collect();
                write!(f, "partidas_disponibles:{}", entries.join("|"))
            }
            Reply::NoMatches(m) => write!(f, "no_partidas:{}", m),
            Reply::Joined(m) => write!(f, "unido_exitoso:{}", m),
            Reply::JoinFailed(m) => write!(f, "error_union:{}", m),
            Reply::ShipPlaced(m) => write!(f, "barco_colocado:{}", m),
            Reply::RemainingShips(m) => write!(f, "barcos_restantes:{}", m),
            Reply::PlacementFailed(m) => write!(f, "error_colocacion:{}", m),
            Reply::PlacementFinished(m) => write!(f, "colocacion_finalizada:{}", m),
            Reply::MatchReady(m) => write!(f, "partida_ready:{}", m),
            Reply::StillWaiting(m) => write!(f, "aun_esperando:{}", m),
            Reply::YourTurn => f.write_str("tu_turno"),
            Reply::RivalTurn => f.write_str("turno_rival"),
            Reply::AttackResult(o) => write!(f, "resultado_ataque:{}", o),
            Reply::AttackFailed(m) => write!(f, "error_ataque:{}", m),
            Reply::AttackReceived(c, o) => write!(f, "ataque_recibido:{},{}", c, o),
            Reply::GameOver(m) => write!(f, "fin_partida:{}", m),
            Reply::RivalFound(u) => write!(f, "rival_encontrado:{}", u),
            Reply::NoRival(m) => write!(f, "sin_rival:{}", m),
            Reply::PlacementTurn(m) => write!(f, "turno_colocacion:{}", m),
            Reply::ServerStatus { connected, active } => write!(f, "{} | {}", connected, active),
            Reply::History(moves) => {
                let entries: Vec<String> = moves
                    .iter()
                    .map(|m| format!("{}@{}={}", m.attacker, m.coord, m.outcome))
                    .collect();
                write!(f, "historial:{}", entries.join(";"))
            }
            Reply::Error(m) => write!(f, "error:{}", m),
            Reply::ProtocolError(m) => write!(f, "error_protocolo:{}", m),
        }
    }
}

/// Split a reply frame into its prefix and payload. Bare tokens have an empty payload.
pub fn split_reply(frame: &str) -> (&str, &str) {
    frame.split_once(':').unwrap_or((frame, ""))
}

/// A command line fit for logs: the password of `login`/`registro` is masked.
pub fn redact_credentials(line: &str) -> Cow<'_, str> {
    let mut words = line.split_whitespace();
    match (words.next(), words.next(), words.next()) {
        (Some(verb @ ("login" | "registro")), Some(user), Some(_)) => {
            Cow::Owned(format!("{} {} ***", verb, user))
        }
        _ => Cow::Borrowed(line),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_are_masked_in_logs() {
        assert_eq!(redact_credentials("login ana secreto"), "login ana ***");
        assert_eq!(redact_credentials("registro bea a b c"), "registro bea ***");
        assert_eq!(redact_credentials("login ana"), "login ana");
        assert_eq!(redact_credentials("atacar 1,2"), "atacar 1,2");
        assert!(matches!(redact_credentials("estado_servidor"), Cow::Borrowed(_)));
    }

    #[test]
    fn parses_commands() {
        assert_eq!(
            "login ana pw".parse::<Command>(),
            Ok(Command::Login {
                user: "ana".into(),
                password: "pw".into()
            })
        );
        assert_eq!("crear_partida".parse::<Command>(), Ok(Command::CreateMatch));
        assert_eq!("seleccionar_partida 12".parse::<Command>(), Ok(Command::SelectMatch(12)));
        assert_eq!(
            "colocar_barco portaaviones 0 0 horizontal".parse::<Command>(),
            Ok(Command::PlaceShip(PlacementRequest::new(
                ShipClass::Carrier,
                Coord::new(0, 0),
                Orientation::Horizontal
            )))
        );
        assert_eq!("atacar 3,4".parse::<Command>(), Ok(Command::Attack(Coord::new(3, 4))));
        assert_eq!("atacar 3 4".parse::<Command>(), Ok(Command::Attack(Coord::new(3, 4))));
        assert_eq!("termina_servicio".parse::<Command>(), Ok(Command::Terminate));
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!("   ".parse::<Command>(), Err(ProtocolError::Empty));
        assert_eq!(
            "bailar".parse::<Command>(),
            Err(ProtocolError::UnknownCommand("bailar".into()))
        );
        assert!("atacar 3".parse::<Command>().is_err());
        assert!("atacar x,1".parse::<Command>().is_err());
        assert!("colocar_barco acorazado 0 0 h".parse::<Command>().is_err());
        assert!("seleccionar_partida".parse::<Command>().is_err());
        assert!("login ana".parse::<Command>().is_err());
        assert!("crear_partida ya".parse::<Command>().is_err());
    }

    #[test]
    fn renders_replies() {
        assert_eq!(
            Reply::OpenMatches(vec![(1, "ana".into()), (4, "bea".into())]).to_string(),
            "partidas_disponibles:1 - ana|4 - bea"
        );
        assert_eq!(
            Reply::AttackReceived(Coord::new(2, 7), AttackOutcome::HitAndSunk).to_string(),
            "ataque_recibido:2,7,hundido"
        );
        assert_eq!(
            Reply::ServerStatus {
                connected: 3,
                active: 1
            }
            .to_string(),
            "3 | 1"
        );
        assert_eq!(Reply::YourTurn.to_string(), "tu_turno");
        assert_eq!(split_reply("resultado_ataque:agua"), ("resultado_ataque", "agua"));
        assert_eq!(split_reply("turno_rival"), ("turno_rival", ""));
    }
}
