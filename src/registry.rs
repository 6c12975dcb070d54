//! Process-wide session state shared by every connection task.
//!
//! Lock order is always registry first, then a single match. Code holding a
//! match guard must release it before calling back into the registry.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

use crate::common::{AuthError, SessionError};
use crate::config::StarterPolicy;
use crate::fleet::FleetRules;
use crate::game::{Match, MatchId};
use crate::protocol::Reply;
use crate::store::MatchStore;

/// Queue feeding a connection's writer task.
pub type Outbox = mpsc::UnboundedSender<String>;

/// A live match plus the channel that wakes tasks waiting on it.
pub struct MatchHandle {
    game: Mutex<Match>,
    changed: watch::Sender<u64>,
    closed: AtomicBool,
}

impl MatchHandle {
    fn new(game: Match) -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            game: Mutex::new(game),
            changed,
            closed: AtomicBool::new(false),
        }
    }

    /// Exclusive access to the match. Every read-modify-write on it goes through this guard.
    pub fn lock(&self) -> MutexGuard<'_, Match> {
        self.game.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wake every waiter so it re-checks the match.
    pub fn touch(&self) {
        self.changed.send_modify(|generation| *generation += 1);
    }

    /// The match left the active table (withdrawn or concluded).
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.touch();
    }

    /// Wait until `check` yields a value for the current match state.
    ///
    /// Gives up with `None` when `limit` elapses or the match is closed first.
    pub async fn wait_for<T, F>(&self, limit: Duration, mut check: F) -> Option<T>
    where
        F: FnMut(&Match) -> Option<T>,
    {
        let mut rx = self.changed.subscribe();
        let waiting = async {
            loop {
                let found = {
                    let game = self.lock();
                    check(&*game)
                };
                if found.is_some() {
                    return found;
                }
                if self.is_closed() || rx.changed().await.is_err() {
                    return None;
                }
            }
        };
        timeout(limit, waiting).await.ok().flatten()
    }
}

#[derive(Default)]
struct Inner {
    matches: HashMap<MatchId, Arc<MatchHandle>>,
    connected: HashSet<String>,
    connections: HashMap<String, Outbox>,
    /// Match each player is seated in, kept in step with `matches`.
    seats: HashMap<String, MatchId>,
    next_id: MatchId,
}

impl Inner {
    fn active_match_of(&self, user: &str) -> Option<(MatchId, Arc<MatchHandle>)> {
        let id = *self.seats.get(user)?;
        let handle = self.matches.get(&id)?;
        let live = handle.lock().result().is_none();
        live.then(|| (id, handle.clone()))
    }

    fn release_seat(&mut self, user: &str, id: MatchId) {
        if self.seats.get(user) == Some(&id) {
            self.seats.remove(user);
        }
    }
}

pub struct SessionRegistry {
    inner: Mutex<Inner>,
    store: Arc<dyn MatchStore>,
    rules: FleetRules,
    starter: StarterPolicy,
}

impl SessionRegistry {
    pub fn new(store: Arc<dyn MatchStore>) -> Self {
        let next_id = store.max_id() + 1;
        Self {
            inner: Mutex::new(Inner {
                next_id,
                ..Inner::default()
            }),
            store,
            rules: FleetRules::default(),
            starter: StarterPolicy::default(),
        }
    }

    pub fn with_rules(mut self, rules: FleetRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_starter(mut self, starter: StarterPolicy) -> Self {
        self.starter = starter;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a live connection for `user`. A second simultaneous login is refused.
    pub fn connect(&self, user: &str, outbox: Outbox) -> Result<(), AuthError> {
        let mut inner = self.lock();
        if inner.connected.contains(user) {
            return Err(AuthError::AlreadyConnected(user.to_string()));
        }
        inner.connected.insert(user.to_string());
        inner.connections.insert(user.to_string(), outbox);
        Ok(())
    }

    /// Drop `user`'s connection and settle any match they leave behind.
    pub fn disconnect(&self, user: &str) {
        let abandoned = {
            let mut inner = self.lock();
            inner.connected.remove(user);
            inner.connections.remove(user);
            inner.active_match_of(user)
        };
        let Some((id, handle)) = abandoned else {
            return;
        };
        if self.withdraw(id, user) {
            return;
        }
        let settled = {
            let mut game = handle.lock();
            let winner = game.forfeit(user).map(|r| r.winner.clone());
            winner.map(|w| (w, Match::clone(&game)))
        };
        if let Some((winner, snapshot)) = settled {
            info!("Match {} forfeited by {}; {} wins", id, user, winner);
            self.notify(&winner, Reply::GameOver("victoria_por_abandono".into()));
            self.conclude(snapshot);
        }
    }

    pub fn is_connected(&self, user: &str) -> bool {
        self.lock().connected.contains(user)
    }

    pub fn connected_count(&self) -> usize {
        self.lock().connected.len()
    }

    pub fn active_match_count(&self) -> usize {
        self.lock().matches.len()
    }

    /// Open a new match owned by `creator`.
    pub fn create_match(&self, creator: &str) -> Result<(MatchId, Arc<MatchHandle>), SessionError> {
        let mut inner = self.lock();
        if let Some((id, _)) = inner.active_match_of(creator) {
            return Err(SessionError::AlreadyInMatch(id));
        }
        let id = inner.next_id;
        inner.next_id += 1;
        let handle = Arc::new(MatchHandle::new(Match::new(
            id,
            creator,
            self.rules,
            self.starter,
        )));
        inner.matches.insert(id, handle.clone());
        inner.seats.insert(creator.to_string(), id);
        info!("Match {} created by {}", id, creator);
        Ok((id, handle))
    }

    /// Open matches `viewer` could join, as `(id, creator)` sorted by id.
    pub fn open_matches(&self, viewer: &str) -> Vec<(MatchId, String)> {
        let inner = self.lock();
        let mut open: Vec<(MatchId, String)> = inner
            .matches
            .iter()
            .filter_map(|(id, h)| {
                let game = h.lock();
                (game.is_open() && game.primary() != viewer)
                    .then(|| (*id, game.primary().to_string()))
            })
            .collect();
        open.sort();
        open
    }

    /// Seat `user` as the opponent of match `id`. Concurrent joiners are serialized
    /// by the registry lock, so at most one of them succeeds.
    pub fn join_match(&self, id: MatchId, user: &str) -> Result<Arc<MatchHandle>, SessionError> {
        let mut inner = self.lock();
        if let Some((current, _)) = inner.active_match_of(user) {
            return Err(SessionError::AlreadyInMatch(current));
        }
        let handle = inner
            .matches
            .get(&id)
            .cloned()
            .ok_or(SessionError::NotFound(id))?;
        handle.lock().join(user)?;
        inner.seats.insert(user.to_string(), id);
        handle.touch();
        info!("{} joined match {}", user, id);
        Ok(handle)
    }

    pub fn get(&self, id: MatchId) -> Option<Arc<MatchHandle>> {
        self.lock().matches.get(&id).cloned()
    }

    /// The unfinished match `user` is seated in, if any.
    pub fn active_match_of(&self, user: &str) -> Option<(MatchId, Arc<MatchHandle>)> {
        self.lock().active_match_of(user)
    }

    /// Remove an unjoined match created by `user`. Returns whether it was removed.
    pub fn withdraw(&self, id: MatchId, user: &str) -> bool {
        let mut inner = self.lock();
        let Some(handle) = inner.matches.get(&id).cloned() else {
            return false;
        };
        let removable = {
            let game = handle.lock();
            game.is_open() && game.primary() == user
        };
        if removable {
            inner.matches.remove(&id);
            inner.release_seat(user, id);
            handle.close();
            info!("Open match {} withdrawn by {}", id, user);
        }
        removable
    }

    /// Remove a finished match from the active table and archive it.
    ///
    /// Inside a tokio runtime the archive write runs on the blocking pool;
    /// outside one it happens before this returns.
    pub fn conclude(&self, snapshot: Match) {
        let id = snapshot.id();
        {
            let mut inner = self.lock();
            if let Some(handle) = inner.matches.remove(&id) {
                handle.close();
            }
            inner.release_seat(snapshot.primary(), id);
            if let Some(opponent) = snapshot.opponent() {
                inner.release_seat(opponent, id);
            }
        }
        let store = self.store.clone();
        let archive = move || match store.save_match(&snapshot) {
            Ok(()) => info!("Match {} archived", id),
            Err(e) => error!("Failed to archive match {}: {:#}", id, e),
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn_blocking(archive);
            }
            Err(_) => archive(),
        }
    }

    /// Look up an archived match.
    pub fn archived(&self, id: MatchId) -> anyhow::Result<Option<Match>> {
        self.store.load_match(id)
    }

    /// Best-effort push to `user`. Returns false when the connection is gone.
    pub fn notify(&self, user: &str, reply: Reply) -> bool {
        let outbox = self.lock().connections.get(user).cloned();
        match outbox {
            Some(tx) if tx.send(reply.to_string()).is_ok() => true,
            _ => {
                warn!("Dropping notification for {}: {}", user, reply);
                false
            }
        }
    }
}
