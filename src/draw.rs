use crate::{
    api::{
        ApiResult,
        DrawResult,
        DrawnPrize,
        Prize,
        RaffleApi,
        User,
    },
    error::DrawRejection,
    session::SessionStore,
    storage::LocalStorage,
};
use rand::Rng;
use tracing::{
    error,
    info,
    warn,
};

/// Which side decides the card the roulette lands on.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, clap::ValueEnum)]
pub enum LandingPolicy {
    /// Pick a card locally and spin while the draw request is pending.
    #[default]
    Cosmetic,
    /// Wait for the server and spin to the prize it granted.
    Authoritative,
}

/// A draw admitted by [`DrawCoordinator::begin`].
#[derive(Clone, Debug, PartialEq)]
pub struct DrawTicket {
    user_id: i64,
    catalog: Vec<Prize>,
    predicted: Option<usize>,
}

impl DrawTicket {
    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    /// Catalog as it was when the draw started.
    pub fn catalog(&self) -> &[Prize] {
        &self.catalog
    }

    /// Pick the card a cosmetic spin will land on.
    pub fn predict<R: Rng + ?Sized>(&mut self, rng: &mut R) -> usize {
        let target = rng.random_range(0..self.catalog.len());
        self.predicted = Some(target);
        target
    }

    pub fn predicted(&self) -> Option<usize> {
        self.predicted
    }

    /// Position of the granted prize in the snapshot, matched by name and image.
    pub fn granted_index(&self, result: &DrawResult) -> Option<usize> {
        self.catalog.iter().position(|p| result.prize.matches(p))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DrawOutcome {
    Won {
        result: DrawResult,
        /// Index of the granted prize in the ticket's catalog snapshot.
        granted_index: Option<usize>,
    },
    Failed {
        message: String,
    },
    /// The session that started the draw is no longer the current one.
    Discarded {
        result: DrawResult,
    },
}

/// Admission and completion of draw requests; at most one is in flight.
#[derive(Debug, Default)]
pub struct DrawCoordinator {
    in_flight: bool,
}

impl DrawCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn begin(
        &mut self,
        user: Option<&User>,
        catalog: &[Prize],
        roulette_idle: bool,
    ) -> Result<DrawTicket, DrawRejection> {
        if self.in_flight || !roulette_idle {
            return Err(DrawRejection::AlreadySpinning);
        }
        let user = user.ok_or(DrawRejection::NoSession)?;
        if user.shadow_coins < 1 {
            return Err(DrawRejection::InsufficientBalance);
        }
        if catalog.is_empty() {
            return Err(DrawRejection::CatalogEmpty);
        }
        self.in_flight = true;
        info!(user_id = user.id, balance = user.shadow_coins, "draw started");
        Ok(DrawTicket {
            user_id: user.id,
            catalog: catalog.to_vec(),
            predicted: None,
        })
    }

    /// Apply the server's answer. The in-flight flag is cleared on every path.
    pub fn complete<S: LocalStorage>(
        &mut self,
        ticket: &DrawTicket,
        result: ApiResult<DrawResult>,
        session: &mut SessionStore<S>,
    ) -> DrawOutcome {
        let current = session.current().map(|u| u.id);
        let outcome = match result {
            Ok(result) if current != Some(ticket.user_id) => {
                warn!(
                    user_id = ticket.user_id,
                    ?current,
                    prize = %result.prize.name,
                    new_balance = result.new_balance,
                    "draw completed for a session that is no longer active"
                );
                DrawOutcome::Discarded { result }
            }
            Ok(result) => {
                if let Err(err) = session.update_balance(result.new_balance) {
                    error!(%err, "failed to persist balance after draw");
                }
                let granted_index = ticket.granted_index(&result);
                info!(
                    user_id = ticket.user_id,
                    prize = %result.prize.name,
                    new_balance = result.new_balance,
                    "draw completed"
                );
                if granted_index.is_none() {
                    warn!(prize = %result.prize.name, "granted prize not in catalog snapshot");
                }
                DrawOutcome::Won {
                    result,
                    granted_index,
                }
            }
            Err(err) => {
                warn!(user_id = ticket.user_id, %err, "draw failed");
                DrawOutcome::Failed {
                    message: err.user_message(),
                }
            }
        };
        self.in_flight = false;
        outcome
    }

    /// Release a ticket that never reached the server.
    pub fn abandon(&mut self, ticket: &DrawTicket) {
        warn!(user_id = ticket.user_id, "draw abandoned before sending");
        self.in_flight = false;
    }

    /// Admit, send and complete a draw in one step.
    pub async fn draw<A: RaffleApi, S: LocalStorage>(
        &mut self,
        api: &A,
        session: &mut SessionStore<S>,
        catalog: &[Prize],
    ) -> Result<DrawOutcome, DrawRejection> {
        let ticket = self.begin(session.current(), catalog, true)?;
        let result = api.draw(ticket.user_id).await;
        Ok(self.complete(&ticket, result, session))
    }
}

/// What the win notification shows once the spin has landed.
#[derive(Clone, Debug, PartialEq)]
pub struct Announcement {
    pub prize: DrawnPrize,
    pub message: String,
    pub landed: Prize,
    pub matched: bool,
}

/// Joins the landed card with the server result; either may arrive first.
#[derive(Debug, Default)]
pub struct Reconciler {
    landed: Option<Prize>,
    won: Option<DrawResult>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_landed(&mut self, prize: Prize) -> Option<Announcement> {
        self.landed = Some(prize);
        self.try_announce()
    }

    pub fn on_won(&mut self, result: DrawResult) -> Option<Announcement> {
        self.won = Some(result);
        self.try_announce()
    }

    pub fn is_waiting(&self) -> bool {
        self.landed.is_some() || self.won.is_some()
    }

    pub fn reset(&mut self) {
        self.landed = None;
        self.won = None;
    }

    fn try_announce(&mut self) -> Option<Announcement> {
        if self.landed.is_none() || self.won.is_none() {
            return None;
        }
        let landed = self.landed.take()?;
        let won = self.won.take()?;
        let matched = won.prize.matches(&landed);
        if !matched {
            warn!(
                landed = %landed.name,
                granted = %won.prize.name,
                "roulette landed on a different prize than the server granted"
            );
        }
        Some(Announcement {
            prize: won.prize,
            message: won.message,
            landed,
            matched,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        error::ApiError,
        storage::InMemoryLocalStorage,
        test_helpers::{
            FakeRaffleApi,
            catalog,
            drawn,
            user,
        },
    };
    use rand::{
        SeedableRng,
        rngs::StdRng,
    };

    fn session_with(coins: i64) -> (SessionStore<InMemoryLocalStorage>, InMemoryLocalStorage) {
        let storage = InMemoryLocalStorage::new();
        let mut session = SessionStore::new(storage.clone());
        session.replace(user(1, coins)).unwrap();
        (session, storage)
    }

    fn won(prize: &Prize, new_balance: i64) -> DrawResult {
        DrawResult {
            new_balance,
            message: "You won!".to_string(),
            prize: drawn(prize),
        }
    }

    #[tokio::test]
    async fn draw__rejects_locally_without_balance() {
        // given
        let api = FakeRaffleApi::new();
        let (mut session, _) = session_with(0);
        let mut coordinator = DrawCoordinator::new();

        // when
        let err = coordinator
            .draw(&api, &mut session, &catalog(&["A"]))
            .await
            .unwrap_err();

        // then
        assert_eq!(err, DrawRejection::InsufficientBalance);
        assert_eq!(api.calls().draw, 0);
        assert!(!coordinator.in_flight());
    }

    #[tokio::test]
    async fn draw__rejects_locally_when_catalog_empty() {
        let api = FakeRaffleApi::new();
        let (mut session, _) = session_with(5);
        let mut coordinator = DrawCoordinator::new();

        let err = coordinator.draw(&api, &mut session, &[]).await.unwrap_err();

        assert_eq!(err, DrawRejection::CatalogEmpty);
        assert_eq!(api.calls().draw, 0);
    }

    #[test]
    fn begin__rejects_second_attempt_while_in_flight() {
        // given
        let prizes = catalog(&["A", "B"]);
        let owner = user(1, 3);
        let mut coordinator = DrawCoordinator::new();
        let _ticket = coordinator.begin(Some(&owner), &prizes, true).unwrap();

        // when
        let err = coordinator.begin(Some(&owner), &prizes, true).unwrap_err();

        // then
        assert_eq!(err, DrawRejection::AlreadySpinning);
        assert_eq!(err.to_string(), "The roulette is already spinning");
    }

    #[test]
    fn begin__rejects_while_roulette_busy_and_without_session() {
        let prizes = catalog(&["A"]);
        let mut coordinator = DrawCoordinator::new();

        assert_eq!(
            coordinator.begin(Some(&user(1, 3)), &prizes, false),
            Err(DrawRejection::AlreadySpinning)
        );
        assert_eq!(
            coordinator.begin(None, &prizes, true),
            Err(DrawRejection::NoSession)
        );
        assert!(!coordinator.in_flight());
    }

    #[tokio::test]
    async fn draw__success_updates_balance_with_single_write() {
        // given
        let prizes = catalog(&["A", "B", "C"]);
        let api = FakeRaffleApi::new();
        api.set_draw(Ok(won(&prizes[2], 4)));
        let (mut session, storage) = session_with(5);
        let writes_before = storage.write_count();
        let mut coordinator = DrawCoordinator::new();

        // when
        let outcome = coordinator.draw(&api, &mut session, &prizes).await.unwrap();

        // then
        assert_eq!(
            outcome,
            DrawOutcome::Won {
                result: won(&prizes[2], 4),
                granted_index: Some(2),
            }
        );
        assert_eq!(session.current().unwrap().shadow_coins, 4);
        assert_eq!(session.cached().unwrap().unwrap().shadow_coins, 4);
        assert_eq!(storage.write_count(), writes_before + 1);
        assert!(!coordinator.in_flight());
    }

    #[tokio::test]
    async fn draw__failure_keeps_balance_and_clears_flag() {
        // given
        let api = FakeRaffleApi::new();
        api.set_draw(Err(ApiError::Rejected("No prizes left".into())));
        let (mut session, storage) = session_with(5);
        let writes_before = storage.write_count();
        let mut coordinator = DrawCoordinator::new();

        // when
        let outcome = coordinator
            .draw(&api, &mut session, &catalog(&["A"]))
            .await
            .unwrap();

        // then
        assert_eq!(
            outcome,
            DrawOutcome::Failed {
                message: "No prizes left".into()
            }
        );
        assert_eq!(session.current().unwrap().shadow_coins, 5);
        assert_eq!(storage.write_count(), writes_before);
        assert!(!coordinator.in_flight());
    }

    #[test]
    fn complete__reply_for_previous_session_is_discarded() {
        // given
        let prizes = catalog(&["A", "B", "C"]);
        let (mut session, storage) = session_with(5);
        let mut coordinator = DrawCoordinator::new();
        let ticket = coordinator
            .begin(session.current(), &prizes, true)
            .unwrap();
        session.clear().unwrap();
        session.replace(user(2, 10)).unwrap();
        let writes_before = storage.write_count();

        // when
        let outcome = coordinator.complete(&ticket, Ok(won(&prizes[2], 4)), &mut session);

        // then
        assert_eq!(
            outcome,
            DrawOutcome::Discarded {
                result: won(&prizes[2], 4)
            }
        );
        assert_eq!(session.current(), Some(&user(2, 10)));
        assert_eq!(storage.write_count(), writes_before);
        assert!(!coordinator.in_flight());
    }

    #[tokio::test]
    async fn draw__connection_failure_shows_generic_message() {
        let api = FakeRaffleApi::new();
        let (mut session, _) = session_with(2);
        let mut coordinator = DrawCoordinator::new();

        let outcome = coordinator
            .draw(&api, &mut session, &catalog(&["A"]))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DrawOutcome::Failed {
                message: "Connection error, please try again".into()
            }
        );
    }

    #[test]
    fn ticket__predict_stays_inside_snapshot() {
        let mut coordinator = DrawCoordinator::new();
        let mut ticket = coordinator
            .begin(Some(&user(1, 1)), &catalog(&["A", "B", "C"]), true)
            .unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..50 {
            let target = ticket.predict(&mut rng);
            assert!(target < 3);
            assert_eq!(ticket.predicted(), Some(target));
        }
    }

    #[test]
    fn reconciler__announces_server_prize_in_either_order() {
        // given
        let prizes = catalog(&["A", "B"]);
        let mut landed_first = Reconciler::new();
        let mut won_first = Reconciler::new();

        // when
        assert_eq!(landed_first.on_landed(prizes[0].clone()), None);
        let a = landed_first.on_won(won(&prizes[1], 0)).unwrap();
        assert_eq!(won_first.on_won(won(&prizes[1], 0)), None);
        let b = won_first.on_landed(prizes[1].clone()).unwrap();

        // then
        assert_eq!(a.prize.name, "B");
        assert!(!a.matched);
        assert_eq!(b.prize.name, "B");
        assert!(b.matched);
        assert!(!landed_first.is_waiting());
        assert!(!won_first.is_waiting());
    }
}
