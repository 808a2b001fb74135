use crate::{
    scores::{
        HighScores,
        ScoreStore,
    },
    terms::{
        Difficulty,
        Term,
        TermCatalog,
    },
};
use rand::{
    Rng,
    SeedableRng,
    rngs::StdRng,
    seq::{
        IndexedRandom,
        SliceRandom,
    },
};
use std::{
    collections::HashSet,
    time::Duration,
};
use tracing::{
    debug,
    info,
    warn,
};


pub const REVEAL_DELAY: Duration = Duration::from_millis(900);

/// Upper bound on relative distance for hard comparisons.
pub const HARD_MAX_DISTANCE: f64 = 0.25;
/// Upper bound on relative distance for medium comparisons.
pub const MEDIUM_MAX_DISTANCE: f64 = 0.50;
/// Lower bound on relative distance for easy comparisons.
pub const EASY_MIN_DISTANCE: f64 = 0.40;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum GameState {
    SelectingDifficulty,
    AwaitingGuess,
    Revealing,
    Transitioning,
    GameOver,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Direction {
    Higher,
    Lower,
}

/// `Higher` wins ties.
pub fn evaluate_guess(direction: Direction, top: &Term, bottom: &Term) -> bool {
    let is_higher = bottom.searches >= top.searches;
    match direction {
        Direction::Higher => is_higher,
        Direction::Lower => !is_higher,
    }
}

pub fn relative_distance(term: &Term, current: &Term) -> f64 {
    term.searches.abs_diff(current.searches) as f64 / current.searches.max(1) as f64
}

fn within_band(difficulty: Difficulty, distance: f64) -> bool {
    match difficulty {
        Difficulty::Hard => distance <= HARD_MAX_DISTANCE,
        Difficulty::Medium => distance <= MEDIUM_MAX_DISTANCE,
        Difficulty::Easy => distance >= EASY_MIN_DISTANCE,
    }
}

/// Terms not yet shown in the current cycle, plus the ids already shown.
#[derive(Clone, Debug, Default)]
pub struct TermPool {
    remaining: Vec<Term>,
    used: HashSet<String>,
    refills: usize,
}

impl TermPool {
    pub fn new(remaining: Vec<Term>, used: impl IntoIterator<Item = String>) -> Self {
        Self {
            remaining,
            used: used.into_iter().collect(),
            refills: 0,
        }
    }

    pub fn remaining(&self) -> &[Term] {
        &self.remaining
    }

    pub fn used(&self) -> &HashSet<String> {
        &self.used
    }

    pub fn refills(&self) -> usize {
        self.refills
    }

    /// Rebuilds `remaining` from `tier`, skipping `avoid` and used ids. Starts a new
    /// cycle when nothing is left.
    fn refill<R: Rng + ?Sized>(
        &mut self,
        tier: &[Term],
        avoid: Option<&str>,
        rng: &mut R,
    ) -> Vec<Term> {
        let not_avoided = |t: &&Term| Some(t.id.as_str()) != avoid;
        let mut pool: Vec<Term> = tier
            .iter()
            .filter(not_avoided)
            .filter(|t| !self.used.contains(&t.id))
            .cloned()
            .collect();
        if pool.is_empty() {
            self.used = avoid.map(str::to_string).into_iter().collect();
            pool = tier.iter().filter(not_avoided).cloned().collect();
            debug!(size = pool.len(), "term pool exhausted, starting a new cycle");
        }
        pool.shuffle(rng);
        self.refills += 1;
        self.remaining = pool.clone();
        pool
    }

    /// Picks the next bottom term for `current`.
    ///
    /// Candidates are unused terms from the pool (refilled from `tier` when empty),
    /// narrowed to the difficulty's distance band. An empty band falls back to every
    /// candidate, and no candidate at all returns `current`.
    pub fn pick_biased_next<R: Rng + ?Sized>(
        &mut self,
        tier: &[Term],
        current: &Term,
        difficulty: Difficulty,
        rng: &mut R,
    ) -> Term {
        let mut available: Vec<Term> = self
            .remaining
            .iter()
            .filter(|t| t.id != current.id && !self.used.contains(&t.id))
            .cloned()
            .collect();
        if available.is_empty() {
            available = self.refill(tier, Some(&current.id), rng);
        }

        let banded: Vec<&Term> = available
            .iter()
            .filter(|t| within_band(difficulty, relative_distance(t, current)))
            .collect();
        let selection: Vec<&Term> = if banded.is_empty() {
            available.iter().collect()
        } else {
            banded
        };

        let Some(next) = selection.choose(rng).map(|t| (*t).clone()) else {
            return current.clone();
        };
        self.remaining.retain(|t| t.id != next.id);
        self.used.insert(next.id.clone());
        next
    }
}

/// Everything that lives for one difficulty selection.
#[derive(Clone, Debug)]
pub struct RoundSession {
    id: u64,
    difficulty: Difficulty,
    playable: Vec<Term>,
    pool: TermPool,
    top: Term,
    bottom: Term,
    score: u32,
    streak: u32,
    best_streak: u32,
    verdict: Option<bool>,
}

impl RoundSession {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn pool(&self) -> &TermPool {
        &self.pool
    }

    pub fn top(&self) -> &Term {
        &self.top
    }

    pub fn bottom(&self) -> &Term {
        &self.bottom
    }
}

/// Pending end of a reveal. Only completes the session it was issued for.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RevealTicket {
    pub session: u64,
    pub delay: Duration,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GuessOutcome {
    pub correct: bool,
    pub score: u32,
    pub streak: u32,
    pub new_high_score: bool,
    pub ticket: RevealTicket,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GameOverSummary {
    pub difficulty: Difficulty,
    pub score: u32,
    pub high_score: u32,
    pub tier_best: u32,
    pub best_streak: u32,
}

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum RoundError {
    #[error("not enough playable {difficulty} terms ({available} found, 2 needed)")]
    InsufficientTerms {
        difficulty: Difficulty,
        available: usize,
    },
    #[error("cannot {action} while {state:?}")]
    InvalidTransition {
        state: GameState,
        action: &'static str,
    },
}

/// The game state machine. Owns the active [`RoundSession`] and the high scores.
pub struct RoundEngine<S, R = StdRng> {
    catalog: TermCatalog,
    store: S,
    rng: R,
    high_scores: HighScores,
    state: GameState,
    session: Option<RoundSession>,
    generation: u64,
    reveal_delay: Duration,
}

impl<S: ScoreStore> RoundEngine<S, StdRng> {
    pub fn new(catalog: TermCatalog, store: S) -> Self {
        Self::with_rng(catalog, store, StdRng::from_os_rng())
    }
}

impl<S: ScoreStore, R: Rng> RoundEngine<S, R> {
    pub fn with_rng(catalog: TermCatalog, store: S, rng: R) -> Self {
        let high_scores = HighScores::hydrate(&store);
        Self {
            catalog,
            store,
            rng,
            high_scores,
            state: GameState::SelectingDifficulty,
            session: None,
            generation: 0,
            reveal_delay: REVEAL_DELAY,
        }
    }

    pub fn with_reveal_delay(mut self, delay: Duration) -> Self {
        self.reveal_delay = delay;
        self
    }

    pub fn select_difficulty(&mut self, difficulty: Difficulty) -> Result<(), RoundError> {
        match self.state {
            GameState::SelectingDifficulty => self.start(difficulty),
            state => Err(RoundError::InvalidTransition {
                state,
                action: "select a difficulty",
            }),
        }
    }

    pub fn play_again(&mut self) -> Result<(), RoundError> {
        let difficulty = match (self.state, self.difficulty()) {
            (GameState::GameOver, Some(difficulty)) => difficulty,
            (state, _) => {
                return Err(RoundError::InvalidTransition {
                    state,
                    action: "play again",
                });
            }
        };
        self.start(difficulty)
    }

    pub fn change_difficulty(&mut self) -> Result<(), RoundError> {
        match self.state {
            GameState::SelectingDifficulty | GameState::GameOver => {
                self.reset();
                Ok(())
            }
            state => Err(RoundError::InvalidTransition {
                state,
                action: "change difficulty",
            }),
        }
    }

    fn start(&mut self, difficulty: Difficulty) -> Result<(), RoundError> {
        let playable = self.catalog.playable(difficulty);
        if playable.len() < 2 {
            warn!(
                %difficulty,
                available = playable.len(),
                "insufficient catalog entries for difficulty"
            );
            return Err(RoundError::InsufficientTerms {
                difficulty,
                available: playable.len(),
            });
        }

        let mut shuffled = playable.clone();
        shuffled.shuffle(&mut self.rng);
        let mut rest = shuffled.into_iter();
        let (Some(top), Some(bottom)) = (rest.next(), rest.next()) else {
            return Err(RoundError::InsufficientTerms {
                difficulty,
                available: playable.len(),
            });
        };
        let used = [top.id.clone(), bottom.id.clone()];

        self.generation = self.generation.wrapping_add(1);
        self.session = Some(RoundSession {
            id: self.generation,
            difficulty,
            pool: TermPool::new(rest.collect(), used),
            playable,
            top,
            bottom,
            score: 0,
            streak: 0,
            best_streak: 0,
            verdict: None,
        });
        self.state = GameState::AwaitingGuess;
        info!(%difficulty, session = self.generation, "round session started");
        Ok(())
    }

    fn reset(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.session = None;
        self.state = GameState::SelectingDifficulty;
    }

    /// Evaluates a guess. Returns `None` (ignored) unless a guess is awaited.
    pub fn guess(&mut self, direction: Direction) -> Option<GuessOutcome> {
        if self.state != GameState::AwaitingGuess {
            debug!(state = ?self.state, "guess ignored");
            return None;
        }
        let session = self.session.as_mut()?;
        let correct = evaluate_guess(direction, &session.top, &session.bottom);
        session.verdict = Some(correct);

        let mut new_high_score = false;
        if correct {
            session.score += 1;
            session.streak += 1;
            session.best_streak = session.best_streak.max(session.streak);
            new_high_score =
                self.high_scores
                    .record(&mut self.store, session.difficulty, session.score);
        } else {
            session.best_streak = session.best_streak.max(session.streak);
            session.streak = 0;
        }
        self.state = GameState::Revealing;

        Some(GuessOutcome {
            correct,
            score: session.score,
            streak: session.streak,
            new_high_score,
            ticket: RevealTicket {
                session: session.id,
                delay: self.reveal_delay,
            },
        })
    }

    /// Ends a reveal: advances to the next pair after a correct guess, or to
    /// `GameOver` after a wrong one. Stale tickets return `None` and change nothing.
    pub fn complete_reveal(&mut self, ticket: RevealTicket) -> Option<GameState> {
        if self.state != GameState::Revealing {
            return None;
        }
        let session = self.session.as_mut()?;
        if session.id != ticket.session {
            debug!(ticket = ticket.session, current = session.id, "stale reveal ignored");
            return None;
        }

        if session.verdict == Some(true) {
            self.state = GameState::Transitioning;
            let next_top = session.bottom.clone();
            let next_bottom = session.pool.pick_biased_next(
                &session.playable,
                &next_top,
                session.difficulty,
                &mut self.rng,
            );
            session.top = next_top;
            session.bottom = next_bottom;
            session.verdict = None;
            self.state = GameState::AwaitingGuess;
        } else {
            info!(score = session.score, best_streak = session.best_streak, "game over");
            self.state = GameState::GameOver;
        }
        Some(self.state)
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn session(&self) -> Option<&RoundSession> {
        self.session.as_ref()
    }

    pub fn difficulty(&self) -> Option<Difficulty> {
        self.session.as_ref().map(|s| s.difficulty)
    }

    pub fn top(&self) -> Option<&Term> {
        self.session.as_ref().map(|s| &s.top)
    }

    pub fn bottom(&self) -> Option<&Term> {
        self.session.as_ref().map(|s| &s.bottom)
    }

    pub fn score(&self) -> u32 {
        self.session.as_ref().map_or(0, |s| s.score)
    }

    pub fn streak(&self) -> u32 {
        self.session.as_ref().map_or(0, |s| s.streak)
    }

    pub fn best_streak(&self) -> u32 {
        self.session.as_ref().map_or(0, |s| s.best_streak)
    }

    /// Verdict of the guess being revealed, if any.
    pub fn verdict(&self) -> Option<bool> {
        self.session.as_ref().and_then(|s| s.verdict)
    }

    pub fn is_revealed(&self) -> bool {
        matches!(self.state, GameState::Revealing | GameState::GameOver)
    }

    pub fn can_guess(&self) -> bool {
        self.state == GameState::AwaitingGuess && self.session.is_some()
    }

    pub fn high_scores(&self) -> &HighScores {
        &self.high_scores
    }

    pub fn catalog(&self) -> &TermCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn summary(&self) -> Option<GameOverSummary> {
        if self.state != GameState::GameOver {
            return None;
        }
        let session = self.session.as_ref()?;
        Some(GameOverSummary {
            difficulty: session.difficulty,
            score: session.score,
            high_score: self.high_scores.global,
            tier_best: self.high_scores.for_tier(session.difficulty),
            best_streak: session.best_streak,
        })
    }
}
