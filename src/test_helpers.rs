use crate::{
    app::GameController,
    chain::{
        ChainId,
        Network,
    },
    round::RoundEngine,
    scores::InMemoryScoreStore,
    simulated::SimulatedWallet,
    terms::{
        Term,
        TermCatalog,
        TermRecord,
    },
};
use rand::{
    SeedableRng,
    rngs::StdRng,
};
use std::time::Duration;

pub fn record(id: &str, label: &str, searches: u64) -> TermRecord {
    TermRecord {
        id: id.to_string(),
        term: label.to_string(),
        searches,
        image_url: format!("https://picsum.photos/seed/{id}/900/1200"),
        source: None,
        tags: Vec::new(),
        familiarity: None,
    }
}

pub fn term(id: &str, label: &str, searches: u64) -> Term {
    Term::from(record(id, label, searches))
}

pub fn catalog(entries: &[(&str, &str, u64)]) -> TermCatalog {
    TermCatalog::from_records(
        entries
            .iter()
            .map(|(id, label, searches)| record(id, label, *searches)),
    )
}

/// Six terms per tier with comfortable spreads.
pub fn fixture_catalog() -> TermCatalog {
    catalog(&[
        ("google", "Google", 755_000_000),
        ("youtube", "YouTube", 705_000_000),
        ("facebook", "Facebook", 520_000_000),
        ("amazon", "Amazon", 310_000_000),
        ("weather", "Weather", 150_000_000),
        ("netflix", "Netflix", 60_000_000),
        ("spotify", "Spotify", 45_000_000),
        ("canva", "Canva", 30_000_000),
        ("zillow", "Zillow", 20_000_000),
        ("etsy", "Etsy", 12_000_000),
        ("duolingo", "Duolingo", 8_000_000),
        ("notion", "Notion", 5_500_000),
        ("figma", "Figma", 4_000_000),
        ("obsidian", "Obsidian", 2_000_000),
        ("blender", "Blender", 1_500_000),
        ("procreate", "Procreate", 1_200_000),
        ("anki", "Anki", 900_000),
        ("godot", "Godot", 700_000),
    ])
}

pub fn engine_with(catalog: TermCatalog, seed: u64) -> RoundEngine<InMemoryScoreStore, StdRng> {
    RoundEngine::with_rng(catalog, InMemoryScoreStore::new(), StdRng::seed_from_u64(seed))
}

pub type TestController = GameController<SimulatedWallet, InMemoryScoreStore, StdRng>;

/// A controller wired to a simulated wallet and an in-memory score store.
pub struct TestContext {
    controller: TestController,
    wallet: SimulatedWallet,
    store: InMemoryScoreStore,
}

impl TestContext {
    pub fn new() -> Self {
        Self::on_chain(ChainId::BASE)
    }

    pub fn on_chain(chain: ChainId) -> Self {
        Self::with_parts(fixture_catalog(), InMemoryScoreStore::new(), chain)
    }

    pub fn with_parts(catalog: TermCatalog, store: InMemoryScoreStore, chain: ChainId) -> Self {
        let wallet = SimulatedWallet::on_chain(chain);
        let engine = RoundEngine::with_rng(catalog, store.clone(), StdRng::seed_from_u64(42))
            .with_reveal_delay(Duration::from_millis(900));
        let controller = GameController::new(engine, wallet.clone(), Network::base());
        Self {
            controller,
            wallet,
            store,
        }
    }

    pub fn controller(&mut self) -> &mut TestController {
        &mut self.controller
    }

    pub fn wallet(&self) -> SimulatedWallet {
        self.wallet.clone()
    }

    pub fn store(&self) -> InMemoryScoreStore {
        self.store.clone()
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
