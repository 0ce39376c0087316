//! Content Collaborator
//!
//! The engine asks the content store for "one location, optionally excluding
//! already-played ones" and nothing more. `LocationSource` is that seam;
//! `LocationCatalog` is the built-in realization backed by the game store,
//! with seeded selection so test runs are reproducible.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::core::geo::Coordinate;
use crate::store::{Complexity, GameStore, LocationId, LocationRecord};

/// A candidate location handed to the round engine. The coordinate stays
/// server-side; only `content_ref` ever reaches the client before scoring.
#[derive(Clone, Debug)]
pub struct Candidate {
    /// Location id.
    pub id: LocationId,
    /// True coordinate of the panorama.
    pub coordinate: Coordinate,
    /// Opaque reference to the panorama content.
    pub content_ref: String,
}

impl From<LocationRecord> for Candidate {
    fn from(record: LocationRecord) -> Self {
        Self {
            id: record.id,
            coordinate: record.coordinate,
            content_ref: record.content_ref,
        }
    }
}

/// Source of candidate locations.
///
/// Returns `None` when no location outside `exclude` exists; relaxing the
/// exclusion on a miss is the caller's decision, not the source's.
#[async_trait]
pub trait LocationSource: Send + Sync {
    /// Pick one location not in `exclude`.
    async fn candidate_location(&self, exclude: &BTreeSet<LocationId>) -> Option<Candidate>;
}

// =============================================================================
// SELECTION RNG
// =============================================================================

/// Xorshift128+ generator for candidate selection.
///
/// Seeded, so a catalog constructed with the same seed over the same
/// contents serves the same sequence - which keeps integration tests
/// reproducible without threading a rand handle everywhere.
#[derive(Clone, Debug)]
struct SelectionRng {
    state: [u64; 2],
}

impl SelectionRng {
    /// SplitMix64-initialized state, never all zeros.
    fn new(seed: u64) -> Self {
        let mut s = seed;
        let mut splitmix = || {
            s = s.wrapping_add(0x9E37_79B9_7F4A_7C15);
            let mut z = s;
            z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
            z ^ (z >> 31)
        };
        let state0 = splitmix();
        let state1 = splitmix();
        let state = if state0 == 0 && state1 == 0 { [1, 1] } else { [state0, state1] };
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);
        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);
        result
    }

    /// Uniform-ish index into a slice of length `len` (len > 0).
    fn next_index(&mut self, len: usize) -> usize {
        (self.next_u64() % len as u64) as usize
    }
}

// =============================================================================
// CATALOG
// =============================================================================

/// Catalog tuning.
#[derive(Clone, Copy, Debug)]
pub struct CatalogConfig {
    /// While a player has fewer than this many distinct locations behind
    /// them, easy locations are served first when any remain.
    pub easy_intro_plays: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self { easy_intro_plays: 5 }
    }
}

/// Store-backed location source with seeded random selection.
pub struct LocationCatalog {
    store: Arc<GameStore>,
    config: CatalogConfig,
    rng: Mutex<SelectionRng>,
}

impl LocationCatalog {
    /// Create a catalog over the shared store.
    pub fn new(store: Arc<GameStore>, config: CatalogConfig, seed: u64) -> Self {
        Self {
            store,
            config,
            rng: Mutex::new(SelectionRng::new(seed)),
        }
    }
}

#[async_trait]
impl LocationSource for LocationCatalog {
    async fn candidate_location(&self, exclude: &BTreeSet<LocationId>) -> Option<Candidate> {
        let mut pool: Vec<LocationRecord> = self
            .store
            .all_locations()
            .await
            .into_iter()
            .filter(|l| !exclude.contains(&l.id))
            .collect();
        if pool.is_empty() {
            return None;
        }

        // New players get easy panoramas while the catalog has them. The
        // exclusion set size counts distinct locations played, which tracks
        // games for the one-round-per-location selection the engine uses.
        if exclude.len() < self.config.easy_intro_plays {
            let easy: Vec<LocationRecord> = pool
                .iter()
                .filter(|l| l.complexity == Complexity::Easy)
                .cloned()
                .collect();
            if !easy.is_empty() {
                pool = easy;
            }
        }

        let mut rng = self.rng.lock().await;
        let pick = rng.next_index(pool.len());
        pool.into_iter().nth(pick).map(Candidate::from)
    }
}

// =============================================================================
// DEMO SEED
// =============================================================================

/// Seed a handful of well-known panoramas so a fresh server is playable.
pub async fn seed_demo_catalog(store: &GameStore) {
    let demo: [(LocationId, f64, f64, &str, Complexity); 8] = [
        (1, 48.8584, 2.2945, "pano:eiffel-tower", Complexity::Easy),
        (2, 40.6892, -74.0445, "pano:statue-of-liberty", Complexity::Easy),
        (3, 51.5007, -0.1246, "pano:big-ben", Complexity::Easy),
        (4, -33.8568, 151.2153, "pano:sydney-opera-house", Complexity::Normal),
        (5, 35.6595, 139.7005, "pano:shibuya-crossing", Complexity::Normal),
        (6, -22.9519, -43.2105, "pano:corcovado", Complexity::Normal),
        (7, 64.1466, -21.9426, "pano:reykjavik-harbor", Complexity::Hard),
        (8, -1.2921, 36.8219, "pano:nairobi-cbd", Complexity::Hard),
    ];
    for (id, lat, lng, content_ref, complexity) in demo {
        let Some(coordinate) = Coordinate::new(lat, lng) else { continue };
        store
            .insert_location(LocationRecord::new(id, coordinate, content_ref.into(), complexity))
            .await;
    }
}

// =============================================================================
// TESTS
// =============================================================================
