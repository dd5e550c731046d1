//! # Stamps
//!
//! A library for turning peer endorsements into reputation.
//!
//! ## Main characteristics:
//!
//! **Propagating** - a participant's reputation flows on to the participants
//! they endorse, in proportion to the share of their total voting weight each
//! one received.
//!
//! **Anchored** - one distinguished anchor participant is pinned to a score of
//! 1 and seeds the whole system through a single fixed endorsement.
//!
//! **Consistent** - every event is applied, persisted and rescored before the
//! next one is accepted; readers never see a graph without its scores.
//!
//! ## Implementation
//!
//! Scores are the solution of a linear fixed-point system built from the vote
//! graph, solved directly rather than by walking the graph, so endorsement
//! cycles need no special treatment.

// Rustc
#![warn(trivial_casts)]
#![deny(
	absolute_paths_not_starting_with_crate, deprecated, future_incompatible, missing_docs,
	nonstandard_style, unreachable_code, unreachable_patterns
)]
#![forbid(unsafe_code)]
// Clippy
#![allow(clippy::tabs_in_doc_comments, clippy::needless_range_loop, clippy::new_without_default)]
#![deny(
	// Complexity
 	clippy::unnecessary_cast,
	clippy::needless_question_mark,
	clippy::clone_on_copy,
	// Pedantic
 	clippy::cast_possible_wrap,
	// Perf
	clippy::redundant_clone,
	// Restriction
 	clippy::panic,
	// Style
 	clippy::let_and_return,
 	clippy::needless_borrow
)]

pub mod cache;
pub mod error;
pub mod gate;
pub mod graph;
pub mod history;
pub mod ingest;
pub mod solver;
pub mod storage;

use cache::ScoreCache;
use error::StampError;
use gate::Reputation;
use graph::{VoteEffect, VoteGraph, VoteKind, VotesSnapshot};
use history::{replay, CancellationToken, RebuildReport, Replay, TranscriptSource};
use ingest::{IgnoreReason, ReactionEvent, ReactionLedger, Transition, VoteEvent};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use solver::{max_deviation, ReputationSolver, RESIDUAL_TOLERANCE};
use storage::Storage;

/// Engine configuration settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
	/// Participant pinned to a score of 1.
	pub anchor_id: String,
	/// Participant receiving the anchor's seed endorsement.
	pub primary_id: String,
	/// Reserved identity of the engine itself, which cannot be endorsed.
	pub operator_id: String,
	/// Weight of a strong endorsement in base units.
	pub strong_multiplier: i64,
	/// Share of a participant's score passed on through their endorsements.
	pub gamma: f64,
	/// Emoji name of a base endorsement.
	pub base_emoji: String,
	/// Emoji name of a strong endorsement.
	pub strong_emoji: String,
	/// Pause between transcript pages during a history replay.
	pub page_delay_ms: u64,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			anchor_id: "0".to_string(),
			primary_id: "181142785259208704".to_string(),
			operator_id: "736241264856662038".to_string(),
			strong_multiplier: 5,
			gamma: 1.0,
			base_emoji: "stamp".to_string(),
			strong_emoji: "goldstamp".to_string(),
			page_delay_ms: 0,
		}
	}
}

impl EngineConfig {
	/// Checks the settings are usable.
	pub fn validate(&self) -> Result<(), StampError> {
		if !(self.gamma > 0.0 && self.gamma <= 1.0) {
			return Err(StampError::ConfigurationError(format!(
				"Gamma must be in (0, 1], got {}.",
				self.gamma
			)));
		}
		if self.strong_multiplier <= 0 {
			return Err(StampError::ConfigurationError(format!(
				"Strong multiplier must be positive, got {}.",
				self.strong_multiplier
			)));
		}

		let ids = [&self.anchor_id, &self.primary_id, &self.operator_id];
		if ids.iter().any(|id| id.is_empty()) {
			return Err(StampError::ConfigurationError(
				"Anchor, primary and operator ids must not be empty.".to_string(),
			));
		}
		if ids[0] == ids[1] || ids[0] == ids[2] || ids[1] == ids[2] {
			return Err(StampError::ConfigurationError(
				"Anchor, primary and operator ids must be distinct.".to_string(),
			));
		}

		if self.base_emoji.is_empty() || self.base_emoji == self.strong_emoji {
			return Err(StampError::ConfigurationError(
				"Endorsement emoji must be distinct and not empty.".to_string(),
			));
		}

		Ok(())
	}

	/// Resolves an emoji name or kind name to a vote kind.
	pub fn kind_for_name(&self, name: &str) -> Option<VoteKind> {
		if name == self.base_emoji {
			Some(VoteKind::Base)
		} else if name == self.strong_emoji {
			Some(VoteKind::Strong)
		} else {
			name.parse().ok()
		}
	}
}

/// Float scores checked against the exact rational solve.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Verification {
	/// Participants scored.
	pub participants: usize,
	/// Whether the anchor scored exactly 1.
	pub anchor_pinned: bool,
	/// Residual of the float solve.
	pub residual: f64,
	/// Largest difference between float and exact scores.
	pub max_deviation: f64,
}

impl Verification {
	/// Whether every check passed.
	pub fn is_ok(&self) -> bool {
		self.anchor_pinned
			&& self.residual < RESIDUAL_TOLERANCE
			&& self.max_deviation < RESIDUAL_TOLERANCE
	}
}

/// The reputation engine: owns the vote graph, its scores and the snapshot
/// store, and applies one event at a time.
pub struct StampEngine<S> {
	config: EngineConfig,
	solver: ReputationSolver,
	graph: VoteGraph,
	cache: ScoreCache,
	ledger: ReactionLedger,
	store: S,
}

impl<S: Storage<VotesSnapshot, Err = StampError>> StampEngine<S> {
	/// Opens the engine from the persisted snapshot.
	///
	/// A missing or unreadable snapshot is an error: starting from an empty
	/// graph would discard every recorded endorsement.
	pub fn open(config: EngineConfig, store: S) -> Result<Self, StampError> {
		config.validate()?;

		let snapshot = store
			.load()
			.map_err(|e| StampError::SnapshotError(format!("Failed to load snapshot: {}", e)))?;
		let graph = VoteGraph::from_snapshot(&config, snapshot)?;
		info!("Loaded {} voters from snapshot", graph.snapshot().len());

		let mut engine = Self::with_graph(config, graph, store);
		engine.refresh();
		Ok(engine)
	}

	/// Creates an engine holding only the anchor seed and persists it,
	/// replacing any existing snapshot.
	pub fn initialize(config: EngineConfig, mut store: S) -> Result<Self, StampError> {
		config.validate()?;

		let graph = VoteGraph::new(&config);
		store.save(graph.snapshot())?;
		info!("Initialized snapshot with the anchor seed");

		let mut engine = Self::with_graph(config, graph, store);
		engine.refresh();
		Ok(engine)
	}

	fn with_graph(config: EngineConfig, graph: VoteGraph, store: S) -> Self {
		Self {
			solver: ReputationSolver::new(config.gamma),
			config,
			graph,
			cache: ScoreCache::empty(),
			ledger: ReactionLedger::new(),
			store,
		}
	}

	/// Returns the configuration.
	pub fn config(&self) -> &EngineConfig {
		&self.config
	}

	/// Returns the vote graph.
	pub fn graph(&self) -> &VoteGraph {
		&self.graph
	}

	/// Returns the scores of the last successful recompute.
	pub fn cache(&self) -> &ScoreCache {
		&self.cache
	}

	/// Returns the reaction ledger.
	pub fn ledger(&self) -> &ReactionLedger {
		&self.ledger
	}

	/// Score of a participant, 0.0 if unknown.
	pub fn user_score(&self, id: &str) -> f64 {
		self.cache.score(id)
	}

	/// Stamps of a participant, 0.0 if unknown.
	pub fn user_stamps(&self, id: &str) -> f64 {
		self.cache.stamps(id)
	}

	/// Applies an endorsement being added.
	pub fn on_add(&mut self, kind: VoteKind, from_id: &str, to_id: &str) -> Result<Transition, StampError> {
		self.handle_event(&VoteEvent::add(kind, from_id, to_id))
	}

	/// Applies an endorsement being withdrawn.
	pub fn on_remove(
		&mut self, kind: VoteKind, from_id: &str, to_id: &str,
	) -> Result<Transition, StampError> {
		self.handle_event(&VoteEvent::remove(kind, from_id, to_id))
	}

	/// Applies a raw reaction; reactions with other emoji are ignored.
	pub fn handle_reaction(&mut self, reaction: &ReactionEvent) -> Result<Transition, StampError> {
		match reaction.to_vote_event(&self.config) {
			Some(event) => self.handle_event(&event),
			None => {
				debug!("Ignoring reaction {:?}", reaction.emoji);
				Ok(Transition::Ignored(IgnoreReason::UnrecognizedKind))
			},
		}
	}

	/// Applies one event: mutates the graph, persists it and rescores.
	///
	/// If persisting fails the graph is restored to its state before the event
	/// and the error returned. If the
	/// recompute fails the vote stays committed and the previous scores remain
	/// in effect.
	pub fn handle_event(&mut self, event: &VoteEvent) -> Result<Transition, StampError> {
		if let Some(reason) = self.ledger.check(event) {
			warn!("Ignoring duplicate event {:?}", event);
			return Ok(Transition::Ignored(reason));
		}

		let previous = self.graph.clone();
		match self.graph.add_vote(event.kind, &event.from_id, &event.to_id, event.is_undo) {
			VoteEffect::Applied => {},
			VoteEffect::SelfEndorsement => {
				debug!("Ignoring self-endorsement by {}", event.from_id);
				return Ok(Transition::Ignored(IgnoreReason::SelfEndorsement));
			},
			VoteEffect::OperatorEndorsement => {
				debug!("Ignoring endorsement of the operator by {}", event.from_id);
				return Ok(Transition::Ignored(IgnoreReason::OperatorEndorsement));
			},
			VoteEffect::AnchorVote => {
				debug!("Ignoring vote cast by the anchor on {}", event.to_id);
				return Ok(Transition::Ignored(IgnoreReason::AnchorVote));
			},
		}

		if let Err(e) = self.store.save(self.graph.snapshot()) {
			self.graph = previous;
			error!("Failed to persist vote {:?}, reverted: {}", event, e);
			return Err(e);
		}
		self.ledger.record(event);

		debug!(
			"{} {} endorsement {} -> {}",
			if event.is_undo { "Withdrew" } else { "Added" },
			event.kind,
			event.from_id,
			event.to_id
		);
		let before = self.user_stamps(&event.to_id);
		if !self.refresh() {
			return Ok(Transition::AppliedWithStaleScores);
		}
		debug!("{} stamps: {} -> {}", event.to_id, before, self.user_stamps(&event.to_id));

		Ok(Transition::Applied)
	}

	/// Wipes the graph back to the anchor seed and persists it.
	pub fn reset_all(&mut self) -> Result<(), StampError> {
		warn!("Wiping stamp records");
		let mut graph = self.graph.clone();
		graph.reset();
		self.store.save(graph.snapshot())?;

		self.graph = graph;
		self.ledger.clear();
		self.refresh();
		Ok(())
	}

	/// Recomputes the scores from the current graph.
	pub fn recalculate(&mut self) -> Result<(), StampError> {
		let solution = self.solver.calculate(&self.graph)?;
		if solution.residual > RESIDUAL_TOLERANCE {
			warn!("Solve residual {} exceeds tolerance", solution.residual);
		}
		info!(
			"Recalculated scores of {} participants (total weight {})",
			solution.index.len(),
			self.graph.total_signed_weight()
		);
		self.cache = ScoreCache::new(solution, self.graph.total_signed_weight());
		Ok(())
	}

	/// Recomputes, logging a failure and keeping the previous scores.
	fn refresh(&mut self) -> bool {
		match self.recalculate() {
			Ok(()) => true,
			Err(e) => {
				error!("Score recompute failed, keeping previous scores: {}", e);
				false
			},
		}
	}

	/// Resets the graph and replays every endorsement of `source`.
	///
	/// The current graph and snapshot are only replaced once the replay
	/// completed; a cancelled or failed replay leaves them untouched.
	pub async fn rebuild_from_history<T: TranscriptSource>(
		&mut self, source: &mut T, token: &CancellationToken,
	) -> Result<RebuildReport, StampError> {
		let replay = replay(&self.config, source, token).await?;
		self.commit_rebuild(replay)
	}

	/// Persists and publishes a completed replay.
	pub fn commit_rebuild(&mut self, replay: Replay) -> Result<RebuildReport, StampError> {
		let Replay { graph, ledger, mut report } = replay;
		self.store.save(graph.snapshot())?;

		self.graph = graph;
		self.ledger = ledger;
		report.rescored = self.refresh();
		info!("Rebuilt graph from history: {:?}", report);

		Ok(report)
	}

	/// Cross-checks the cached scores against an exact rational solve.
	pub fn verify(&self) -> Result<Verification, StampError> {
		let solution = self.solver.calculate(&self.graph)?;
		let (index, exact) = self.solver.calculate_rational(&self.graph)?;
		if index != solution.index {
			return Err(StampError::ValidationError(
				"Float and rational solves indexed participants differently.".to_string(),
			));
		}

		let cached: Vec<f64> = index.ids().iter().map(|id| self.cache.score(id)).collect();

		Ok(Verification {
			participants: index.len(),
			anchor_pinned: self.cache.score(self.graph.anchor_id()) == 1.0,
			residual: solution.residual,
			max_deviation: max_deviation(&cached, &exact),
		})
	}
}

impl<S> Reputation for StampEngine<S> {
	fn user_score(&self, id: &str) -> f64 {
		self.cache.score(id)
	}

	fn user_stamps(&self, id: &str) -> f64 {
		self.cache.stamps(id)
	}
}
