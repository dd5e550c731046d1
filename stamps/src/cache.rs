//! # Score Cache Module.
//!
//! Read-only view of the last completed solve. Replaced wholesale after every
//! recompute, never patched.

use crate::{
	gate::Reputation,
	solver::{ParticipantIndex, Solution},
	storage::ScoreRecord,
};

/// Scores and stamps from one graph snapshot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScoreCache {
	index: ParticipantIndex,
	scores: Vec<f64>,
	total_weight: i64,
}

impl ScoreCache {
	/// A cache that knows no participant.
	pub fn empty() -> Self {
		Self::default()
	}

	/// Wraps a solution computed from a graph whose total signed weight is
	/// `total_weight`.
	pub fn new(solution: Solution, total_weight: i64) -> Self {
		let Solution { index, scores, .. } = solution;
		Self { index, scores, total_weight }
	}

	/// Score of the participant, 0.0 if unknown.
	pub fn score(&self, id: &str) -> f64 {
		self.index.position(id).and_then(|pos| self.scores.get(pos)).copied().unwrap_or(0.0)
	}

	/// Stamps of the participant, 0.0 if unknown.
	pub fn stamps(&self, id: &str) -> f64 {
		self.score(id) * self.total_weight as f64
	}

	/// Total signed weight of the scored graph.
	pub fn total_weight(&self) -> i64 {
		self.total_weight
	}

	/// Number of scored participants.
	pub fn len(&self) -> usize {
		self.scores.len()
	}

	/// Whether nothing has been scored yet.
	pub fn is_empty(&self) -> bool {
		self.scores.is_empty()
	}

	/// The participant index of the scored graph.
	pub fn index(&self) -> &ParticipantIndex {
		&self.index
	}

	/// One record per participant, in index order.
	pub fn records(&self) -> Vec<ScoreRecord> {
		self.index
			.ids()
			.iter()
			.zip(self.scores.iter())
			.map(|(id, &score)| ScoreRecord::new(id.clone(), score, score * self.total_weight as f64))
			.collect()
	}
}

impl Reputation for ScoreCache {
	fn user_score(&self, id: &str) -> f64 {
		self.score(id)
	}

	fn user_stamps(&self, id: &str) -> f64 {
		self.stamps(id)
	}
}
