//! # Vote Graph Module.
//!
//! This module holds the signed, weighted endorsement edges between
//! participants together with the running per-voter totals.

use crate::{error::StampError, EngineConfig};
use serde::{Deserialize, Serialize};
use std::{
	collections::{BTreeMap, BTreeSet},
	fmt,
	str::FromStr,
};

/// Weight of a single base endorsement.
pub const BASE_WEIGHT: i64 = 1;

/// Endorsement strength.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteKind {
	/// Base unit endorsement.
	Base,
	/// Endorsement worth `strong_multiplier` base units.
	Strong,
}

impl VoteKind {
	/// Weight of one endorsement of this kind.
	pub fn weight(&self, strong_multiplier: i64) -> i64 {
		match self {
			VoteKind::Base => BASE_WEIGHT,
			VoteKind::Strong => BASE_WEIGHT * strong_multiplier,
		}
	}

	/// Returns the canonical name of the kind.
	pub fn as_str(&self) -> &'static str {
		match self {
			VoteKind::Base => "base",
			VoteKind::Strong => "strong",
		}
	}
}

impl FromStr for VoteKind {
	type Err = StampError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"base" => Ok(VoteKind::Base),
			"strong" => Ok(VoteKind::Strong),
			_ => Err(StampError::ParsingError(format!("Invalid vote kind \"{}\".", s))),
		}
	}
}

impl fmt::Display for VoteKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Voting record of a single voter.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
	/// Signed sum of every weight this voter has cast.
	pub votecount: i64,
	/// Signed accumulated weight cast on each recipient.
	pub votes: BTreeMap<String, i64>,
}

impl VoteRecord {
	/// Creates a record from a single vote.
	pub fn single(recipient: &str, weight: i64) -> Self {
		Self { votecount: weight, votes: BTreeMap::from([(recipient.to_string(), weight)]) }
	}

	/// Checks that `votecount` equals the sum of `votes`.
	pub fn is_consistent(&self) -> bool {
		self.votecount == self.votes.values().sum::<i64>()
	}
}

/// The durable form of the graph, keyed by voter id.
pub type VotesSnapshot = BTreeMap<String, VoteRecord>;

/// Effect of a vote submission on the graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteEffect {
	/// The weight was added.
	Applied,
	/// Rejected, the voter endorsed themselves.
	SelfEndorsement,
	/// Rejected, the recipient is the reserved operator identity.
	OperatorEndorsement,
	/// Rejected, the anchor only ever casts its seed vote.
	AnchorVote,
}

impl VoteEffect {
	/// Whether the graph changed.
	pub fn is_applied(&self) -> bool {
		matches!(self, VoteEffect::Applied)
	}
}

/// Mutable store of endorsement edges and per-voter totals.
#[derive(Clone, Debug, PartialEq)]
pub struct VoteGraph {
	anchor_id: String,
	primary_id: String,
	operator_id: String,
	strong_multiplier: i64,
	votes: VotesSnapshot,
	participants: BTreeSet<String>,
}

impl VoteGraph {
	/// Creates a graph holding only the anchor seed.
	pub fn new(config: &EngineConfig) -> Self {
		let mut graph = Self {
			anchor_id: config.anchor_id.clone(),
			primary_id: config.primary_id.clone(),
			operator_id: config.operator_id.clone(),
			strong_multiplier: config.strong_multiplier,
			votes: VotesSnapshot::new(),
			participants: BTreeSet::new(),
		};
		graph.reset();
		graph
	}

	/// Rebuilds a graph from a persisted snapshot.
	///
	/// Every voter record must satisfy `votecount == sum(votes)` and the anchor
	/// must hold exactly its seed vote, otherwise the snapshot is rejected as
	/// corrupt.
	pub fn from_snapshot(config: &EngineConfig, snapshot: VotesSnapshot) -> Result<Self, StampError> {
		let seed = VoteRecord::single(&config.primary_id, BASE_WEIGHT);
		if snapshot.get(&config.anchor_id) != Some(&seed) {
			return Err(StampError::SnapshotError(format!(
				"Anchor {} does not hold its seed vote on {}.",
				config.anchor_id, config.primary_id
			)));
		}
		if let Some((voter, record)) = snapshot.iter().find(|(_, record)| !record.is_consistent()) {
			return Err(StampError::SnapshotError(format!(
				"Voter {} has votecount {} but votes summing to {}.",
				voter,
				record.votecount,
				record.votes.values().sum::<i64>()
			)));
		}

		let mut graph = Self::new(config);
		graph.votes = snapshot;
		graph.collect_participants();
		Ok(graph)
	}

	/// Wipes every vote except the anchor seed.
	pub fn reset(&mut self) {
		self.votes.clear();
		self.votes.insert(
			self.anchor_id.clone(),
			VoteRecord::single(&self.primary_id, BASE_WEIGHT),
		);
		self.collect_participants();
	}

	/// Adds (or with `is_undo`, subtracts) one endorsement of `kind` cast by
	/// `from_id` on `to_id`.
	///
	/// Self-endorsements, endorsements of the operator and votes cast by the
	/// anchor are ignored.
	pub fn add_vote(&mut self, kind: VoteKind, from_id: &str, to_id: &str, is_undo: bool) -> VoteEffect {
		if from_id == self.anchor_id {
			return VoteEffect::AnchorVote;
		}
		if to_id == self.operator_id {
			return VoteEffect::OperatorEndorsement;
		}
		if to_id == from_id {
			return VoteEffect::SelfEndorsement;
		}

		let mut weight = kind.weight(self.strong_multiplier);
		if is_undo {
			weight = -weight;
		}

		self.participants.insert(from_id.to_string());
		self.participants.insert(to_id.to_string());

		let record = self.votes.entry(from_id.to_string()).or_default();
		record.votecount += weight;
		*record.votes.entry(to_id.to_string()).or_insert(0) += weight;

		VoteEffect::Applied
	}

	/// Returns the full voter table.
	pub fn snapshot(&self) -> &VotesSnapshot {
		&self.votes
	}

	/// Returns the record of a single voter.
	pub fn record(&self, voter: &str) -> Option<&VoteRecord> {
		self.votes.get(voter)
	}

	/// Signed weight `from_id` has cast on `to_id`.
	pub fn weight(&self, from_id: &str, to_id: &str) -> i64 {
		self.record(from_id).and_then(|record| record.votes.get(to_id)).copied().unwrap_or(0)
	}

	/// Every participant referenced by a vote, plus the anchor and primary.
	pub fn participants(&self) -> &BTreeSet<String> {
		&self.participants
	}

	/// The anchor participant id.
	pub fn anchor_id(&self) -> &str {
		&self.anchor_id
	}

	/// Sum of every voter's votecount.
	pub fn total_signed_weight(&self) -> i64 {
		self.votes.values().map(|record| record.votecount).sum()
	}

	/// Nonzero edges as `(voter, recipient, weight)`.
	pub fn edges(&self) -> impl Iterator<Item = (&str, &str, i64)> {
		self.votes.iter().flat_map(|(voter, record)| {
			record
				.votes
				.iter()
				.filter(|(_, &weight)| weight != 0)
				.map(move |(recipient, &weight)| (voter.as_str(), recipient.as_str(), weight))
		})
	}

	fn collect_participants(&mut self) {
		self.participants.clear();
		self.participants.insert(self.anchor_id.clone());
		self.participants.insert(self.primary_id.clone());
		for (voter, record) in &self.votes {
			self.participants.insert(voter.clone());
			self.participants.extend(record.votes.keys().cloned());
		}
	}
}
