//! # Ingest Module.
//!
//! Inbound endorsement events and the per-reaction ledger that keeps a
//! duplicated delivery from being counted twice.

use crate::{graph::VoteKind, EngineConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A validated endorsement event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteEvent {
	/// Message carrying the reaction, when known.
	pub message_id: Option<String>,
	/// Endorsement strength.
	pub kind: VoteKind,
	/// Endorsing participant.
	pub from_id: String,
	/// Endorsed participant.
	pub to_id: String,
	/// Whether the endorsement is being withdrawn.
	pub is_undo: bool,
}

impl VoteEvent {
	/// An endorsement being added.
	pub fn add(kind: VoteKind, from_id: &str, to_id: &str) -> Self {
		Self {
			message_id: None,
			kind,
			from_id: from_id.to_string(),
			to_id: to_id.to_string(),
			is_undo: false,
		}
	}

	/// An endorsement being withdrawn.
	pub fn remove(kind: VoteKind, from_id: &str, to_id: &str) -> Self {
		Self { is_undo: true, ..Self::add(kind, from_id, to_id) }
	}

	/// Attaches the message the reaction belongs to.
	pub fn with_message(mut self, message_id: &str) -> Self {
		self.message_id = Some(message_id.to_string());
		self
	}
}

/// A raw reaction as delivered by the chat listener.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionEvent {
	/// Message reacted to.
	pub message_id: String,
	/// Emoji name.
	pub emoji: String,
	/// Reacting participant.
	pub from_id: String,
	/// Author of the message.
	pub to_id: String,
	/// Whether the reaction was removed.
	pub removed: bool,
}

impl ReactionEvent {
	/// Maps the reaction to a vote event, `None` for unrecognized emoji.
	pub fn to_vote_event(&self, config: &EngineConfig) -> Option<VoteEvent> {
		let kind = config.kind_for_name(&self.emoji)?;
		let event = VoteEvent::add(kind, &self.from_id, &self.to_id).with_message(&self.message_id);
		Some(VoteEvent { is_undo: self.removed, ..event })
	}
}

/// Whether a reaction currently endorses its message's author.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndorsementState {
	/// No endorsement in effect.
	Unendorsed,
	/// Endorsement in effect.
	Endorsed,
}

/// Why an event left the graph untouched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
	/// The emoji is not an endorsement.
	UnrecognizedKind,
	/// The voter endorsed themselves.
	SelfEndorsement,
	/// The recipient is the reserved operator identity.
	OperatorEndorsement,
	/// The voter is the anchor.
	AnchorVote,
	/// The reaction was already endorsing.
	DuplicateAdd,
	/// The reaction was already withdrawn.
	DuplicateRemove,
}

/// Outcome of processing one event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
	/// The graph changed, was persisted and rescored.
	Applied,
	/// The graph changed and was persisted, but the recompute failed and the
	/// previous scores stay in effect.
	AppliedWithStaleScores,
	/// Nothing changed.
	Ignored(IgnoreReason),
}

impl Transition {
	/// Whether the graph changed.
	pub fn is_applied(&self) -> bool {
		!matches!(self, Transition::Ignored(_))
	}
}

type ReactionKey = (String, String, VoteKind);

/// Tracks the endorsement state of every reaction seen this session, keyed by
/// message, voter and kind.
///
/// A removal for a reaction the ledger has never seen is let through, since
/// the endorsement may predate the session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReactionLedger {
	states: HashMap<ReactionKey, EndorsementState>,
}

impl ReactionLedger {
	/// Creates an empty ledger.
	pub fn new() -> Self {
		Self::default()
	}

	fn key(event: &VoteEvent) -> Option<ReactionKey> {
		event
			.message_id
			.as_ref()
			.map(|message_id| (message_id.clone(), event.from_id.clone(), event.kind))
	}

	/// Returns the reason to drop the event, if it repeats the current state.
	pub fn check(&self, event: &VoteEvent) -> Option<IgnoreReason> {
		let state = Self::key(event).and_then(|key| self.states.get(&key).copied());
		match (state, event.is_undo) {
			(Some(EndorsementState::Endorsed), false) => Some(IgnoreReason::DuplicateAdd),
			(Some(EndorsementState::Unendorsed), true) => Some(IgnoreReason::DuplicateRemove),
			_ => None,
		}
	}

	/// Records the state the event leaves its reaction in.
	pub fn record(&mut self, event: &VoteEvent) {
		if let Some(key) = Self::key(event) {
			let state = match event.is_undo {
				true => EndorsementState::Unendorsed,
				false => EndorsementState::Endorsed,
			};
			self.states.insert(key, state);
		}
	}

	/// Current state of a reaction, if seen.
	pub fn state(&self, message_id: &str, from_id: &str, kind: VoteKind) -> Option<EndorsementState> {
		self.states.get(&(message_id.to_string(), from_id.to_string(), kind)).copied()
	}

	/// Number of reactions tracked.
	pub fn len(&self) -> usize {
		self.states.len()
	}

	/// Whether no reaction is tracked.
	pub fn is_empty(&self) -> bool {
		self.states.is_empty()
	}

	/// Forgets every reaction.
	pub fn clear(&mut self) {
		self.states.clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_reaction_mapping() {
		let config = EngineConfig::default();
		let reaction = ReactionEvent {
			message_id: "42".to_string(),
			emoji: "goldstamp".to_string(),
			from_id: "1001".to_string(),
			to_id: "1002".to_string(),
			removed: true,
		};

		let event = reaction.to_vote_event(&config).unwrap();
		assert_eq!(event, VoteEvent::remove(VoteKind::Strong, "1001", "1002").with_message("42"));

		let other = ReactionEvent { emoji: "thumbsup".to_string(), ..reaction };
		assert_eq!(other.to_vote_event(&config), None);
	}

	#[test]
	fn test_ledger_cycles_between_states() {
		let mut ledger = ReactionLedger::new();
		let add = VoteEvent::add(VoteKind::Base, "1001", "1002").with_message("42");
		let remove = VoteEvent::remove(VoteKind::Base, "1001", "1002").with_message("42");

		assert_eq!(ledger.check(&add), None);
		ledger.record(&add);
		assert_eq!(ledger.state("42", "1001", VoteKind::Base), Some(EndorsementState::Endorsed));
		assert_eq!(ledger.check(&add), Some(IgnoreReason::DuplicateAdd));

		assert_eq!(ledger.check(&remove), None);
		ledger.record(&remove);
		assert_eq!(ledger.check(&remove), Some(IgnoreReason::DuplicateRemove));
		assert_eq!(ledger.check(&add), None);
	}

	#[test]
	fn test_ledger_keys_include_kind() {
		let mut ledger = ReactionLedger::new();
		ledger.record(&VoteEvent::add(VoteKind::Base, "1001", "1002").with_message("42"));

		let strong = VoteEvent::add(VoteKind::Strong, "1001", "1002").with_message("42");
		assert_eq!(ledger.check(&strong), None);
		assert_eq!(ledger.len(), 1);
	}

	#[test]
	fn test_ledger_lets_unknown_removal_and_unkeyed_events_through() {
		let mut ledger = ReactionLedger::new();
		let unseen = VoteEvent::remove(VoteKind::Base, "1001", "1002").with_message("7");
		assert_eq!(ledger.check(&unseen), None);

		let unkeyed = VoteEvent::add(VoteKind::Base, "1001", "1002");
		ledger.record(&unkeyed);
		ledger.record(&unkeyed);
		assert_eq!(ledger.check(&unkeyed), None);
		assert!(ledger.is_empty());
	}
}
