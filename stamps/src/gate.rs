//! # Gating Module.
//!
//! The narrow read-only interface privilege checks consult, and the threshold
//! helpers built on it.

use std::collections::BTreeSet;

/// Stamps a reply needs from its approvers before it is posted.
pub const POSTING_THRESHOLD: f64 = 30.0;

/// Read access to participant reputation.
pub trait Reputation {
	/// Normalized score of the participant, 0.0 if unknown.
	fn user_score(&self, id: &str) -> f64;
	/// Stamps of the participant, 0.0 if unknown.
	fn user_stamps(&self, id: &str) -> f64;
}

/// Whether the participant holds strictly more than `threshold` stamps.
pub fn meets_threshold<R: Reputation + ?Sized>(reputation: &R, id: &str, threshold: f64) -> bool {
	reputation.user_stamps(id) > threshold
}

/// Sum of the stamps of every distinct approver.
pub fn approval_total<R, I, T>(reputation: &R, approvers: I) -> f64
where
	R: Reputation + ?Sized,
	I: IntoIterator<Item = T>,
	T: AsRef<str>,
{
	let distinct: BTreeSet<String> =
		approvers.into_iter().map(|approver| approver.as_ref().to_string()).collect();
	distinct.iter().map(|approver| reputation.user_stamps(approver)).sum()
}

/// Whether the approvals on a reply are enough to post it.
pub fn approved_for_posting<R, I, T>(reputation: &R, approvers: I) -> bool
where
	R: Reputation + ?Sized,
	I: IntoIterator<Item = T>,
	T: AsRef<str>,
{
	approval_total(reputation, approvers) > POSTING_THRESHOLD
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	struct Fixed(HashMap<&'static str, f64>);

	impl Reputation for Fixed {
		fn user_score(&self, id: &str) -> f64 {
			self.user_stamps(id) / 100.0
		}

		fn user_stamps(&self, id: &str) -> f64 {
			self.0.get(id).copied().unwrap_or(0.0)
		}
	}

	fn reputation() -> Fixed {
		Fixed(HashMap::from([("alice", 20.0), ("bob", 12.5), ("carol", 0.0)]))
	}

	#[test]
	fn test_threshold_is_strict() {
		let reputation = reputation();
		assert!(meets_threshold(&reputation, "alice", 0.0));
		assert!(!meets_threshold(&reputation, "carol", 0.0));
		assert!(!meets_threshold(&reputation, "nobody", 0.0));
		assert!(!meets_threshold(&reputation, "alice", 20.0));
	}

	#[test]
	fn test_approvals_count_each_approver_once() {
		let reputation = reputation();
		assert_eq!(approval_total(&reputation, ["alice", "alice", "bob"]), 32.5);
		assert!(approved_for_posting(&reputation, vec!["alice", "bob"]));
		assert!(!approved_for_posting(&reputation, vec!["alice", "alice"]));
		assert_eq!(approval_total(&reputation, Vec::<String>::new()), 0.0);
	}
}
