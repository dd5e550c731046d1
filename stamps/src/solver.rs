//! # Reputation Solver Module.
//!
//! Scores are the solution of the linear fixed point
//!
//! `score[i] = Σ_j gamma * (votes[j][i] / votecount[j]) * score[j]`
//!
//! with the anchor's row replaced by `score[anchor] = 1`. The system is solved
//! directly, so cycles in the endorsement graph need no special handling.

use crate::{error::StampError, graph::VoteGraph};
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, ToPrimitive, Zero};
use std::collections::HashMap;

/// Largest residual `|A·x − B|` accepted from a float solve.
pub const RESIDUAL_TOLERANCE: f64 = 1e-9;
/// Pivots smaller than this are treated as zero.
const PIVOT_EPSILON: f64 = 1e-12;

/// Stable bijection between participant ids and matrix rows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParticipantIndex {
	ids: Vec<String>,
	positions: HashMap<String, usize>,
}

impl ParticipantIndex {
	/// Indexes every participant of the graph: the anchor first, then the
	/// rest in sorted order.
	pub fn build(graph: &VoteGraph) -> Self {
		let anchor = graph.anchor_id();
		let mut ids = Vec::with_capacity(graph.participants().len());
		ids.push(anchor.to_string());
		ids.extend(graph.participants().iter().filter(|id| id.as_str() != anchor).cloned());

		let positions = ids.iter().enumerate().map(|(pos, id)| (id.clone(), pos)).collect();

		Self { ids, positions }
	}

	/// Row of the participant, if known.
	pub fn position(&self, id: &str) -> Option<usize> {
		self.positions.get(id).copied()
	}

	/// Participant at the given row.
	pub fn id(&self, pos: usize) -> Option<&str> {
		self.ids.get(pos).map(String::as_str)
	}

	/// Participant ids in row order.
	pub fn ids(&self) -> &[String] {
		&self.ids
	}

	/// Number of participants.
	pub fn len(&self) -> usize {
		self.ids.len()
	}

	/// Whether no participant is indexed.
	pub fn is_empty(&self) -> bool {
		self.ids.is_empty()
	}
}

/// A normalized edge: row `to`, column `from`, `weight / votecount`.
struct Edge {
	to: usize,
	from: usize,
	weight: i64,
	votecount: i64,
}

/// Collects the off-diagonal entries of the system.
fn edges(graph: &VoteGraph, index: &ParticipantIndex) -> Result<Vec<Edge>, StampError> {
	let mut edges = Vec::new();
	for (voter, recipient, weight) in graph.edges() {
		let votecount = graph.record(voter).map(|record| record.votecount).unwrap_or(0);
		if votecount == 0 {
			return Err(StampError::UnsolvableSystem(format!(
				"Voter {} has a zero votecount but casts weight {} on {}.",
				voter, weight, recipient
			)));
		}

		let lookup = |id: &str| {
			index.position(id).ok_or_else(|| {
				StampError::ValidationError(format!("Participant {} is not indexed.", id))
			})
		};
		let to = lookup(recipient)?;
		let from = lookup(voter)?;

		// The anchor row is pinned.
		if to == 0 || to == from {
			continue;
		}

		edges.push(Edge { to, from, weight, votecount });
	}

	Ok(edges)
}

/// The dense system `A·x = B` built from a graph.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearSystem {
	a: Vec<Vec<f64>>,
	b: Vec<f64>,
}

impl LinearSystem {
	/// Builds the system for the given graph and index.
	pub fn build(graph: &VoteGraph, index: &ParticipantIndex, gamma: f64) -> Result<Self, StampError> {
		let n = index.len();
		let mut a = vec![vec![0.0; n]; n];
		let mut b = vec![0.0; n];

		for edge in edges(graph, index)? {
			a[edge.to][edge.from] = gamma * edge.weight as f64 / edge.votecount as f64;
		}

		for i in 1..n {
			a[i][i] = -1.0;
		}
		if n > 0 {
			a[0][0] = 1.0;
			b[0] = 1.0;
		}

		Ok(Self { a, b })
	}

	/// The coefficient matrix.
	pub fn matrix(&self) -> &[Vec<f64>] {
		&self.a
	}

	/// The right-hand side.
	pub fn rhs(&self) -> &[f64] {
		&self.b
	}

	/// Largest absolute component of `A·x − B`.
	pub fn residual(&self, x: &[f64]) -> f64 {
		self.a
			.iter()
			.zip(self.b.iter())
			.map(|(row, b)| {
				let ax: f64 = row.iter().zip(x.iter()).map(|(a, x)| a * x).sum();
				(ax - b).abs()
			})
			.fold(0.0, f64::max)
	}

	/// Solves the system by Gaussian elimination with partial pivoting.
	///
	/// Row 0 is the anchor row `x[0] = 1`; it is substituted into the other
	/// rows before eliminating, which keeps the anchor score exactly 1.
	pub fn solve(&self) -> Result<Vec<f64>, StampError> {
		let n = self.b.len();
		if n == 0 {
			return Ok(Vec::new());
		}

		let anchor = self.b[0] / self.a[0][0];
		let m = n - 1;
		let mut rows: Vec<Vec<f64>> = (1..n).map(|i| self.a[i][1..].to_vec()).collect();
		let mut rhs: Vec<f64> = (1..n).map(|i| self.b[i] - self.a[i][0] * anchor).collect();

		for col in 0..m {
			let mut pivot = col;
			for row in col + 1..m {
				if rows[row][col].abs() > rows[pivot][col].abs() {
					pivot = row;
				}
			}
			if rows[pivot][col].abs() < PIVOT_EPSILON {
				return Err(StampError::UnsolvableSystem(format!(
					"Singular system at row {} of {}.",
					col + 1,
					n
				)));
			}
			rows.swap(col, pivot);
			rhs.swap(col, pivot);

			for row in col + 1..m {
				let factor = rows[row][col] / rows[col][col];
				if factor == 0.0 {
					continue;
				}
				for k in col..m {
					let delta = factor * rows[col][k];
					rows[row][k] -= delta;
				}
				let delta = factor * rhs[col];
				rhs[row] -= delta;
			}
		}

		let mut x = vec![0.0; n];
		x[0] = anchor;
		for row in (0..m).rev() {
			let tail: f64 = (row + 1..m).map(|k| rows[row][k] * x[k + 1]).sum();
			x[row + 1] = (rhs[row] - tail) / rows[row][row];
		}

		Ok(x)
	}
}

/// Scores computed from one graph snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct Solution {
	/// Participant rows.
	pub index: ParticipantIndex,
	/// One score per row.
	pub scores: Vec<f64>,
	/// Residual of the solve.
	pub residual: f64,
}

/// Builds and solves the reputation system.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ReputationSolver {
	gamma: f64,
}

impl ReputationSolver {
	/// Creates a solver with attenuation factor `gamma`.
	pub fn new(gamma: f64) -> Self {
		Self { gamma }
	}

	/// The attenuation factor.
	pub fn gamma(&self) -> f64 {
		self.gamma
	}

	/// Computes the score of every participant.
	pub fn calculate(&self, graph: &VoteGraph) -> Result<Solution, StampError> {
		let index = ParticipantIndex::build(graph);
		let system = LinearSystem::build(graph, &index, self.gamma)?;
		let scores = system.solve()?;
		let residual = system.residual(&scores);

		Ok(Solution { index, scores, residual })
	}

	/// Computes the scores exactly, using rational arithmetic.
	pub fn calculate_rational(
		&self, graph: &VoteGraph,
	) -> Result<(ParticipantIndex, Vec<BigRational>), StampError> {
		let gamma = BigRational::from_float(self.gamma).ok_or_else(|| {
			StampError::ConfigurationError(format!("Gamma {} is not finite.", self.gamma))
		})?;

		let index = ParticipantIndex::build(graph);
		let n = index.len();
		if n == 0 {
			return Ok((index, Vec::new()));
		}

		// Reduced system over rows/columns 1..n with the anchor substituted.
		let m = n - 1;
		let mut rows = vec![vec![BigRational::zero(); m]; m];
		let mut rhs = vec![BigRational::zero(); m];
		for i in 0..m {
			rows[i][i] = -BigRational::one();
		}
		for edge in edges(graph, &index)? {
			let coefficient = &gamma
				* BigRational::new(BigInt::from(edge.weight), BigInt::from(edge.votecount));
			if edge.from == 0 {
				rhs[edge.to - 1] = -coefficient;
			} else {
				rows[edge.to - 1][edge.from - 1] = coefficient;
			}
		}

		for col in 0..m {
			let pivot = (col..m).find(|&row| !rows[row][col].is_zero()).ok_or_else(|| {
				StampError::UnsolvableSystem(format!("Singular system at row {} of {}.", col + 1, n))
			})?;
			rows.swap(col, pivot);
			rhs.swap(col, pivot);

			for row in col + 1..m {
				if rows[row][col].is_zero() {
					continue;
				}
				let factor = &rows[row][col] / &rows[col][col];
				for k in col..m {
					let delta = &factor * &rows[col][k];
					rows[row][k] -= delta;
				}
				let delta = &factor * &rhs[col];
				rhs[row] -= delta;
			}
		}

		let mut x = vec![BigRational::zero(); n];
		x[0] = BigRational::one();
		for row in (0..m).rev() {
			let mut acc = rhs[row].clone();
			for k in row + 1..m {
				acc -= &rows[row][k] * &x[k + 1];
			}
			x[row + 1] = acc / &rows[row][row];
		}

		Ok((index, x))
	}
}

/// Largest absolute difference between float and exact scores.
pub fn max_deviation(scores: &[f64], exact: &[BigRational]) -> f64 {
	scores
		.iter()
		.zip(exact.iter())
		.map(|(score, exact)| match exact.to_f64() {
			Some(exact) => (score - exact).abs(),
			None => f64::INFINITY,
		})
		.fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{graph::VoteKind, EngineConfig};
	use rand::{rngs::StdRng, Rng, SeedableRng};

	const ALICE: &str = "1001";
	const BOB: &str = "1002";
	const CAROL: &str = "1003";

	fn config() -> EngineConfig {
		EngineConfig::default()
	}

	fn score(solution: &Solution, id: &str) -> f64 {
		solution.scores[solution.index.position(id).unwrap()]
	}

	#[test]
	fn test_index_places_anchor_first() {
		let config = EngineConfig { anchor_id: "zz-anchor".to_string(), ..config() };
		let mut graph = VoteGraph::new(&config);
		graph.add_vote(VoteKind::Base, ALICE, BOB, false);

		let index = ParticipantIndex::build(&graph);

		assert_eq!(index.id(0), Some("zz-anchor"));
		assert_eq!(index.len(), 4);
		assert_eq!(index.ids()[1..], [ALICE, BOB, config.primary_id.as_str()]);
		for (pos, id) in index.ids().iter().enumerate() {
			assert_eq!(index.position(id), Some(pos));
		}
		assert_eq!(index.position("unknown"), None);
	}

	#[test]
	fn test_seed_only_graph() {
		let config = config();
		let graph = VoteGraph::new(&config);

		let solution = ReputationSolver::new(1.0).calculate(&graph).unwrap();

		assert_eq!(score(&solution, &config.anchor_id), 1.0);
		assert_eq!(score(&solution, &config.primary_id), 1.0);
	}

	#[test]
	fn test_chain_passes_full_score() {
		// Anchor -> primary -> Bob, each the voter's only vote.
		let config = config();
		let mut graph = VoteGraph::new(&config);
		graph.add_vote(VoteKind::Base, &config.primary_id, BOB, false);

		let solution = ReputationSolver::new(1.0).calculate(&graph).unwrap();

		assert_eq!(score(&solution, &config.anchor_id), 1.0);
		assert!((score(&solution, &config.primary_id) - 1.0).abs() < 1e-12);
		assert!((score(&solution, BOB) - 1.0).abs() < 1e-12);
	}

	#[test]
	fn test_two_voters_add_linearly() {
		let config = config();
		let mut graph = VoteGraph::new(&config);
		graph.add_vote(VoteKind::Base, &config.primary_id, ALICE, false);
		graph.add_vote(VoteKind::Base, &config.primary_id, BOB, false);
		graph.add_vote(VoteKind::Base, ALICE, CAROL, false);
		graph.add_vote(VoteKind::Base, BOB, CAROL, false);

		let solution = ReputationSolver::new(1.0).calculate(&graph).unwrap();

		let expected = score(&solution, ALICE) + score(&solution, BOB);
		assert!((score(&solution, ALICE) - 0.5).abs() < 1e-12);
		assert!((score(&solution, CAROL) - expected).abs() < 1e-12);
	}

	#[test]
	fn test_gamma_attenuates() {
		let config = config();
		let mut graph = VoteGraph::new(&config);
		graph.add_vote(VoteKind::Base, &config.primary_id, ALICE, false);

		let solution = ReputationSolver::new(0.5).calculate(&graph).unwrap();

		assert!((score(&solution, &config.primary_id) - 0.5).abs() < 1e-12);
		assert!((score(&solution, ALICE) - 0.25).abs() < 1e-12);
	}

	#[test]
	fn test_cycle_is_solved() {
		// Primary and Alice endorse each other; gamma < 1 keeps it determinate.
		let config = config();
		let mut graph = VoteGraph::new(&config);
		graph.add_vote(VoteKind::Base, &config.primary_id, ALICE, false);
		graph.add_vote(VoteKind::Base, ALICE, &config.primary_id, false);

		let solver = ReputationSolver::new(0.5);
		let solution = solver.calculate(&graph).unwrap();

		// p = 0.5 + 0.5 a, a = 0.5 p
		assert!((score(&solution, &config.primary_id) - 2.0 / 3.0).abs() < 1e-12);
		assert!((score(&solution, ALICE) - 1.0 / 3.0).abs() < 1e-12);
		assert!(solution.residual < RESIDUAL_TOLERANCE);
	}

	#[test]
	fn test_zero_votecount_with_edges_is_unsolvable() {
		let config = config();
		let mut graph = VoteGraph::new(&config);
		graph.add_vote(VoteKind::Strong, ALICE, BOB, false);
		graph.add_vote(VoteKind::Strong, ALICE, CAROL, true);

		let result = ReputationSolver::new(1.0).calculate(&graph);
		assert!(matches!(result, Err(StampError::UnsolvableSystem(_))));
	}

	#[test]
	fn test_zero_votecount_without_edges_is_solvable() {
		let config = config();
		let mut graph = VoteGraph::new(&config);
		graph.add_vote(VoteKind::Base, ALICE, BOB, false);
		graph.add_vote(VoteKind::Base, ALICE, BOB, true);

		let solution = ReputationSolver::new(1.0).calculate(&graph).unwrap();
		assert_eq!(score(&solution, BOB), 0.0);
	}

	#[test]
	fn test_closed_unanchored_cycle_is_singular() {
		let config = config();
		let mut graph = VoteGraph::new(&config);
		graph.add_vote(VoteKind::Base, ALICE, BOB, false);
		graph.add_vote(VoteKind::Base, BOB, ALICE, false);

		let result = ReputationSolver::new(1.0).calculate(&graph);
		assert!(matches!(result, Err(StampError::UnsolvableSystem(_))));
	}

	#[test]
	fn test_random_graphs_satisfy_fixed_point() {
		let config = config();
		let mut rng = StdRng::seed_from_u64(42);
		let solver = ReputationSolver::new(0.85);

		for _ in 0..25 {
			let mut graph = VoteGraph::new(&config);
			let mut ids: Vec<String> = (0..12).map(|i| format!("u{}", i)).collect();
			ids.push(config.primary_id.clone());
			for _ in 0..60 {
				let from = &ids[rng.gen_range(0..ids.len())];
				let to = &ids[rng.gen_range(0..ids.len())];
				let kind = if rng.gen_bool(0.3) { VoteKind::Strong } else { VoteKind::Base };
				graph.add_vote(kind, from, to, false);
			}

			let index = ParticipantIndex::build(&graph);
			let system = LinearSystem::build(&graph, &index, solver.gamma()).unwrap();
			let x = system.solve().unwrap();

			assert_eq!(x[0], 1.0);
			assert!(system.residual(&x) < RESIDUAL_TOLERANCE);

			let (_, exact) = solver.calculate_rational(&graph).unwrap();
			assert!(max_deviation(&x, &exact) < 1e-9);
		}
	}

	#[test]
	fn test_rational_matches_exact_values() {
		let config = config();
		let mut graph = VoteGraph::new(&config);
		graph.add_vote(VoteKind::Base, &config.primary_id, ALICE, false);
		graph.add_vote(VoteKind::Strong, &config.primary_id, BOB, false);

		let (index, exact) = ReputationSolver::new(1.0).calculate_rational(&graph).unwrap();

		let at = |id: &str| exact[index.position(id).unwrap()].clone();
		assert_eq!(at(&config.anchor_id), BigRational::one());
		assert_eq!(at(ALICE), BigRational::new(1.into(), 6.into()));
		assert_eq!(at(BOB), BigRational::new(5.into(), 6.into()));
	}

	#[test]
	fn test_system_layout() {
		let config = config();
		let mut graph = VoteGraph::new(&config);
		graph.add_vote(VoteKind::Base, &config.primary_id, ALICE, false);

		let index = ParticipantIndex::build(&graph);
		let system = LinearSystem::build(&graph, &index, 1.0).unwrap();
		let primary = index.position(&config.primary_id).unwrap();
		let alice = index.position(ALICE).unwrap();

		assert_eq!(system.matrix()[0], vec![1.0, 0.0, 0.0]);
		assert_eq!(system.rhs(), &[1.0, 0.0, 0.0]);
		assert_eq!(system.matrix()[primary][0], 1.0);
		assert_eq!(system.matrix()[primary][primary], -1.0);
		assert_eq!(system.matrix()[alice][primary], 1.0);
		assert_eq!(system.matrix()[alice][alice], -1.0);
	}
}
