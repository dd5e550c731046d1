//! # History Module.
//!
//! Rebuilds the vote graph by replaying every historical endorsement from a
//! paged transcript. The replay works on a fresh graph and touches no engine
//! state; the result is only committed once the whole transcript was read.

use crate::{
	error::StampError,
	graph::{VoteEffect, VoteGraph},
	ingest::{ReactionLedger, VoteEvent},
	storage::{CSVFileStorage, EndorsementRecord, Storage},
	EngineConfig,
};
use log::{debug, info};
use std::{collections::VecDeque, future::Future, path::PathBuf, time::Duration};
pub use tokio_util::sync::CancellationToken;

/// Rows per page when paging a CSV transcript.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// A paged source of historical endorsements.
pub trait TranscriptSource {
	/// Fetches the next page, `None` once the transcript is exhausted.
	fn next_page(
		&mut self,
	) -> impl Future<Output = Result<Option<Vec<EndorsementRecord>>, StampError>> + Send;
}

/// Transcript backed by a CSV export with a `msgid,type,from,to` header.
pub struct CsvTranscript {
	rows: VecDeque<EndorsementRecord>,
	page_size: usize,
}

impl CsvTranscript {
	/// Reads the whole file and serves it in pages of `page_size` rows.
	pub fn open(filepath: PathBuf, page_size: usize) -> Result<Self, StampError> {
		let rows = CSVFileStorage::<EndorsementRecord>::new(filepath)
			.load()
			.map_err(|e| StampError::TranscriptError(e.to_string()))?;
		Ok(Self::from_records(rows, page_size))
	}

	/// Serves the given records in pages of `page_size` rows.
	pub fn from_records(rows: Vec<EndorsementRecord>, page_size: usize) -> Self {
		Self { rows: rows.into(), page_size: page_size.max(1) }
	}

	/// Rows not served yet.
	pub fn remaining(&self) -> usize {
		self.rows.len()
	}
}

impl TranscriptSource for CsvTranscript {
	async fn next_page(&mut self) -> Result<Option<Vec<EndorsementRecord>>, StampError> {
		if self.rows.is_empty() {
			return Ok(None);
		}
		let count = self.page_size.min(self.rows.len());
		Ok(Some(self.rows.drain(..count).collect()))
	}
}

/// Counters of a finished rebuild.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RebuildReport {
	/// Pages read from the transcript.
	pub pages: usize,
	/// Endorsements added to the graph.
	pub applied: usize,
	/// Endorsements skipped.
	pub ignored: usize,
	/// Whether the rebuilt graph was rescored.
	pub rescored: bool,
}

/// A fully replayed graph awaiting commit.
#[derive(Clone, Debug)]
pub struct Replay {
	/// The rebuilt graph.
	pub graph: VoteGraph,
	/// Reactions seen during the replay.
	pub ledger: ReactionLedger,
	/// Replay counters.
	pub report: RebuildReport,
}

/// Replays `source` into a fresh graph.
///
/// Cancellation is checked before every page and interrupts a pending page
/// fetch or the `config.page_delay_ms` pause between pages.
pub async fn replay<S: TranscriptSource>(
	config: &EngineConfig, source: &mut S, token: &CancellationToken,
) -> Result<Replay, StampError> {
	let mut graph = VoteGraph::new(config);
	let mut ledger = ReactionLedger::new();
	let mut report = RebuildReport::default();
	let delay = Duration::from_millis(config.page_delay_ms);

	loop {
		if token.is_cancelled() {
			return Err(cancelled(report.pages));
		}

		let page = tokio::select! {
			biased;
			_ = token.cancelled() => return Err(cancelled(report.pages)),
			page = source.next_page() => match page? {
				Some(page) => page,
				None => break,
			},
		};
		report.pages += 1;

		for record in page {
			let kind = match config.kind_for_name(&record.kind) {
				Some(kind) => kind,
				None => {
					report.ignored += 1;
					continue;
				},
			};
			let event = VoteEvent::add(kind, &record.from_id, &record.to_id)
				.with_message(&record.message_id);

			if ledger.check(&event).is_some() {
				debug!("Skipping duplicate endorsement {:?}", record);
				report.ignored += 1;
				continue;
			}

			match graph.add_vote(kind, &record.from_id, &record.to_id, false) {
				VoteEffect::Applied => {
					ledger.record(&event);
					report.applied += 1;
				},
				_ => report.ignored += 1,
			}
		}

		debug!("Replayed page {} ({} endorsements so far)", report.pages, report.applied);

		if !delay.is_zero() {
			tokio::select! {
				biased;
				_ = token.cancelled() => return Err(cancelled(report.pages)),
				_ = tokio::time::sleep(delay) => {},
			}
		}
	}

	info!(
		"Replayed {} endorsements from {} pages ({} ignored)",
		report.applied, report.pages, report.ignored
	);

	Ok(Replay { graph, ledger, report })
}

fn cancelled(pages: usize) -> StampError {
	StampError::CancelledError(format!("History replay cancelled after {} pages.", pages))
}
