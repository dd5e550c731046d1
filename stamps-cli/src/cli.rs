//! # CLI Module.
//!
//! This module contains all CLI related data handling and conversions.

use crate::fs::{get_file_path, save_config, snapshot_storage, FileType, SCORES_FILENAME};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use stamps::{
	error::StampError,
	graph::{VoteKind, VotesSnapshot},
	history::{CancellationToken, CsvTranscript, DEFAULT_PAGE_SIZE},
	ingest::{Transition, VoteEvent},
	storage::{CSVFileStorage, JSONFileStorage, Storage},
	EngineConfig, StampEngine,
};
use std::path::PathBuf;

/// Engine backed by the JSON snapshot file.
pub type Engine = StampEngine<JSONFileStorage<VotesSnapshot>>;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
	#[command(subcommand)]
	pub mode: Mode,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Mode {
	/// Reset the graph and replay a CSV transcript. Requires 'ImportData'.
	Import(ImportData),
	/// Create a snapshot holding only the anchor seed.
	Init(InitData),
	/// Wipe every vote except the anchor seed.
	Reset,
	/// Calculate and save the scores of every participant.
	Scores,
	/// Display the current configuration.
	Show,
	/// Display a participant's score and stamps. Requires 'QueryData'.
	Stamps(QueryData),
	/// Update the configuration. Requires 'UpdateData'.
	Update(UpdateData),
	/// Cross-check the scores against an exact solve.
	Verify,
	/// Apply a single endorsement. Requires 'VoteData'.
	Vote(VoteData),
}

/// Import subcommand input.
#[derive(Args, Debug)]
pub struct ImportData {
	/// CSV file with a 'msgid,type,from,to' header.
	#[clap(long = "file")]
	file: Option<String>,
	/// Rows replayed per page.
	#[clap(long = "page-size")]
	page_size: Option<usize>,
}

/// Init subcommand input.
#[derive(Args, Debug)]
pub struct InitData {
	/// Overwrite an existing snapshot.
	#[clap(long = "force")]
	force: bool,
}

/// Query subcommand input.
#[derive(Args, Debug)]
pub struct QueryData {
	/// Participant id.
	#[clap(long = "id")]
	id: Option<String>,
}

/// Vote subcommand input.
#[derive(Args, Debug)]
pub struct VoteData {
	/// Endorsing participant id.
	#[clap(long = "from")]
	from: Option<String>,
	/// Endorsed participant id.
	#[clap(long = "to")]
	to: Option<String>,
	/// Endorsement kind (base, strong) or emoji name.
	#[clap(long = "kind")]
	kind: Option<String>,
	/// Message the endorsement is attached to.
	#[clap(long = "message")]
	message: Option<String>,
	/// Withdraw the endorsement instead of adding it.
	#[clap(long = "undo")]
	undo: bool,
}

/// Configuration update subcommand input.
#[derive(Args, Debug)]
pub struct UpdateData {
	/// Anchor participant id.
	#[clap(long = "anchor")]
	anchor_id: Option<String>,
	/// Primary participant id.
	#[clap(long = "primary")]
	primary_id: Option<String>,
	/// Reserved operator id.
	#[clap(long = "operator")]
	operator_id: Option<String>,
	/// Strong endorsement multiplier.
	#[clap(long = "multiplier")]
	strong_multiplier: Option<String>,
	/// Attenuation factor in (0, 1].
	#[clap(long = "gamma")]
	gamma: Option<String>,
	/// Base endorsement emoji name.
	#[clap(long = "base-emoji")]
	base_emoji: Option<String>,
	/// Strong endorsement emoji name.
	#[clap(long = "strong-emoji")]
	strong_emoji: Option<String>,
	/// Pause between replayed pages, in milliseconds.
	#[clap(long = "page-delay")]
	page_delay_ms: Option<String>,
}

impl VoteData {
	pub fn to_vote_event(&self, config: &EngineConfig) -> Result<VoteEvent, StampError> {
		let from = self
			.from
			.as_deref()
			.ok_or_else(|| StampError::ValidationError("Missing voter.".to_string()))?;

		let to = self
			.to
			.as_deref()
			.ok_or_else(|| StampError::ValidationError("Missing recipient.".to_string()))?;

		let kind: VoteKind = match self.kind.as_deref() {
			Some(name) => config.kind_for_name(name).ok_or_else(|| {
				StampError::ParsingError(format!("Unrecognized endorsement \"{}\".", name))
			})?,
			None => VoteKind::Base,
		};

		let event = match self.undo {
			true => VoteEvent::remove(kind, from, to),
			false => VoteEvent::add(kind, from, to),
		};

		Ok(match self.message.as_deref() {
			Some(message) => event.with_message(message),
			None => event,
		})
	}
}

/// Opens the engine from the snapshot.
pub fn open_engine(config: EngineConfig) -> Result<Engine, StampError> {
	StampEngine::open(config, snapshot_storage()?)
}

/// Handles the `import` command.
pub async fn handle_import(config: EngineConfig, data: ImportData) -> Result<(), StampError> {
	let file = data
		.file
		.as_deref()
		.ok_or_else(|| StampError::ValidationError("Missing transcript file.".to_string()))?;
	let mut transcript =
		CsvTranscript::open(PathBuf::from(file), data.page_size.unwrap_or(DEFAULT_PAGE_SIZE))?;
	let mut engine = open_engine(config)?;

	let token = CancellationToken::new();
	let ctrl_c = token.clone();
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			warn!("Cancelling import, the snapshot is left untouched.");
			ctrl_c.cancel();
		}
	});

	let report = engine.rebuild_from_history(&mut transcript, &token).await?;

	info!(
		"Imported {} endorsements ({} ignored) from {} pages.",
		report.applied, report.ignored, report.pages
	);

	Ok(())
}

/// Handles the `init` command.
pub fn handle_init(config: EngineConfig, data: InitData) -> Result<(), StampError> {
	let storage = snapshot_storage()?;
	if storage.exists() && !data.force {
		return Err(StampError::ValidationError(format!(
			"Snapshot \"{}\" already exists, use --force to overwrite it.",
			storage.filepath().display()
		)));
	}

	let path = storage.filepath().clone();
	StampEngine::initialize(config, storage)?;
	info!("Snapshot created at \"{}\".", path.display());

	Ok(())
}

/// Handles the `reset` command.
pub fn handle_reset(config: EngineConfig) -> Result<(), StampError> {
	open_engine(config)?.reset_all()
}

/// Handles the `scores` command.
pub fn handle_scores(config: EngineConfig) -> Result<(), StampError> {
	let engine = open_engine(config)?;
	let records = engine.cache().records();

	if records.is_empty() {
		return Err(StampError::UnsolvableSystem(
			"No scores could be calculated.".to_string(),
		));
	}

	let scores_fp = get_file_path(SCORES_FILENAME, FileType::Csv)?;
	let mut records_storage = CSVFileStorage::new(scores_fp);
	records_storage.save(&records)?;

	info!(
		"Scores saved at \"{}\".",
		records_storage.filepath().display()
	);

	Ok(())
}

/// Handles the `stamps` command.
pub fn handle_stamps(config: EngineConfig, data: QueryData) -> Result<(), StampError> {
	let id = data
		.id
		.as_deref()
		.ok_or_else(|| StampError::ValidationError("Missing participant id.".to_string()))?;
	let engine = open_engine(config)?;

	info!(
		"{}: score {}, {} stamps.",
		id,
		engine.user_score(id),
		engine.user_stamps(id)
	);

	Ok(())
}

/// Handles the `verify` command.
pub fn handle_verify(config: EngineConfig) -> Result<(), StampError> {
	let engine = open_engine(config)?;
	let verification = engine.verify()?;

	info!("Verification: {:#?}", verification);

	if !verification.is_ok() {
		return Err(StampError::ValidationError(
			"Scores failed verification.".to_string(),
		));
	}

	Ok(())
}

/// Handles the `vote` command.
pub fn handle_vote(config: EngineConfig, data: VoteData) -> Result<(), StampError> {
	let event = data.to_vote_event(&config)?;
	let mut engine = open_engine(config)?;

	match engine.handle_event(&event)? {
		Transition::Applied => info!(
			"{} now has {} stamps.",
			event.to_id,
			engine.user_stamps(&event.to_id)
		),
		Transition::AppliedWithStaleScores => {
			warn!("Vote saved, but the scores could not be recalculated.")
		},
		Transition::Ignored(reason) => warn!("Vote ignored: {:?}.", reason),
	}

	Ok(())
}

fn parse<T: std::str::FromStr>(value: &str, name: &str) -> Result<T, StampError>
where
	T::Err: std::fmt::Display,
{
	value.parse::<T>().map_err(|e| StampError::ParsingError(format!("Invalid {}: {}", name, e)))
}

/// Handles the CLI project configuration update.
pub fn handle_update(config: &mut EngineConfig, data: UpdateData) -> Result<(), StampError> {
	let mut updated = config.clone();

	if let Some(anchor_id) = data.anchor_id {
		updated.anchor_id = anchor_id;
	}

	if let Some(primary_id) = data.primary_id {
		updated.primary_id = primary_id;
	}

	if let Some(operator_id) = data.operator_id {
		updated.operator_id = operator_id;
	}

	if let Some(strong_multiplier) = data.strong_multiplier {
		updated.strong_multiplier = parse(&strong_multiplier, "multiplier")?;
	}

	if let Some(gamma) = data.gamma {
		updated.gamma = parse(&gamma, "gamma")?;
	}

	if let Some(base_emoji) = data.base_emoji {
		updated.base_emoji = base_emoji;
	}

	if let Some(strong_emoji) = data.strong_emoji {
		updated.strong_emoji = strong_emoji;
	}

	if let Some(page_delay_ms) = data.page_delay_ms {
		updated.page_delay_ms = parse(&page_delay_ms, "page delay")?;
	}

	updated.validate()?;
	*config = updated;

	save_config(config)
}
