//! # Storage Module.
//!
//! This module contains the storage trait, its file-backed implementations and
//! the record types written to and read from disk.

use crate::error::StampError;
use csv::{ReaderBuilder, WriterBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{ser::PrettyFormatter, Serializer};
use std::{
	fs::{self, File},
	io::{BufReader, Write},
	marker::PhantomData,
	path::PathBuf,
};

/// The main trait to be implemented by different storage types.
pub trait Storage<T> {
	/// The error type.
	type Err;

	/// Loads data from storage.
	fn load(&self) -> Result<T, Self::Err>;
	/// Replaces the stored data.
	fn save(&mut self, data: &T) -> Result<(), Self::Err>;
}

/// The `CSVFileStorage` struct persists and retrieves rows of records to and
/// from a CSV file with a header line.
///
/// # Examples
///
/// ```no_run
/// use stamps::storage::{CSVFileStorage, ScoreRecord, Storage};
/// use std::path::PathBuf;
///
/// let mut storage = CSVFileStorage::<ScoreRecord>::new(PathBuf::from("scores.csv"));
/// let rows = vec![ScoreRecord::new("1001".to_string(), 0.5, 3.0)];
///
/// storage.save(&rows).unwrap();
/// assert_eq!(storage.load().unwrap(), rows);
/// ```
pub struct CSVFileStorage<T> {
	filepath: PathBuf,
	phantom: PhantomData<T>,
}

impl<T> CSVFileStorage<T> {
	/// Creates a new CSVFileStorage.
	pub fn new(filepath: PathBuf) -> Self {
		Self { filepath, phantom: PhantomData }
	}

	/// Returns the path to the file.
	pub fn filepath(&self) -> &PathBuf {
		&self.filepath
	}
}

impl<T: Serialize + DeserializeOwned> Storage<Vec<T>> for CSVFileStorage<T> {
	type Err = StampError;

	fn load(&self) -> Result<Vec<T>, StampError> {
		let file = File::open(&self.filepath).map_err(StampError::IOError)?;
		let mut reader = ReaderBuilder::new().trim(csv::Trim::All).from_reader(BufReader::new(file));

		reader
			.deserialize()
			.map(|result| result.map_err(|e| StampError::FileIOError(e.to_string())))
			.collect()
	}

	fn save(&mut self, data: &Vec<T>) -> Result<(), StampError> {
		let mut writer = WriterBuilder::new()
			.from_path(&self.filepath)
			.map_err(|e| StampError::FileIOError(e.to_string()))?;

		for record in data {
			writer.serialize(record).map_err(|e| StampError::FileIOError(e.to_string()))?;
		}

		writer.flush().map_err(|e| StampError::FileIOError(e.to_string()))
	}
}

/// The `JSONFileStorage` struct persists a single value as a tab-indented JSON
/// document.
///
/// Saves go through a sibling temporary file that is renamed over the target,
/// so readers only ever see a complete document.
pub struct JSONFileStorage<T> {
	filepath: PathBuf,
	phantom: PhantomData<T>,
}

impl<T> JSONFileStorage<T> {
	/// Creates a new JSONFileStorage.
	pub fn new(filepath: PathBuf) -> Self {
		Self { filepath, phantom: PhantomData }
	}

	/// Returns the path to the file.
	pub fn filepath(&self) -> &PathBuf {
		&self.filepath
	}

	/// Whether the file exists.
	pub fn exists(&self) -> bool {
		self.filepath.is_file()
	}

	fn temp_path(&self) -> PathBuf {
		let mut name = self.filepath.file_name().map(|name| name.to_os_string()).unwrap_or_default();
		name.push(".tmp");
		self.filepath.with_file_name(name)
	}
}

impl<T: Serialize + DeserializeOwned> Storage<T> for JSONFileStorage<T> {
	type Err = StampError;

	fn load(&self) -> Result<T, Self::Err> {
		let file = File::open(&self.filepath).map_err(StampError::IOError)?;
		serde_json::from_reader(BufReader::new(file))
			.map_err(|e| StampError::ParsingError(e.to_string()))
	}

	fn save(&mut self, data: &T) -> Result<(), Self::Err> {
		let mut buffer = Vec::new();
		let mut serializer =
			Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(b"\t"));
		data.serialize(&mut serializer).map_err(|e| StampError::ParsingError(e.to_string()))?;

		let temp_path = self.temp_path();
		let mut file = File::create(&temp_path).map_err(StampError::IOError)?;
		file.write_all(&buffer).map_err(StampError::IOError)?;
		file.sync_all().map_err(StampError::IOError)?;

		fs::rename(&temp_path, &self.filepath).map_err(StampError::IOError)
	}
}

/// One historical endorsement, as found in transcripts and bulk imports.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndorsementRecord {
	/// Message the endorsement was attached to.
	#[serde(rename = "msgid")]
	pub message_id: String,
	/// Emoji name or vote kind.
	#[serde(rename = "type")]
	pub kind: String,
	/// Endorsing participant.
	#[serde(rename = "from")]
	pub from_id: String,
	/// Endorsed participant.
	#[serde(rename = "to")]
	pub to_id: String,
}

impl EndorsementRecord {
	/// Creates a new endorsement record.
	pub fn new(message_id: &str, kind: &str, from_id: &str, to_id: &str) -> Self {
		Self {
			message_id: message_id.to_string(),
			kind: kind.to_string(),
			from_id: from_id.to_string(),
			to_id: to_id.to_string(),
		}
	}
}

/// Score record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
	/// The participant id.
	participant: String,
	/// The participant's score.
	score: f64,
	/// The participant's stamps.
	stamps: f64,
}

impl ScoreRecord {
	/// Creates a new score record.
	pub fn new(participant: String, score: f64, stamps: f64) -> Self {
		Self { participant, score, stamps }
	}

	/// Returns the participant id.
	pub fn participant(&self) -> &String {
		&self.participant
	}

	/// Returns the score.
	pub fn score(&self) -> f64 {
		self.score
	}

	/// Returns the stamps.
	pub fn stamps(&self) -> f64 {
		self.stamps
	}
}

#[cfg(test)]
mod tests {
	use crate::{
		graph::{VoteGraph, VoteKind, VoteRecord, VotesSnapshot},
		storage::*,
		EngineConfig,
	};
	use rand::{rngs::StdRng, Rng, SeedableRng};
	use std::{collections::BTreeMap, fs};

	#[test]
	fn test_csv_file_storage() {
		let dir = tempfile::tempdir().unwrap();
		let mut csv_storage = CSVFileStorage::<ScoreRecord>::new(dir.path().join("scores.csv"));

		let content = vec![
			ScoreRecord::new("0".to_string(), 1.0, 12.0),
			ScoreRecord::new("1001".to_string(), 0.25, 3.0),
		];

		assert!(csv_storage.save(&content).is_ok());

		let records = csv_storage.load().unwrap();
		assert_eq!(records, content);
	}

	#[test]
	fn test_endorsement_csv_uses_export_header() {
		let dir = tempfile::tempdir().unwrap();
		let filepath = dir.path().join("stamps.csv");
		fs::write(&filepath, "msgid,type,from,to\n42,goldstamp,1001,1002\n43, stamp ,1003,1001\n")
			.unwrap();

		let records = CSVFileStorage::<EndorsementRecord>::new(filepath).load().unwrap();

		assert_eq!(
			records,
			vec![
				EndorsementRecord::new("42", "goldstamp", "1001", "1002"),
				EndorsementRecord::new("43", "stamp", "1003", "1001"),
			]
		);
	}

	#[test]
	fn test_json_snapshot_round_trip() {
		let dir = tempfile::tempdir().unwrap();
		let filepath = dir.path().join("stamps.json");
		let mut json_storage = JSONFileStorage::<VotesSnapshot>::new(filepath.clone());

		let mut graph = VoteGraph::new(&EngineConfig::default());
		graph.add_vote(VoteKind::Strong, "1001", "1002", false);
		graph.add_vote(VoteKind::Base, "1002", "1003", false);
		graph.add_vote(VoteKind::Base, "1002", "1003", true);

		json_storage.save(graph.snapshot()).unwrap();
		let loaded = json_storage.load().unwrap();

		assert_eq!(&loaded, graph.snapshot());
		assert!(!filepath.with_file_name("stamps.json.tmp").exists());
		let text = fs::read_to_string(&filepath).unwrap();
		assert!(text.contains("\n\t\"0\": {"));
	}

	#[test]
	fn test_json_round_trips_random_graphs() {
		let dir = tempfile::tempdir().unwrap();
		let config = EngineConfig::default();
		let mut json_storage = JSONFileStorage::<VotesSnapshot>::new(dir.path().join("stamps.json"));
		let mut rng = StdRng::seed_from_u64(11);

		for _ in 0..20 {
			let mut graph = VoteGraph::new(&config);
			for _ in 0..rng.gen_range(0..50) {
				let from = format!("{}", 1000 + rng.gen_range(0..10));
				let to = format!("{}", 1000 + rng.gen_range(0..10));
				let kind = if rng.gen_bool(0.3) { VoteKind::Strong } else { VoteKind::Base };
				graph.add_vote(kind, &from, &to, rng.gen_bool(0.25));
			}

			json_storage.save(graph.snapshot()).unwrap();
			let loaded = json_storage.load().unwrap();

			assert_eq!(&loaded, graph.snapshot());
			assert_eq!(VoteGraph::from_snapshot(&config, loaded).unwrap(), graph);
		}
	}

	#[test]
	fn test_json_reads_legacy_snapshot() {
		let dir = tempfile::tempdir().unwrap();
		let filepath = dir.path().join("stamps.json");
		fs::write(
			&filepath,
			"{\"0\": {\"votecount\": 1, \"votes\": {\"181142785259208704\": 1}}, \
			 \"1001\": {\"votecount\": 6, \"votes\": {\"1002\": 5, \"1003\": 1}}}",
		)
		.unwrap();

		let loaded = JSONFileStorage::<VotesSnapshot>::new(filepath).load().unwrap();

		assert_eq!(
			loaded.get("1001"),
			Some(&VoteRecord {
				votecount: 6,
				votes: BTreeMap::from([("1002".to_string(), 5), ("1003".to_string(), 1)]),
			})
		);
	}

	#[test]
	fn test_json_load_failures() {
		let dir = tempfile::tempdir().unwrap();
		let missing = JSONFileStorage::<VotesSnapshot>::new(dir.path().join("missing.json"));
		assert!(matches!(missing.load(), Err(StampError::IOError(_))));

		let filepath = dir.path().join("broken.json");
		fs::write(&filepath, "{\"0\": {\"votecount\": ").unwrap();
		let broken = JSONFileStorage::<VotesSnapshot>::new(filepath);
		assert!(matches!(broken.load(), Err(StampError::ParsingError(_))));
	}
}
