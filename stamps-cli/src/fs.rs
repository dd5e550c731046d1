//! # Filesystem Actions Module.
//!
//! This module provides functionalities for filesystem actions.

use dotenv::{dotenv, var};
use stamps::{
	error::StampError,
	graph::VotesSnapshot,
	storage::{JSONFileStorage, Storage},
	EngineConfig,
};
use std::{env::current_dir, path::PathBuf};

/// Library configuration file name.
pub const CONFIG_FILENAME: &str = "config";
/// Vote graph snapshot file name.
pub const SNAPSHOT_FILENAME: &str = "stamps";
/// Score report file name.
pub const SCORES_FILENAME: &str = "scores";

/// Enum representing the possible file extensions.
pub enum FileType {
	/// CSV file.
	Csv,
	/// JSON file.
	Json,
}

impl FileType {
	/// Converts the enum variant into its corresponding file extension.
	fn as_str(&self) -> &'static str {
		match self {
			FileType::Csv => "csv",
			FileType::Json => "json",
		}
	}
}

/// Retrieves the path to the `assets` directory.
pub fn get_assets_path() -> Result<PathBuf, StampError> {
	current_dir().map_err(StampError::IOError).map(|current_dir| {
		// Workaround for the tests running in the crate directory.
		#[cfg(test)]
		{
			current_dir.join("assets")
		}

		#[cfg(not(test))]
		{
			current_dir.join("stamps-cli/assets")
		}
	})
}

/// Helper function to get the path of a file in the `assets` directory.
pub fn get_file_path(file_name: &str, file_type: FileType) -> Result<PathBuf, StampError> {
	let assets_path = get_assets_path()?;
	Ok(assets_path.join(format!("{}.{}", file_name, file_type.as_str())))
}

/// Loads the configuration file.
pub fn load_config() -> Result<EngineConfig, StampError> {
	let filepath = get_file_path(CONFIG_FILENAME, FileType::Json)?;
	JSONFileStorage::<EngineConfig>::new(filepath).load()
}

/// Saves the configuration file.
pub fn save_config(config: &EngineConfig) -> Result<(), StampError> {
	let filepath = get_file_path(CONFIG_FILENAME, FileType::Json)?;
	JSONFileStorage::<EngineConfig>::new(filepath).save(config)
}

/// Path of the vote graph snapshot, `STAMPS_SNAPSHOT` overriding the default.
pub fn snapshot_path() -> Result<PathBuf, StampError> {
	dotenv().ok();
	match var("STAMPS_SNAPSHOT") {
		Ok(path) => Ok(PathBuf::from(path)),
		Err(_) => get_file_path(SNAPSHOT_FILENAME, FileType::Json),
	}
}

/// Snapshot storage at `snapshot_path`.
pub fn snapshot_storage() -> Result<JSONFileStorage<VotesSnapshot>, StampError> {
	snapshot_path().map(JSONFileStorage::new)
}
