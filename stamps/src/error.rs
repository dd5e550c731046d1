//! # Error Module.
//!
//! This module features the `StampError` enum for error handling throughout the project.

use thiserror::Error;

/// The crate-wide error variants.
#[derive(Debug, Error)]
pub enum StampError {
	/// History replay was cancelled before completion
	#[error("CancelledError: {0}")]
	CancelledError(String),

	/// Configuration error
	#[error("ConfigurationError: {0}")]
	ConfigurationError(String),

	/// File read/write error
	#[error("FileIOError: {0}")]
	FileIOError(String),

	/// Input/output error
	#[error("IOError: {0}")]
	IOError(std::io::Error),

	/// Parsing error
	#[error("ParsingError: {0}")]
	ParsingError(String),

	/// The persisted graph snapshot is missing or corrupt
	#[error("SnapshotError: {0}")]
	SnapshotError(String),

	/// Transcript source error
	#[error("TranscriptError: {0}")]
	TranscriptError(String),

	/// The reputation system has no unique solution
	#[error("UnsolvableSystem: {0}")]
	UnsolvableSystem(String),

	/// Validation error
	#[error("ValidationError: {0}")]
	ValidationError(String),
}
