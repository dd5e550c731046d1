//! # Stamps CLI
//!
//! This crate provides a CLI interface to use the `stamps` library.

#![warn(trivial_casts)]
#![deny(
	absolute_paths_not_starting_with_crate, deprecated, future_incompatible, missing_docs,
	nonstandard_style, unreachable_code, unreachable_patterns
)]
#![forbid(unsafe_code)]
#![deny(
	// Complexity
 	clippy::unnecessary_cast,
	clippy::needless_question_mark,
	// Pedantic
 	clippy::cast_lossless,
 	clippy::cast_possible_wrap,
	// Perf
	clippy::redundant_clone,
	// Restriction
 	clippy::panic,
	// Style
 	clippy::let_and_return,
 	clippy::needless_borrow
)]

mod cli;
mod fs;

use clap::Parser;
use cli::*;
use dotenv::dotenv;
use env_logger::{init_from_env, Env};
use fs::load_config;
use log::info;
use stamps::error::StampError;

#[tokio::main]
async fn main() -> Result<(), StampError> {
	dotenv().ok();
	init_from_env(Env::default().filter_or("LOG_LEVEL", "info"));
	let mut config = load_config()?;
	config.validate()?;

	match Cli::parse().mode {
		Mode::Import(import_data) => handle_import(config, import_data).await?,
		Mode::Init(init_data) => handle_init(config, init_data)?,
		Mode::Reset => handle_reset(config)?,
		Mode::Scores => handle_scores(config)?,
		Mode::Show => info!("Engine config:\n{:#?}", config),
		Mode::Stamps(query_data) => handle_stamps(config, query_data)?,
		Mode::Update(update_data) => handle_update(&mut config, update_data)?,
		Mode::Verify => handle_verify(config)?,
		Mode::Vote(vote_data) => handle_vote(config, vote_data)?,
	};

	Ok(())
}
