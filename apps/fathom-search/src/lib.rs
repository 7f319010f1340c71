use std::{
	fs,
	path::{Path, PathBuf},
};

use clap::{Parser, Subcommand};
use color_eyre::eyre;
use serde::{Serialize, de::DeserializeOwned};
use tracing_subscriber::EnvFilter;

use fathom_service::{FathomService, RerankRequest, SearchRequest};

/// Package version, git sha, and target triple.
pub const VERSION: &str = concat!(
	env!("CARGO_PKG_VERSION"),
	"-",
	env!("VERGEN_GIT_SHA"),
	"-",
	env!("VERGEN_CARGO_TARGET_TRIPLE"),
);

#[derive(Debug, Parser)]
#[command(version = VERSION, rename_all = "kebab")]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Retrieve, fuse, and rerank a query.
	Search {
		#[arg(
			long,
			short = 'q',
			value_name = "TEXT",
			conflicts_with = "request",
			required_unless_present = "request"
		)]
		query: Option<String>,
		#[arg(long, value_name = "MS")]
		budget_ms: Option<u64>,
		#[arg(long, value_name = "N")]
		size: Option<u32>,
		#[arg(long)]
		debug: bool,
		/// JSON search request. Overrides the inline flags.
		#[arg(long, short = 'r', value_name = "FILE")]
		request: Option<PathBuf>,
	},
	/// Rerank an already fused candidate list read from a JSON request file.
	Rerank {
		#[arg(long, short = 'r', value_name = "FILE")]
		request: PathBuf,
	},
	/// Print counters and breaker state after running a request file through `search`.
	Stats {
		#[arg(long, short = 'r', value_name = "FILE")]
		request: Option<PathBuf>,
	},
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = fathom_config::load(&args.config)?;

	init_tracing(&config)?;

	let service = FathomService::new(config)?;

	match args.command {
		Command::Search { query, budget_ms, size, debug, request } => {
			let request = match request {
				Some(path) => read_json::<SearchRequest>(&path)?,
				None => inline_search(query, budget_ms, size, debug)?,
			};
			let response = service.search(request).await?;

			print_json(&response)
		},
		Command::Rerank { request } => {
			let request = read_json::<RerankRequest>(&request)?;
			let response = service.rerank(request).await?;

			print_json(&response)
		},
		Command::Stats { request } => {
			if let Some(path) = request {
				let request = read_json::<SearchRequest>(&path)?;

				if let Err(err) = service.search(request).await {
					tracing::warn!(error = %err, "Search failed while collecting stats.");
				}
			}

			print_json(&serde_json::json!({
				"metrics": service.metrics_snapshot(),
				"breakers": service.breaker_snapshots(),
			}))
		},
	}
}

fn inline_search(
	query: Option<String>,
	budget_ms: Option<u64>,
	size: Option<u32>,
	debug: bool,
) -> color_eyre::Result<SearchRequest> {
	let query = query.ok_or_else(|| eyre::eyre!("Either --query or --request is required."))?;
	let mut request = SearchRequest { query, budget_ms, ..SearchRequest::default() };

	request.options.size = size;
	request.options.debug = debug;

	Ok(request)
}

fn init_tracing(config: &fathom_config::Config) -> color_eyre::Result<()> {
	let filter =
		EnvFilter::try_new(&config.service.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

	Ok(())
}

fn read_json<T>(path: &Path) -> color_eyre::Result<T>
where
	T: DeserializeOwned,
{
	let raw = fs::read_to_string(path)
		.map_err(|err| eyre::eyre!("Failed to read {}: {err}", path.display()))?;

	Ok(serde_json::from_str(&raw)?)
}

fn print_json<T>(value: &T) -> color_eyre::Result<()>
where
	T: Serialize,
{
	let json = serde_json::to_string_pretty(value)?;

	println!("{json}");

	Ok(())
}
