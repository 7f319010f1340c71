//! Shared fixtures for pipeline tests: a validated config and a small document corpus.

mod error;

pub use error::{Error, Result};

use serde_json::Map;
use time::{Date, Month, OffsetDateTime, Time};

use fathom_config::Config;
use fathom_providers::{ScoredDoc, SourceDoc};

pub const TEST_CONFIG: &str = include_str!("../fixtures/test_config.toml");

/// Parses and validates [`TEST_CONFIG`]. All provider endpoints point at an unroutable port.
pub fn test_config() -> Result<Config> {
	let mut cfg: Config = toml::from_str(TEST_CONFIG)?;

	fathom_config::normalize(&mut cfg);
	fathom_config::validate(&cfg)?;

	Ok(cfg)
}

/// Hits in the given order with strictly decreasing scores.
pub fn scored(doc_ids: &[&str]) -> Vec<ScoredDoc> {
	doc_ids
		.iter()
		.enumerate()
		.map(|(idx, doc_id)| ScoredDoc {
			doc_id: doc_id.to_string(),
			score: Some(10.0 - idx as f32 * 0.5),
		})
		.collect()
}

pub fn corpus() -> Vec<SourceDoc> {
	vec![
		doc(
			"d1",
			"Sonar Mapping of the Mariana Trench",
			&["Mariana Reyes"],
			(2024, Month::March, 1),
		),
		doc("d2", "Hydrothermal Vents Field Guide", &["Ken Takai"], (2019, Month::June, 12)),
		doc(
			"d3",
			"Abyssal Plains: A Survey",
			&["Ruth Okafor", "Li Wei"],
			(2022, Month::January, 5),
		),
		doc("d4", "Deep Sea Acoustics", &["Tolkien Hart"], (2015, Month::September, 30)),
		doc("d5", "Bioluminescence at Depth", &["Edith Widder"], (2023, Month::November, 18)),
		doc("d6", "Ocean Floor Sediments", &["Pat Moreno"], (2010, Month::April, 2)),
		SourceDoc { doc_id: "d7".to_string(), ..SourceDoc::default() },
	]
}

pub fn source(doc_id: &str) -> Option<SourceDoc> {
	corpus().into_iter().find(|doc| doc.doc_id == doc_id)
}

fn doc(doc_id: &str, title: &str, authors: &[&str], published: (i32, Month, u8)) -> SourceDoc {
	let (year, month, day) = published;
	let published_at = Date::from_calendar_date(year, month, day)
		.ok()
		.map(|date| date.with_time(Time::MIDNIGHT).assume_utc());

	SourceDoc {
		doc_id: doc_id.to_string(),
		title: Some(title.to_string()),
		authors: authors.iter().map(|author| author.to_string()).collect(),
		text: Some(format!("{title}. Field notes and measurements.")),
		published_at,
		metadata: Map::new(),
	}
}

/// Fixed clock for freshness-sensitive assertions.
pub fn fixed_now() -> OffsetDateTime {
	Date::from_calendar_date(2025, Month::January, 1)
		.map(|date| date.with_time(Time::MIDNIGHT).assume_utc())
		.unwrap_or(OffsetDateTime::UNIX_EPOCH)
}
