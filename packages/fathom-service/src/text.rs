//! Query normalization shared by cache keys and the lexical fallback check.

use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

/// NFKC, lowercased, inner whitespace collapsed to single spaces.
pub fn normalize_query(query: &str) -> String {
	let folded: String = query.nfkc().flat_map(char::to_lowercase).collect();

	folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn query_tokens(query: &str) -> Vec<String> {
	normalize_query(query).unicode_words().map(str::to_string).collect()
}

pub fn is_single_token(query: &str) -> bool {
	query_tokens(query).len() == 1
}

/// Case-insensitive, NFKC-normalized substring test. `needle` must already be normalized.
pub fn contains_normalized(haystack: &str, needle: &str) -> bool {
	if needle.is_empty() {
		return false;
	}

	normalize_query(haystack).contains(needle)
}
