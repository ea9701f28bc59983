use ahash::{AHashMap, AHashSet};
use unicode_normalization::UnicodeNormalization;

/// Function words skipped by frequency extraction so keyword summaries carry
/// topical terms only.
const STOPWORDS: &[&str] = &[
	"a", "an", "and", "are", "as", "at", "be", "been", "but", "by", "can", "do", "for", "from",
	"had", "has", "have", "if", "in", "into", "is", "it", "its", "may", "not", "of", "on", "or",
	"our", "such", "than", "that", "the", "their", "then", "there", "these", "they", "this", "to",
	"was", "we", "were", "which", "will", "with", "you", "your",
];

pub fn is_stopword(term: &str) -> bool {
	STOPWORDS.contains(&term)
}

/// Splits text into normalized terms: NFKC-folded, lowercased, alphanumeric
/// runs of at least two characters.
pub fn normalize_terms(text: &str) -> Vec<String> {
	let folded = text.nfkc().collect::<String>().to_lowercase();
	let mut terms = Vec::new();
	let mut current = String::new();

	for c in folded.chars() {
		if c.is_alphanumeric() {
			current.push(c);
		} else if !current.is_empty() {
			if current.chars().count() >= 2 {
				terms.push(current.clone());
			}

			current.clear();
		}
	}
	if current.chars().count() >= 2 {
		terms.push(current);
	}

	terms
}

/// Distinct non-stopword terms of a text.
pub fn term_set(text: &str) -> AHashSet<String> {
	normalize_terms(text).into_iter().filter(|t| !is_stopword(t)).collect()
}

/// Term counts with stopwords removed.
pub fn term_frequencies(text: &str) -> AHashMap<String, usize> {
	let mut frequencies = AHashMap::new();

	for term in normalize_terms(text) {
		if is_stopword(&term) {
			continue;
		}

		*frequencies.entry(term).or_insert(0) += 1;
	}

	frequencies
}

/// The `limit` most frequent terms, count-descending with an alphabetical
/// tiebreak so extraction is deterministic for identical input.
pub fn top_terms(text: &str, limit: usize) -> Vec<String> {
	top_terms_boosted(text, limit, &[], 1.)
}

/// Frequency ranking where terms on the domain list have their counts scaled
/// by `boost` before sorting.
pub fn top_terms_boosted(
	text: &str,
	limit: usize,
	domain_terms: &[String],
	boost: f32,
) -> Vec<String> {
	let domain = domain_terms.iter().map(|t| t.to_lowercase()).collect::<AHashSet<_>>();
	let mut ranked = term_frequencies(text)
		.into_iter()
		.map(|(term, count)| {
			let weight =
				if domain.contains(&term) { count as f32 * boost } else { count as f32 };

			(term, weight)
		})
		.collect::<Vec<_>>();

	ranked.sort_by(|(a_term, a_weight), (b_term, b_weight)| {
		b_weight.total_cmp(a_weight).then_with(|| a_term.cmp(b_term))
	});
	ranked.truncate(limit);

	ranked.into_iter().map(|(term, _)| term).collect()
}

/// Distinct-to-total term ratio in `[0, 1]`; 0 for termless text.
pub fn vocabulary_diversity(text: &str) -> f32 {
	let terms = normalize_terms(text);

	if terms.is_empty() {
		return 0.;
	}

	let distinct = terms.iter().collect::<AHashSet<_>>().len();

	distinct as f32 / terms.len() as f32
}

/// Set overlap of the terms of two texts. Two empty sets are fully similar;
/// one empty set shares nothing.
pub fn jaccard(a: &AHashSet<String>, b: &AHashSet<String>) -> f32 {
	if a.is_empty() && b.is_empty() {
		return 1.;
	}
	if a.is_empty() || b.is_empty() {
		return 0.;
	}

	let intersection = a.intersection(b).count() as f32;
	let union = a.union(b).count() as f32;

	intersection / union
}

/// Fraction of `query` terms present in `content`, used to score how well a
/// chunk covers the literal wording of a query.
pub fn lexical_overlap_ratio(query: &str, content: &str) -> f32 {
	let query_terms = term_set(query);

	if query_terms.is_empty() {
		return 0.;
	}

	let content_terms = term_set(content);
	let matched = query_terms.iter().filter(|t| content_terms.contains(*t)).count();

	matched as f32 / query_terms.len() as f32
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn normalizes_and_filters_short_runs() {
		assert_eq!(normalize_terms("The I/O scheduler, v2!"), ["the", "scheduler", "v2"]);
		assert!(!term_set("the scheduler").contains("the"));
	}

	#[test]
	fn top_terms_break_ties_alphabetically() {
		assert_eq!(top_terms("beta alpha beta alpha gamma", 3), ["alpha", "beta", "gamma"]);
	}

	#[test]
	fn domain_boost_promotes_listed_terms() {
		let boosted =
			top_terms_boosted("kernel cache cache", 1, &["kernel".to_owned()], 2.5);

		assert_eq!(boosted, ["kernel"]);
	}

	#[test]
	fn jaccard_handles_empty_sets() {
		let empty = AHashSet::new();
		let full = term_set("alpha beta");

		assert_eq!(jaccard(&empty, &empty), 1.);
		assert_eq!(jaccard(&empty, &full), 0.);
		assert_eq!(jaccard(&full, &full), 1.);
	}
}
