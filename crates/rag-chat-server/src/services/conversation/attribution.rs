//! Source attribution heuristic
//! Decides whether retrieved passages are shown to the user as "sources",
//! so that small talk and general-knowledge answers are not credited to the corpus

use std::collections::HashSet;
use tracing::debug;

use super::context_builder::truncate_chars;
use super::types::RetrievedPassage;
use crate::config::AttributionConfig;
use crate::models::chat::SourceInfo;

#[derive(Debug, Clone)]
pub struct SourceAttribution {
    domain_keywords: Vec<String>,
    off_topic_keywords: Vec<String>,
    stopwords: HashSet<String>,
    min_shared_terms: usize,
}

impl SourceAttribution {
    pub fn new(config: &AttributionConfig) -> Self {
        Self {
            domain_keywords: lowercase_all(&config.domain_keywords),
            off_topic_keywords: lowercase_all(&config.off_topic_keywords),
            stopwords: lowercase_all(&config.stopwords).into_iter().collect(),
            min_shared_terms: config.min_shared_terms,
        }
    }

    pub fn should_show_sources(
        &self,
        passages: &[RetrievedPassage],
        query: &str,
        response: &str,
    ) -> bool {
        if passages.is_empty() {
            return false;
        }

        let query_lower = query.to_lowercase();
        let response_lower = response.to_lowercase();

        // Substring match, so "hi" also hits "this"
        if let Some(keyword) = first_match(&query_lower, &self.off_topic_keywords) {
            debug!("Hiding sources: off-topic query matched '{}'", keyword);
            return false;
        }

        let Some(keyword) = first_match(&query_lower, &self.domain_keywords) else {
            debug!("Hiding sources: query has no domain keyword");
            return false;
        };
        debug!("Query matched domain keyword '{}'", keyword);

        if let Some(keyword) = first_match(&response_lower, &self.domain_keywords) {
            debug!("Showing sources: response matched domain keyword '{}'", keyword);
            return true;
        }

        let response_terms = self.meaningful_terms(&response_lower);
        for passage in passages {
            let passage_lower = passage.content.to_lowercase();
            let shared = self
                .meaningful_terms(&passage_lower)
                .intersection(&response_terms)
                .count();

            if shared >= self.min_shared_terms {
                debug!(
                    "Showing sources: response shares {} terms with {}",
                    shared, passage.source_id
                );
                return true;
            }
        }

        debug!("Hiding sources: no evidence the response used the passages");
        false
    }

    fn meaningful_terms<'a>(&self, text: &'a str) -> HashSet<&'a str> {
        text.split_whitespace()
            .filter(|word| !self.stopwords.contains(*word))
            .collect()
    }
}

impl Default for SourceAttribution {
    fn default() -> Self {
        Self::new(&AttributionConfig::default())
    }
}

/// One entry per file, first (best-ranked) passage wins
pub fn collect_sources(passages: &[RetrievedPassage], preview_chars: usize) -> Vec<SourceInfo> {
    let mut seen = HashSet::new();
    passages
        .iter()
        .filter(|passage| seen.insert(passage.source_id.as_str()))
        .map(|passage| SourceInfo {
            file: passage.source_id.clone(),
            preview: truncate_chars(&passage.content, preview_chars),
        })
        .collect()
}

fn first_match<'a>(text: &str, keywords: &'a [String]) -> Option<&'a str> {
    keywords
        .iter()
        .find(|keyword| text.contains(keyword.as_str()))
        .map(String::as_str)
}

fn lowercase_all(words: &[String]) -> Vec<String> {
    words.iter().map(|w| w.to_lowercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passage(content: &str, source: &str, rank: usize) -> RetrievedPassage {
        RetrievedPassage {
            content: content.to_string(),
            source_id: source.to_string(),
            rank,
        }
    }

    fn neo_latin_passages() -> Vec<RetrievedPassage> {
        vec![passage(
            "Renaissance Latin poetry flourished among humanist circles in Italy, where poets imitated Virgil and Horace.",
            "handbook.pdf",
            1,
        )]
    }

    #[test]
    fn test_no_passages_never_shows_sources() {
        let filter = SourceAttribution::default();
        assert!(!filter.should_show_sources(&[], "Tell me about Renaissance Latin poetry", "Latin"));
    }

    #[test]
    fn test_small_talk_hides_sources() {
        let filter = SourceAttribution::default();
        assert!(!filter.should_show_sources(
            &neo_latin_passages(),
            "hello, how are you?",
            "I am fine, thanks for asking about Latin."
        ));
    }

    #[test]
    fn test_academic_query_with_shared_terms_shows_sources() {
        let filter = SourceAttribution::default();
        // No domain keyword in the response, so only term overlap can qualify it
        let response = "Poets in italy imitated virgil and horace closely.";
        assert!(filter.should_show_sources(
            &neo_latin_passages(),
            "Tell me about Renaissance Latin poetry",
            response
        ));
    }

    #[test]
    fn test_academic_query_with_domain_response_shows_sources() {
        let filter = SourceAttribution::default();
        assert!(filter.should_show_sources(
            &neo_latin_passages(),
            "Tell me about Renaissance Latin poetry",
            "Neo-Latin verse was widely read."
        ));
    }

    #[test]
    fn test_non_academic_query_hides_sources() {
        let filter = SourceAttribution::default();
        assert!(!filter.should_show_sources(
            &neo_latin_passages(),
            "Who painted the Mona Lisa?",
            "Leonardo, a renaissance figure."
        ));
    }

    #[test]
    fn test_substring_semantics_are_kept() {
        let filter = SourceAttribution::default();
        // "hi" inside "this" marks the query off-topic
        assert!(!filter.should_show_sources(
            &neo_latin_passages(),
            "Is this Latin poetry?",
            "Yes, Latin poetry."
        ));
    }

    #[test]
    fn test_stopwords_do_not_count_as_shared_terms() {
        let filter = SourceAttribution::default();
        let passages = vec![passage("the and of with is", "a.pdf", 1)];
        assert!(!filter.should_show_sources(
            &passages,
            "Explain Renaissance poetry",
            "The answer is of with and."
        ));
    }

    #[test]
    fn test_collect_sources_dedupes_by_file_keeping_first() {
        let long = "x".repeat(250);
        let sources = collect_sources(
            &[
                passage(&long, "a.pdf", 1),
                passage("second chunk", "a.pdf", 2),
                passage("short", "b.pdf", 3),
            ],
            200,
        );

        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].file, "a.pdf");
        assert_eq!(sources[0].preview, format!("{}...", "x".repeat(200)));
        assert_eq!(sources[1].preview, "short");
    }
}
