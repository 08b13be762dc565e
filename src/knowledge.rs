//! Knowledge base matcher
//!
//! Articles are looked up by category, then kept when their title or
//! description mentions any keyword of the ticket text. There is no
//! relevance scoring: matches come back in storage order.

use crate::db::{last_insert_id, ArticleRow, NewArticleRow};
use crate::error::{HelpdeskError, Result};
use crate::model::KnowledgeArticle;
use crate::schema::knowledge_articles;
use crate::triage::SolutionLookup;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use serde::Serialize;
use tracing::debug;

pub const DEFAULT_EXCERPT_CHARS: usize = 100;

const DELIMITERS: &[char] = &[' ', '.', ',', ';', ':', '!', '?', '\n', '\r', '\t'];

const MIN_KEYWORD_CHARS: usize = 3;

/// Upper-cased articles, prepositions and conjunctions (Portuguese and English)
const STOP_WORDS: &[&str] = &[
    "A", "O", "E", "DE", "DO", "DA", "UM", "UMA", "ESTÁ", "NÃO", "COM", "POR", "PARA",
    "THE", "AND", "FOR", "WITH", "NOT", "BUT", "FROM", "THIS", "THAT", "ARE", "WAS", "HAS",
];

/// Upper-cased, de-duplicated keywords of `text`, in first-seen order
pub fn extract_keywords(text: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for token in text.split(DELIMITERS) {
        let upper = token.to_uppercase();
        if upper.chars().count() < MIN_KEYWORD_CHARS || STOP_WORDS.contains(&upper.as_str()) {
            continue;
        }
        if !keywords.contains(&upper) {
            keywords.push(upper);
        }
    }
    keywords
}

/// First `max_chars` characters of `text`, with an ellipsis when cut
pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub article_id: i32,
    pub title: String,
    pub excerpt: String,
}

#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    excerpt_chars: usize,
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::new(DEFAULT_EXCERPT_CHARS)
    }
}

impl KnowledgeBase {
    pub fn new(excerpt_chars: usize) -> Self {
        Self { excerpt_chars }
    }

    /// Articles in `category` whose title or description contains any
    /// keyword of `description`, lowest id first
    fn matching_articles(
        &self,
        conn: &mut SqliteConnection,
        description: &str,
        category: &str,
    ) -> Result<Vec<KnowledgeArticle>> {
        let keywords = extract_keywords(description);
        debug!(category, keywords = ?keywords, "knowledge base lookup");
        if keywords.is_empty() {
            return Ok(Vec::new());
        }

        // SQLite's upper() is ASCII-only, so filter on the Rust side
        let rows = knowledge_articles::table
            .filter(knowledge_articles::category.eq(category))
            .order(knowledge_articles::id.asc())
            .select(ArticleRow::as_select())
            .load::<ArticleRow>(conn)?;

        Ok(rows
            .into_iter()
            .filter(|row| {
                let title = row.title.to_uppercase();
                let body = row.description.to_uppercase();
                keywords
                    .iter()
                    .any(|kw| title.contains(kw.as_str()) || body.contains(kw.as_str()))
            })
            .map(KnowledgeArticle::from)
            .collect())
    }

    pub fn suggest(
        &self,
        conn: &mut SqliteConnection,
        description: &str,
        category: &str,
        limit: usize,
    ) -> Result<Vec<Suggestion>> {
        self.alternatives(conn, description, category, limit, None)
    }

    /// Like [`suggest`](Self::suggest), skipping articles whose solution is
    /// exactly `current`
    pub fn alternatives(
        &self,
        conn: &mut SqliteConnection,
        description: &str,
        category: &str,
        limit: usize,
        current: Option<&str>,
    ) -> Result<Vec<Suggestion>> {
        let articles = self.matching_articles(conn, description, category)?;
        Ok(articles
            .into_iter()
            .filter(|article| current != Some(article.solution.as_str()))
            .take(limit)
            .map(|article| Suggestion {
                article_id: article.id,
                excerpt: excerpt(&article.solution, self.excerpt_chars),
                title: article.title,
            })
            .collect())
    }

    pub fn add_article(
        &self,
        conn: &mut SqliteConnection,
        category: &str,
        title: &str,
        description: &str,
        solution: &str,
    ) -> Result<i32> {
        let fields = [category, title, description, solution];
        if fields.iter().any(|f| f.trim().is_empty()) {
            return Err(HelpdeskError::validation(
                "category, title, description and solution are all required",
            ));
        }
        diesel::insert_into(knowledge_articles::table)
            .values(&NewArticleRow {
                category: category.trim(),
                title: title.trim(),
                description: description.trim(),
                solution: solution.trim(),
            })
            .execute(conn)?;
        Ok(last_insert_id(conn)?)
    }
}

impl SolutionLookup for KnowledgeBase {
    fn best_match(&self, conn: &mut SqliteConnection, description: &str, category: &str) -> Result<Option<String>> {
        let articles = self.matching_articles(conn, description, category)?;
        Ok(articles.into_iter().next().map(|article| article.solution))
    }
}
