use common::{error::AppError, storage::db::SurrealDbClient};

use crate::{FulltextHit, GraphHit, SemanticHit};

pub const FULLTEXT_LIMIT: usize = 5;
pub const SEMANTIC_LIMIT: usize = 5;
pub const GRAPH_LIMIT: usize = 10;

/// Rank boosts for title matches, applied on top of the text score.
pub const EXACT_TITLE_BOOST: f64 = 10.0;
pub const PARTIAL_TITLE_BOOST: f64 = 2.5;

/// Full-text search over page chunks, ranked by FTS score plus title
/// boosts, with the page dereferenced for attribution.
pub async fn fulltext_search(
    terms: &str,
    title_term: &str,
    limit: usize,
    db: &SurrealDbClient,
) -> Result<Vec<FulltextHit>, AppError> {
    let sql = r#"
        SELECT
            page_id.title AS title,
            page_id.url AS url,
            chunk_text,
            (IF string::lowercase(page_id.title) = string::lowercase($title_term) THEN 10.0
             ELSE (IF string::contains(string::lowercase(page_id.title), string::lowercase($title_term)) THEN 2.5 ELSE 0.0 END) END)
            + (IF search::score(0) != NONE THEN search::score(0) ELSE 0.0 END) AS rank
        FROM page_chunk
        WHERE chunk_text @0@ $terms
           OR string::contains(string::lowercase(page_id.title), string::lowercase($title_term))
        ORDER BY rank DESC
        LIMIT $limit;
    "#;

    let hits: Vec<FulltextHit> = db
        .client
        .query(sql)
        .bind(("terms", terms.to_owned()))
        .bind(("title_term", title_term.to_owned()))
        .bind(("limit", i64::try_from(limit).unwrap_or(i64::MAX)))
        .await?
        .take(0)?;

    Ok(hits)
}

/// Semantic search over page extensions: weighted résumé and keyword
/// scores (0.6 / 0.4) plus title boosts.
pub async fn semantic_search(
    terms: &str,
    title_term: &str,
    limit: usize,
    db: &SurrealDbClient,
) -> Result<Vec<SemanticHit>, AppError> {
    let sql = r#"
        SELECT
            page_title,
            url AS wiki_url,
            resume,
            keywords,
            (IF string::lowercase(page_title) = string::lowercase($title_term) THEN 10.0
             ELSE (IF string::contains(string::lowercase(page_title), string::lowercase($title_term)) THEN 2.5 ELSE 0.0 END) END)
            + 0.6 * (IF search::score(0) != NONE THEN search::score(0) ELSE 0.0 END)
            + 0.4 * (IF search::score(1) != NONE THEN search::score(1) ELSE 0.0 END) AS rank
        FROM page_extension
        WHERE resume @0@ $terms
           OR keywords @1@ $terms
           OR string::contains(string::lowercase(page_title), string::lowercase($title_term))
        ORDER BY rank DESC
        LIMIT $limit;
    "#;

    let hits: Vec<SemanticHit> = db
        .client
        .query(sql)
        .bind(("terms", terms.to_owned()))
        .bind(("title_term", title_term.to_owned()))
        .bind(("limit", i64::try_from(limit).unwrap_or(i64::MAX)))
        .await?
        .take(0)?;

    Ok(hits)
}

/// Graph search over entity relationships; the search term matches
/// either end of the triple, case-insensitively.
pub async fn graph_search(
    term: &str,
    limit: usize,
    db: &SurrealDbClient,
) -> Result<Vec<GraphHit>, AppError> {
    let sql = r#"
        SELECT
            subject_id.entity_name AS subject,
            predicate,
            object_id.entity_name AS object,
            source_page_id.title AS source_page_title,
            source_page_id.url AS source_page_url
        FROM entity_relationship
        WHERE string::contains(string::lowercase(subject_id.entity_name), string::lowercase($term))
           OR string::contains(string::lowercase(object_id.entity_name), string::lowercase($term))
        ORDER BY confidence DESC
        LIMIT $limit;
    "#;

    let hits: Vec<GraphHit> = db
        .client
        .query(sql)
        .bind(("term", term.to_owned()))
        .bind(("limit", i64::try_from(limit).unwrap_or(i64::MAX)))
        .await?
        .take(0)?;

    Ok(hits)
}
