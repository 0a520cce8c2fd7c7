use std::{collections::HashSet, sync::Arc};

use chrono::Utc;
use common::{error::AppError, llm::LlmClient, storage::db::SurrealDbClient};
use tracing::{debug, info, warn};

use crate::{
    json_repair::extract_json,
    prompts,
    query_guard::{sanitize_generated_query, validate_query},
    FulltextHit, GraphHit, SearchResult, SemanticHit, SourceRef,
};

const TOP_K: usize = 5;
const MAX_SOURCES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SearchAction {
    Semantic,
    Graph,
    Fulltext,
    Done,
}

impl SearchAction {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchAction::Semantic => "search_semantic",
            SearchAction::Graph => "search_graph",
            SearchAction::Fulltext => "search_fulltext",
            SearchAction::Done => "done",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "search_semantic" => Some(SearchAction::Semantic),
            "search_graph" => Some(SearchAction::Graph),
            "search_fulltext" => Some(SearchAction::Fulltext),
            "done" => Some(SearchAction::Done),
            _ => None,
        }
    }

    pub fn all() -> [SearchAction; 4] {
        [
            SearchAction::Semantic,
            SearchAction::Graph,
            SearchAction::Fulltext,
            SearchAction::Done,
        ]
    }
}

impl std::fmt::Display for SearchAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed search pass, kept across iterations.
#[derive(Debug, Clone)]
pub struct SearchAttempt {
    pub action: SearchAction,
    pub reasoning: String,
    pub result_count: usize,
    pub results: SearchResult,
    pub formatted_results: String,
}

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub max_iterations: usize,
    /// Results kept per attempt for prompts and source extraction.
    pub top_k: usize,
    pub max_sources: usize,
    /// Whether graph-mode answers cite page URLs; the current default
    /// suppresses them.
    pub cite_graph_sources: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            top_k: TOP_K,
            max_sources: MAX_SOURCES,
            cite_graph_sources: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlannerOutcome {
    pub answer: String,
    pub success: bool,
    pub iterations: usize,
    pub sources: Vec<SourceRef>,
    pub history: Vec<SearchAttempt>,
}

/// Render the top results the way the evaluation and answer prompts
/// expect to see them.
pub fn format_results(results: &SearchResult, top_k: usize) -> String {
    if results.is_empty() {
        return "No results found".to_string();
    }

    let lines: Vec<String> = match results {
        SearchResult::Semantic(hits) => hits
            .iter()
            .take(top_k)
            .enumerate()
            .map(|(index, hit)| format!("{}. {}: {}", index + 1, hit.page_title, hit.resume))
            .collect(),
        SearchResult::Graph(hits) => hits
            .iter()
            .take(top_k)
            .enumerate()
            .map(|(index, hit)| {
                format!(
                    "{}. {} {} {} (source: {})",
                    index + 1,
                    hit.subject,
                    hit.predicate,
                    hit.object,
                    hit.source_page_url.as_deref().unwrap_or_default()
                )
            })
            .collect(),
        SearchResult::Fulltext(hits) => hits
            .iter()
            .take(top_k)
            .enumerate()
            .map(|(index, hit)| format!("{}. {}: {}", index + 1, hit.title, hit.chunk_text))
            .collect(),
    };

    lines.join("\n")
}

/// Collapse duplicate URLs keeping the highest-ranked chunk per page;
/// hits arrive already ordered by rank.
pub fn dedup_fulltext_by_url(hits: Vec<FulltextHit>) -> Vec<FulltextHit> {
    let mut seen = HashSet::new();
    hits.into_iter()
        .filter(|hit| hit.url.is_empty() || seen.insert(hit.url.clone()))
        .collect()
}

/// Pick citable sources from the last non-empty search, mapping the
/// per-mode url/title fields and deduplicating by URL in order.
pub fn extract_sources(
    history: &[SearchAttempt],
    max_sources: usize,
    cite_graph_sources: bool,
) -> Vec<SourceRef> {
    for attempt in history.iter().rev() {
        if attempt.result_count == 0 {
            continue;
        }

        if attempt.action == SearchAction::Graph && !cite_graph_sources {
            return Vec::new();
        }

        let candidates: Vec<SourceRef> = match &attempt.results {
            SearchResult::Graph(hits) => hits
                .iter()
                .take(max_sources)
                .filter_map(|hit| {
                    Some(SourceRef {
                        title: hit.source_page_title.clone()?,
                        url: hit.source_page_url.clone()?,
                    })
                })
                .collect(),
            SearchResult::Semantic(hits) => hits
                .iter()
                .take(max_sources)
                .filter(|hit| !hit.wiki_url.is_empty() && !hit.page_title.is_empty())
                .map(|hit| SourceRef {
                    title: hit.page_title.clone(),
                    url: hit.wiki_url.clone(),
                })
                .collect(),
            SearchResult::Fulltext(hits) => hits
                .iter()
                .take(max_sources)
                .filter(|hit| !hit.url.is_empty() && !hit.title.is_empty())
                .map(|hit| SourceRef {
                    title: hit.title.clone(),
                    url: hit.url.clone(),
                })
                .collect(),
        };

        let mut seen = HashSet::new();
        return candidates
            .into_iter()
            .filter(|source| seen.insert(source.url.clone()))
            .take(max_sources)
            .collect();
    }

    Vec::new()
}

/// Iterative LLM-driven controller: decide a strategy, generate and
/// guard a query, execute it read-only, evaluate sufficiency, and
/// synthesize an answer in the caller's language.
pub struct AgenticPlanner {
    db: Arc<SurrealDbClient>,
    llm: LlmClient,
    config: PlannerConfig,
}

impl AgenticPlanner {
    pub fn new(db: Arc<SurrealDbClient>, llm: LlmClient, config: PlannerConfig) -> Self {
        Self { db, llm, config }
    }

    /// Answer a user query. Never returns an error: failures degrade to
    /// a user-visible message.
    pub async fn answer(&self, user_query: &str, response_language: &str) -> PlannerOutcome {
        match self.run(user_query, response_language).await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(error = %err, "agentic search failed");
                PlannerOutcome {
                    answer: "I could not process the question right now; please try again later."
                        .to_string(),
                    success: false,
                    iterations: 0,
                    sources: Vec::new(),
                    history: Vec::new(),
                }
            }
        }
    }

    async fn run(
        &self,
        user_query: &str,
        response_language: &str,
    ) -> Result<PlannerOutcome, AppError> {
        info!(%user_query, %response_language, "starting agentic search");

        let current_date = Utc::now().format("%Y-%m-%d").to_string();
        let mut history: Vec<SearchAttempt> = Vec::new();

        for iteration in 1..=self.config.max_iterations {
            debug!(iteration, max = self.config.max_iterations, "iteration");

            let blocked: Vec<SearchAction> = history.iter().map(|attempt| attempt.action).collect();
            let available: Vec<SearchAction> = SearchAction::all()
                .into_iter()
                .filter(|action| !blocked.contains(action))
                .collect();

            let results_text = history.last().map_or_else(
                || "None yet".to_string(),
                |last| {
                    format!(
                        "Search {} - {}:\n{}",
                        iteration - 1,
                        last.action.as_str().replace("search_", ""),
                        last.formatted_results
                    )
                },
            );

            // Step 1: decide the next action
            let decision_raw = self
                .llm
                .generate(
                    &prompts::decision_prompt(
                        &current_date,
                        user_query,
                        &blocked,
                        &available,
                        &results_text,
                    ),
                    0.1,
                    250,
                )
                .await?;

            let Ok(decision) = extract_json(&decision_raw.text) else {
                warn!(payload = %decision_raw.text.chars().take(200).collect::<String>(),
                      "failed to parse decision");
                break;
            };
            let Some(action) = decision["action"].as_str().and_then(SearchAction::parse) else {
                warn!(?decision, "decision carried no usable action");
                break;
            };
            let reasoning = decision["reasoning"].as_str().unwrap_or_default().to_string();
            info!(action = %action, %reasoning, "action decided");

            // Step 2: done means answer from what we already have
            if action == SearchAction::Done {
                if history.is_empty() {
                    warn!("chose 'done' before any search");
                    break;
                }

                let formatted = history
                    .last()
                    .map(|attempt| attempt.formatted_results.clone())
                    .unwrap_or_default();
                let answer = self
                    .llm
                    .generate(
                        &prompts::answer_prompt(
                            response_language,
                            &current_date,
                            user_query,
                            &formatted,
                        ),
                        0.7,
                        1024,
                    )
                    .await?;

                let sources = extract_sources(
                    &history,
                    self.config.max_sources,
                    self.config.cite_graph_sources,
                );
                return Ok(PlannerOutcome {
                    answer: answer.text,
                    success: true,
                    iterations: iteration,
                    sources,
                    history,
                });
            }

            // Step 3: generate and guard the query
            let Some(generation_prompt) = prompts::query_generation_prompt(action, user_query)
            else {
                break;
            };
            let query_raw = self.llm.generate(&generation_prompt, 0.1, 400).await?;
            let query = sanitize_generated_query(&query_raw.text);
            debug!(%query, "generated query");

            let results = match validate_query(&query) {
                Ok(()) => match self.execute_generated(action, &query).await {
                    Ok(results) => results,
                    Err(err) => {
                        // A failed execution burns the action for the
                        // rest of the request
                        warn!(action = %action, error = %err, "generated query failed to execute");
                        history.push(SearchAttempt {
                            action,
                            reasoning,
                            result_count: 0,
                            results: empty_result(action),
                            formatted_results: "No results".to_string(),
                        });
                        continue;
                    }
                },
                Err(err) => {
                    warn!(action = %action, error = %err, %query, "generated query rejected");
                    history.push(SearchAttempt {
                        action,
                        reasoning,
                        result_count: 0,
                        results: empty_result(action),
                        formatted_results: "No results".to_string(),
                    });
                    continue;
                }
            };

            let result_count = results.len();
            info!(action = %action, result_count, "query executed");

            let formatted_results = if result_count == 0 {
                "No results".to_string()
            } else {
                format_results(&results, self.config.top_k)
            };

            history.push(SearchAttempt {
                action,
                reasoning,
                result_count,
                results,
                formatted_results: formatted_results.clone(),
            });

            // Step 4: evaluate sufficiency
            if result_count > 0 {
                let evaluation_raw = self
                    .llm
                    .generate(
                        &prompts::evaluation_prompt(&current_date, user_query, &formatted_results),
                        0.1,
                        150,
                    )
                    .await?;

                match extract_json(&evaluation_raw.text) {
                    Ok(evaluation) => {
                        let can_answer = evaluation["can_answer"].as_bool().unwrap_or(false);
                        info!(
                            can_answer,
                            reasoning = evaluation["reasoning"].as_str().unwrap_or_default(),
                            "evaluated results"
                        );

                        if can_answer {
                            let answer = self
                                .llm
                                .generate(
                                    &prompts::answer_prompt(
                                        response_language,
                                        &current_date,
                                        user_query,
                                        &formatted_results,
                                    ),
                                    0.3,
                                    1024,
                                )
                                .await?;

                            let sources = extract_sources(
                                &history,
                                self.config.max_sources,
                                self.config.cite_graph_sources,
                            );
                            return Ok(PlannerOutcome {
                                answer: answer.text,
                                success: true,
                                iterations: iteration,
                                sources,
                                history,
                            });
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to parse evaluation");
                    }
                }
            }
        }

        // Exhausted the iteration budget
        warn!(max_iterations = self.config.max_iterations, "iteration budget exhausted");

        let last_with_results = history.iter().rev().find(|attempt| attempt.result_count > 0);

        let answer = match last_with_results {
            Some(attempt) => {
                self.llm
                    .generate(
                        &prompts::partial_answer_prompt(
                            response_language,
                            user_query,
                            &attempt.formatted_results,
                        ),
                        0.7,
                        1024,
                    )
                    .await?
            }
            None => {
                self.llm
                    .generate(
                        &prompts::no_results_prompt(response_language, user_query),
                        0.7,
                        1024,
                    )
                    .await?
            }
        };

        let sources = extract_sources(
            &history,
            self.config.max_sources,
            self.config.cite_graph_sources,
        );
        Ok(PlannerOutcome {
            answer: answer.text,
            success: false,
            iterations: self.config.max_iterations,
            sources,
            history,
        })
    }

    /// Run a validated generated statement against the database and map
    /// the rows into the mode's result shape. Rows that do not fit the
    /// shape are dropped.
    async fn execute_generated(
        &self,
        action: SearchAction,
        query: &str,
    ) -> Result<SearchResult, AppError> {
        let rows: Vec<serde_json::Value> = self
            .db
            .client
            .query(query.to_owned())
            .await?
            .take(0)?;

        Ok(match action {
            SearchAction::Fulltext => {
                let hits: Vec<FulltextHit> = rows
                    .into_iter()
                    .filter_map(|row| serde_json::from_value(row).ok())
                    .collect();
                SearchResult::Fulltext(dedup_fulltext_by_url(hits))
            }
            SearchAction::Semantic => SearchResult::Semantic(
                rows.into_iter()
                    .filter_map(|row| serde_json::from_value::<SemanticHit>(row).ok())
                    .collect(),
            ),
            SearchAction::Graph | SearchAction::Done => SearchResult::Graph(
                rows.into_iter()
                    .filter_map(|row| serde_json::from_value::<GraphHit>(row).ok())
                    .collect(),
            ),
        })
    }
}

fn empty_result(action: SearchAction) -> SearchResult {
    match action {
        SearchAction::Fulltext => SearchResult::Fulltext(Vec::new()),
        SearchAction::Semantic => SearchResult::Semantic(Vec::new()),
        SearchAction::Graph | SearchAction::Done => SearchResult::Graph(Vec::new()),
    }
}
