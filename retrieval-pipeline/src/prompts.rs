use crate::agentic::SearchAction;

/// First LLM call of an iteration: pick the next search strategy.
pub fn decision_prompt(
    current_date: &str,
    user_query: &str,
    blocked: &[SearchAction],
    available: &[SearchAction],
    results_text: &str,
) -> String {
    let blocked_text = if blocked.is_empty() {
        "None".to_string()
    } else {
        blocked
            .iter()
            .map(|action| format!("- {} (already tried)", action.as_str()))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let blocked_names = if blocked.is_empty() {
        "none".to_string()
    } else {
        blocked
            .iter()
            .map(|action| action.as_str().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let available_text = available
        .iter()
        .map(|action| format!("- {}", action.as_str()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "TODAY'S DATE: {current_date}\n\
         \n\
         Query: {user_query}\n\
         \n\
         QUERY ANALYSIS:\n\
         - If query asks about relationships, connections, or \"how X relates to Y\" -> prefer search_graph\n\
         - If query asks \"what is\" or definitions -> prefer search_semantic or search_fulltext\n\
         - If previous search gave partial results -> try different method\n\
         \n\
         ALREADY TRIED:\n\
         {blocked_text}\n\
         \n\
         RESULTS SO FAR:\n\
         {results_text}\n\
         \n\
         YOU CANNOT USE: {blocked_names}\n\
         \n\
         CHOOSE FROM:\n\
         {available_text}\n\
         \n\
         Return JSON: {{\"action\": \"...\", \"reasoning\": \"one sentence, max 20 words\"}}"
    )
}

/// Second call: produce a single SurrealQL SELECT for the chosen mode.
pub fn query_generation_prompt(action: SearchAction, user_query: &str) -> Option<String> {
    match action {
        SearchAction::Graph => Some(graph_query_prompt(user_query)),
        SearchAction::Semantic => Some(semantic_query_prompt(user_query)),
        SearchAction::Fulltext => Some(fulltext_query_prompt(user_query)),
        SearchAction::Done => None,
    }
}

fn graph_query_prompt(user_query: &str) -> String {
    format!(
        "Generate a SurrealQL query for entity relationships.\n\
         \n\
         Query: {user_query}\n\
         \n\
         IMPORTANT: Entity names are in English. If the query is in another language, translate the search terms to English before generating the query.\n\
         \n\
         CRITICAL: Entity name matching rules:\n\
         - Use FULL entity names in the contains patterns - never truncate\n\
         - Example: searching for \"ominiverdi\" -> use string::contains(string::lowercase(...), 'ominiverdi')\n\
         - Do NOT shorten: \"ominiverdi\" must stay \"ominiverdi\", never becomes \"omini\" or \"verdi\"\n\
         \n\
         Table: entity_relationship\n\
         - subject_id and object_id are record links to entity (field entity_name)\n\
         - source_page_id is a record link to page (fields title, url)\n\
         \n\
         IMPORTANT: Always include source page information.\n\
         \n\
         Template:\n\
         SELECT\n\
             subject_id.entity_name AS subject,\n\
             predicate,\n\
             object_id.entity_name AS object,\n\
             source_page_id.title AS source_page_title,\n\
             source_page_id.url AS source_page_url\n\
         FROM entity_relationship\n\
         WHERE string::contains(string::lowercase(subject_id.entity_name), '<term>')\n\
            OR string::contains(string::lowercase(object_id.entity_name), '<term>')\n\
         LIMIT 10;\n\
         \n\
         Replace <term> with the lowercased search term.\n\
         \n\
         Return ONLY the query, no explanation."
    )
}

fn semantic_query_prompt(user_query: &str) -> String {
    format!(
        "Generate a SurrealQL query for semantic search using page summaries.\n\
         \n\
         Query: {user_query}\n\
         \n\
         IMPORTANT: The wiki content is in English. If the query is in another language,\n\
         translate the search terms to English before generating the query.\n\
         \n\
         Table: page_extension (page_title, url, resume, keywords)\n\
         - resume is full-text indexed as match reference 0, keywords as reference 1\n\
         \n\
         CRITICAL INSTRUCTIONS:\n\
         1. Exact title match gets 10.0 point boost\n\
         2. Partial title match gets 2.5 point boost\n\
         3. Use string::lowercase() for comparisons\n\
         4. Search both resume and keywords\n\
         \n\
         Template:\n\
         SELECT\n\
             page_title,\n\
             url AS wiki_url,\n\
             resume,\n\
             keywords,\n\
             (IF string::lowercase(page_title) = '<main_term>' THEN 10.0\n\
              ELSE (IF string::contains(string::lowercase(page_title), '<main_term>') THEN 2.5 ELSE 0.0 END) END)\n\
             + 0.6 * (IF search::score(0) != NONE THEN search::score(0) ELSE 0.0 END)\n\
             + 0.4 * (IF search::score(1) != NONE THEN search::score(1) ELSE 0.0 END) AS rank\n\
         FROM page_extension\n\
         WHERE resume @0@ '<terms>'\n\
            OR keywords @1@ '<terms>'\n\
            OR string::contains(string::lowercase(page_title), '<main_term>')\n\
         ORDER BY rank DESC\n\
         LIMIT 5;\n\
         \n\
         Replace <main_term> with the lowercased primary search term (e.g., 'gdal', 'postgis', 'qgis').\n\
         Replace <terms> with full search terms.\n\
         \n\
         Return ONLY the query, no explanation."
    )
}

fn fulltext_query_prompt(user_query: &str) -> String {
    format!(
        "Generate a SurrealQL query for fulltext search using page chunks.\n\
         \n\
         Query: {user_query}\n\
         \n\
         IMPORTANT: The wiki content is in English. If the query is in another language,\n\
         translate the search terms to English before generating the query.\n\
         \n\
         Table: page_chunk (chunk_text, page_id)\n\
         - chunk_text is full-text indexed as match reference 0\n\
         - page_id is a record link to page (fields title, url)\n\
         \n\
         CRITICAL INSTRUCTIONS:\n\
         1. Exact title match gets 10.0 point boost\n\
         2. Partial title match gets 2.5 point boost\n\
         3. Use string::lowercase() for comparisons\n\
         4. Rank with search::score(0)\n\
         \n\
         Template:\n\
         SELECT\n\
             page_id.title AS title,\n\
             page_id.url AS url,\n\
             chunk_text,\n\
             (IF string::lowercase(page_id.title) = '<main_term>' THEN 10.0\n\
              ELSE (IF string::contains(string::lowercase(page_id.title), '<main_term>') THEN 2.5 ELSE 0.0 END) END)\n\
             + (IF search::score(0) != NONE THEN search::score(0) ELSE 0.0 END) AS rank\n\
         FROM page_chunk\n\
         WHERE chunk_text @0@ '<terms>'\n\
            OR string::contains(string::lowercase(page_id.title), '<main_term>')\n\
         ORDER BY rank DESC\n\
         LIMIT 5;\n\
         \n\
         Replace <main_term> with the lowercased primary search term.\n\
         Replace <terms> with full search terms.\n\
         \n\
         Return ONLY the query, no explanation."
    )
}

/// Third call: can the gathered results answer the question?
pub fn evaluation_prompt(current_date: &str, user_query: &str, formatted_results: &str) -> String {
    format!(
        "TODAY'S DATE: {current_date}\n\
         \n\
         Query: {user_query}\n\
         \n\
         FOUND:\n\
         {formatted_results}\n\
         \n\
         CRITICAL EVALUATION:\n\
         - Check result #1 FIRST - it has highest relevance score\n\
         - For \"what is X?\" queries: Look for \"X is a/an...\" definitions in result #1\n\
         - If ANY result directly answers the query -> can_answer: true\n\
         - Tangential info or wrong service -> can_answer: false\n\
         \n\
         SPECIAL CASES FOR \"WHO IS\" QUERIES:\n\
         - Graph relationships showing identity (is_alias_of, is_member_of, lives_at, works_at) ARE sufficient\n\
         - Relationships showing person's connections/affiliations answer who they are\n\
         - Example: \"X is_alias_of Y\" + \"X lives_at Z\" = complete answer about X\n\
         \n\
         Can you FULLY and DIRECTLY answer the query with ONLY this information?\n\
         \n\
         Return EXACTLY ONE JSON object:\n\
         {{\"can_answer\": true or false, \"reasoning\": \"one sentence\"}}"
    )
}

/// Final call: synthesize the answer in the target language.
pub fn answer_prompt(
    response_language: &str,
    current_date: &str,
    user_query: &str,
    formatted_results: &str,
) -> String {
    format!(
        "Answer this question in {response_language} language.\n\
         \n\
         TODAY'S DATE: {current_date}\n\
         \n\
         Query: {user_query}\n\
         \n\
         Search Results:\n\
         {formatted_results}\n\
         \n\
         CRITICAL INSTRUCTIONS:\n\
         1. Write your entire answer in {response_language} language (not English, unless {response_language} is 'English')\n\
         2. Answer ONLY using the search results above - DO NOT use any other knowledge\n\
         3. If results are graph relationships (like \"X is_project_of Y\"):\n\
            - Convert to natural language: \"X is a project of Y\"\n\
            - State each unique relationship once only\n\
            - Synthesize into a clear sentence\n\
         4. If search results are insufficient, say \"The wiki has limited information on this\"\n\
         5. Keep answer concise: 2-3 sentences for simple queries, max 5 sentences for complex ones\n\
         6. Do NOT repeat the same information multiple times\n\
         7. Include the most relevant wiki page URL at the end\n\
         \n\
         CRITICAL URL RULES:\n\
         - URLs MUST come from the search results above\n\
         - NEVER invent or guess URLs\n\
         - All URLs are from wiki.osgeo.org (OSGeo wiki, NOT Wikipedia)\n\
         - If graph results: use source_page_url\n\
         - If semantic results: use wiki_url\n\
         - If fulltext results: use url\n\
         \n\
         Answer in {response_language}:"
    )
}

/// Exhaustion with partial results: hedge and point at what was found.
pub fn partial_answer_prompt(
    response_language: &str,
    user_query: &str,
    formatted_results: &str,
) -> String {
    format!(
        "You are answering in {response_language} language.\n\
         \n\
         User asked: {user_query}\n\
         \n\
         You searched but couldn't find a direct answer. However, you found some related information:\n\
         \n\
         {formatted_results}\n\
         \n\
         Generate a helpful response in {response_language} that:\n\
         1. Says you couldn't find specific/direct information about their exact question\n\
         2. Briefly mentions what related information you DID find (if relevant)\n\
         3. Either:\n\
            - Suggest they rephrase the question, OR\n\
            - Ask if they meant something else based on what you found, OR\n\
            - Provide the partial information as \"limited information available\"\n\
         4. Be brief (2-3 sentences maximum)\n\
         5. Be helpful and conversational\n\
         \n\
         IMPORTANT: Write ONLY in {response_language}, NO code, NO formatting.\n\
         \n\
         Response:"
    )
}

/// Exhaustion with nothing found: ask the user to rephrase.
pub fn no_results_prompt(response_language: &str, user_query: &str) -> String {
    format!(
        "You are answering in {response_language} language.\n\
         \n\
         User asked: {user_query}\n\
         \n\
         You searched but found no relevant information in the OSGeo wiki.\n\
         \n\
         Generate a brief, helpful message in {response_language} that:\n\
         1. Says you couldn't find information about this in the wiki\n\
         2. Suggests they rephrase the question or add more details\n\
         3. Keep it very brief (1-2 sentences)\n\
         \n\
         IMPORTANT: Write ONLY in {response_language}, NO code, NO formatting.\n\
         \n\
         Response:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_prompt_lists_blocked_and_available() {
        let prompt = decision_prompt(
            "2024-03-04",
            "What is QGIS?",
            &[SearchAction::Semantic],
            &[SearchAction::Graph, SearchAction::Fulltext, SearchAction::Done],
            "None yet",
        );
        assert!(prompt.contains("- search_semantic (already tried)"));
        assert!(prompt.contains("YOU CANNOT USE: search_semantic"));
        assert!(prompt.contains("- search_graph"));
        assert!(prompt.contains("- done"));
        assert!(prompt.contains("What is QGIS?"));
        assert!(prompt.contains("2024-03-04"));
    }

    #[test]
    fn test_decision_prompt_without_history() {
        let prompt = decision_prompt(
            "2024-03-04",
            "What is QGIS?",
            &[],
            &[
                SearchAction::Semantic,
                SearchAction::Graph,
                SearchAction::Fulltext,
                SearchAction::Done,
            ],
            "None yet",
        );
        assert!(prompt.contains("ALREADY TRIED:\nNone"));
        assert!(prompt.contains("YOU CANNOT USE: none"));
    }

    #[test]
    fn test_query_generation_prompt_per_action() {
        let graph = query_generation_prompt(SearchAction::Graph, "who founded OSGeo").unwrap();
        assert!(graph.contains("entity_relationship"));
        assert!(graph.contains("LIMIT 10"));
        assert!(graph.contains("source_page_url"));

        let semantic = query_generation_prompt(SearchAction::Semantic, "what is GDAL").unwrap();
        assert!(semantic.contains("page_extension"));
        assert!(semantic.contains("0.6 *"));
        assert!(semantic.contains("LIMIT 5"));

        let fulltext = query_generation_prompt(SearchAction::Fulltext, "what is GDAL").unwrap();
        assert!(fulltext.contains("page_chunk"));
        assert!(fulltext.contains("10.0"));
        assert!(fulltext.contains("LIMIT 5"));

        assert!(query_generation_prompt(SearchAction::Done, "anything").is_none());
    }

    #[test]
    fn test_answer_prompt_pins_language() {
        let prompt = answer_prompt("Spanish", "2024-03-04", "¿Qué es QGIS?", "1. QGIS: ...");
        assert!(prompt.contains("Answer this question in Spanish language."));
        assert!(prompt.contains("Answer in Spanish:"));
        assert!(prompt.contains("NEVER invent or guess URLs"));
    }

    #[test]
    fn test_fallback_prompts_pin_language() {
        assert!(partial_answer_prompt("Italian", "query", "results")
            .contains("Write ONLY in Italian"));
        assert!(no_results_prompt("Italian", "query").contains("Write ONLY in Italian"));
    }
}
