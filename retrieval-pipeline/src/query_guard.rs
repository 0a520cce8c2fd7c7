use common::error::AppError;

/// Keywords that mutate data or state. Any appearance as a standalone
/// token outside a string literal rejects the statement.
const FORBIDDEN_KEYWORDS: [&str; 21] = [
    "create", "update", "delete", "insert", "upsert", "relate", "define", "remove", "alter",
    "drop", "truncate", "grant", "revoke", "commit", "rollback", "begin", "cancel", "let", "use",
    "kill", "sleep",
];

/// Strip markdown fences and surrounding noise from a generated query.
pub fn sanitize_generated_query(raw: &str) -> String {
    let mut query = raw.trim();

    for prefix in ["```sql", "```surql", "```"] {
        if let Some(stripped) = query.strip_prefix(prefix) {
            query = stripped;
            break;
        }
    }
    if let Some(stripped) = query.strip_suffix("```") {
        query = stripped;
    }

    query.trim().to_string()
}

/// Accept exactly one read-only SELECT statement.
pub fn validate_query(query: &str) -> Result<(), AppError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(AppError::QueryRejected("empty statement".to_string()));
    }

    let first_token = trimmed
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_lowercase();
    if first_token != "select" {
        return Err(AppError::QueryRejected(
            "only SELECT statements are allowed".to_string(),
        ));
    }

    let mut tokens: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_string: Option<char> = None;

    for (index, character) in trimmed.char_indices() {
        match in_string {
            Some(quote) => {
                if character == quote {
                    in_string = None;
                }
            }
            None => match character {
                '\'' | '"' => {
                    flush_token(&mut tokens, &mut current);
                    in_string = Some(character);
                }
                ';' => {
                    flush_token(&mut tokens, &mut current);
                    if trimmed[index + 1..].trim().is_empty() {
                        continue;
                    }
                    return Err(AppError::QueryRejected(
                        "multiple statements are not allowed".to_string(),
                    ));
                }
                _ if character.is_alphanumeric() || character == '_' => {
                    current.push(character);
                }
                _ => flush_token(&mut tokens, &mut current),
            },
        }
    }
    flush_token(&mut tokens, &mut current);

    if in_string.is_some() {
        return Err(AppError::QueryRejected(
            "unterminated string literal".to_string(),
        ));
    }

    for token in &tokens {
        let lowered = token.to_lowercase();
        if FORBIDDEN_KEYWORDS.contains(&lowered.as_str()) {
            return Err(AppError::QueryRejected(format!(
                "forbidden keyword: {token}"
            )));
        }
    }

    Ok(())
}

fn flush_token(tokens: &mut Vec<String>, current: &mut String) {
    if !current.is_empty() {
        tokens.push(std::mem::take(current));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_fences() {
        assert_eq!(
            sanitize_generated_query("```sql\nSELECT * FROM page_chunk;\n```"),
            "SELECT * FROM page_chunk;"
        );
        assert_eq!(
            sanitize_generated_query("```\nSELECT 1\n```"),
            "SELECT 1"
        );
        assert_eq!(sanitize_generated_query("  SELECT 1  "), "SELECT 1");
    }

    #[test]
    fn test_accepts_single_select() {
        validate_query("SELECT chunk_text FROM page_chunk WHERE chunk_text @0@ 'qgis' LIMIT 5;")
            .expect("valid select");
        validate_query("select * from page_extension").expect("lowercase select");
    }

    #[test]
    fn test_rejects_non_select() {
        assert!(validate_query("DELETE page_chunk").is_err());
        assert!(validate_query("UPDATE page SET title = 'x'").is_err());
        assert!(validate_query("INFO FOR DB").is_err());
        assert!(validate_query("").is_err());
    }

    #[test]
    fn test_rejects_embedded_mutations() {
        assert!(validate_query("SELECT * FROM (DELETE page_chunk RETURN BEFORE)").is_err());
        assert!(validate_query("SELECT *, (UPDATE page SET x = 1) FROM page").is_err());
        assert!(validate_query("SELECT * FROM page; DELETE page").is_err());
    }

    #[test]
    fn test_allows_keywords_inside_string_literals() {
        validate_query("SELECT * FROM page_chunk WHERE chunk_text @0@ 'latest update'")
            .expect("keyword inside string is data");
        validate_query("SELECT * FROM page WHERE title = 'Create a map'")
            .expect("keyword inside string is data");
    }

    #[test]
    fn test_field_names_containing_keywords_pass() {
        validate_query("SELECT updated_at FROM page_extension LIMIT 5")
            .expect("updated_at is not the update keyword");
    }

    #[test]
    fn test_rejects_multiple_statements() {
        assert!(validate_query("SELECT 1; SELECT 2").is_err());
        validate_query("SELECT 1;").expect("trailing semicolon is fine");
    }

    #[test]
    fn test_rejects_unterminated_string() {
        assert!(validate_query("SELECT * FROM page WHERE title = 'oops").is_err());
    }
}
