use crate::case::model::ProjectKey;

/// Escapes text for use inside a double-quoted JQL string literal.
/// Every `"` and `\` gets a `\` in front.
pub fn escape_jql_string(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c == '"' || c == '\\' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// A complete, escaped JQL string literal including the surrounding quotes.
pub fn quoted(raw: &str) -> String {
    format!("\"{}\"", escape_jql_string(raw))
}

/// Characters the text-search query parser treats as syntax.
const TEXT_QUERY_RESERVED: &[char] = &[
    '+', '-', '&', '|', '!', '(', ')', '{', '}', '[', ']', '^', '~', '*', '?', ':', '\\', '/', '"',
];

/// Exact-phrase text query for `~`: reserved characters backslash-escaped,
/// the whole wrapped in double quotes. The result still has to go through
/// [`quoted`] to become a JQL literal.
pub fn text_phrase(raw: &str) -> String {
    let mut phrase = String::with_capacity(raw.len() + 2);
    phrase.push('"');
    for c in raw.chars() {
        if TEXT_QUERY_RESERVED.contains(&c) {
            phrase.push('\\');
        }
        phrase.push(c);
    }
    phrase.push('"');
    phrase
}

/// Candidates for an existing test with this name linked to the requirement.
///
/// `summary ~` is a text match, so callers still have to compare summaries
/// for exact equality.
pub fn duplicate_query(
    project_key: &ProjectKey,
    issue_type: &str,
    requirement_id: &str,
    test_name: &str,
) -> String {
    format!(
        "project = {} AND issuetype = {} AND summary ~ {} AND issue in linkedIssues({})",
        quoted(project_key.as_str()),
        quoted(issue_type),
        quoted(&text_phrase(test_name)),
        quoted(requirement_id),
    )
}
