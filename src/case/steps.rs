use crate::case::model::{StepsInput, TestStep};
use regex::Regex;
use std::sync::LazyLock;

static STEP_NUMBERING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\s*").expect("step numbering pattern compiles"));

/// Normalizes caller-provided steps into one ordered list.
///
/// A free-text block is split per line; blank lines are dropped and a leading
/// `N. ` is stripped. Only the last derived step carries `expected_result`.
/// An empty result means there is nothing to publish.
pub fn format_steps(steps: Option<&StepsInput>, expected_result: Option<&str>) -> Vec<TestStep> {
    match steps {
        None => vec![],
        Some(StepsInput::Structured(steps)) => steps.clone(),
        Some(StepsInput::FreeText(text)) => parse_free_text(text, expected_result.unwrap_or("")),
    }
}

fn parse_free_text(text: &str, expected_result: &str) -> Vec<TestStep> {
    let actions: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| STEP_NUMBERING.replace(line, "").into_owned())
        .collect();
    let last = actions.len().saturating_sub(1);
    actions
        .into_iter()
        .enumerate()
        .map(|(i, action)| {
            let result = if i == last { expected_result } else { "" };
            TestStep::new(action, "", result)
        })
        .collect()
}
