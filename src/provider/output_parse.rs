use crate::orchestration::state::{ExecutionStep, PlanOption};
use crate::provider::prompts::NO_CLARIFICATION_NEEDED;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedOptions {
    pub options: Vec<PlanOption>,
    /// One human-readable reason per dropped entry.
    pub rejected: Vec<String>,
}

/// `None` when the reply says no clarification is needed, else the question lines.
pub fn parse_clarification(reply: &str) -> Option<Vec<String>> {
    if reply.contains(NO_CLARIFICATION_NEEDED) {
        return None;
    }
    Some(
        reply
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && line.contains('?'))
            .map(str::to_string)
            .collect(),
    )
}

pub fn parse_query_lines(reply: &str, limit: usize) -> Vec<String> {
    reply
        .lines()
        .map(strip_list_marker)
        .map(|line| line.trim_matches(|ch| ch == '"' || ch == '\'').trim())
        .filter(|line| !line.is_empty() && !line.starts_with("```"))
        .map(str::to_string)
        .take(limit)
        .collect()
}

fn strip_list_marker(line: &str) -> &str {
    let trimmed = line.trim();
    for bullet in ["- ", "* ", "• "] {
        if let Some(rest) = trimmed.strip_prefix(bullet) {
            return rest.trim();
        }
    }
    let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &trimmed[digits..];
        if let Some(rest) = rest.strip_prefix('.').or_else(|| rest.strip_prefix(')')) {
            return rest.trim();
        }
    }
    trimmed
}

/// Extracts a JSON array of plan options from a fenced block or the first
/// `[`..`]` span. Entries that fail validation are dropped and reported.
pub fn parse_plan_options(reply: &str) -> Result<ParsedOptions, String> {
    let candidate = fenced_block(reply)
        .filter(|block| block.trim_start().starts_with('[') || block.trim_start().starts_with('{'))
        .or_else(|| bracket_span(reply))
        .ok_or_else(|| "reply contains no JSON array".to_string())?;

    let value: Value = serde_json::from_str(candidate.trim())
        .map_err(|err| format!("plan options are not valid json: {err}"))?;
    let entries = match value {
        Value::Array(entries) => entries,
        Value::Object(mut object) => match object.remove("options") {
            Some(Value::Array(entries)) => entries,
            _ => return Err("plan options object has no `options` array".to_string()),
        },
        _ => return Err("plan options must be a JSON array".to_string()),
    };

    let mut parsed = ParsedOptions::default();
    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value::<PlanOption>(entry) {
            Ok(option) if option.tech_stack.trim().is_empty() => parsed
                .rejected
                .push(format!("option {}: tech_stack must be non-empty", index + 1)),
            Ok(option) => parsed.options.push(option),
            Err(err) => parsed.rejected.push(format!("option {}: {err}", index + 1)),
        }
    }
    Ok(parsed)
}

/// Parses `STEP N: action` lines, renumbering from 1 so step numbers stay unique.
pub fn parse_plan_steps(reply: &str, max_steps: usize) -> Vec<ExecutionStep> {
    reply
        .lines()
        .filter_map(|line| {
            let line = line.trim().trim_start_matches(['*', '#', '-', ' ']);
            let head = line.get(..4)?;
            if !head.eq_ignore_ascii_case("step") {
                return None;
            }
            let rest = line[4..].trim_start();
            let digits = rest.chars().take_while(char::is_ascii_digit).count();
            if digits == 0 {
                return None;
            }
            let action = rest[digits..]
                .trim_start_matches(['*', ':', '.', ')', ' '])
                .trim();
            (!action.is_empty()).then(|| action.to_string())
        })
        .take(max_steps)
        .enumerate()
        .map(|(index, action)| ExecutionStep::pending(index as u32 + 1, action))
        .collect()
}

/// Reads a `FILE: <path>` header and the fenced block that follows it.
pub fn parse_file_block(reply: &str) -> Option<GeneratedFile> {
    let mut lines = reply.lines();
    let path = lines.by_ref().find_map(|line| {
        let line = line.trim();
        let rest = line
            .strip_prefix("FILE:")
            .or_else(|| line.strip_prefix("File:"))?;
        let path = rest.trim().trim_matches(['`', '*', '"']).trim();
        (!path.is_empty()).then(|| path.to_string())
    })?;

    let remainder = lines.collect::<Vec<_>>().join("\n");
    let content = fenced_block(&remainder)
        .map(str::to_string)
        .unwrap_or_else(|| remainder.trim().to_string());
    Some(GeneratedFile {
        path,
        content: ensure_trailing_newline(content),
    })
}

/// First non-empty single-backtick span, e.g. the command in "Run `cargo test`".
pub fn first_backticked(text: &str) -> Option<String> {
    let mut rest = text;
    while let Some(start) = rest.find('`') {
        let after = &rest[start..];
        let ticks = after.chars().take_while(|ch| *ch == '`').count();
        let body = &after[ticks..];
        let end = body.find(&"`".repeat(ticks))?;
        let span = body[..end].trim();
        if ticks == 1 && !span.is_empty() {
            return Some(span.to_string());
        }
        rest = &body[end + ticks..];
    }
    None
}

/// First command line of a reply, unwrapping a code fence and a `$ ` prompt.
pub fn parse_shell_command(reply: &str) -> Option<String> {
    let body = fenced_block(reply).unwrap_or(reply);
    body.lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.strip_prefix("$ ").unwrap_or(line).trim().to_string())
        .filter(|line| !line.is_empty())
}

fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_open = &text[open + 3..];
    let body_start = after_open.find('\n')? + 1;
    let body = &after_open[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim_end_matches(['\n', '\r']))
}

fn bracket_span(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end > start).then(|| &text[start..=end])
}

fn ensure_trailing_newline(mut content: String) -> String {
    if !content.ends_with('\n') {
        content.push('\n');
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestration::state::Complexity;

    #[test]
    fn clarification_reply_variants() {
        assert_eq!(parse_clarification("NO_CLARIFICATION_NEEDED"), None);
        assert_eq!(
            parse_clarification("Some context\n1. Which database?\n2. Web or CLI?\n"),
            Some(vec![
                "1. Which database?".to_string(),
                "2. Web or CLI?".to_string()
            ])
        );
    }

    #[test]
    fn query_lines_drop_markers_and_respect_limit() {
        let reply = "1. rust cli frameworks\n- \"todo app data model\"\n\n* sqlite vs json storage\n4) extra";
        assert_eq!(
            parse_query_lines(reply, 3),
            vec![
                "rust cli frameworks",
                "todo app data model",
                "sqlite vs json storage"
            ]
        );
    }

    #[test]
    fn plan_options_from_fence_with_invalid_entry() {
        let reply = r#"Here you go:
```json
[
  {"tech_stack": "Rust + clap", "why_fits": "single binary", "pros": ["fast", "safe"], "cons": ["compile times", "learning curve"], "complexity": "medium"},
  {"tech_stack": "Python + typer", "why_fits": "quick", "pros": [], "cons": [], "complexity": "trivial"},
  {"tech_stack": "Go + cobra", "why_fits": "static", "estimated_complexity": "Low"}
]
```"#;
        let parsed = parse_plan_options(reply).expect("fenced json parses");
        assert_eq!(parsed.options.len(), 2);
        assert_eq!(parsed.options[1].complexity, Complexity::Low);
        assert_eq!(parsed.rejected.len(), 1);
        assert!(parsed.rejected[0].starts_with("option 2"));
    }

    #[test]
    fn plan_options_from_bare_span_and_garbage() {
        let reply = r#"Options: [{"tech_stack":"Node","why_fits":"js","complexity":"high"}] done"#;
        let parsed = parse_plan_options(reply).expect("bracket span parses");
        assert_eq!(parsed.options[0].tech_stack, "Node");
        assert!(parse_plan_options("no json here").is_err());
    }

    #[test]
    fn plan_steps_are_parsed_and_renumbered() {
        let reply = "Plan:\nSTEP 1: Create file main.py - entry point\n**Step 3:** Run command `python main.py`\nSTEP: missing number\nstep 4. Write docs";
        let steps = parse_plan_steps(reply, 10);
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].action, "Create file main.py - entry point");
        assert_eq!(steps[1].step_number, 2);
        assert_eq!(steps[1].action, "Run command `python main.py`");
        assert_eq!(steps[2].action, "Write docs");
        assert_eq!(parse_plan_steps(reply, 1).len(), 1);
    }

    #[test]
    fn file_block_with_and_without_fence() {
        let reply = "FILE: `src/app.py`\n```python\nprint('hi')\n```\n";
        assert_eq!(
            parse_file_block(reply),
            Some(GeneratedFile {
                path: "src/app.py".to_string(),
                content: "print('hi')\n".to_string(),
            })
        );
        let bare = parse_file_block("FILE: notes.txt\nplain body").expect("bare body");
        assert_eq!(bare.content, "plain body\n");
        assert_eq!(parse_file_block("no header"), None);
    }

    #[test]
    fn backticks_and_shell_commands() {
        assert_eq!(
            first_backticked("Run command `npm test` then `ls`"),
            Some("npm test".to_string())
        );
        assert_eq!(first_backticked("see ```block``` only"), None);
        assert_eq!(first_backticked("no ticks"), None);
        assert_eq!(
            parse_shell_command("```sh\n$ pytest -q\n```"),
            Some("pytest -q".to_string())
        );
        assert_eq!(parse_shell_command("   "), None);
    }
}
