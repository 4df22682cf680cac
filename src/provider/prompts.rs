use super::Prompt;
use crate::orchestration::state::{ExecutionStep, PlanOption};

pub const NO_CLARIFICATION_NEEDED: &str = "NO_CLARIFICATION_NEEDED";

const SYNTHESIS_NOTE_LIMIT: usize = 10;
const SYNTHESIS_CONTENT_CHARS: usize = 200;
const OPTIONS_RESEARCH_CHARS: usize = 1000;

pub fn clarification(objective: &str) -> Prompt {
    Prompt::new(
        format!(
            "You are an expert project analyst. Analyze the user's objective and decide \
             whether critical ambiguities need clarification: missing technical requirements, \
             unclear scope, ambiguous technology choices, unspecified constraints.\n\
             If clarification is needed, list specific questions, one per line.\n\
             If the objective is clear enough, respond with '{NO_CLARIFICATION_NEEDED}'."
        ),
        format!("Objective: {objective}"),
    )
    .with_temperature(0.3)
}

pub fn research_queries(objective: &str, count: usize) -> Prompt {
    Prompt::new(
        format!(
            "You are a research assistant. Generate {count} specific search queries to research \
             this project objective. Focus on best practices, technology comparisons, common \
             pitfalls and recent developments.\nReturn only the queries, one per line."
        ),
        format!("Objective: {objective}"),
    )
}

/// `findings` are `(title, content)` pairs; only the first few are sent, each clipped.
pub fn research_synthesis<'a>(
    objective: &str,
    findings: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Prompt {
    let findings = findings
        .into_iter()
        .take(SYNTHESIS_NOTE_LIMIT)
        .map(|(title, content)| format!("- {title}: {}...", clip(content, SYNTHESIS_CONTENT_CHARS)))
        .collect::<Vec<_>>()
        .join("\n\n");
    Prompt::new(
        "You are a technical expert. Synthesize the research findings into a clear summary: \
         recommended technologies and why, architecture patterns, common challenges and how \
         to avoid them, key design decisions.",
        format!(
            "Objective: {objective}\n\nResearch findings:\n{findings}\n\nProvide a concise synthesis:"
        ),
    )
}

pub fn plan_options(objective: &str, research: &str) -> Prompt {
    Prompt::new(
        "You are a technical architect. Generate 3 distinct implementation options for the \
         objective, each with a different approach, tech stack or complexity level.\n\
         Respond with a JSON array of exactly 3 objects with the keys:\n\
         tech_stack (string), why_fits (string), pros (array of at least 2 strings), \
         cons (array of at least 2 strings), complexity (one of \"low\", \"medium\", \"high\").",
        format!(
            "Objective: {objective}\n\nResearch synthesis:\n{}\n\nGenerate 3 implementation options:",
            clip(research, OPTIONS_RESEARCH_CHARS)
        ),
    )
    .with_temperature(0.7)
}

pub fn execution_plan(objective: &str, plan: &PlanOption, max_steps: usize) -> Prompt {
    Prompt::new(
        format!(
            "You are a code generation expert. Create a step-by-step execution plan to implement \
             the selected technical approach. For each step say what to do (create file, run \
             command) and the exact content or command. Be specific and actionable. Limit to \
             {max_steps} steps.\nFormat each step as: STEP N: [action] - [details]"
        ),
        format!(
            "Objective: {objective}\n\nSelected plan:\nTech stack: {}\nReasoning: {}\n\nGenerate execution steps:",
            plan.tech_stack, plan.why_fits
        ),
    )
    .with_temperature(0.3)
}

pub fn file_content(objective: &str, plan: &PlanOption, step: &ExecutionStep) -> Prompt {
    Prompt::new(
        "You write files for a project being built step by step. Reply with the file path on \
         the first line as `FILE: <relative path>` followed by the complete file content in a \
         single fenced code block. No other text.",
        format!(
            "Objective: {objective}\nTech stack: {}\nStep {}: {}",
            plan.tech_stack, step.step_number, step.action
        ),
    )
    .with_temperature(0.2)
}

pub fn shell_command(objective: &str, step: &ExecutionStep) -> Prompt {
    Prompt::new(
        "You translate a build step into one POSIX shell command run from the project root. \
         Reply with the command only, on a single line, without explanation.",
        format!(
            "Objective: {objective}\nStep {}: {}",
            step.step_number, step.action
        ),
    )
    .with_temperature(0.0)
}

pub(crate) fn clip(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
