use super::{NodeContext, NodeError, TaskNode};
use crate::orchestration::routing::NodeId;
use crate::orchestration::state::{ResearchNote, WorkflowState};
use crate::provider::output_parse::parse_query_lines;
use crate::provider::prompts;

pub const RESEARCH_UNAVAILABLE: &str = "Research unavailable.";

pub struct ResearchNode;

/// Queries used when the reasoning service cannot produce any.
pub fn fallback_queries(objective: &str, depth: usize) -> Vec<String> {
    let objective = objective.trim();
    [
        format!("{objective} best practices"),
        format!("{objective} technology comparison"),
        format!("{objective} common pitfalls"),
        format!("{objective} architecture patterns"),
        format!("{objective} recent developments"),
    ]
    .into_iter()
    .cycle()
    .take(depth)
    .enumerate()
    .map(|(index, query)| {
        if index < 5 {
            query
        } else {
            format!("{query} {}", index / 5 + 1)
        }
    })
    .collect()
}

impl TaskNode for ResearchNode {
    fn id(&self) -> NodeId {
        NodeId::Research
    }

    fn run(&self, ctx: &NodeContext<'_>, state: &mut WorkflowState) -> Result<(), NodeError> {
        let depth = ctx.workflow.research_depth;
        state.log("Starting research phase...");

        let mut queries = match ctx
            .reasoning
            .invoke(&prompts::research_queries(&state.objective, depth))
        {
            Ok(reply) => parse_query_lines(&reply, depth),
            Err(err) => {
                state.record_error(format!("Research query generation failed: {err}"));
                Vec::new()
            }
        };
        if queries.is_empty() {
            queries = fallback_queries(&state.objective, depth);
            state.log("Using fallback research queries");
        }
        state.log(format!("Generated {} research queries", queries.len()));

        for query in &queries {
            match ctx.search.search(query, ctx.search_max_results) {
                Ok(hits) => {
                    state.log(format!("Searched: {query} ({} results)", hits.len()));
                    state
                        .research_notes
                        .extend(hits.into_iter().map(|hit| ResearchNote {
                            query: query.clone(),
                            title: hit.title,
                            content: hit.content,
                            url: hit.url,
                        }));
                }
                Err(err) => {
                    ctx.log_event("warn", "research.search_failed", &err.to_string());
                    state.record_error(format!("Search error for '{query}': {err}"));
                }
            }
        }
        state.research_queries = queries;

        let synthesis_prompt = prompts::research_synthesis(
            &state.objective,
            state
                .research_notes
                .iter()
                .map(|note| (note.title.as_str(), note.content.as_str())),
        );
        match ctx.reasoning.invoke(&synthesis_prompt) {
            Ok(synthesis) => {
                state.log(format!(
                    "Research synthesis completed ({} chars)",
                    synthesis.chars().count()
                ));
                state.research_synthesis = synthesis;
            }
            Err(err) => {
                state.research_synthesis = RESEARCH_UNAVAILABLE.to_string();
                state.record_error(format!("Research synthesis failed: {err}"));
            }
        }

        state.mark_completed("research");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_queries_follow_depth() {
        let queries = fallback_queries(" Build a CLI todo app ", 3);
        assert_eq!(
            queries,
            vec![
                "Build a CLI todo app best practices",
                "Build a CLI todo app technology comparison",
                "Build a CLI todo app common pitfalls",
            ]
        );
        let many = fallback_queries("x", 7);
        assert_eq!(many.len(), 7);
        assert_eq!(many[5], "x best practices 2");
    }
}
