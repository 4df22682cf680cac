use super::{NodeContext, NodeError, TaskNode};
use crate::orchestration::routing::NodeId;
use crate::orchestration::state::{Complexity, PlanOption, WorkflowState};
use crate::provider::output_parse::parse_plan_options;
use crate::provider::prompts;

pub const OPTION_COUNT: usize = 3;

pub struct GenerateOptionsNode;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

/// Fixed options used to pad a short or failed generation, in position order.
pub fn fallback_options() -> [PlanOption; OPTION_COUNT] {
    [
        PlanOption {
            tech_stack: "Modern Stack: React + TypeScript + Node.js".to_string(),
            why_fits: "Popular, well-supported, great for modern web apps".to_string(),
            pros: strings(&["Large ecosystem", "Strong typing", "Fast development"]),
            cons: strings(&["Complex tooling", "Build step required"]),
            complexity: Complexity::Medium,
        },
        PlanOption {
            tech_stack: "Simple Stack: HTML + CSS + Vanilla JavaScript".to_string(),
            why_fits: "Lightweight, no build tools, easy to understand".to_string(),
            pros: strings(&["No dependencies", "Fast load times", "Simple deployment"]),
            cons: strings(&["Limited features", "More manual work"]),
            complexity: Complexity::Low,
        },
        PlanOption {
            tech_stack: "Full Stack: Next.js + PostgreSQL + Prisma".to_string(),
            why_fits: "Comprehensive solution with SSR, database, and API".to_string(),
            pros: strings(&["All-in-one solution", "Great performance", "Type safety"]),
            cons: strings(&["More complex", "Higher resource requirements"]),
            complexity: Complexity::High,
        },
    ]
}

/// Pads from the fallback set at positions `len..3` and truncates to 3.
pub fn normalize_options(mut options: Vec<PlanOption>) -> Vec<PlanOption> {
    options.truncate(OPTION_COUNT);
    let present = options.len();
    options.extend(fallback_options().into_iter().skip(present));
    options
}

impl TaskNode for GenerateOptionsNode {
    fn id(&self) -> NodeId {
        NodeId::GenerateOptions
    }

    fn run(&self, ctx: &NodeContext<'_>, state: &mut WorkflowState) -> Result<(), NodeError> {
        state.log("Generating implementation options...");
        let prompt = prompts::plan_options(&state.objective, &state.research_synthesis);

        let generated = match ctx.reasoning.invoke(&prompt) {
            Ok(reply) => match parse_plan_options(&reply) {
                Ok(parsed) => {
                    for reason in &parsed.rejected {
                        state.log(format!("Dropped invalid option: {reason}"));
                    }
                    parsed.options
                }
                Err(reason) => {
                    state.log(format!("Could not parse options: {reason}"));
                    Vec::new()
                }
            },
            Err(err) => {
                state.record_error(format!("Option generation error: {err}"));
                Vec::new()
            }
        };

        if generated.len() < OPTION_COUNT {
            state.log("Generating fallback options");
        }
        state.plan_options = normalize_options(generated);
        state.log(format!(
            "Generated {} implementation options",
            state.plan_options.len()
        ));
        state.mark_completed("option_generation");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom(name: &str) -> PlanOption {
        PlanOption::new(name, "fits", vec![], vec![], "low").expect("option")
    }

    #[test]
    fn padding_fills_positions_after_generated_ones() {
        let options = normalize_options(vec![custom("Rust")]);
        assert_eq!(options.len(), 3);
        assert_eq!(options[0].tech_stack, "Rust");
        assert_eq!(options[1].tech_stack, fallback_options()[1].tech_stack);
        assert_eq!(options[2].tech_stack, fallback_options()[2].tech_stack);
    }

    #[test]
    fn surplus_options_are_truncated() {
        let options = normalize_options(vec![custom("a"), custom("b"), custom("c"), custom("d")]);
        let names: Vec<&str> = options.iter().map(|o| o.tech_stack.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(normalize_options(Vec::new()), fallback_options().to_vec());
    }
}
