#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliVerb {
    Start,
    Poll,
    Select,
    Advance,
    Cancel,
    Show,
    Runs,
    Checkpoints,
    Help,
    Unknown,
}

pub fn parse_cli_verb(input: &str) -> CliVerb {
    match input {
        "start" => CliVerb::Start,
        "poll" => CliVerb::Poll,
        "select" => CliVerb::Select,
        "advance" => CliVerb::Advance,
        "cancel" => CliVerb::Cancel,
        "show" => CliVerb::Show,
        "runs" => CliVerb::Runs,
        "checkpoints" => CliVerb::Checkpoints,
        "help" | "--help" | "-h" => CliVerb::Help,
        _ => CliVerb::Unknown,
    }
}

pub fn cli_help_lines() -> Vec<String> {
    vec![
        "Commands:".to_string(),
        "  start <objective...>                 Create a run and drive it to the selection point"
            .to_string(),
        "  poll <run_id>                        Show plan options or status and logs".to_string(),
        "  select <run_id> <option_index>       Choose a plan option and resume the run"
            .to_string(),
        "  advance <run_id>                     Continue a run that is still executing"
            .to_string(),
        "  cancel <run_id>                      Cancel a run and release its sandbox".to_string(),
        "  show <run_id>                        Print the full workflow state as JSON".to_string(),
        "  runs                                 List runs, most recently updated first"
            .to_string(),
        "  checkpoints <run_id>                 List the run's checkpoint history".to_string(),
    ]
}

pub(crate) fn help_text() -> String {
    cli_help_lines().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_documented_verb_parses() {
        for line in cli_help_lines().iter().skip(1) {
            let verb = line.split_whitespace().next().expect("verb column");
            assert_ne!(parse_cli_verb(verb), CliVerb::Unknown, "{verb}");
        }
        assert_eq!(parse_cli_verb("deploy"), CliVerb::Unknown);
    }
}
