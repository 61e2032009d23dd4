use ensemble_core::TaskType;
use std::collections::HashMap;

/// Which worker implementation serves a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentKind {
    General,
    Coding,
    Review,
}

/// Capability tag plus the behaviour an agent created for it gets.
#[derive(Debug, Clone)]
pub struct AgentProfile {
    pub capability: String,
    pub kind: AgentKind,
    pub system_prompt: String,
}

pub const CAP_GENERAL: &str = "general";
pub const CAP_PROGRAMMER: &str = "programmer";
pub const CAP_CODE_REVIEWER: &str = "code_reviewer";
pub const CAP_UI_DESIGNER: &str = "ui_designer";
pub const CAP_UX_SPECIALIST: &str = "ux_specialist";

/// Map an alias to its canonical capability tag. Unknown tags are returned
/// lowercased and unchanged.
pub fn canonical_capability(tag: &str) -> String {
    let lower = tag.trim().to_ascii_lowercase();
    match lower.as_str() {
        "" => CAP_GENERAL.to_string(),
        "coding" | "coder" | "programming" => CAP_PROGRAMMER.to_string(),
        "review" | "reviewer" | "code_review" => CAP_CODE_REVIEWER.to_string(),
        "designer" | "design" => CAP_UI_DESIGNER.to_string(),
        "ux" => CAP_UX_SPECIALIST.to_string(),
        _ => lower,
    }
}

/// Capabilities a task of the given type needs, in routing order.
pub fn required_capabilities(task_type: TaskType) -> Vec<&'static str> {
    match task_type {
        TaskType::Coding => vec![CAP_PROGRAMMER, CAP_CODE_REVIEWER],
        TaskType::Design => vec![CAP_UI_DESIGNER, CAP_UX_SPECIALIST],
        TaskType::General | TaskType::Research => vec![CAP_GENERAL],
    }
}

/// Built-in profiles keyed by canonical capability.
pub fn default_profiles() -> HashMap<String, AgentProfile> {
    [
        (CAP_GENERAL, AgentKind::General, GENERAL_PROMPT),
        (CAP_PROGRAMMER, AgentKind::Coding, PROGRAMMER_PROMPT),
        (CAP_CODE_REVIEWER, AgentKind::Review, REVIEWER_PROMPT),
        (CAP_UI_DESIGNER, AgentKind::General, UI_DESIGNER_PROMPT),
        (CAP_UX_SPECIALIST, AgentKind::Review, UX_SPECIALIST_PROMPT),
    ]
    .into_iter()
    .map(|(cap, kind, prompt)| {
        (
            cap.to_string(),
            AgentProfile {
                capability: cap.to_string(),
                kind,
                system_prompt: prompt.to_string(),
            },
        )
    })
    .collect()
}

const GENERAL_PROMPT: &str = "\
You are a general-purpose worker in a team of collaborating agents. \
Answer the subtask you are given directly and concisely.

Rules:
1. Use results from dependencies and teammates when they are relevant.
2. Report how confident you are in your answer between 0 and 1.
3. Set done to true only when nothing is left to improve.
";

const PROGRAMMER_PROMPT: &str = "\
You are the programmer in a team of collaborating agents. You write \
correct, idiomatic code for the subtask you are given.

Rules:
1. Output code in markdown code blocks.
2. Keep code simple and include only comments that explain non-obvious logic.
3. Incorporate reviewer feedback from earlier rounds.
";

const REVIEWER_PROMPT: &str = "\
You are the code reviewer in a team of collaborating agents. You review \
the work your teammates shared for correctness, security and clarity.

Rules:
1. Point out concrete defects and how to fix them.
2. Give a confidence score for the reviewed work between 0 and 1.
3. Set done to true when the work is acceptable as is.
";

const UI_DESIGNER_PROMPT: &str = "\
You are the UI designer in a team of collaborating agents. Describe layouts, \
components and visual hierarchy for the subtask you are given.
";

const UX_SPECIALIST_PROMPT: &str = "\
You are the UX specialist in a team of collaborating agents. Review the \
proposed designs your teammates shared for usability and accessibility.
";
