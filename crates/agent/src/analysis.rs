//! Prompt construction and reply parsing
//!
//! Model replies are free text. The parser scans them line by line for the
//! four labeled fields and keeps defaults for anything missing or malformed.

use agentloop_proto::{Complexity, Task, TaskAnalysis, TaskRecord, DEFAULT_ESTIMATED_HOURS};

const COMPLEXITY_LABEL: &str = "complexity:";
const HOURS_LABEL: &str = "estimated hours:";
const SKILLS_LABEL: &str = "required skills:";
const RECOMMENDED_LABEL: &str = "recommended agent type:";

/// Prompt asking an agent to analyze a task
pub fn analysis_prompt(specialization: &str, task: &Task) -> String {
    let category = match &task.category {
        Some(category) => format!("Category: {category}\n"),
        None => String::new(),
    };
    format!(
        "As an AI agent specialized in {specialization}, analyze this task:\n\
         \n\
         Title: {title}\n\
         Description: {description}\n\
         Priority: {priority}\n\
         {category}\
         \n\
         Provide analysis in this format:\n\
         - Complexity: [low/medium/high]\n\
         - Estimated Hours: [number]\n\
         - Required Skills: [comma-separated list]\n\
         - Recommended Agent Type: [frontend/backend/fullstack/devops]\n\
         \n\
         Consider the technical requirements, scope, and potential challenges.",
        title = task.title,
        description = task.description,
        priority = task.priority,
    )
}

/// Prompt asking an agent to acknowledge a newly assigned task
pub fn acceptance_prompt(name: &str, specialization: &str, task: &Task) -> String {
    format!(
        "You are {name}, an AI agent specialized in {specialization}.\n\
         You have just been assigned this task:\n\
         \n\
         Title: {title}\n\
         Description: {description}\n\
         Priority: {priority}\n\
         \n\
         Provide a brief response acknowledging the task and outlining your initial approach.\n\
         Be professional and specific about your planned steps.",
        title = task.title,
        description = task.description,
        priority = task.priority,
    )
}

/// Prompt asking an agent to narrate progress on a stored task
pub fn progress_prompt(name: &str, record: &TaskRecord) -> String {
    format!(
        "As {name}, provide a realistic progress update for this task:\n\
         \n\
         Title: {title}\n\
         Description: {description}\n\
         \n\
         The task is currently in progress. Provide a brief, realistic update about:\n\
         - Current progress\n\
         - Any challenges encountered\n\
         - Next steps\n\
         - Estimated completion time\n\
         \n\
         Keep it professional and concise.",
        title = record.title,
        description = record.description,
    )
}

/// Value after the last `:` with bullets, emphasis and brackets stripped
fn field_value(line: &str) -> &str {
    line.rsplit(':')
        .next()
        .unwrap_or_default()
        .trim_matches(|c: char| c.is_whitespace() || matches!(c, '*' | '_' | '[' | ']' | '`'))
}

fn parse_hours(value: &str) -> Option<f64> {
    let token = value.split_whitespace().next()?;
    token
        .parse::<f64>()
        .ok()
        .filter(|hours| hours.is_finite() && *hours >= 0.0)
}

/// Parse a model reply into a `TaskAnalysis`
///
/// Never fails: each field keeps its default unless a well-formed value is found.
pub fn parse_analysis(reply: &str) -> TaskAnalysis {
    let mut analysis = TaskAnalysis::default();

    for line in reply.lines() {
        let lowered = line.to_lowercase();

        if lowered.contains(COMPLEXITY_LABEL) {
            if let Ok(complexity) = field_value(line).parse::<Complexity>() {
                analysis.complexity = complexity;
            }
        } else if lowered.contains(HOURS_LABEL) {
            analysis.estimated_hours =
                parse_hours(field_value(line)).unwrap_or(DEFAULT_ESTIMATED_HOURS);
        } else if lowered.contains(SKILLS_LABEL) {
            let skills: Vec<String> = field_value(line)
                .split(',')
                .map(|skill| skill.trim().to_string())
                .filter(|skill| !skill.is_empty())
                .collect();
            if !skills.is_empty() {
                analysis.required_skills = skills;
            }
        } else if lowered.contains(RECOMMENDED_LABEL) {
            let recommended = field_value(line).to_lowercase();
            if !recommended.is_empty() {
                analysis.recommended_agent = recommended;
            }
        }
    }

    analysis
}

/// Whether `specialization` is a case-insensitive substring of `recommended`
pub fn matches_specialization(specialization: &str, recommended: &str) -> bool {
    recommended
        .to_lowercase()
        .contains(&specialization.to_lowercase())
}
