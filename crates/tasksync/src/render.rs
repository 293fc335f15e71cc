//! Issue body rendering and parsing.
//!
//! The body of every managed issue follows a fixed layout: a YAML-style
//! metadata block, free-text sections, checkbox link lists and a trailing
//! marker comment. Other tools parse this layout. Rendering is
//! deterministic: the same task and the same link states always produce the
//! same string, and the sync engine relies on that to skip unchanged bodies.
//!
//! ```text
//! ---
//! id: 3
//! title: "Wire up auth"
//! parent: [1]
//! dependents: [4]
//! complexity: 7
//! priority: high
//! status: pending
//! ---
//!
//! ## Details
//! ...
//!
//! ## Test Strategy
//! ...
//!
//! ## Dependencies
//! - [x] #12
//!
//! ## Meta
//! - Status: `pending`
//! - Priority: `high`
//! - Complexity: `7 / 10`
//! - Required By:
//!    - [ ] #14
//! <!-- tasksync:managed -->
//! ```

use crate::domain::{IssueNumber, Task, TaskId};
use crate::graph::TaskAnnotations;

/// Marker comment identifying issues managed by tasksync.
pub const ISSUE_MARKER: &str = "<!-- tasksync:managed -->";

/// Label applied to issues with at least one open dependency.
pub const BLOCKED_LABEL: &str = "blocked";

/// Label applied to children of a task in `breakdown` status.
pub const SUB_ISSUE_LABEL: &str = "sub-issue";

const DEPENDENCIES_HEADING: &str = "## Dependencies";
const META_HEADING: &str = "## Meta";
const SUB_ISSUE_COMMENT_PREFIX: &str = "Sub-issue: ";

/// A reference to another issue, rendered as a checkbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssueLink {
    /// Linked issue
    pub number: IssueNumber,
    /// Checked when the linked issue is closed
    pub closed: bool,
}

impl IssueLink {
    fn checkbox(self) -> String {
        let mark = if self.closed { 'x' } else { ' ' };
        format!("- [{mark}] {}", self.number)
    }
}

/// Link lists filled in once every task has an issue number.
///
/// The default (all empty) is the placeholder used when an issue is first
/// created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BodyLinks {
    /// Issues this task depends on
    pub dependencies: Vec<IssueLink>,
    /// Issues that depend on this task
    pub required_by: Vec<IssueLink>,
    /// Issues of this task's subtasks
    pub subtasks: Vec<IssueLink>,
}

/// Render the canonical issue body for a task.
pub fn render_body(task: &Task, annotations: &TaskAnnotations, links: &BodyLinks) -> String {
    let mut body = String::new();

    body.push_str("---\n");
    body.push_str(&format!("id: {}\n", task.id));
    body.push_str(&format!("title: \"{}\"\n", escape_title(&task.title)));
    if let Some(parent) = annotations.parent {
        body.push_str(&format!("parent: [{parent}]\n"));
    }
    if !annotations.required_by.is_empty() {
        body.push_str(&format!("dependents: [{}]\n", join_ids(&annotations.required_by)));
    }
    body.push_str(&format!("complexity: {}\n", task.complexity));
    body.push_str(&format!("priority: {}\n", task.priority));
    body.push_str(&format!("status: {}\n", task.status.as_wire_str()));
    body.push_str("---\n\n");

    let mut details = vec![task.description.trim_end()];
    if let Some(extra) = task.details.as_deref() {
        details.push(extra.trim_end());
    }
    let details: Vec<&str> = details.into_iter().filter(|s| !s.is_empty()).collect();
    push_section(&mut body, "## Details", &[details.join("\n\n")]);

    let strategy = task.test_strategy.as_deref().map(str::trim_end).unwrap_or("");
    push_section(&mut body, "## Test Strategy", &[strategy.to_string()]);

    if !task.subtasks.is_empty() {
        push_section(&mut body, "## Subtasks", &checkboxes(&links.subtasks));
    }

    push_section(&mut body, DEPENDENCIES_HEADING, &checkboxes(&links.dependencies));

    body.push_str(META_HEADING);
    body.push('\n');
    body.push_str(&format!("- Status: `{}`\n", task.status.as_wire_str()));
    body.push_str(&format!("- Priority: `{}`\n", task.priority));
    body.push_str(&format!("- Complexity: `{} / 10`\n", task.complexity));
    body.push_str("- Required By:\n");
    for link in &links.required_by {
        body.push_str(&format!("   {}\n", link.checkbox()));
    }
    body.push_str(ISSUE_MARKER);
    body.push('\n');

    body
}

/// Labels for a task's issue, excluding the conditional `blocked` label.
///
/// `breakdown_child` is true when the task's parent is in `breakdown`
/// status, which adds the `sub-issue` label.
pub fn task_labels(task: &Task, fixed_tag: &str, breakdown_child: bool) -> Vec<String> {
    let mut labels = vec![
        fixed_tag.to_string(),
        format!("priority:{}", task.priority),
        format!("complexity:{}", task.complexity_tier().as_str()),
    ];
    if breakdown_child {
        labels.push(SUB_ISSUE_LABEL.to_string());
    }
    labels
}

/// Whether a body carries the tasksync marker.
pub fn has_marker(body: &str) -> bool {
    body.contains(ISSUE_MARKER)
}

/// Issue numbers listed in a body's `## Dependencies` section.
///
/// Both checked and unchecked entries are returned, in order. The section
/// read is the last `## Dependencies` heading before `## Meta`, so the same
/// heading inside free-text details is ignored. Bodies without the section
/// yield an empty list.
pub fn parse_dependency_numbers(body: &str) -> Vec<IssueNumber> {
    let lines: Vec<&str> = body.lines().collect();
    let end = lines
        .iter()
        .rposition(|line| line.trim_end() == META_HEADING)
        .unwrap_or(lines.len());
    let Some(start) = lines[..end]
        .iter()
        .rposition(|line| line.trim_end() == DEPENDENCIES_HEADING)
    else {
        return Vec::new();
    };

    lines[start + 1..end]
        .iter()
        .take_while(|line| !line.starts_with("## "))
        .filter_map(|line| parse_checkbox_reference(line))
        .collect()
}

/// Comment posted on a parent when the native sub-issue link is unavailable.
pub fn sub_issue_comment(child: IssueNumber) -> String {
    format!("{SUB_ISSUE_COMMENT_PREFIX}{child}")
}

/// Child issue referenced by a [`sub_issue_comment`], if `comment` is one.
pub fn parse_sub_issue_comment(comment: &str) -> Option<IssueNumber> {
    comment
        .trim()
        .strip_prefix(SUB_ISSUE_COMMENT_PREFIX)?
        .strip_prefix('#')?
        .parse::<u64>()
        .ok()
        .map(IssueNumber)
}

fn parse_checkbox_reference(line: &str) -> Option<IssueNumber> {
    let rest = line
        .trim()
        .strip_prefix("- [")?
        .get(1..)?
        .strip_prefix("] #")?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    digits.parse::<u64>().ok().map(IssueNumber)
}

fn push_section(body: &mut String, heading: &str, lines: &[String]) {
    body.push_str(heading);
    body.push('\n');
    for line in lines.iter().filter(|l| !l.is_empty()) {
        body.push_str(line);
        body.push('\n');
    }
    body.push('\n');
}

fn checkboxes(links: &[IssueLink]) -> Vec<String> {
    links.iter().map(|link| link.checkbox()).collect()
}

fn join_ids(ids: &[TaskId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn escape_title(title: &str) -> String {
    title.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Priority, TaskStatus};
    use rstest::rstest;

    fn sample_task() -> Task {
        let mut task = Task::new(3, "Wire up \"auth\"")
            .with_dependencies([1, 2])
            .with_complexity(7);
        task.description = "Implement the OAuth flow.".to_string();
        task.test_strategy = Some("Log in twice.".to_string());
        task.priority = Priority::High;
        task.status = TaskStatus::InProgress;
        task
    }

    #[test]
    fn test_render_body_exact_layout() {
        let annotations = TaskAnnotations {
            required_by: vec![TaskId(4)],
            hierarchy_depth: 2,
            parent: Some(TaskId(1)),
        };
        let links = BodyLinks {
            dependencies: vec![
                IssueLink { number: IssueNumber(11), closed: true },
                IssueLink { number: IssueNumber(12), closed: false },
            ],
            required_by: vec![IssueLink { number: IssueNumber(14), closed: false }],
            subtasks: vec![],
        };

        let expected = "---\n\
id: 3\n\
title: \"Wire up \\\"auth\\\"\"\n\
parent: [1]\n\
dependents: [4]\n\
complexity: 7\n\
priority: high\n\
status: in_progress\n\
---\n\
\n\
## Details\n\
Implement the OAuth flow.\n\
\n\
## Test Strategy\n\
Log in twice.\n\
\n\
## Dependencies\n\
- [x] #11\n\
- [ ] #12\n\
\n\
## Meta\n\
- Status: `in_progress`\n\
- Priority: `high`\n\
- Complexity: `7 / 10`\n\
- Required By:\n   - [ ] #14\n\
<!-- tasksync:managed -->\n";

        assert_eq!(render_body(&sample_task(), &annotations, &links), expected);
    }

    #[test]
    fn test_placeholder_body_has_empty_link_sections() {
        let mut task = sample_task();
        task.subtasks = vec![TaskId(5)];
        let body = render_body(&task, &TaskAnnotations::default(), &BodyLinks::default());

        assert!(body.contains("## Subtasks\n\n## Dependencies\n\n## Meta\n"));
        assert!(body.ends_with("- Required By:\n<!-- tasksync:managed -->\n"));
        assert!(!body.contains("parent:"));
        assert!(!body.contains("dependents:"));
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let task = sample_task();
        let annotations = TaskAnnotations::default();
        let links = BodyLinks::default();
        assert_eq!(
            render_body(&task, &annotations, &links),
            render_body(&task, &annotations, &links)
        );
    }

    #[rstest]
    #[case::high(8, "complexity:high")]
    #[case::medium(5, "complexity:medium")]
    #[case::low(2, "complexity:low")]
    fn test_complexity_labels(#[case] score: u8, #[case] expected: &str) {
        let task = Task::new(1, "t").with_complexity(score);
        let labels = task_labels(&task, "taskmaster", false);
        assert_eq!(labels[0], "taskmaster");
        assert_eq!(labels[1], "priority:medium");
        assert_eq!(labels[2], expected);
    }

    #[test]
    fn test_breakdown_child_gets_sub_issue_label() {
        let task = Task::new(2, "child");
        assert!(task_labels(&task, "taskmaster", true).contains(&SUB_ISSUE_LABEL.to_string()));
        assert!(!task_labels(&task, "taskmaster", false).contains(&SUB_ISSUE_LABEL.to_string()));
    }

    #[test]
    fn test_parse_rendered_body() {
        let links = BodyLinks {
            dependencies: vec![
                IssueLink { number: IssueNumber(11), closed: true },
                IssueLink { number: IssueNumber(12), closed: false },
            ],
            required_by: vec![IssueLink { number: IssueNumber(14), closed: false }],
            subtasks: vec![],
        };
        let body = render_body(&sample_task(), &TaskAnnotations::default(), &links);

        assert!(has_marker(&body));
        assert_eq!(
            parse_dependency_numbers(&body),
            vec![IssueNumber(11), IssueNumber(12)]
        );
    }

    #[test]
    fn test_parse_foreign_body() {
        let body = "Just a hand-written issue\n\n- [ ] #3 unrelated checklist";
        assert!(!has_marker(body));
        assert!(parse_dependency_numbers(body).is_empty());
    }

    #[test]
    fn test_dependency_heading_in_details_is_ignored() {
        let mut task = sample_task();
        task.description = "Notes\n## Dependencies\nnone yet".to_string();
        let links = BodyLinks {
            dependencies: vec![IssueLink { number: IssueNumber(12), closed: false }],
            ..BodyLinks::default()
        };
        let body = render_body(&task, &TaskAnnotations::default(), &links);

        assert_eq!(parse_dependency_numbers(&body), vec![IssueNumber(12)]);
    }

    #[test]
    fn test_empty_dependency_section_after_details_heading() {
        let mut task = sample_task();
        task.description = "## Dependencies\n- [ ] #99".to_string();
        let body = render_body(&task, &TaskAnnotations::default(), &BodyLinks::default());

        assert!(parse_dependency_numbers(&body).is_empty());
    }

    #[rstest]
    #[case::plain("Sub-issue: #7", Some(IssueNumber(7)))]
    #[case::padded("  Sub-issue: #42\n", Some(IssueNumber(42)))]
    #[case::other_comment("Looks good to me", None)]
    #[case::trailing_text("Sub-issue: #7 and more", None)]
    fn test_parse_sub_issue_comment(#[case] comment: &str, #[case] expected: Option<IssueNumber>) {
        assert_eq!(parse_sub_issue_comment(comment), expected);
    }

    #[test]
    fn test_sub_issue_comment_round_trips() {
        let comment = sub_issue_comment(IssueNumber(5));
        assert_eq!(comment, "Sub-issue: #5");
        assert_eq!(parse_sub_issue_comment(&comment), Some(IssueNumber(5)));
    }
}
