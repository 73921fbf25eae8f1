//! Merge condition evaluation
//!
//! [`check_simple`] only looks at fields every PR listing carries (labels,
//! author, target branch). [`check_full`] additionally fetches live
//! mergeability and commit statuses.

use crate::config::MergeQuery;
use crate::error::Result;
use crate::platform::GitProvider;
use crate::types::{CommitStatus, CommitStatusState, PullRequest, branch_name};
use std::collections::{BTreeSet, HashMap};

/// Implicit label required by `approve_required`
pub const APPROVED_LABEL: &str = "approved";

/// Outcome of the simple tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Every rule holds
    pub passed: bool,
    /// Space-joined rule violations, empty when passed
    pub message: String,
}

/// Outcome of the full tier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullVerdict {
    /// Every condition holds
    pub passed: bool,
    /// A structural rule (label/author/branch) failed
    pub remove_from_merge_pool: bool,
    /// Space-joined violations
    pub message: String,
}

/// Live data gathered by [`check_full`]
#[derive(Debug, Clone)]
pub struct LiveCheck {
    /// Freshly fetched PR
    pub pull_request: PullRequest,
    /// Latest status per context on the head commit
    pub statuses: HashMap<String, CommitStatus>,
    /// Evaluation result
    pub verdict: FullVerdict,
}

fn join_sorted<'a>(items: impl IntoIterator<Item = &'a str>) -> String {
    let sorted: BTreeSet<&str> = items.into_iter().collect();
    sorted.into_iter().collect::<Vec<_>>().join(",")
}

fn check_labels(labels: &[String], query: &MergeQuery) -> (bool, Option<String>) {
    let present: BTreeSet<&str> = labels.iter().map(String::as_str).collect();

    let required = query
        .labels
        .iter()
        .map(String::as_str)
        .chain(query.approve_required.then_some(APPROVED_LABEL));
    let missing: Vec<&str> = required.filter(|l| !present.contains(l)).collect();
    let blocking: Vec<&str> = query
        .block_labels
        .iter()
        .map(String::as_str)
        .filter(|l| present.contains(l))
        .collect();

    let mut segments = Vec::new();
    if !missing.is_empty() {
        segments.push(format!("Label [{}] is required.", join_sorted(missing.iter().copied())));
    }
    if !blocking.is_empty() {
        segments.push(format!(
            "Label [{}] is blocking the merge.",
            join_sorted(blocking.iter().copied())
        ));
    }

    let passed = missing.is_empty() && blocking.is_empty();
    (passed, (!segments.is_empty()).then(|| segments.join(" ")))
}

fn contains(haystack: &[String], needle: &str) -> bool {
    haystack.iter().any(|s| s == needle)
}

fn check_author(author: &str, query: &MergeQuery) -> (bool, Option<String>) {
    if contains(&query.skip_authors, author) {
        return (false, Some(format!("Author [{author}] is in skipAuthors query.")));
    }
    if !query.authors.is_empty() && !contains(&query.authors, author) {
        return (
            false,
            Some(format!("Author [{author}] is not in authors query.")),
        );
    }
    (true, None)
}

fn check_branch(reference: &str, query: &MergeQuery) -> (bool, Option<String>) {
    let branch = branch_name(reference);
    if contains(&query.skip_branches, branch) {
        return (
            false,
            Some(format!("Branch [{branch}] is in skipBranches query.")),
        );
    }
    if !query.branches.is_empty() && !contains(&query.branches, branch) {
        return (
            false,
            Some(format!("Branch [{branch}] is not in branches query.")),
        );
    }
    (true, None)
}

/// Evaluate label, author and branch rules
pub fn check_simple(query: &MergeQuery, pr: &PullRequest) -> Verdict {
    let (labels_ok, labels_msg) = check_labels(&pr.labels, query);
    let (author_ok, author_msg) = check_author(&pr.author.name, query);
    let (branch_ok, branch_msg) = check_branch(&pr.base.reference, query);

    let message = [labels_msg, author_msg, branch_msg]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");

    Verdict {
        passed: labels_ok && author_ok && branch_ok,
        message,
    }
}

/// Evaluate commit statuses
///
/// `own_context` is the engine's own status and never counts.
pub fn check_checks(
    statuses: &HashMap<String, CommitStatus>,
    query: &MergeQuery,
    own_context: &str,
) -> Verdict {
    let succeeded =
        |context: &str| statuses.get(context).is_some_and(|s| s.state == CommitStatusState::Success);

    let unmet: Vec<&str> = if query.checks.is_empty() {
        statuses
            .keys()
            .map(String::as_str)
            .filter(|c| *c != own_context && !contains(&query.optional_checks, c))
            .filter(|c| !succeeded(c))
            .collect()
    } else {
        query
            .checks
            .iter()
            .map(String::as_str)
            .filter(|c| *c != own_context && !succeeded(c))
            .collect()
    };

    if unmet.is_empty() {
        Verdict {
            passed: true,
            message: String::new(),
        }
    } else {
        Verdict {
            passed: false,
            message: format!("Checks [{}] are not successful.", join_sorted(unmet)),
        }
    }
}

/// Combine the simple tier with mergeability and checks, over known data
pub fn evaluate_full(
    query: &MergeQuery,
    pr: &PullRequest,
    statuses: &HashMap<String, CommitStatus>,
    own_context: &str,
) -> FullVerdict {
    let simple = check_simple(query, pr);
    if !simple.passed {
        return FullVerdict {
            passed: false,
            remove_from_merge_pool: true,
            message: simple.message,
        };
    }

    let mut messages = Vec::new();
    if !pr.mergeable {
        messages.push("Merge conflicts exist.".to_string());
    }
    let checks = check_checks(statuses, query, own_context);
    if !checks.message.is_empty() {
        messages.push(checks.message);
    }
    if !simple.message.is_empty() {
        messages.push(simple.message);
    }

    FullVerdict {
        passed: pr.mergeable && checks.passed,
        remove_from_merge_pool: false,
        message: messages.join(" "),
    }
}

/// Fetch live data for PR `id` and evaluate every condition
pub async fn check_full(
    query: &MergeQuery,
    id: u64,
    provider: &dyn GitProvider,
    own_context: &str,
) -> Result<LiveCheck> {
    let pull_request = provider.get_pull_request(id).await?;
    let statuses: HashMap<String, CommitStatus> = provider
        .list_commit_statuses(&pull_request.head.sha)
        .await?
        .into_iter()
        .map(|s| (s.context.clone(), s))
        .collect();

    let verdict = evaluate_full(query, &pull_request, &statuses, own_context);
    Ok(LiveCheck {
        pull_request,
        statuses,
        verdict,
    })
}
