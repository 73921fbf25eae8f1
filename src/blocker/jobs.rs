//! Retest jobs and merge parameters
//!
//! Which pre-submit jobs count for a target branch, how their statuses
//! encode the base commit they ran against, what a batch retest request
//! looks like, and how a PR gets merged.

use crate::config::{BlockerSettings, JobSpec, MergeConfig, RepoConfig};
use crate::error::{Error, Result};
use crate::store::{JobBase, JobPull, JobRequest, JobSender};
use crate::types::{MergeMethod, PullRequest, branch_name};
use rand::Rng;
use rand::distributions::Alphanumeric;
use regex::Regex;
use std::sync::LazyLock;

/// Key preceding the base sha in a job's status description
pub const BASE_SHA_KEY: &str = "BaseSHA:";

static BASE_SHA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("{BASE_SHA_KEY}([0-9a-f]{{5,40}})")).expect("base sha regex is valid")
});

static TEMPLATE_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*\.([A-Za-z][A-Za-z.]*)\s*\}\}").expect("template regex is valid")
});

/// Base sha a job ran against, from its status description
pub fn parse_base_sha(description: &str) -> Option<&str> {
    BASE_SHA_RE
        .captures(description)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn any_match(patterns: &[String], value: &str) -> bool {
    patterns
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .any(|re| re.is_match(value))
}

/// Pre-submit jobs that run for pull requests targeting `base_ref`
pub fn filter_jobs<'a>(jobs: &'a [JobSpec], base_ref: &str) -> Vec<&'a JobSpec> {
    let branch = branch_name(base_ref);
    jobs.iter()
        .filter(|job| {
            let Some(when) = &job.when else {
                return true;
            };
            if !when.tag.is_empty() || !when.skip_tag.is_empty() {
                return false;
            }
            let included = when.branch.is_empty() || any_match(&when.branch, branch);
            let skipped = !when.skip_branch.is_empty() && any_match(&when.skip_branch, branch);
            included && !skipped
        })
        .collect()
}

fn random_suffix() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(5)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect()
}

/// Job name: `<config>-<head sha prefix | batch>-<random>`
pub fn job_name(config_name: &str, pull_requests: &[PullRequest]) -> String {
    let middle = match pull_requests {
        [single] => single.head.sha.chars().take(5).collect(),
        _ => "batch".to_string(),
    };
    format!("{config_name}-{middle}-{}", random_suffix())
}

/// Build the retest request for a batch targeting `branch` at `base_sha`
pub fn batch_job_request(
    config: &RepoConfig,
    settings: &BlockerSettings,
    branch: &str,
    base_sha: &str,
    pull_requests: &[PullRequest],
) -> Result<JobRequest> {
    let jobs: Vec<String> = filter_jobs(&config.jobs.pre_submit, branch)
        .into_iter()
        .map(|j| j.name.clone())
        .collect();
    if jobs.is_empty() {
        return Err(Error::NoApplicableJobs(branch.to_string()));
    }

    Ok(JobRequest {
        name: job_name(&config.name, pull_requests),
        namespace: config.namespace.clone(),
        config_name: config.name.clone(),
        jobs,
        repository: config.git.repository.clone(),
        sender: JobSender {
            name: settings.bot_name.clone(),
            email: settings.bot_email.clone(),
        },
        base: JobBase {
            reference: branch.to_string(),
            sha: base_sha.to_string(),
        },
        pulls: pull_requests
            .iter()
            .map(|pr| JobPull {
                id: pr.id,
                reference: pr.head.reference.clone(),
                sha: pr.head.sha.clone(),
                link: pr.url.clone(),
                author: pr.author.name.clone(),
            })
            .collect(),
    })
}

/// Merge method for `pr`: first override label wins, then the configured default
pub fn merge_method(pr: &PullRequest, merge: &MergeConfig, settings: &BlockerSettings) -> MergeMethod {
    for label in &pr.labels {
        if !settings.squash_label.is_empty() && *label == settings.squash_label {
            return MergeMethod::Squash;
        }
        if !settings.merge_label.is_empty() && *label == settings.merge_label {
            return MergeMethod::Merge;
        }
    }
    merge.method.unwrap_or_default()
}

fn template_field(pr: &PullRequest, field: &str) -> Option<String> {
    let value = match field {
        "ID" => pr.id.to_string(),
        "Title" => pr.title.clone(),
        "URL" => pr.url.clone(),
        "Author.Name" | "Sender.Name" => pr.author.name.clone(),
        "Author.Email" | "Sender.Email" => pr.author.email.clone(),
        "Head.Ref" => pr.head.reference.clone(),
        "Head.Sha" => pr.head.sha.clone(),
        "Base.Ref" => pr.base.reference.clone(),
        "Base.Sha" => pr.base.sha.clone(),
        _ => return None,
    };
    Some(value)
}

/// Render a `{{.Field}}` commit template against `pr`
pub fn render_commit_message(template: &str, pr: &PullRequest) -> Result<String> {
    let mut rendered = String::with_capacity(template.len());
    let mut last = 0;
    for caps in TEMPLATE_FIELD_RE.captures_iter(template) {
        let (Some(whole), Some(field)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = template_field(pr, field.as_str())
            .ok_or_else(|| Error::Template(format!("unknown field .{}", field.as_str())))?;
        rendered.push_str(&template[last..whole.start()]);
        rendered.push_str(&value);
        last = whole.end();
    }
    rendered.push_str(&template[last..]);
    Ok(rendered)
}

/// Commit message for merging `pr`; empty without a template
pub fn commit_message(merge: &MergeConfig, pr: &PullRequest) -> Result<String> {
    match merge.commit_template.as_deref() {
        Some(template) if !template.is_empty() => render_commit_message(template, pr),
        _ => Ok(String::new()),
    }
}
