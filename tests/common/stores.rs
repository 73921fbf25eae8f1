//! In-memory configuration and job stores

#![allow(dead_code)]

use async_trait::async_trait;
use pr_blocker::config::RepoConfig;
use pr_blocker::error::{Error, Result};
use pr_blocker::store::{ConfigStore, JobRef, JobRequest, JobState, JobStore};
use std::collections::HashMap;
use std::sync::Mutex;

/// Configuration objects held in memory
#[derive(Default)]
pub struct MemoryConfigStore {
    configs: Mutex<Vec<RepoConfig>>,
}

impl MemoryConfigStore {
    pub fn new(configs: Vec<RepoConfig>) -> Self {
        Self {
            configs: Mutex::new(configs),
        }
    }

    /// Add or replace the object with the same namespace/name
    pub fn put(&self, config: RepoConfig) {
        let mut configs = self.configs.lock().unwrap();
        configs.retain(|c| !(c.namespace == config.namespace && c.name == config.name));
        configs.push(config);
    }

    pub fn remove(&self, namespace: &str, name: &str) {
        self.configs
            .lock()
            .unwrap()
            .retain(|c| !(c.namespace == namespace && c.name == name));
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn list(&self) -> Result<Vec<RepoConfig>> {
        Ok(self.configs.lock().unwrap().clone())
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<RepoConfig> {
        self.configs
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.namespace == namespace && c.name == name)
            .cloned()
            .ok_or_else(|| Error::ConfigNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }
}

/// Job system stand-in; created jobs start `Running`
#[derive(Default)]
pub struct MemoryJobStore {
    created: Mutex<Vec<JobRequest>>,
    states: Mutex<HashMap<String, JobState>>,
    error_on_create: Mutex<Option<String>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> Vec<JobRequest> {
        self.created.lock().unwrap().clone()
    }

    /// The most recently created job
    pub fn last_job(&self) -> Option<JobRequest> {
        self.created.lock().unwrap().last().cloned()
    }

    pub fn set_state(&self, name: &str, state: JobState) {
        self.states.lock().unwrap().insert(name.to_string(), state);
    }

    /// Set the state of the most recently created job
    pub fn finish_last(&self, state: JobState) {
        let name = self.last_job().expect("no job created").name;
        self.set_state(&name, state);
    }

    /// Delete a job so later polls report it missing
    pub fn remove_job(&self, name: &str) {
        self.states.lock().unwrap().remove(name);
    }

    pub fn fail_create(&self, msg: &str) {
        *self.error_on_create.lock().unwrap() = Some(msg.to_string());
    }

    pub fn heal(&self) {
        *self.error_on_create.lock().unwrap() = None;
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, request: &JobRequest) -> Result<JobRef> {
        if let Some(msg) = self.error_on_create.lock().unwrap().as_ref() {
            return Err(Error::JobStore(msg.clone()));
        }
        self.created.lock().unwrap().push(request.clone());
        self.set_state(&request.name, JobState::Running);
        Ok(JobRef {
            namespace: request.namespace.clone(),
            name: request.name.clone(),
        })
    }

    async fn state(&self, job: &JobRef) -> Result<JobState> {
        self.states
            .lock()
            .unwrap()
            .get(&job.name)
            .cloned()
            .ok_or_else(|| Error::JobNotFound(job.to_string()))
    }
}
