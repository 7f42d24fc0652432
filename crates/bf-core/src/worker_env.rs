//! Environment contract between the orchestrator and a worker process
//!
//! Identifying fields and secrets travel in the child's environment, never
//! on its command line.

use crate::error::WorkerEnvError;
use crate::types::{BotDefinition, ReplicaId, SensitiveString};

pub const BOT_TOKEN: &str = "BOT_TOKEN";
pub const REPLICA_UUID: &str = "REPLICA_UUID";
pub const REPLICA_SLUG: &str = "REPLICA_SLUG";
pub const OWNER_UUID: &str = "OWNER_UUID";
pub const ELEVENLABS_ID: &str = "ELEVENLABS_ID";
pub const LOG_LEVEL: &str = "LOG_LEVEL";
pub const BOT_CHAOS: &str = "BOT_CHAOS";

/// Validated worker environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerEnv {
    pub token: SensitiveString,
    pub replica_id: ReplicaId,
    pub replica_slug: Option<String>,
    pub owner_id: String,
    pub voice_id: Option<String>,
    pub log_level: Option<String>,
    /// Raw fault list, parsed by the worker agent
    pub chaos: Option<String>,
}

impl WorkerEnv {
    /// Environment for the worker that runs `definition`
    pub fn from_definition(definition: &BotDefinition) -> Self {
        Self {
            token: definition.token.clone(),
            replica_id: definition.replica_id.clone(),
            replica_slug: definition.replica_slug.clone(),
            owner_id: definition.owner_id.clone(),
            voice_id: definition.voice_id.clone(),
            log_level: None,
            chaos: None,
        }
    }

    /// Variables to set on the child process
    pub fn to_vars(&self) -> Vec<(&'static str, String)> {
        let mut vars = vec![
            (BOT_TOKEN, self.token.expose().to_string()),
            (REPLICA_UUID, self.replica_id.to_string()),
            (OWNER_UUID, self.owner_id.clone()),
        ];
        let optional = [
            (REPLICA_SLUG, &self.replica_slug),
            (ELEVENLABS_ID, &self.voice_id),
            (LOG_LEVEL, &self.log_level),
            (BOT_CHAOS, &self.chaos),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                vars.push((name, value.clone()));
            }
        }
        vars
    }

    /// Read and validate the current process environment
    pub fn from_env() -> Result<Self, WorkerEnvError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Validate an environment provided by `lookup`; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, WorkerEnvError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let require = |name: &'static str| get(name).ok_or(WorkerEnvError::Missing(name));

        Ok(Self {
            token: require(BOT_TOKEN)?.into(),
            replica_id: require(REPLICA_UUID)?.into(),
            replica_slug: get(REPLICA_SLUG),
            owner_id: require(OWNER_UUID)?,
            voice_id: get(ELEVENLABS_ID),
            log_level: get(LOG_LEVEL),
            chaos: get(BOT_CHAOS),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: Vec<(&'static str, String)>) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_definition_survives_environment() {
        let definition = BotDefinition::new("r-1", "owner-1", "tok")
            .with_slug("alice")
            .with_voice_id("v-1");
        let env = WorkerEnv::from_definition(&definition);

        let parsed = WorkerEnv::from_lookup(lookup(env.to_vars())).unwrap();
        assert_eq!(parsed, env);
        assert_eq!(parsed.token.expose(), "tok");
    }

    #[test]
    fn test_optional_vars_are_omitted() {
        let env = WorkerEnv::from_definition(&BotDefinition::new("r-1", "o", "t"));
        let names: Vec<_> = env.to_vars().into_iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec![BOT_TOKEN, REPLICA_UUID, OWNER_UUID]);
    }

    #[test]
    fn test_missing_token_is_rejected() {
        let err = WorkerEnv::from_lookup(lookup(vec![
            (REPLICA_UUID, "r".to_string()),
            (OWNER_UUID, "o".to_string()),
            (BOT_TOKEN, "  ".to_string()),
        ]))
        .unwrap_err();
        assert_eq!(err, WorkerEnvError::Missing(BOT_TOKEN));
    }
}
