use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Environment {
    pub id: String,
    #[serde(default)]
    pub description: String,
    /// Projects this environment is restricted to. Empty means unrestricted.
    #[serde(default)]
    pub projects: Vec<String>,
}

impl Environment {
    pub fn is_restricted(&self) -> bool {
        !self.projects.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Project {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Organization {
    pub id: String,
    #[serde(default)]
    pub environments: Vec<Environment>,
    #[serde(default)]
    pub projects: Vec<Project>,
}

impl Organization {
    pub fn environment(&self, id: &str) -> Option<&Environment> {
        self.environments.iter().find(|env| env.id == id)
    }

    pub fn has_project(&self, id: &str) -> bool {
        self.projects.iter().any(|project| project.id == id)
    }
}

/// An API key handed to SDKs, bound to one organization and environment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SdkConnection {
    pub key: String,
    pub organization: String,
    /// Falls back to the configured default environment when unset
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub projects: Vec<String>,
    #[serde(default)]
    pub encrypt_payload: bool,
    #[serde(default)]
    pub encryption_key: Option<String>,
}
