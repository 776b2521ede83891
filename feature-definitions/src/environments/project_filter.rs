use crate::environments::environment_models::Environment;

/// The set of projects whose features may end up in a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowedProjects {
    /// No project restriction at all
    All,
    /// Only these projects. An empty list admits nothing.
    Only(Vec<String>),
}

impl AllowedProjects {
    /// Whether a feature belonging to `project` is visible.
    /// Features without a project are only visible when nothing is restricted.
    pub fn admits(&self, project: Option<&str>) -> bool {
        match self {
            AllowedProjects::All => true,
            AllowedProjects::Only(projects) => {
                project.is_some_and(|p| projects.iter().any(|allowed| allowed == p))
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, AllowedProjects::Only(projects) if projects.is_empty())
    }
}

/// Narrows the caller's requested projects by what the environment itself permits.
///
/// With `strict`, an environment restricted to some projects applies that
/// restriction even when the caller asked for no particular project. Without
/// it, an unscoped caller sees every project.
pub fn filter_projects(
    requested: &[String],
    environment: &Environment,
    strict: bool,
) -> AllowedProjects {
    if !environment.is_restricted() {
        return if requested.is_empty() {
            AllowedProjects::All
        } else {
            AllowedProjects::Only(requested.to_vec())
        };
    }

    if requested.is_empty() {
        return if strict {
            AllowedProjects::Only(environment.projects.clone())
        } else {
            AllowedProjects::All
        };
    }

    AllowedProjects::Only(
        requested
            .iter()
            .filter(|project| environment.projects.contains(project))
            .cloned()
            .collect(),
    )
}
