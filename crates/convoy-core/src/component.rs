//! Component kind and command surface types
//!
//! These are the shared vocabulary between the orchestrator scopes and the
//! plugins they drive: the closed set of component kinds, the command info
//! tree a command plugin reports, and the flattened wire form the server
//! consumes.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Closed set of plugin component categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    /// Command plugins expose a command tree and an execute entry point.
    Command,
    /// Host plugins detect whether they apply to the running host.
    Host,
    /// Provider plugins manage workload backends.
    Provider,
}

impl ComponentKind {
    /// All kinds in their canonical enumeration order.
    pub fn all() -> [ComponentKind; 3] {
        [
            ComponentKind::Command,
            ComponentKind::Host,
            ComponentKind::Provider,
        ]
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComponentKind::Command => "command",
            ComponentKind::Host => "host",
            ComponentKind::Provider => "provider",
        };
        write!(f, "{}", name)
    }
}

/// Metadata about the job a scope is executing on behalf of.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobInfo {
    /// Identifier of the job, empty when running outside a job.
    #[serde(default)]
    pub id: String,
    /// Whether the job runs on the local node.
    #[serde(default)]
    pub local: bool,
}

/// CLI arguments routed to a command plugin, kept distinct from ordinary
/// string vectors so the invoker can match them by type.
#[derive(Debug, Clone, Default)]
pub struct CliArgs(pub Vec<String>);

/// Kind of value a command flag carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagKind {
    Bool,
    String,
}

/// Flag declared by a command plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Flag {
    pub long_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub default_value: Option<String>,
    pub kind: FlagKind,
}

/// Wire form of a flag as shipped to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFlag {
    pub long_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub default_value: String,
    pub kind: FlagKind,
}

/// Pluggable translation from declared flags to their wire form.
pub type FlagMapper = Arc<dyn Fn(&[Flag]) -> Vec<WireFlag> + Send + Sync>;

/// Default flag translation.
pub fn flags_to_wire(flags: &[Flag]) -> Vec<WireFlag> {
    flags
        .iter()
        .map(|f| WireFlag {
            long_name: f.long_name.clone(),
            description: f.description.clone(),
            default_value: f.default_value.clone().unwrap_or_default(),
            kind: f.kind,
        })
        .collect()
}

/// Command tree reported by a command plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandInfo {
    pub name: String,
    #[serde(default)]
    pub synopsis: String,
    #[serde(default)]
    pub help: String,
    #[serde(default)]
    pub flags: Vec<Flag>,
    #[serde(default)]
    pub subcommands: Vec<CommandInfo>,
}

/// Flattened command entry: the name is the whitespace-joined path from the
/// root command to this node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub name: String,
    pub synopsis: String,
    pub help: String,
    pub flags: Vec<WireFlag>,
}

/// Flatten a command info tree into its sequence of command records,
/// depth-first, concatenating parent names with a single space.
pub fn flatten_command_info(
    info: &CommandInfo,
    parents: &[String],
    flag_mapper: &FlagMapper,
) -> Vec<CommandRecord> {
    let mut names = parents.to_vec();
    names.push(info.name.clone());

    let mut records = vec![CommandRecord {
        name: names.join(" "),
        synopsis: info.synopsis.clone(),
        help: info.help.clone(),
        flags: flag_mapper(&info.flags),
    }];

    for sub in &info.subcommands {
        records.extend(flatten_command_info(sub, &names, flag_mapper));
    }
    records
}

/// Reference to the component a task targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentRef {
    pub kind: ComponentKind,
    pub name: String,
}

/// A unit of work dispatched against a scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Component to run; command names may carry subcommand words.
    pub component: ComponentRef,
    /// Full command line, whitespace separated.
    pub command_name: String,
    /// Raw CLI arguments forwarded to the plugin.
    #[serde(default)]
    pub cli_args: Vec<String>,
}

impl Task {
    /// Create a command task.
    pub fn command(command_name: impl Into<String>, cli_args: Vec<String>) -> Self {
        let command_name = command_name.into();
        Self {
            component: ComponentRef {
                kind: ComponentKind::Command,
                name: command_name.clone(),
            },
            command_name,
            cli_args,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: &str, subcommands: Vec<CommandInfo>) -> CommandInfo {
        CommandInfo {
            name: name.to_string(),
            synopsis: format!("{} synopsis", name),
            help: String::new(),
            flags: Vec::new(),
            subcommands,
        }
    }

    #[test]
    fn test_flatten_joins_parent_names_with_a_space() {
        let mapper: FlagMapper = Arc::new(flags_to_wire);
        let tree = info("box", vec![info("add", vec![info("remote", vec![])])]);

        let names: Vec<String> = flatten_command_info(&tree, &[], &mapper)
            .into_iter()
            .map(|r| r.name)
            .collect();

        assert_eq!(names, vec!["box", "box add", "box add remote"]);
    }

    #[test]
    fn test_flatten_translates_flags_through_the_mapper() {
        let mapper: FlagMapper = Arc::new(flags_to_wire);
        let mut tree = info("up", vec![]);
        tree.flags.push(Flag {
            long_name: "provision".to_string(),
            description: "run provisioners".to_string(),
            default_value: None,
            kind: FlagKind::Bool,
        });

        let records = flatten_command_info(&tree, &[], &mapper);
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].flags,
            vec![WireFlag {
                long_name: "provision".to_string(),
                description: "run provisioners".to_string(),
                default_value: String::new(),
                kind: FlagKind::Bool,
            }]
        );
    }

    #[test]
    fn test_component_kind_display() {
        assert_eq!(ComponentKind::Command.to_string(), "command");
        assert_eq!(ComponentKind::Host.to_string(), "host");
    }
}
