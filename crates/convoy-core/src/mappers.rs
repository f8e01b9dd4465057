//! Built-in argument mappers.

use std::collections::HashMap;
use std::sync::Arc;

use crate::component::CliArgs;
use crate::dynamic::{ArgMapper, ArgRequest, ArgValue, CallArgs};

/// Translates raw CLI arguments into a key/value map: `--key=value` becomes
/// an entry, a bare `--flag` maps to `"true"`, positional words are skipped.
pub struct CommandArgsMapper;

impl ArgMapper for CommandArgsMapper {
    fn provides(&self) -> ArgRequest {
        ArgRequest::typed::<HashMap<String, String>>()
    }

    fn map(&self, args: &CallArgs) -> Option<ArgValue> {
        let cli = args.get_typed::<CliArgs>()?;
        let mut map = HashMap::new();
        for arg in &cli.0 {
            let Some(flag) = arg.strip_prefix("--") else {
                continue;
            };
            match flag.split_once('=') {
                Some((key, value)) => map.insert(key.to_string(), value.to_string()),
                None => map.insert(flag.to_string(), "true".to_string()),
            };
        }
        Some(Arc::new(map))
    }
}
