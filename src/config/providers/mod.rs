//! Sources which contribute partial configuration trees.
//!
//! Each provider yields a JSON tree in the camelCase shape of [`Config`](super::Config). Missing
//! values are either omitted or `null` so that they never override a lower priority source.

use std::collections::BTreeMap;

pub mod defaults;
pub mod env;
pub mod legacy;

/// An immutable snapshot of environment variables.
///
/// All providers read variables through this snapshot, which permits to load configurations
/// for arbitrary variable sets without touching the process environment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvVars {
    vars: BTreeMap<String, String>,
}

impl EnvVars {
    /// Captures the current process environment.
    pub fn from_process() -> Self {
        EnvVars {
            vars: std::env::vars().collect(),
        }
    }

    pub fn from_pairs<K: Into<String>, V: Into<String>>(
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        EnvVars {
            vars: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    /// Returns the value of the given variable. Empty values are treated as unset.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Returns the value of the first variable in `names` which is set.
    pub fn first_of(&self, names: &[&str]) -> Option<&str> {
        names.iter().find_map(|name| self.get(name))
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::EnvVars;

    #[test]
    fn empty_values_count_as_unset() {
        let vars = EnvVars::from_pairs([("APP_ENV", ""), ("NODE_ENV", "staging")]);

        assert_eq!(vars.get("APP_ENV"), None);
        assert!(!vars.is_set("APP_ENV"));
        assert_eq!(vars.first_of(&["APP_ENV", "NODE_ENV"]), Some("staging"));
        assert_eq!(vars.first_of(&["UNKNOWN"]), None);
    }
}
