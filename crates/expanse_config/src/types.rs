//! Configuration types deserialized from `expanse.toml`.

use expanse_common::Timeout;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;

/// The top-level engine configuration parsed from `expanse.toml`.
///
/// Every section is optional; an empty file yields the defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    /// Persistent expansion cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Procedural macro worker settings.
    #[serde(default)]
    pub proc_macro: ProcMacroConfig,
    /// Declarative expander resource limits.
    #[serde(default)]
    pub expander: ExpanderConfig,
}

/// Settings for the on-disk expansion and index caches.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Whether the persistent cache is used at all. Can be toggled at runtime.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Base directory holding `stub.names` and both cache maps.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

/// Settings for out-of-process procedural macro expansion.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcMacroConfig {
    /// Whether procedural macros are expanded at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether build scripts are evaluated. Procedural macro artifacts only
    /// exist when they are, so expansion requires both flags.
    #[serde(default = "default_true")]
    pub evaluate_build_scripts: bool,
    /// Path to the helper executable. Without one, procedural macros
    /// cannot be expanded.
    #[serde(default)]
    pub helper: Option<PathBuf>,
    /// Extra arguments passed to the helper (e.g. `"proc-worker"`).
    #[serde(default, deserialize_with = "deserialize_string_or_vec")]
    pub helper_args: Vec<String>,
    /// Wall-clock timeout for a single expansion request.
    #[serde(default = "default_timeout", deserialize_with = "deserialize_timeout")]
    pub timeout: Timeout,
    /// Number of worker processes per execution environment.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Remote (sandboxed) execution environment, if any.
    #[serde(default)]
    pub remote: Option<RemoteConfig>,
}

impl Default for ProcMacroConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            evaluate_build_scripts: true,
            helper: None,
            helper_args: Vec::new(),
            timeout: default_timeout(),
            workers: default_workers(),
            remote: None,
        }
    }
}

impl ProcMacroConfig {
    /// Returns `true` if both the feature flag and its prerequisite are on.
    pub fn is_active(&self) -> bool {
        self.enabled && self.evaluate_build_scripts
    }
}

/// A remote execution environment: the helper is started through a launcher
/// command such as `["wsl", "--"]` or `["ssh", "builder"]`.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Launcher command and its leading arguments.
    #[serde(deserialize_with = "deserialize_string_or_vec")]
    pub launcher: Vec<String>,
}

/// Resource limits for the in-process declarative expander.
#[derive(Debug, Clone, Deserialize)]
pub struct ExpanderConfig {
    /// Maximum length of an expansion, in bytes.
    #[serde(default = "default_max_expansion_size")]
    pub max_expansion_size: usize,
    /// Maximum nesting depth of repetitions during transcription.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for ExpanderConfig {
    fn default() -> Self {
        Self {
            max_expansion_size: default_max_expansion_size(),
            max_depth: default_max_depth(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> Timeout {
    Timeout::from_millis(10_000)
}

fn default_workers() -> usize {
    2
}

fn default_max_expansion_size() -> usize {
    4 * 1024 * 1024
}

fn default_max_depth() -> usize {
    64
}

/// Deserializes a field that can be either a single string or a list of strings.
fn deserialize_string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrVec;

    impl<'de> Visitor<'de> for StringOrVec {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("a string or a list of strings")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(vec![v.to_string()])
        }

        fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut vec = Vec::new();
            while let Some(val) = seq.next_element::<String>()? {
                vec.push(val);
            }
            Ok(vec)
        }
    }

    deserializer.deserialize_any(StringOrVec)
}

/// Deserializes a timeout given either as a string with a unit (`"10s"`) or
/// as a bare integer number of milliseconds.
fn deserialize_timeout<'de, D>(deserializer: D) -> Result<Timeout, D::Error>
where
    D: Deserializer<'de>,
{
    struct TimeoutVisitor;

    impl<'de> Visitor<'de> for TimeoutVisitor {
        type Value = Timeout;

        fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("a duration like \"10s\" or a number of milliseconds")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            v.parse().map_err(E::custom)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
            Ok(Timeout::from_millis(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
            u64::try_from(v)
                .map(Timeout::from_millis)
                .map_err(|_| E::custom(format!("negative timeout: {v}")))
        }
    }

    deserializer.deserialize_any(TimeoutVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_config_from_str;

    #[test]
    fn timeout_as_string() {
        let config = load_config_from_str("[proc_macro]\ntimeout = \"750ms\"\n").unwrap();
        assert_eq!(config.proc_macro.timeout.as_millis(), 750);
    }

    #[test]
    fn timeout_as_integer() {
        let config = load_config_from_str("[proc_macro]\ntimeout = 1200\n").unwrap();
        assert_eq!(config.proc_macro.timeout.as_millis(), 1200);
    }

    #[test]
    fn timeout_invalid_string() {
        assert!(load_config_from_str("[proc_macro]\ntimeout = \"later\"\n").is_err());
    }

    #[test]
    fn helper_args_single_string() {
        let config = load_config_from_str("[proc_macro]\nhelper_args = \"proc-worker\"\n").unwrap();
        assert_eq!(config.proc_macro.helper_args, vec!["proc-worker"]);
    }

    #[test]
    fn helper_args_list() {
        let config =
            load_config_from_str("[proc_macro]\nhelper_args = [\"proc-worker\", \"--quiet\"]\n")
                .unwrap();
        assert_eq!(config.proc_macro.helper_args, vec!["proc-worker", "--quiet"]);
    }

    #[test]
    fn remote_launcher_list() {
        let toml = r#"
[proc_macro.remote]
launcher = ["wsl", "--"]
"#;
        let config = load_config_from_str(toml).unwrap();
        let remote = config.proc_macro.remote.unwrap();
        assert_eq!(remote.launcher, vec!["wsl", "--"]);
    }

    #[test]
    fn proc_macro_requires_build_scripts() {
        let mut pm = ProcMacroConfig::default();
        assert!(pm.is_active());
        pm.evaluate_build_scripts = false;
        assert!(!pm.is_active());
        pm.evaluate_build_scripts = true;
        pm.enabled = false;
        assert!(!pm.is_active());
    }
}
