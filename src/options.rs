use serde::{Deserialize, Serialize};

/// Duplicate key handling policy for mappings.
///
/// Merge keys (`<<`) never trigger [`DuplicateKeyPolicy::Error`]: keys that a merge would
/// bring in and that the host mapping already defines are always dropped silently.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicateKeyPolicy {
    /// First key wins: later duplicate pairs are skipped (key+value are consumed and ignored).
    FirstWins,
    /// Error out on encountering a duplicate key written directly in the mapping.
    Error,
}

/// Limits applied to alias replay to harden against alias bombs.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct AliasLimits {
    /// Maximum total number of **replayed** events injected from aliases across the entire parse.
    /// When exceeded, loading fails with a syntax error.
    pub max_total_replayed_events: usize,
    /// Maximum depth of the alias replay stack (nested alias → injected buffer → alias, etc.).
    pub max_replay_stack_depth: usize,
    /// Maximum number of times a **single anchor** may be expanded via alias.
    /// Use `usize::MAX` for "unlimited".
    pub max_alias_expansions_per_anchor: usize,
}

impl Default for AliasLimits {
    fn default() -> Self {
        Self {
            max_total_replayed_events: 1_000_000,
            max_replay_stack_depth: 64,
            max_alias_expansions_per_anchor: usize::MAX,
        }
    }
}

/// Loader configuration options.
///
/// Example: load a small configuration with a stricter duplicate-key policy.
///
/// ```rust
/// use coyaml::options::DuplicateKeyPolicy;
/// use coyaml::{Group, Loader, Node, Schema};
///
/// let schema = Schema::new(Group::new().field("name", Node::string())).unwrap();
///
/// let options = coyaml::options! {
///     duplicate_keys: DuplicateKeyPolicy::Error,
/// };
///
/// let loader = Loader::with_options(&schema, options);
/// assert!(loader.load_str("name: a\nname: b\n").is_err());
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Options {
    /// Log the expected keys of a group when an unknown key is seen, and trace every
    /// matched key. Mirrors `--debug-config`. Default: false.
    pub debug: bool,
    /// Policy for duplicate keys. Default: [`DuplicateKeyPolicy::FirstWins`].
    pub duplicate_keys: DuplicateKeyPolicy,
    /// Limits for alias replay to harden against alias bombs.
    pub alias_limits: AliasLimits,
    /// Run `$name` / `${expr}` substitution over string and numeric scalars. Default: true.
    pub expand_vars: bool,
    /// Maximum nesting of `!Include` files. Default: 64.
    pub max_include_depth: usize,
    /// Optional cap, in bytes, on the size of any file read by the loader
    /// (root document, `!Include`, `!FromFile`). Default: no cap.
    pub max_file_size: Option<u64>,
    /// Treat integers with a leading `0` (like `0755`) as octal, as YAML 1.1 and
    /// most shells do. Default: true.
    pub legacy_octal_numbers: bool,

    /// Render an excerpt of the offending line into errors that point into a document.
    /// Default: true.
    pub with_snippet: bool,

    /// Columns kept on each side of the error position in a rendered excerpt.
    /// `0` turns excerpts off like `with_snippet: false`. Default: 64.
    pub crop_radius: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            debug: false,
            duplicate_keys: DuplicateKeyPolicy::FirstWins,
            alias_limits: AliasLimits::default(),
            expand_vars: true,
            max_include_depth: 64,
            max_file_size: None,
            legacy_octal_numbers: true,
            with_snippet: true,
            crop_radius: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_favor_lenient_loading() {
        let opts = Options::default();
        assert!(!opts.debug);
        assert_eq!(opts.duplicate_keys, DuplicateKeyPolicy::FirstWins);
        assert!(opts.expand_vars);
        assert_eq!(opts.max_include_depth, 64);
        assert!(opts.max_file_size.is_none());
        assert!(opts.legacy_octal_numbers);
        assert!(opts.with_snippet);
        assert_eq!(opts.alias_limits.max_replay_stack_depth, 64);
    }

    #[test]
    fn macro_overrides_only_named_fields() {
        let opts = crate::options! {
            debug: true,
            max_include_depth: 3,
            alias_limits: AliasLimits {
                max_alias_expansions_per_anchor: 10,
                ..AliasLimits::default()
            },
        };
        assert!(opts.debug);
        assert_eq!(opts.max_include_depth, 3);
        assert_eq!(opts.alias_limits.max_alias_expansions_per_anchor, 10);
        assert_eq!(opts.alias_limits.max_total_replayed_events, 1_000_000);
        assert!(opts.expand_vars);
    }
}
