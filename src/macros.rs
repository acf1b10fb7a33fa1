//! Public macros for constructing option structs without relying on struct literal syntax.
//!
//! These macros keep call sites short while allowing option structs to gain fields
//! without breaking callers.

/// Construct [`crate::Options`] from `Default` and a list of field assignments.
///
/// Example:
///
/// ```rust
/// use coyaml::options::DuplicateKeyPolicy;
///
/// let options = coyaml::options! {
///     duplicate_keys: DuplicateKeyPolicy::Error,
///     expand_vars: false,
/// };
/// assert!(!options.expand_vars);
/// ```
#[macro_export]
macro_rules! options {
    ( $( $field:ident : $value:expr ),* $(,)? ) => {{
        let mut opt = $crate::Options::default();
        $(
            #[allow(deprecated)]
            {
                opt.$field = $value;
            }
        )*
        opt
    }};
}

/// Construct [`crate::EmitOptions`] from `Default` and a list of field assignments.
///
/// Example:
///
/// ```rust
/// let opts = coyaml::emit_options! {
///     comments: true,
/// };
/// assert!(!opts.short);
/// ```
#[macro_export]
macro_rules! emit_options {
    ( $( $field:ident : $value:expr ),* $(,)? ) => {{
        let mut opt = $crate::EmitOptions::default();
        $(
            #[allow(deprecated)]
            {
                opt.$field = $value;
            }
        )*
        opt
    }};
}
