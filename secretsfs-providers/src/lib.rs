//! Namespace providers mounted under the secretsfs root.
//!
//! | name        | content                                           |
//! |-------------|---------------------------------------------------|
//! | `secrets`   | the store's hierarchy                             |
//! | `templates` | template files rendered with secrets              |
//! | `internal`  | diagnostics (caller, inode table, store settings) |
//! | `tests`     | a fixed tree for checking the mount               |

pub mod internal;
pub mod secrets;
pub mod selftest;
pub mod template;
pub mod templates;
pub mod tree;

#[cfg(test)]
pub(crate) mod testing;

pub use internal::InternalProvider;
pub use secrets::SecretsProvider;
pub use selftest::SelfTestProvider;
pub use templates::TemplatesProvider;

/// Names of every provider this crate ships.
pub const PROVIDER_NAMES: [&str; 4] = [secrets::NAME, templates::NAME, internal::NAME, selftest::NAME];
