#![allow(clippy::case_sensitive_file_extension_comparisons)]
#![allow(clippy::if_not_else)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

/*!

`aept` fetches indexed repositories of Debian-style binary packages,
resolves dependencies, and atomically installs, upgrades and removes
packages on the live host or on an *offline root* built through an
unprivileged user-namespace chroot.

The library interface is what the `aept` binary drives: build a
[`Config`], pick a [`listener::Listener`], and call into
[`transaction`], [`index`] or [`query`]. See `main.rs` for usage.
*/

pub mod ipk {
    pub mod ar;
    pub mod extract;
}
pub mod conffile;
pub mod config;
pub mod control;
pub mod digest;
pub mod error;
pub mod fetch;
pub mod fileset;
pub mod index;
pub mod listener;
pub mod lock;
pub mod pathcheck;
pub mod query;
pub mod resolve;
pub mod sandbox;
pub mod script;
pub mod signals;
pub mod solver;
pub mod status;
pub mod transaction;
pub mod version;

pub use crate::config::Config;
pub use crate::error::{AResult, AeptError};
pub use crate::transaction::{Ctx, TransactionOpts};
