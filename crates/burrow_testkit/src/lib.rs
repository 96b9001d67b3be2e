//! # Burrow Testkit
//!
//! Test utilities for BurrowDB.
//!
//! This crate provides:
//! - Temporary environments that can be closed, reopened, or torn down as
//!   if the process had crashed
//! - A scripted file system space probe
//! - Property-based generators for keys, values and operation batches
//! - Serializable dumps of every table, for comparing environment states
//!
//! ## Usage
//!
//! ```rust,ignore
//! use burrow_testkit::prelude::*;
//!
//! #[test]
//! fn survives_reopen() {
//!     let test_env = TestEnv::new();
//!     let db = test_env.table("users");
//!     db.put(None, b"k", b"v", PutFlags::NONE).unwrap();
//!     drop(db);
//!     let test_env = test_env.reopen();
//!     // ...
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod dump;
pub mod fixtures;
pub mod generators;
pub mod probe;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::dump::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::probe::*;
    pub use burrow_core::{
        CommitFlags, Config, CursorFlags, Db, DbFlags, EnvDirs, EnvError, EnvFlags, Environment,
        Isolation, PutFlags, SpaceState, TxnFlags,
    };
}

pub use dump::*;
pub use fixtures::*;
pub use generators::*;
pub use probe::*;
