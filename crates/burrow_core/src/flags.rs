//! Flag sets accepted by public operations.
//!
//! Each set is a `u32` newtype. Raw bits can be built with `from_bits`
//! (for callers translating from a numeric API), so every operation checks
//! its argument with `check_allowed` before doing anything else.

use crate::error::{EnvError, EnvResult};
use crate::types::Isolation;
use std::ops::{BitOr, BitOrAssign};

macro_rules! flag_set {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$flag_meta:meta])* $flag:ident = $bit:expr; )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(u32);

        impl $name {
            /// The empty set.
            pub const NONE: Self = Self(0);
            $( $(#[$flag_meta])* pub const $flag: Self = Self($bit); )*

            const KNOWN: u32 = 0 $( | $bit )*;

            /// Builds a set from raw bits. Unknown bits are kept so that
            /// `check_allowed` can report them.
            #[must_use]
            pub const fn from_bits(bits: u32) -> Self {
                Self(bits)
            }

            /// Returns the raw bits.
            #[must_use]
            pub const fn bits(self) -> u32 {
                self.0
            }

            /// Whether every bit of `other` is set.
            #[must_use]
            pub const fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            /// Whether no bit is set.
            #[must_use]
            pub const fn is_empty(self) -> bool {
                self.0 == 0
            }

            /// Rejects bits this set does not define.
            ///
            /// # Errors
            ///
            /// Returns [`EnvError::Invalid`] naming the unknown bits and `op`.
            pub fn check_allowed(self, op: &str) -> EnvResult<()> {
                let unknown = self.0 & !Self::KNOWN;
                if unknown == 0 {
                    Ok(())
                } else {
                    Err(EnvError::invalid(format!("unknown flags {unknown:#x} in {op}")))
                }
            }
        }

        impl BitOr for $name {
            type Output = Self;

            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }
    };
}

flag_set! {
    /// Flags for opening an environment.
    EnvFlags {
        /// Create the home directory and persistent tables if missing.
        CREATE = 0x01;
        /// Enable transactions.
        INIT_TXN = 0x02;
        /// Enable the lock manager.
        INIT_LOCK = 0x04;
        /// Enable the log.
        INIT_LOG = 0x08;
        /// Enable the cache table.
        INIT_MPOOL = 0x10;
        /// Run recovery on open. Recovery always runs; accepted for
        /// compatibility.
        RECOVER = 0x20;
        /// Single-process environment.
        PRIVATE = 0x40;
        /// Handles may be shared between threads.
        THREAD = 0x80;
    }
}

impl EnvFlags {
    /// The usual flags for a transactional environment.
    pub const TRANSACTIONAL: Self = Self(
        Self::CREATE.0
            | Self::INIT_TXN.0
            | Self::INIT_LOCK.0
            | Self::INIT_LOG.0
            | Self::INIT_MPOOL.0
            | Self::THREAD.0,
    );
}

flag_set! {
    /// Flags for opening a table.
    DbFlags {
        /// Create the table if it does not exist.
        CREATE = 0x01;
        /// With `CREATE`, fail if the table already exists.
        EXCL = 0x02;
        /// The handle may be shared between threads.
        THREAD = 0x04;
    }
}

flag_set! {
    /// Flags for beginning a transaction.
    TxnFlags {
        /// Read-uncommitted isolation.
        READ_UNCOMMITTED = 0x01;
        /// Read-committed isolation.
        READ_COMMITTED = 0x02;
        /// Snapshot isolation.
        SNAPSHOT = 0x04;
        /// Serializable isolation.
        SERIALIZABLE = 0x08;
        /// Use the parent's isolation level.
        INHERIT_ISOLATION = 0x10;
        /// Flush the log at commit.
        SYNC = 0x20;
        /// Do not flush the log at commit.
        NOSYNC = 0x40;
    }
}

impl TxnFlags {
    /// The explicitly requested isolation level, if any.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::Invalid`] when more than one level is requested,
    /// or a level is requested together with `INHERIT_ISOLATION`.
    pub fn isolation(self) -> EnvResult<Option<Isolation>> {
        let requested = requested_isolation(
            self.contains(Self::READ_UNCOMMITTED),
            self.contains(Self::READ_COMMITTED),
            self.contains(Self::SNAPSHOT),
            self.contains(Self::SERIALIZABLE),
        )?;
        if requested.is_some() && self.contains(Self::INHERIT_ISOLATION) {
            return Err(EnvError::invalid(
                "an isolation level cannot be combined with INHERIT_ISOLATION",
            ));
        }
        Ok(requested)
    }
}

flag_set! {
    /// Flags for opening a cursor.
    CursorFlags {
        /// Positioning operations take write locks.
        RMW = 0x01;
        /// Read uncommitted data through this cursor.
        READ_UNCOMMITTED = 0x02;
        /// Read committed data through this cursor without keeping locks.
        READ_COMMITTED = 0x04;
        /// Read the transaction's snapshot through this cursor.
        SNAPSHOT = 0x08;
        /// Serializable reads through this cursor.
        SERIALIZABLE = 0x10;
    }
}

impl CursorFlags {
    /// The explicitly requested isolation level, if any.
    ///
    /// # Errors
    ///
    /// Returns [`EnvError::Invalid`] when more than one level is requested.
    pub fn isolation(self) -> EnvResult<Option<Isolation>> {
        requested_isolation(
            self.contains(Self::READ_UNCOMMITTED),
            self.contains(Self::READ_COMMITTED),
            self.contains(Self::SNAPSHOT),
            self.contains(Self::SERIALIZABLE),
        )
    }
}

flag_set! {
    /// Flags for committing a transaction.
    CommitFlags {
        /// Flush the log before returning.
        SYNC = 0x01;
        /// Do not flush the log.
        NOSYNC = 0x02;
    }
}

flag_set! {
    /// Flags for storing a value.
    PutFlags {
        /// Fail with [`EnvError::KeyExists`] if the key is present.
        NOOVERWRITE = 0x01;
    }
}

fn requested_isolation(
    uncommitted: bool,
    committed: bool,
    snapshot: bool,
    serializable: bool,
) -> EnvResult<Option<Isolation>> {
    let levels = [
        (uncommitted, Isolation::ReadUncommitted),
        (committed, Isolation::ReadCommitted),
        (snapshot, Isolation::Snapshot),
        (serializable, Isolation::Serializable),
    ];
    let mut chosen = levels.iter().filter(|(set, _)| *set).map(|(_, level)| *level);
    let first = chosen.next();
    if chosen.next().is_some() {
        return Err(EnvError::invalid("more than one isolation level requested"));
    }
    Ok(first)
}
