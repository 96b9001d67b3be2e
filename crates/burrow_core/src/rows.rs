//! Update functions and multi-table writes.
//!
//! Both are driven by hooks set on [`Config`](crate::Config): an update
//! function computes a record's new value from its old one, and row
//! generators derive the rows that secondary tables store for a row of a
//! source table.

use crate::config::{UpdateAction, UpdateFn};
use crate::db::Db;
use crate::env::{Environment, TableRef};
use crate::error::{EnvError, EnvResult};
use crate::locks::{KeyRange, LockMode};
use crate::txn::{Txn, TxnNode};
use burrow_storage::{RecordBuf, Seek, Visibility};
use std::ptr;
use std::sync::Arc;
use tracing::debug;

/// Applies `update` to one key. Returns whether the record changed.
fn apply_update(
    env: &Environment,
    node: &TxnNode,
    table: &Arc<TableRef>,
    update: &UpdateFn,
    dname: &str,
    key: &[u8],
    extra: &[u8],
) -> EnvResult<bool> {
    let old = table
        .table
        .lookup(key, &node.view(Visibility::LatestCommitted));
    match update(dname, key, old.as_deref(), extra) {
        UpdateAction::Keep => Ok(false),
        UpdateAction::Set(value) => env.txn_write(node, table, key, Some(&value)).map(|()| true),
        UpdateAction::Delete if old.is_some() => env.txn_write(node, table, key, None).map(|()| true),
        UpdateAction::Delete => Ok(false),
    }
}

impl Db {
    fn update_function(&self) -> EnvResult<UpdateFn> {
        self.env()
            .shared
            .config
            .update_function
            .clone()
            .ok_or_else(|| EnvError::invalid("environment has no update function"))
    }

    /// Rewrites the record under `key` with the environment's update
    /// function.
    ///
    /// The function sees the current value (or `None`) and `extra`, and
    /// decides whether to keep, replace or delete the record.
    ///
    /// # Errors
    ///
    /// - [`EnvError::Invalid`] if no update function is configured
    /// - [`EnvError::NoSpace`] while space is critical
    /// - a lock conflict, or the panic error
    pub fn update(&self, txn: Option<&Txn>, key: &[u8], extra: &[u8]) -> EnvResult<()> {
        let env = self.env();
        let result = env
            .check_usable()
            .and_then(|()| self.table())
            .and_then(|table| {
                let update = self.update_function()?;
                let dname = self.dname().unwrap_or_default();
                env.shared.space.admit_write("update")?;
                env.with_txn(txn, |node| {
                    node.touch(table);
                    env.lock(node, table, KeyRange::point(key), LockMode::Write)?;
                    apply_update(env, node, table, &update, dname, key, extra)
                })
            });
        if let Ok(true) = result {
            env.shared.stats.record_write();
        }
        env.report(result.map(|_| ()))
    }

    /// Runs the update function over every visible record.
    ///
    /// The whole table is write-locked first. Returns how many records
    /// changed.
    ///
    /// # Errors
    ///
    /// As [`Db::update`].
    pub fn update_broadcast(&self, txn: Option<&Txn>, extra: &[u8]) -> EnvResult<usize> {
        let env = self.env();
        let result = env
            .check_usable()
            .and_then(|()| self.table())
            .and_then(|table| {
                let update = self.update_function()?;
                let dname = self.dname().unwrap_or_default();
                env.shared.space.admit_write("update_broadcast")?;
                env.with_txn(txn, |node| {
                    node.touch(table);
                    env.lock(node, table, KeyRange::everything(), LockMode::Write)?;

                    let view = node.view(Visibility::LatestCommitted);
                    let mut buf = RecordBuf::new();
                    let mut keys = Vec::new();
                    let mut found = table.table.position(Seek::First, &view, &mut buf);
                    while found {
                        let key = buf.key().to_vec();
                        found = table.table.position(Seek::After(&key), &view, &mut buf);
                        keys.push(key);
                    }

                    let mut changed = 0;
                    for key in &keys {
                        if apply_update(env, node, table, &update, dname, key, extra)? {
                            changed += 1;
                        }
                    }
                    debug!(txn = %node.id, dname, visited = keys.len(), changed, "update broadcast");
                    Ok(changed)
                })
            });
        if let Ok(changed) = result {
            for _ in 0..changed {
                env.shared.stats.record_write();
            }
        }
        env.report(result)
    }
}

/// A destination handle resolved for a multi-table write.
struct Target<'d> {
    db: &'d Db,
    dname: &'d str,
    table: Arc<TableRef>,
}

impl Environment {
    fn resolve_targets<'d>(&self, src: &Db, dests: &[&'d Db]) -> EnvResult<Vec<Target<'d>>> {
        if src.dname().is_none() {
            return Err(EnvError::invalid("source table handle is not open"));
        }
        dests
            .iter()
            .map(|&db| {
                if !Arc::ptr_eq(&db.env().shared, &self.shared) {
                    return Err(EnvError::invalid("table handle belongs to another environment"));
                }
                let table = Arc::clone(db.table()?);
                Ok(Target {
                    db,
                    dname: db.dname().unwrap_or_default(),
                    table,
                })
            })
            .collect()
    }

    /// Writes a source row and the rows derived from it, atomically.
    ///
    /// Each handle in `dests` that is `src` itself receives `key`/`value`;
    /// every other one receives the row produced by the configured
    /// `generate_row_for_put`, or nothing if it produces none.
    ///
    /// # Errors
    ///
    /// - [`EnvError::Invalid`] for unopened handles, handles from another
    ///   environment, or a missing row generator
    /// - [`EnvError::NoSpace`] while space is critical
    /// - a generator error, a lock conflict, or the panic error
    pub fn put_multiple(
        &self,
        txn: Option<&Txn>,
        src: &Db,
        key: &[u8],
        value: &[u8],
        dests: &[&Db],
    ) -> EnvResult<()> {
        let result = self.check_usable().and_then(|()| {
            let targets = self.resolve_targets(src, dests)?;
            let src_name = src.dname().unwrap_or_default();
            let generate = self.shared.config.generate_row_for_put.clone();
            self.shared.space.admit_write("put_multiple")?;
            self.with_txn(txn, |node| {
                let mut written = 0;
                for target in &targets {
                    let row = if ptr::eq(target.db, src) {
                        Some((key.to_vec(), value.to_vec()))
                    } else {
                        let generate = generate
                            .as_ref()
                            .ok_or_else(|| EnvError::invalid("environment has no put row generator"))?;
                        generate(target.dname, src_name, key, value)?
                    };
                    if let Some((row_key, row_value)) = row {
                        self.txn_write(node, &target.table, &row_key, Some(&row_value))?;
                        written += 1;
                    }
                }
                Ok(written)
            })
        });
        if let Ok(written) = result {
            for _ in 0..written {
                self.shared.stats.record_write();
            }
        }
        self.report(result.map(|_| ()))
    }

    /// Deletes a source row and the rows derived from it, atomically.
    ///
    /// `src` itself loses `key`; every other handle loses the key produced
    /// by the configured `generate_row_for_del`. Keys that are already
    /// absent are skipped.
    ///
    /// # Errors
    ///
    /// As [`Environment::put_multiple`].
    pub fn del_multiple(
        &self,
        txn: Option<&Txn>,
        src: &Db,
        key: &[u8],
        value: &[u8],
        dests: &[&Db],
    ) -> EnvResult<()> {
        let result = self.check_usable().and_then(|()| {
            let targets = self.resolve_targets(src, dests)?;
            let src_name = src.dname().unwrap_or_default();
            let generate = self.shared.config.generate_row_for_del.clone();
            self.shared.space.admit_write("del_multiple")?;
            self.with_txn(txn, |node| {
                let mut deleted = 0;
                for target in &targets {
                    let row_key = if ptr::eq(target.db, src) {
                        Some(key.to_vec())
                    } else {
                        let generate = generate
                            .as_ref()
                            .ok_or_else(|| EnvError::invalid("environment has no delete row generator"))?;
                        generate(target.dname, src_name, key, value)?
                    };
                    let Some(row_key) = row_key else {
                        continue;
                    };
                    let table = &target.table;
                    node.touch(table);
                    self.lock(node, table, KeyRange::point(&row_key), LockMode::Write)?;
                    let view = node.view(Visibility::LatestCommitted);
                    if table.table.lookup(&row_key, &view).is_some() {
                        self.txn_write(node, table, &row_key, None)?;
                        deleted += 1;
                    }
                }
                Ok(deleted)
            })
        });
        if let Ok(deleted) = result {
            for _ in 0..deleted {
                self.shared.stats.record_delete();
            }
        }
        self.report(result.map(|_| ()))
    }
}
