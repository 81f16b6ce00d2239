//! Transaction coordination across the source and archive connections.
//!
//! One transaction is opened per distinct connection. This is not two-phase
//! commit: the archive side commits first, then the source side, so a
//! failure between the two commits can leave rows duplicated in the archive
//! but never lost.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::statement::ConnectionRole;
use crate::core::traits::{DbConnection, Dialect};
use crate::error::{MigrateError, Result};

/// Lifecycle of a coordinated transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Idle,
    Active,
    Committed,
    RolledBack,
}

struct Participant {
    role: ConnectionRole,
    conn: Arc<dyn DbConnection>,
}

/// Issues BEGIN/COMMIT/ROLLBACK on one or two connections.
pub struct TransactionCoordinator {
    participants: Vec<Participant>,
    enabled: bool,
    state: TransactionState,
}

/// Whether two handles point at the same connection object.
pub fn same_connection(a: &Arc<dyn DbConnection>, b: &Arc<dyn DbConnection>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl TransactionCoordinator {
    /// Coordinator over `source` and `archive`, which may be the same connection.
    pub fn new(source: Arc<dyn DbConnection>, archive: Arc<dyn DbConnection>) -> Self {
        let mut participants = vec![Participant {
            role: ConnectionRole::Source,
            conn: source.clone(),
        }];
        if !same_connection(&source, &archive) {
            participants.push(Participant {
                role: ConnectionRole::Archive,
                conn: archive,
            });
        }
        Self {
            participants,
            enabled: true,
            state: TransactionState::Idle,
        }
    }

    /// Coordinator that tracks state but never touches the connections (dry run).
    pub fn disabled(source: Arc<dyn DbConnection>, archive: Arc<dyn DbConnection>) -> Self {
        Self {
            enabled: false,
            ..Self::new(source, archive)
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Number of distinct connections taking part.
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Open a transaction on every participant.
    ///
    /// If a later participant fails to begin, the ones already opened are
    /// rolled back before the error is returned.
    pub async fn begin(&mut self) -> Result<()> {
        self.expect_state(TransactionState::Idle, "begin")?;

        if self.enabled {
            for (opened, participant) in self.participants.iter().enumerate() {
                let keyword = participant.conn.dialect().transaction_begin_keyword();
                debug!("{} on {} connection", keyword, participant.role);
                if let Err(e) = participant.conn.execute(keyword, &[]).await {
                    for earlier in &self.participants[..opened] {
                        rollback_one(earlier).await;
                    }
                    self.state = TransactionState::RolledBack;
                    return Err(MigrateError::transaction(
                        participant.role,
                        format!("{} failed: {}", keyword, e),
                    ));
                }
            }
        }

        self.state = TransactionState::Active;
        Ok(())
    }

    /// Open a new transaction on `conn` after DDL implicitly committed the
    /// previous one. No-op for disabled coordinators.
    pub async fn reopen(&mut self, conn: &Arc<dyn DbConnection>) -> Result<()> {
        self.expect_state(TransactionState::Active, "reopen")?;
        if !self.enabled {
            return Ok(());
        }

        let Some(participant) = self
            .participants
            .iter()
            .find(|p| same_connection(&p.conn, conn))
        else {
            return Err(MigrateError::transaction(
                ConnectionRole::Archive,
                "connection is not part of the transaction",
            ));
        };

        let role = participant.role;
        let participant_conn = Arc::clone(&participant.conn);
        let keyword = participant_conn.dialect().transaction_begin_keyword();
        debug!("{} on {} connection after DDL", keyword, role);
        if let Err(e) = participant_conn.execute(keyword, &[]).await {
            self.rollback().await;
            return Err(MigrateError::transaction(
                role,
                format!("{} after DDL failed: {}", keyword, e),
            ));
        }
        Ok(())
    }

    /// Commit the archive side, then the source side.
    ///
    /// When a commit fails the remaining participants are rolled back.
    pub async fn commit(&mut self) -> Result<()> {
        self.expect_state(TransactionState::Active, "commit")?;

        if self.enabled {
            let order = self.commit_order();
            for (pos, idx) in order.iter().enumerate() {
                let participant = &self.participants[*idx];
                debug!("COMMIT on {} connection", participant.role);
                if let Err(e) = participant.conn.execute("COMMIT", &[]).await {
                    for rest in &order[pos..] {
                        rollback_one(&self.participants[*rest]).await;
                    }
                    self.state = TransactionState::RolledBack;
                    if pos > 0 {
                        warn!(
                            "Archive committed but source commit failed: archived rows are still \
                             present in the source table"
                        );
                    }
                    return Err(MigrateError::transaction(
                        participant.role,
                        format!("COMMIT failed: {}", e),
                    ));
                }
            }
            info!("Committed on {} connection(s)", self.participants.len());
        }

        self.state = TransactionState::Committed;
        Ok(())
    }

    /// Roll back every participant. Failures are logged and swallowed.
    pub async fn rollback(&mut self) {
        if self.state != TransactionState::Active {
            debug!("Rollback skipped in state {:?}", self.state);
            return;
        }

        if self.enabled {
            for participant in &self.participants {
                rollback_one(participant).await;
            }
            info!("Rolled back on {} connection(s)", self.participants.len());
        }

        self.state = TransactionState::RolledBack;
    }

    fn commit_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.participants.len()).collect();
        order.sort_by_key(|&i| match self.participants[i].role {
            ConnectionRole::Archive => 0,
            ConnectionRole::Source => 1,
        });
        order
    }

    fn expect_state(&self, expected: TransactionState, action: &str) -> Result<()> {
        if self.state == expected {
            return Ok(());
        }
        Err(MigrateError::transaction(
            ConnectionRole::Source,
            format!("cannot {} in state {:?}", action, self.state),
        ))
    }
}

async fn rollback_one(participant: &Participant) {
    debug!("ROLLBACK on {} connection", participant.role);
    if let Err(e) = participant.conn.execute("ROLLBACK", &[]).await {
        warn!("Rollback on {} connection failed: {}", participant.role, e);
    }
}
