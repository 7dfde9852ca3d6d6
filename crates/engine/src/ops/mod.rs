use sea_orm::DatabaseConnection;

use crate::{ResultEngine, guard::GroupLocks};

mod expenses;
mod settlements;

/// Run a block inside a group-guarded DB transaction.
///
/// Takes the in-process lock of the group, opens a transaction, and runs the
/// body racing the cancellation token. Commits on success; rolls back on
/// error or cancellation, so a group never ends up half written.
macro_rules! with_group_tx {
    ($self:expr, $group_id:expr, $cancel:expr, |$tx:ident| $body:expr) => {{
        let group_id: ::uuid::Uuid = $group_id;
        let _guard = ::tokio::select! {
            biased;
            _ = $cancel.cancelled() => return Err($crate::EngineError::Cancelled),
            guard = $self.locks.lock(group_id) => guard,
        };
        let $tx = ::sea_orm::TransactionTrait::begin(&$self.database).await?;
        let result = ::tokio::select! {
            biased;
            _ = $cancel.cancelled() => Err($crate::EngineError::Cancelled),
            result = async {
                let result: $crate::ResultEngine<_> = $body;
                result
            } => result,
        };
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = $tx.rollback().await {
                    ::tracing::warn!(%group_id, "rollback failed: {rollback_err}");
                }
                Err(err)
            }
        }
    }};
}

pub(crate) use with_group_tx;

#[derive(Debug)]
pub struct Engine {
    database: DatabaseConnection,
    locks: GroupLocks,
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        Ok(Engine {
            database: self.database,
            locks: GroupLocks::default(),
        })
    }
}
