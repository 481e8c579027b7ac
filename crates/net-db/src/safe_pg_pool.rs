//! A thin wrapper around [`sqlx::PgPool`] whose `begin()` borrows `&mut
//! self`, so the borrow checker — not a runtime check — prevents two
//! concurrent transactions being opened against the same pool handle.

use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use crate::error::DatabaseError;

pub type Transaction<'a> = sqlx::Transaction<'a, sqlx::Postgres>;

#[derive(Clone)]
pub struct SafePgPool {
    pool: sqlx::PgPool,
}

impl SafePgPool {
    #[track_caller]
    pub async fn begin(&mut self) -> Result<SafeTransaction<'_>, DatabaseError> {
        let inner = self.pool.begin().await.map_err(DatabaseError::connection)?;
        Ok(SafeTransaction {
            inner,
            _pool: PhantomData,
        })
    }

    /// Run `f` inside a transaction, committing on `Ok` and rolling back on
    /// `Err`.
    pub async fn with_txn<T, E, F, Fut>(&mut self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Transaction<'_>) -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: From<DatabaseError>,
    {
        let mut txn = self.begin().await?;
        match f(&mut txn).await {
            Ok(value) => {
                txn.commit().await?;
                Ok(value)
            }
            Err(e) => {
                let _ = txn.rollback().await;
                Err(e)
            }
        }
    }

    pub async fn acquire(
        &self,
    ) -> Result<sqlx::pool::PoolConnection<sqlx::Postgres>, DatabaseError> {
        self.pool.acquire().await.map_err(DatabaseError::connection)
    }
}

impl From<sqlx::PgPool> for SafePgPool {
    fn from(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

pub struct SafeTransaction<'a> {
    inner: Transaction<'a>,
    _pool: PhantomData<&'a mut SafePgPool>,
}

impl<'a> SafeTransaction<'a> {
    pub async fn commit(self) -> Result<(), DatabaseError> {
        self.inner.commit().await.map_err(DatabaseError::connection)
    }

    pub async fn rollback(self) -> Result<(), DatabaseError> {
        self.inner
            .rollback()
            .await
            .map_err(DatabaseError::connection)
    }
}

impl<'a> Deref for SafeTransaction<'a> {
    type Target = Transaction<'a>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<'a> DerefMut for SafeTransaction<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}
