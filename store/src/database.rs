//! Transactional database handle.

use crate::{ReadTxn, StoreError, WriteTxn};

/// A database that runs closures inside read or read-write transactions.
///
/// The raw methods are object safe so the chain can hold an
/// `Arc<dyn Database>`; callers normally go through [`DatabaseExt`].
pub trait Database: Send + Sync {
    /// Run `f` inside a read-only transaction.
    fn view_raw(
        &self,
        f: &mut dyn FnMut(&dyn ReadTxn) -> Result<(), StoreError>,
    ) -> Result<(), StoreError>;

    /// Run `f` inside a read-write transaction. The transaction commits only
    /// if `f` returns `Ok`; otherwise every write made through it is discarded.
    fn update_raw(
        &self,
        f: &mut dyn FnMut(&mut dyn WriteTxn) -> Result<(), StoreError>,
    ) -> Result<(), StoreError>;
}

/// Typed wrappers over [`Database`] that thread a result value and a
/// caller-defined error type through the transaction.
pub trait DatabaseExt: Database {
    fn view<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&dyn ReadTxn) -> Result<T, E>,
    {
        let mut f = Some(f);
        let mut outcome: Option<Result<T, E>> = None;
        let raw = self.view_raw(&mut |txn| {
            let Some(f) = f.take() else {
                return Err(StoreError::Backend("view closure invoked twice".into()));
            };
            let result = f(txn);
            let failed = result.is_err();
            outcome = Some(result);
            if failed {
                Err(StoreError::Aborted)
            } else {
                Ok(())
            }
        });
        finish(raw, outcome)
    }

    fn update<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<StoreError>,
        F: FnOnce(&mut dyn WriteTxn) -> Result<T, E>,
    {
        let mut f = Some(f);
        let mut outcome: Option<Result<T, E>> = None;
        let raw = self.update_raw(&mut |txn| {
            let Some(f) = f.take() else {
                return Err(StoreError::Backend("update closure invoked twice".into()));
            };
            let result = f(txn);
            let failed = result.is_err();
            outcome = Some(result);
            if failed {
                Err(StoreError::Aborted)
            } else {
                Ok(())
            }
        });
        finish(raw, outcome)
    }
}

impl<D: Database + ?Sized> DatabaseExt for D {}

fn finish<T, E: From<StoreError>>(
    raw: Result<(), StoreError>,
    outcome: Option<Result<T, E>>,
) -> Result<T, E> {
    match (raw, outcome) {
        // The closure's own error wins over the abort marker.
        (_, Some(Err(e))) => Err(e),
        (Ok(()), Some(Ok(value))) => Ok(value),
        // Closure succeeded but the commit failed.
        (Err(e), _) => Err(e.into()),
        (Ok(()), None) => Err(StoreError::Backend("transaction closure never ran".into()).into()),
    }
}
