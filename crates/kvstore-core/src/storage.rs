//! The storage capability every backend implements

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::KvResult;
use crate::scope::Scope;

/// TTL meaning "keep until deleted"
pub const NO_EXPIRY: Duration = Duration::ZERO;

/// Key-value storage with optional per-key expiry.
///
/// Implementations are cheap handles: cloning one, or rebinding it with
/// [`KvStorage::with_scope`], shares the same underlying backend state.
///
/// Reading a key that is missing or expired is not an error. [`KvStorage::load`]
/// and [`KvStorage::load_and_del`] leave the destination untouched in that case;
/// [`KvStorage::fetch`] and [`KvStorage::fetch_and_del`] return `None`.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use kvstore_core::KvStorage;
///
/// async fn consume_code<S: KvStorage>(storage: &S) -> kvstore_core::KvResult<String> {
///     storage.store("otp:42", "918273", Duration::from_secs(300)).await?;
///
///     let mut code = String::new();
///     storage.load_and_del("otp:42", &mut code).await?;
///     Ok(code)
/// }
/// ```
#[async_trait]
pub trait KvStorage: Clone + Send + Sync + 'static {
    /// Associate `key` with `value`, replacing any previous entry.
    ///
    /// A zero `ttl` ([`NO_EXPIRY`]) keeps the entry until it is deleted; any
    /// other value makes it unreadable once `ttl` has elapsed.
    async fn store<T>(&self, key: &str, value: &T, ttl: Duration) -> KvResult<()>
    where
        T: Serialize + ?Sized + Sync;

    /// Read the live value under `key`
    async fn fetch<T>(&self, key: &str) -> KvResult<Option<T>>
    where
        T: DeserializeOwned + Send;

    /// Read the live value under `key` and remove it in one atomic step.
    ///
    /// When several callers race on the same key, at most one of them gets
    /// `Some`.
    async fn fetch_and_del<T>(&self, key: &str) -> KvResult<Option<T>>
    where
        T: DeserializeOwned + Send;

    /// Remove `key`. Removing a missing key succeeds.
    async fn del(&self, key: &str) -> KvResult<()>;

    /// Decode the value under `key` into `dest`; `dest` is untouched when the key is absent
    async fn load<T>(&self, key: &str, dest: &mut T) -> KvResult<()>
    where
        T: DeserializeOwned + Send,
    {
        if let Some(value) = self.fetch(key).await? {
            *dest = value;
        }
        Ok(())
    }

    /// [`KvStorage::load`] followed by removal, as one atomic step
    async fn load_and_del<T>(&self, key: &str, dest: &mut T) -> KvResult<()>
    where
        T: DeserializeOwned + Send,
    {
        if let Some(value) = self.fetch_and_del(key).await? {
            *dest = value;
        }
        Ok(())
    }

    /// The scope subsequent calls on this handle run under
    fn scope(&self) -> &Scope;

    /// A handle over the same backend state bound to `scope`; `self` is unchanged
    fn with_scope(&self, scope: Scope) -> Self;
}
