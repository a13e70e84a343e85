//! Lifecycle contract for pooled objects

use crate::errors::FactoryError;
use std::sync::Arc;
use std::time::Instant;

/// Read-only timestamps of a pooled entry, handed to
/// [`ObjectFactory::validate_entry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryInfo {
    created_at: Instant,
    last_returned: Instant,
}

impl EntryInfo {
    pub(crate) fn new(created_at: Instant, last_returned: Instant) -> Self {
        Self {
            created_at,
            last_returned,
        }
    }

    /// When the object was created.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// When the object last went back to the idle set.
    pub fn last_returned(&self) -> Instant {
        self.last_returned
    }
}

/// Creates, prepares, checks and disposes of pooled objects.
///
/// A factory is shared by every thread using the pool, so implementations
/// must tolerate concurrent calls. Only [`create`](Self::create) is required.
///
/// # Examples
///
/// ```
/// use esox_pooling::{ObjectFactory, FactoryError};
///
/// struct Buffers;
///
/// impl ObjectFactory<Vec<u8>> for Buffers {
///     fn create(&self) -> Result<Vec<u8>, FactoryError> {
///         Ok(Vec::with_capacity(4096))
///     }
///
///     fn passivate(&self, buf: &mut Vec<u8>) {
///         buf.clear();
///     }
/// }
/// ```
pub trait ObjectFactory<T>: Send + Sync {
    /// Build a fresh instance.
    fn create(&self) -> Result<T, FactoryError>;

    /// Prepare a borrowed instance for use.
    fn activate(&self, _obj: &mut T) {}

    /// Reset an instance on its way back to the idle set.
    fn passivate(&self, _obj: &mut T) {}

    /// Whether the instance is still fit for use.
    fn validate(&self, _obj: &T) -> bool {
        true
    }

    /// Validation with access to the entry's timestamps. Pools that track
    /// entries call this instead of [`validate`](Self::validate).
    fn validate_entry(&self, obj: &T, _info: &EntryInfo) -> bool {
        self.validate(obj)
    }

    /// Release the instance's own resources. Errors are logged by the pool.
    fn destroy(&self, obj: T) -> Result<(), FactoryError> {
        drop(obj);
        Ok(())
    }
}

impl<F, T> ObjectFactory<T> for Arc<F>
where
    F: ObjectFactory<T> + ?Sized,
{
    fn create(&self) -> Result<T, FactoryError> {
        (**self).create()
    }

    fn activate(&self, obj: &mut T) {
        (**self).activate(obj)
    }

    fn passivate(&self, obj: &mut T) {
        (**self).passivate(obj)
    }

    fn validate(&self, obj: &T) -> bool {
        (**self).validate(obj)
    }

    fn validate_entry(&self, obj: &T, info: &EntryInfo) -> bool {
        (**self).validate_entry(obj, info)
    }

    fn destroy(&self, obj: T) -> Result<(), FactoryError> {
        (**self).destroy(obj)
    }
}

/// Factory backed by a closure; every other lifecycle hook is a no-op.
pub struct FnFactory<F> {
    create: F,
}

/// Wrap a fallible closure as an [`ObjectFactory`].
///
/// # Examples
///
/// ```
/// use esox_pooling::{factory_fn, ObjectFactory};
///
/// let factory = factory_fn(|| Ok(String::from("conn")));
/// assert_eq!(factory.create().unwrap(), "conn");
/// ```
pub fn factory_fn<T, F>(create: F) -> FnFactory<F>
where
    F: Fn() -> Result<T, FactoryError> + Send + Sync,
{
    FnFactory { create }
}

impl<T, F> ObjectFactory<T> for FnFactory<F>
where
    F: Fn() -> Result<T, FactoryError> + Send + Sync,
{
    fn create(&self) -> Result<T, FactoryError> {
        (self.create)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Plain;

    impl ObjectFactory<u32> for Plain {
        fn create(&self) -> Result<u32, FactoryError> {
            Ok(7)
        }
    }

    #[test]
    fn defaults_are_permissive() {
        let f = Plain;
        let mut v = f.create().unwrap();
        f.activate(&mut v);
        f.passivate(&mut v);
        assert!(f.validate(&v));
        let now = Instant::now();
        assert!(f.validate_entry(&v, &EntryInfo::new(now, now)));
        assert!(f.destroy(v).is_ok());
    }

    #[test]
    fn fn_factory_propagates_errors() {
        let f = factory_fn(|| -> Result<u32, FactoryError> { Err("boom".into()) });
        let err = f.create().unwrap_err();
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn entry_info_accessors() {
        let created = Instant::now();
        let returned = created + Duration::from_secs(3);
        let info = EntryInfo::new(created, returned);
        assert_eq!(info.created_at(), created);
        assert_eq!(info.last_returned(), returned);
    }
}
