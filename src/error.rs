//! Cache Errors
//!
//! Every backend reports failures through [`CacheError`]. A missing key is the
//! distinguished [`CacheError::NotFound`] value; anything else coming from a
//! concrete store is a [`CacheError::Backend`]. Operations that fan out to
//! several independent backends collect their failures into a [`MultiError`].

use std::fmt;

/// Result alias used by every cache operation
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors returned by cache backends and composites
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The key does not exist in the queried backend
    #[error("key not found")]
    NotFound,

    /// I/O, protocol or resource failure reported by a specific backend
    #[error("{backend}: {source:#}")]
    Backend {
        /// Name of the failing backend (e.g. "Moka", "Redis")
        backend: &'static str,
        /// Underlying failure
        #[source]
        source: anyhow::Error,
    },

    /// Failures collected from independent sub-operations
    #[error(transparent)]
    Aggregate(#[from] MultiError),
}

impl CacheError {
    /// Wrap an arbitrary failure as coming from `backend`
    pub fn backend(backend: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self::Backend {
            backend,
            source: source.into(),
        }
    }

    /// `true` if this is the distinguished "key not found" error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Check whether this error, or any error nested inside an aggregate,
    /// satisfies `predicate`.
    pub fn any<F>(&self, predicate: F) -> bool
    where
        F: Fn(&CacheError) -> bool + Copy,
    {
        match self {
            Self::Aggregate(multi) => multi.iter().any(|err| err.any(predicate)),
            other => predicate(other),
        }
    }

    /// Find the first backend failure whose source chain contains an `E`.
    ///
    /// Aggregates are searched in order, so this answers "did this specific
    /// kind of failure happen in any of the tiers".
    #[must_use]
    pub fn find_source<E>(&self) -> Option<&E>
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        match self {
            Self::NotFound => None,
            Self::Backend { source, .. } => source.chain().find_map(|cause| cause.downcast_ref::<E>()),
            Self::Aggregate(multi) => multi.iter().find_map(CacheError::find_source::<E>),
        }
    }

    /// Name of the backend that failed, if this is a single backend failure
    #[must_use]
    pub fn backend_name(&self) -> Option<&'static str> {
        match self {
            Self::Backend { backend, .. } => Some(backend),
            _ => None,
        }
    }
}

/// Ordered collection of failures from independent sub-operations
///
/// An empty `MultiError` stands for "no error": [`MultiError::into_result`]
/// collapses it to `Ok(())`.
#[derive(Debug, Default)]
pub struct MultiError {
    errors: Vec<CacheError>,
}

impl MultiError {
    /// Create an empty collection
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure
    pub fn push(&mut self, err: CacheError) {
        self.errors.push(err);
    }

    /// Number of recorded failures
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// `true` if nothing was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Iterate recorded failures in the order they happened
    pub fn iter(&self) -> std::slice::Iter<'_, CacheError> {
        self.errors.iter()
    }

    /// Consume the collection, returning the recorded failures
    #[must_use]
    pub fn into_inner(self) -> Vec<CacheError> {
        self.errors
    }

    /// `Ok(())` if empty, otherwise the aggregate as an error
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Aggregate`] when at least one failure was recorded.
    pub fn into_result(self) -> Result<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(CacheError::Aggregate(self))
        }
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.as_slice() {
            [] => f.write_str("no error occurred"),
            [only] => write!(f, "1 error occurred: {only}"),
            errors => {
                let n = errors.len();
                write!(f, "{n} errors occurred:")?;
                for err in errors {
                    write!(f, " [{err}]")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for MultiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.errors.first().map(|err| err as &(dyn std::error::Error + 'static))
    }
}

impl<'a> IntoIterator for &'a MultiError {
    type Item = &'a CacheError;
    type IntoIter = std::slice::Iter<'a, CacheError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

impl FromIterator<CacheError> for MultiError {
    fn from_iter<I: IntoIterator<Item = CacheError>>(iter: I) -> Self {
        Self {
            errors: iter.into_iter().collect(),
        }
    }
}
