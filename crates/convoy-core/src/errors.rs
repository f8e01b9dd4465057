//! Append-style error aggregation for fan-out operations
//!
//! Close and full-save cascades touch many resources and must report every
//! failure instead of stopping at the first one. `ErrorList` collects those
//! failures into a single reportable value: appending flattens nested lists,
//! an empty list converts to `Ok`, and a single-element list displays as the
//! bare error.

use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Shared error value as stored inside an aggregate.
pub type SharedError = Arc<dyn Error + Send + Sync + 'static>;

/// Accumulated errors from a fan-out operation.
#[derive(Debug, Clone, Default)]
pub struct ErrorList {
    errors: Vec<SharedError>,
}

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Append an error, flattening it when it is itself an aggregate.
    pub fn push<E>(&mut self, err: E)
    where
        E: Error + Send + Sync + 'static,
    {
        if let Some(list) = (&err as &dyn Error).downcast_ref::<ErrorList>() {
            self.errors.extend(list.errors.iter().cloned());
        } else {
            self.errors.push(Arc::new(err));
        }
    }

    /// Append an already-shared error.
    pub fn push_shared(&mut self, err: SharedError) {
        if let Some(list) = err.downcast_ref::<ErrorList>() {
            self.errors.extend(list.errors.iter().cloned());
        } else {
            self.errors.push(err);
        }
    }

    /// Merge another aggregate into this one.
    pub fn merge(&mut self, other: ErrorList) {
        self.errors.extend(other.errors);
    }

    /// Record the error side of a result, passing `Ok` through untouched.
    pub fn record<T, E>(&mut self, result: Result<T, E>) -> Option<T>
    where
        E: Error + Send + Sync + 'static,
    {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.push(err);
                None
            }
        }
    }

    pub fn errors(&self) -> &[SharedError] {
        &self.errors
    }

    /// Convert to a result: an empty aggregate is no error at all.
    pub fn into_result(self) -> Result<(), ErrorList> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.errors.len() {
            0 => write!(f, "0 errors occurred"),
            1 => write!(f, "{}", self.errors[0]),
            n => {
                write!(f, "{} errors occurred:", n)?;
                for err in &self.errors {
                    write!(f, "\n  * {}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl Error for ErrorList {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn io_err(msg: &str) -> io::Error {
        io::Error::new(io::ErrorKind::Other, msg.to_string())
    }

    #[test]
    fn test_empty_list_is_no_error() {
        let list = ErrorList::new();
        assert!(list.is_empty());
        assert!(list.into_result().is_ok());
    }

    #[test]
    fn test_single_element_displays_as_the_bare_error() {
        let mut list = ErrorList::new();
        list.push(io_err("disk full"));
        assert_eq!(list.to_string(), "disk full");
    }

    #[test]
    fn test_multiple_errors_are_enumerated() {
        let mut list = ErrorList::new();
        list.push(io_err("one"));
        list.push(io_err("two"));
        let rendered = list.to_string();
        assert!(rendered.starts_with("2 errors occurred:"));
        assert!(rendered.contains("* one"));
        assert!(rendered.contains("* two"));
    }

    #[test]
    fn test_push_flattens_nested_aggregates() {
        let mut inner = ErrorList::new();
        inner.push(io_err("a"));
        inner.push(io_err("b"));

        let mut outer = ErrorList::new();
        outer.push(io_err("c"));
        outer.push(inner);

        assert_eq!(outer.len(), 3);
    }

    #[test]
    fn test_record_collects_only_failures() {
        let mut list = ErrorList::new();
        assert_eq!(list.record(Ok::<_, io::Error>(7)), Some(7));
        assert_eq!(list.record(Err::<i32, _>(io_err("nope"))), None);
        assert_eq!(list.len(), 1);
    }
}
