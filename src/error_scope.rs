//! Per-device error-scope stack (`spec.md` §4.7): `pushErrorScope` /
//! `popErrorScope` bracket a region of calls and capture the first GPU
//! error whose filter matches, mirroring the WebGPU error-scope model.

use parking_lot::Mutex;

use crate::error::GpuError;

/// The class of GPU error an error scope captures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorFilter {
    Validation,
    OutOfMemory,
    Internal,
}

struct Scope {
    filter: ErrorFilter,
    captured: Option<GpuError>,
}

/// A LIFO stack of error scopes, one per device. `report_error` walks the
/// stack from the top and stops at the first scope whose filter matches,
/// recording only the first match it sees there; errors that match no open
/// scope escape to the caller as "uncaptured".
#[derive(Default)]
pub struct ErrorScopeManager {
    stack: Mutex<Vec<Scope>>,
}

impl ErrorScopeManager {
    pub fn new() -> Self {
        Self {
            stack: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, filter: ErrorFilter) {
        self.stack.lock().push(Scope {
            filter,
            captured: None,
        });
    }

    /// Pop the innermost scope, returning the error it captured, if any.
    /// `None` if no scope is open.
    pub fn pop(&self) -> Option<Option<GpuError>> {
        self.stack.lock().pop().map(|scope| scope.captured)
    }

    pub fn depth(&self) -> usize {
        self.stack.lock().len()
    }

    /// Route `error` to the innermost open scope whose filter matches
    /// `error.filter`. Returns `true` if some scope captured it, `false` if
    /// it should be treated as uncaptured.
    pub fn report(&self, error: GpuError) -> bool {
        let mut stack = self.stack.lock();
        for scope in stack.iter_mut().rev() {
            if scope.filter == error.filter {
                if scope.captured.is_none() {
                    scope.captured = Some(error);
                }
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err(filter: ErrorFilter, message: &str) -> GpuError {
        GpuError {
            filter,
            message: message.to_string(),
        }
    }

    #[test]
    fn innermost_matching_scope_captures_first_error_only() {
        let mgr = ErrorScopeManager::new();
        mgr.push(ErrorFilter::Validation);
        mgr.push(ErrorFilter::Validation);

        assert!(mgr.report(err(ErrorFilter::Validation, "first")));
        assert!(mgr.report(err(ErrorFilter::Validation, "second")));

        let inner = mgr.pop().unwrap();
        assert_eq!(inner.unwrap().message, "first");

        let outer = mgr.pop().unwrap();
        assert!(outer.is_none());
    }

    #[test]
    fn error_skips_non_matching_scopes_to_reach_a_matching_one() {
        let mgr = ErrorScopeManager::new();
        mgr.push(ErrorFilter::OutOfMemory);
        mgr.push(ErrorFilter::Validation);

        assert!(mgr.report(err(ErrorFilter::OutOfMemory, "oom")));

        let inner = mgr.pop().unwrap();
        assert!(inner.is_none(), "inner Validation scope does not match");

        let outer = mgr.pop().unwrap();
        assert_eq!(outer.unwrap().message, "oom");
    }

    #[test]
    fn error_with_no_open_matching_scope_is_uncaptured() {
        let mgr = ErrorScopeManager::new();
        mgr.push(ErrorFilter::Validation);
        assert!(!mgr.report(err(ErrorFilter::Internal, "boom")));
        assert!(mgr.pop().unwrap().is_none());
    }

    #[test]
    fn pop_on_empty_stack_returns_none() {
        let mgr = ErrorScopeManager::new();
        assert!(mgr.pop().is_none());
        assert_eq!(mgr.depth(), 0);
    }
}
