use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{error, warn};

use crate::{RtdocError, RtdocResult};

/// What to do when a charge would exceed the memory limit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OomAction {
    /// Terminate the process
    Abort,
    /// Fail the operation with [`RtdocError::ResourceExhausted`]
    Reject,
}

/// Policy invoked when the memory limit would be exceeded
///
/// Embedding applications install their own handler through
/// [`MemoryBudget::with_limit`] to degrade gracefully instead of aborting.
pub trait OomHandler: Send + Sync {
    fn on_exhausted(&self, requested: usize, used: usize, limit: usize) -> OomAction;
}

impl<F> OomHandler for F
where
    F: Fn(usize, usize, usize) -> OomAction + Send + Sync,
{
    fn on_exhausted(&self, requested: usize, used: usize, limit: usize) -> OomAction {
        self(requested, used, limit)
    }
}

/// Default handler: log and abort
#[derive(Debug, Default, Clone, Copy)]
pub struct AbortOnExhaustion;

impl OomHandler for AbortOnExhaustion {
    fn on_exhausted(&self, requested: usize, used: usize, limit: usize) -> OomAction {
        error!(
            "Out of memory while trying to allocate {} bytes ({} of {} in use)",
            requested, used, limit
        );
        OomAction::Abort
    }
}

/// Handler that rejects the offending operation and keeps serving
#[derive(Debug, Default, Clone, Copy)]
pub struct RejectOnExhaustion;

impl OomHandler for RejectOnExhaustion {
    fn on_exhausted(&self, requested: usize, used: usize, limit: usize) -> OomAction {
        warn!(
            "Rejecting allocation of {} bytes ({} of {} in use)",
            requested, used, limit
        );
        OomAction::Reject
    }
}

/// Process-wide accounting of bytes held by the document store
pub struct MemoryBudget {
    limit: Option<usize>,
    used: AtomicUsize,
    handler: Box<dyn OomHandler>,
}

impl MemoryBudget {
    /// Budget that only counts usage and never refuses a charge
    pub fn unlimited() -> Self {
        Self {
            limit: None,
            used: AtomicUsize::new(0),
            handler: Box::new(AbortOnExhaustion),
        }
    }

    /// Budget with a byte ceiling and the policy to apply when it is reached
    pub fn with_limit(limit: usize, handler: impl OomHandler + 'static) -> Self {
        Self {
            limit: Some(limit),
            used: AtomicUsize::new(0),
            handler: Box::new(handler),
        }
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Bytes currently charged
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    /// Reserve `bytes`, consulting the handler when the limit would be crossed
    pub fn charge(&self, bytes: usize) -> RtdocResult<()> {
        let Some(limit) = self.limit else {
            self.used.fetch_add(bytes, Ordering::AcqRel);
            return Ok(());
        };

        let reserved = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                used.checked_add(bytes).filter(|total| *total <= limit)
            });

        match reserved {
            Ok(_) => Ok(()),
            Err(used) => match self.handler.on_exhausted(bytes, used, limit) {
                OomAction::Abort => std::process::abort(),
                OomAction::Reject => Err(RtdocError::ResourceExhausted {
                    requested: bytes,
                    used,
                    limit,
                }),
            },
        }
    }

    /// Return `bytes` previously charged
    pub fn release(&self, bytes: usize) {
        let _ = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                Some(used.saturating_sub(bytes))
            });
    }
}

impl Default for MemoryBudget {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl fmt::Debug for MemoryBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBudget")
            .field("limit", &self.limit)
            .field("used", &self.used())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[test]
    fn test_unlimited_budget_counts_usage() {
        let budget = MemoryBudget::unlimited();
        budget.charge(100).unwrap();
        budget.charge(50).unwrap();
        assert_eq!(budget.used(), 150);

        budget.release(120);
        assert_eq!(budget.used(), 30);
        assert_eq!(budget.limit(), None);
    }

    #[test]
    fn test_release_saturates_at_zero() {
        let budget = MemoryBudget::unlimited();
        budget.charge(10).unwrap();
        budget.release(25);
        assert_eq!(budget.used(), 0);
    }

    #[test]
    fn test_reject_handler_fails_the_charge() {
        let budget = MemoryBudget::with_limit(100, RejectOnExhaustion);
        budget.charge(60).unwrap();

        let err = budget.charge(50).unwrap_err();
        assert!(matches!(
            err,
            RtdocError::ResourceExhausted {
                requested: 50,
                used: 60,
                limit: 100
            }
        ));
        // A failed charge leaves usage untouched
        assert_eq!(budget.used(), 60);

        budget.charge(40).unwrap();
        assert_eq!(budget.used(), 100);
    }

    #[test]
    fn test_closure_handler_is_invoked() {
        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();
        let budget = MemoryBudget::with_limit(8, move |requested: usize, used: usize, limit: usize| {
            assert_eq!((requested, used, limit), (16, 0, 8));
            flag.store(true, Ordering::SeqCst);
            OomAction::Reject
        });

        assert!(budget.charge(16).is_err());
        assert!(called.load(Ordering::SeqCst));
    }
}
