use std::marker::PhantomData;

/// Runs a closure when it goes out of scope.
///
/// The closure fires however the scope is left: falling off the end, an
/// early return, or a panic unwinding through it. Tasks use it to restore
/// the tracking frame's current task after polling, since a poll may unwind.
///
/// A guard starts armed. [`disarm`](Self::disarm) turns it into a no-op, for
/// paths where the cleanup was already done by hand.
pub(crate) struct ScopeGuard<'a, F: FnOnce()> {
    // Taken on drop or disarm, so the closure runs at most once even if the
    // closure itself panics while the guard drops.
    closure: Option<F>,

    _p: PhantomData<&'a ()>,
}

impl<'a, F: FnOnce()> ScopeGuard<'a, F> {
    /// Creates an armed guard.
    ///
    /// ```ignore
    /// let restored = Cell::new(false);
    /// {
    ///     let _guard = ScopeGuard::new(|| restored.set(true));
    ///     assert!(!restored.get());
    /// }
    /// assert!(restored.get());
    /// ```
    pub(crate) fn new(closure: F) -> Self {
        ScopeGuard {
            closure: Some(closure),
            _p: PhantomData,
        }
    }

    /// Prevents the closure from running on drop. Calling it twice is
    /// harmless.
    #[allow(unused)]
    pub(crate) fn disarm(&mut self) {
        self.closure.take();
    }
}

impl<'a, F: FnOnce()> Drop for ScopeGuard<'a, F> {
    fn drop(&mut self) {
        if let Some(closure) = self.closure.take() {
            closure();
        }
    }
}
