//! The reuse contract for pooled objects.
//!
//! A reusable object moves between two states. While it sits idle in a pool
//! it is `Free`; once a caller takes it, it is `InUse` until the caller puts
//! it back. The pool invokes a hook on each transition so that no state
//! leaks from one borrower to the next.

/// An object that can be stored in a pool and handed out again.
///
/// Both hooks default to doing nothing, which is correct for plain value
/// types that carry no borrower-specific state.
///
/// # Examples
///
/// ```
/// use hotpath_core::traits::Reusable;
///
/// #[derive(Default)]
/// struct Session {
///     user: Option<String>,
///     scratch: Vec<u8>,
/// }
///
/// impl Reusable for Session {
///     fn free(&mut self) {
///         self.user = None;
///         self.scratch.clear();
///     }
/// }
///
/// let mut session = Session { user: Some("ada".into()), scratch: vec![1, 2, 3] };
/// session.free();
/// assert!(session.user.is_none());
/// assert!(session.scratch.is_empty());
/// ```
pub trait Reusable {
    /// Prepare the object for a new borrower.
    ///
    /// Called by the pool after the object has been removed from the idle
    /// set and before it is returned from `take`.
    fn reuse(&mut self) {}

    /// Clear the object for storage.
    ///
    /// Called by the pool before the object is inserted into the idle set.
    /// Implementations should drop references to anything the previous
    /// borrower attached.
    fn free(&mut self) {}
}

impl<T> Reusable for Vec<T> {
    fn free(&mut self) {
        self.clear();
    }
}

impl Reusable for String {
    fn free(&mut self) {
        self.clear();
    }
}
