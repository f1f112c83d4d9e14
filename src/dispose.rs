// dispose.rs — release of renderer-side resources

/// Anything that owns resources which must be released explicitly on teardown.
///
/// `dispose` must be idempotent: a second call is a no-op.
pub trait Disposable {
    fn dispose(&mut self);
    fn is_disposed(&self) -> bool;
}
