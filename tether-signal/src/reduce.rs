//! Reduction policies for delegate return values.
//!
//! A delegate calls every subscriber and feeds each return value to a fresh
//! policy, in connection order. The policy decides what the invocation as a
//! whole returns.

use core::marker::PhantomData;

/// Folds subscriber return values into a single result.
pub trait Reduce<T>: Default {
    /// Result of the whole invocation.
    type Output;

    /// Accepts one subscriber's return value.
    fn accept(&mut self, value: T);

    /// Produces the result once every subscriber has been called.
    fn finish(self) -> Self::Output;
}

/// Keeps the value returned by the last subscriber called.
///
/// Yields `None` when there were no subscribers.
pub struct LastValue<T>(Option<T>);

impl<T> Default for LastValue<T> {
    fn default() -> Self {
        Self(None)
    }
}

impl<T> Reduce<T> for LastValue<T> {
    type Output = Option<T>;

    #[inline]
    fn accept(&mut self, value: T) {
        self.0 = Some(value);
    }

    #[inline]
    fn finish(self) -> Option<T> {
        self.0
    }
}

/// Discards every return value.
pub struct Ignore<T = ()>(PhantomData<fn(T)>);

impl<T> Default for Ignore<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T> Reduce<T> for Ignore<T> {
    type Output = ();

    #[inline]
    fn accept(&mut self, _value: T) {}

    #[inline]
    fn finish(self) {}
}

/// Collects every return value, in call order.
pub struct Collect<T>(Vec<T>);

impl<T> Default for Collect<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T> Reduce<T> for Collect<T> {
    type Output = Vec<T>;

    #[inline]
    fn accept(&mut self, value: T) {
        self.0.push(value);
    }

    #[inline]
    fn finish(self) -> Vec<T> {
        self.0
    }
}
