//! Connection handles returned by `connect`.

use crate::slot::SlotState;
use std::fmt;
use tether::Weak;

/// Handle to one subscription.
///
/// A connection observes its slot weakly: holding or dropping it never keeps
/// the subscriber alive or disconnects it. Copies refer to the same
/// subscription, and disconnecting through any copy disconnects all of them.
///
/// The default value is not attached to anything.
#[derive(Clone, Default)]
pub struct Connection {
    state: Option<Weak<SlotState>>,
}

impl Connection {
    pub(crate) fn new(state: Weak<SlotState>) -> Self {
        Self { state: Some(state) }
    }

    /// Whether the subscription is still connected.
    pub fn connected(&self) -> bool {
        self.state
            .as_ref()
            .and_then(Weak::lock)
            .is_some_and(|state| state.is_connected())
    }

    /// Disconnects the subscription.
    ///
    /// Idempotent, and a no-op on a default connection or one whose
    /// registry is gone. Once this returns, no invocation started
    /// afterwards will call the subscriber.
    pub fn disconnect(&self) {
        if let Some(state) = self.state.as_ref().and_then(Weak::lock) {
            state.release();
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("connected", &self.connected())
            .finish()
    }
}

/// A [`Connection`] that disconnects when dropped.
///
/// Move-only. Use [`release`](Self::release) to keep the subscription
/// beyond the guard's scope.
#[derive(Default)]
#[must_use = "dropping a ScopedConnection disconnects it immediately"]
pub struct ScopedConnection {
    inner: Connection,
}

impl ScopedConnection {
    /// Takes ownership of `connection`.
    pub fn new(connection: Connection) -> Self {
        Self { inner: connection }
    }

    /// Whether the subscription is still connected.
    pub fn connected(&self) -> bool {
        self.inner.connected()
    }

    /// Disconnects now rather than on drop.
    pub fn disconnect(&mut self) {
        core::mem::take(&mut self.inner).disconnect();
    }

    /// Gives up scoped ownership without disconnecting.
    pub fn release(mut self) -> Connection {
        core::mem::take(&mut self.inner)
    }
}

impl From<Connection> for ScopedConnection {
    fn from(connection: Connection) -> Self {
        Self::new(connection)
    }
}

impl Drop for ScopedConnection {
    fn drop(&mut self) {
        self.inner.disconnect();
    }
}

impl fmt::Debug for ScopedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedConnection")
            .field("connected", &self.connected())
            .finish()
    }
}
