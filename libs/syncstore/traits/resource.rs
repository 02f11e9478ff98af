use crate::error::Result;
use crate::registry::EventSink;

/// A stateful native object shared through the instance registry
///
/// Observers, event listeners and socket connections implement this. The
/// registry calls `attach` when the first consumer arrives and `detach` when
/// the last one leaves; each transition happens exactly once.
///
/// `attach` runs while the registry holds its map lock, so it must not call
/// back into the same registry. Events should be delivered through the sink
/// after `attach` returns, as native observers do.
pub trait NativeResource: Send + Sync + 'static {
    /// Payload fanned out to consumers
    type Event: Send + Sync + 'static;

    fn attach(&self, sink: EventSink<Self::Event>) -> Result<()>;

    fn detach(&self);
}
