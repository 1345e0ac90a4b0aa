// Typed event emitter shared by the app channel and the connect manager
// Listener records are kept per event kind, in registration order

use std::collections::HashMap;
use std::hash::Hash;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// An event that can be routed to listeners by its kind
pub trait Event {
    type Kind: Copy + Eq + Hash + std::fmt::Debug;

    fn kind(&self) -> Self::Kind;
}

/// Callback invoked with each emitted event of the subscribed kind
pub type Listener<E> = Rc<dyn Fn(&E)>;

/// Optional owner token attached to a listener record
///
/// Two registrations of the same callback under different contexts are
/// distinct records, and `off` only removes the record whose callback and
/// context both match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerContext(u64);

static NEXT_CONTEXT: AtomicU64 = AtomicU64::new(1);

impl ListenerContext {
    pub fn new() -> Self {
        Self(NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ListenerContext {
    fn default() -> Self {
        Self::new()
    }
}

struct ListenerRecord<E> {
    callback: Listener<E>,
    context: Option<ListenerContext>,
}

/// Ordered listener storage owned by the emitting object
pub struct Emitter<E: Event> {
    listeners: HashMap<E::Kind, Vec<ListenerRecord<E>>>,
}

impl<E: Event> Default for Emitter<E> {
    fn default() -> Self {
        Self {
            listeners: HashMap::new(),
        }
    }
}

impl<E: Event> Emitter<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(
        &mut self,
        kind: E::Kind,
        callback: Listener<E>,
        context: Option<ListenerContext>,
    ) -> &mut Self {
        self.listeners
            .entry(kind)
            .or_default()
            .push(ListenerRecord { callback, context });
        self
    }

    /// Remove every record registered with exactly this callback and context
    pub fn remove_listener(
        &mut self,
        kind: E::Kind,
        callback: &Listener<E>,
        context: Option<ListenerContext>,
    ) -> &mut Self {
        if let Some(records) = self.listeners.get_mut(&kind) {
            records.retain(|record| {
                !(Rc::ptr_eq(&record.callback, callback) && record.context == context)
            });
        }
        self
    }

    /// With a kind, whether that kind has listeners; without one, whether any kind does
    pub fn has_listeners(&self, kind: Option<E::Kind>) -> bool {
        match kind {
            Some(kind) => self
                .listeners
                .get(&kind)
                .is_some_and(|records| !records.is_empty()),
            None => self.listeners.values().any(|records| !records.is_empty()),
        }
    }

    pub fn emit(&self, event: &E) {
        let Some(records) = self.listeners.get(&event.kind()) else {
            return;
        };

        // Snapshot so a listener count is fixed for this emission
        let callbacks: Vec<Listener<E>> = records.iter().map(|r| r.callback.clone()).collect();
        for callback in callbacks {
            callback(event);
        }
    }
}

/// Anything that owns an `Emitter` and exposes the usual subscribe surface
pub trait Observable<E: Event> {
    fn emitter(&self) -> &Emitter<E>;
    fn emitter_mut(&mut self) -> &mut Emitter<E>;

    fn on(&mut self, kind: E::Kind, callback: Listener<E>, context: Option<ListenerContext>) {
        self.emitter_mut().add_listener(kind, callback, context);
    }

    fn off(&mut self, kind: E::Kind, callback: &Listener<E>, context: Option<ListenerContext>) {
        self.emitter_mut().remove_listener(kind, callback, context);
    }

    fn has_listeners(&self, kind: Option<E::Kind>) -> bool {
        self.emitter().has_listeners(kind)
    }

    fn emit(&self, event: &E) {
        self.emitter().emit(event);
    }
}
