//! Device loss / restore listeners
//!
//! Anything that owns video-memory objects outside the render context's
//! own tables (dynamic geometry, cached render targets, ...) registers a
//! [`DeviceListener`]. Listeners are told about a loss before the context
//! releases its own objects, newest first, and about a restore after the
//! context has recreated them, oldest first.

use slotmap::{new_key_type, SlotMap};

use crate::context::RenderContext;

new_key_type! {
    /// Registration id of a device listener
    pub struct ListenerId;
}

/// Receives device loss and restore notifications
pub trait DeviceListener {
    /// The device was lost; release video-memory objects
    fn on_device_lost(&mut self, ctx: &mut RenderContext) {
        let _ = ctx;
    }

    /// The device was restored; recreate video-memory objects
    fn on_device_restored(&mut self, ctx: &mut RenderContext) {
        let _ = ctx;
    }
}

/// Listener registry
///
/// Each entry is taken out while it is being notified, so a listener can
/// register or unregister others (or itself) from inside a callback.
#[derive(Default)]
pub struct DeviceEvents {
    listeners: SlotMap<ListenerId, Option<Box<dyn DeviceListener>>>,
    order: Vec<ListenerId>,
}

impl DeviceEvents {
    /// Add a listener at the end of the order
    pub fn register(&mut self, listener: Box<dyn DeviceListener>) -> ListenerId {
        let id = self.listeners.insert(Some(listener));
        self.order.push(id);
        id
    }

    /// Remove a listener, handing it back
    ///
    /// Returns `None` for an unknown id, or for a listener unregistering
    /// itself from inside its own callback.
    pub fn unregister(&mut self, id: ListenerId) -> Option<Box<dyn DeviceListener>> {
        self.order.retain(|other| *other != id);
        self.listeners.remove(id).flatten()
    }

    /// Number of registered listeners
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether no listener is registered
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub(crate) fn ids(&self) -> Vec<ListenerId> {
        self.order.clone()
    }

    pub(crate) fn take(&mut self, id: ListenerId) -> Option<Box<dyn DeviceListener>> {
        self.listeners.get_mut(id).and_then(Option::take)
    }

    pub(crate) fn put_back(&mut self, id: ListenerId, listener: Box<dyn DeviceListener>) {
        if let Some(slot) = self.listeners.get_mut(id) {
            *slot = Some(listener);
        }
    }
}

impl RenderContext {
    /// Register a device listener
    pub fn register_listener(&mut self, listener: Box<dyn DeviceListener>) -> ListenerId {
        self.listeners.register(listener)
    }

    /// Unregister a device listener
    pub fn unregister_listener(&mut self, id: ListenerId) -> Option<Box<dyn DeviceListener>> {
        self.listeners.unregister(id)
    }

    pub(crate) fn broadcast_device_lost(&mut self) {
        let ids = self.listeners.ids();
        for id in ids.into_iter().rev() {
            if let Some(mut listener) = self.listeners.take(id) {
                listener.on_device_lost(self);
                self.listeners.put_back(id, listener);
            }
        }
    }

    pub(crate) fn broadcast_device_restored(&mut self) {
        for id in self.listeners.ids() {
            if let Some(mut listener) = self.listeners.take(id) {
                listener.on_device_restored(self);
                self.listeners.put_back(id, listener);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Recorder {
        name: &'static str,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl DeviceListener for Recorder {
        fn on_device_lost(&mut self, _ctx: &mut RenderContext) {
            self.log.borrow_mut().push(format!("lost:{}", self.name));
        }

        fn on_device_restored(&mut self, _ctx: &mut RenderContext) {
            self.log.borrow_mut().push(format!("restored:{}", self.name));
        }
    }

    struct Quiet;

    impl DeviceListener for Quiet {}

    #[test]
    fn test_register_and_unregister() {
        let mut events = DeviceEvents::default();
        let a = events.register(Box::new(Quiet));
        let b = events.register(Box::new(Quiet));
        assert_eq!(events.len(), 2);
        assert!(events.unregister(a).is_some());
        assert!(events.unregister(a).is_none());
        assert_eq!(events.ids(), vec![b]);
    }

    #[test]
    fn test_broadcast_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let config = crate::config::RenderConfig::default();
        let mut ctx = crate::context::tests::headless_context(config).0;
        for name in ["first", "second", "third"] {
            ctx.register_listener(Box::new(Recorder {
                name,
                log: Rc::clone(&log),
            }));
        }

        ctx.broadcast_device_lost();
        ctx.broadcast_device_restored();
        assert_eq!(
            *log.borrow(),
            vec![
                "lost:third",
                "lost:second",
                "lost:first",
                "restored:first",
                "restored:second",
                "restored:third"
            ]
        );
    }
}
