//! Per-target event fan-out.
//!
//! Remote objects announce events as `<event>` lines naming a target. Each
//! target gets one emitter, created lazily on first subscription and kept
//! for the rest of the session. The session only dispatches into emitters
//! that already exist; events for unknown targets are dropped.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

/// Callback invoked with an event's arguments.
///
/// Callbacks run on the session's protocol task, in line-arrival order.
/// Keep them short; a slow callback stalls response handling.
pub type EventCallback = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Lazily built target-to-emitter map. Clones share the same state.
#[derive(Clone, Default)]
pub struct EventRegistry {
    emitters: Arc<DashMap<String, Arc<TargetEmitter>>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emitter for `target`, created on first use.
    pub fn emitter_for_target(&self, target: &str) -> Arc<TargetEmitter> {
        self.emitters
            .entry(target.to_string())
            .or_insert_with(|| Arc::new(TargetEmitter::new(target)))
            .clone()
    }

    /// Emitter lookup without creation; `None` means nobody ever subscribed.
    pub fn lookup(&self, target: &str) -> Option<Arc<TargetEmitter>> {
        self.emitters.get(target).map(|entry| Arc::clone(&entry))
    }
}

/// Listener fan-out for one remote target.
pub struct TargetEmitter {
    target: String,
    listeners: DashMap<String, Vec<Registration>>,
}

struct Registration {
    callback: EventCallback,
    extra_args: Vec<Value>,
}

impl TargetEmitter {
    fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            listeners: DashMap::new(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Register `callback` for `event_type`. `extra_args` are appended after
    /// the event's own arguments on every dispatch.
    pub fn on(&self, event_type: &str, callback: EventCallback, extra_args: Vec<Value>) {
        self.listeners
            .entry(event_type.to_string())
            .or_default()
            .push(Registration {
                callback,
                extra_args,
            });
    }

    /// Remove every listener for `event_type`.
    pub fn off(&self, event_type: &str) {
        self.listeners.remove(event_type);
    }

    pub fn has_listeners(&self, event_type: &str) -> bool {
        self.listeners
            .get(event_type)
            .is_some_and(|regs| !regs.is_empty())
    }

    /// Invoke all listeners for `event_type`, in registration order.
    pub fn emit(&self, event_type: &str, args: &[Value]) {
        // Snapshot first: a callback may subscribe again, and that must not
        // happen while the shard lock is held.
        let snapshot: Vec<(EventCallback, Vec<Value>)> = match self.listeners.get(event_type) {
            Some(regs) => regs
                .iter()
                .map(|reg| (Arc::clone(&reg.callback), reg.extra_args.clone()))
                .collect(),
            None => return,
        };

        for (callback, extra_args) in snapshot {
            if extra_args.is_empty() {
                callback(args);
            } else {
                let mut full = args.to_vec();
                full.extend(extra_args);
                callback(&full);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn recording_callback() -> (EventCallback, Arc<Mutex<Vec<Vec<Value>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: EventCallback = Arc::new(move |args: &[Value]| {
            sink.lock().unwrap().push(args.to_vec());
        });
        (callback, seen)
    }

    #[test]
    fn emitter_for_target_is_idempotent() {
        let registry = EventRegistry::new();
        let first = registry.emitter_for_target("p1");
        let second = registry.emitter_for_target("p1");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn lookup_does_not_create_emitters() {
        let registry = EventRegistry::new();
        assert!(registry.lookup("ghost").is_none());
        registry.emitter_for_target("p1");
        assert!(registry.lookup("p1").is_some());
        assert!(registry.lookup("ghost").is_none());
    }

    #[test]
    fn dispatch_passes_event_args() {
        let emitter = TargetEmitter::new("p1");
        let (callback, seen) = recording_callback();
        emitter.on("onLoadFinished", callback, vec![]);
        emitter.emit("onLoadFinished", &[json!("success")]);
        assert_eq!(*seen.lock().unwrap(), vec![vec![json!("success")]]);
    }

    #[test]
    fn extra_args_append_after_event_args() {
        let emitter = TargetEmitter::new("p1");
        let (callback, seen) = recording_callback();
        emitter.on("onLoadFinished", callback, vec![json!("ctx")]);
        emitter.emit("onLoadFinished", &[json!("success")]);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![vec![json!("success"), json!("ctx")]]
        );
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let emitter = TargetEmitter::new("p1");
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            emitter.on(
                "onClosing",
                Arc::new(move |_args: &[Value]| order.lock().unwrap().push(tag)),
                vec![],
            );
        }
        emitter.emit("onClosing", &[]);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn off_removes_all_listeners_for_the_event() {
        let emitter = TargetEmitter::new("p1");
        let (callback, seen) = recording_callback();
        emitter.on("onLoadFinished", Arc::clone(&callback), vec![]);
        emitter.on("onLoadFinished", callback, vec![]);
        assert!(emitter.has_listeners("onLoadFinished"));

        emitter.off("onLoadFinished");
        assert!(!emitter.has_listeners("onLoadFinished"));
        emitter.emit("onLoadFinished", &[json!("success")]);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn emit_without_listeners_is_a_no_op() {
        let emitter = TargetEmitter::new("p1");
        emitter.emit("onNothing", &[json!(1)]);
    }

    #[test]
    fn callbacks_may_resubscribe_during_dispatch() {
        let registry = EventRegistry::new();
        let emitter = registry.emitter_for_target("p1");
        let inner = Arc::clone(&emitter);
        let (late_callback, seen) = recording_callback();
        emitter.on(
            "onInit",
            Arc::new(move |_args: &[Value]| {
                inner.on("onLoadFinished", Arc::clone(&late_callback), vec![]);
            }),
            vec![],
        );

        emitter.emit("onInit", &[]);
        emitter.emit("onLoadFinished", &[json!("success")]);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
