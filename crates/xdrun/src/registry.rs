//! # Client Identity Registry
//!
//! Maps local objects to the handles their remote counterparts are known by.
//!
//! Identity is by reference: two distinct objects that compare equal still
//! get distinct handles. A registered `ObjectKey` holds its allocation alive,
//! so its address cannot be handed to another object while the entry exists.
//!
//! Handles come from one counter shared by every class, starting at 1. They
//! are never reused within the registry's lifetime, so the last handle a
//! registry issues is `i32::MAX - 1`; after that `register` fails with
//! `HandlesExhausted` instead of wrapping. Entries leave the
//! registry only through `unregister`.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::AtomicI32;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use xdrpc::Handle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    HandleNotFound { class_name: String },
    HandlesExhausted,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HandleNotFound { class_name } => {
                write!(f, "No handle registered for this {} object", class_name)
            }
            Self::HandlesExhausted => write!(f, "Handle space exhausted"),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// Reference identity of a local object.
#[derive(Clone)]
pub struct ObjectKey(Arc<dyn Any + Send + Sync>);

impl ObjectKey {
    pub fn new<T: Any + Send + Sync>(object: &Arc<T>) -> Self {
        Self(object.clone())
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl PartialEq for ObjectKey {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for ObjectKey {}

impl std::hash::Hash for ObjectKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl std::fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectKey({:#x})", self.addr())
    }
}

/// Outcome of `ClientRegistry::register`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// A new handle was issued.
    Fresh(Handle),
    /// The object was already registered; nothing was allocated.
    Existing(Handle),
}

impl Registration {
    pub fn handle(&self) -> Handle {
        match self {
            Registration::Fresh(h) | Registration::Existing(h) => *h,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Registration::Fresh(_))
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct EntryKey {
    class_name: String,
    object: ObjectKey,
}

pub struct ClientRegistry {
    entries: DashMap<EntryKey, Handle>,
    next_handle: AtomicI32,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_handle: AtomicI32::new(1),
        }
    }

    #[cfg(test)]
    fn starting_at(next: i32) -> Self {
        Self {
            entries: DashMap::new(),
            next_handle: AtomicI32::new(next),
        }
    }

    /// Issues a handle for `object` under `class_name`, unless it already has one.
    pub fn register(&self, class_name: &str, object: &ObjectKey) -> Result<Registration> {
        let key = EntryKey {
            class_name: class_name.to_string(),
            object: object.clone(),
        };

        match self.entries.entry(key) {
            Entry::Occupied(e) => {
                let handle = *e.get();
                tracing::warn!(class = %class_name, handle = %handle, "object already registered");
                Ok(Registration::Existing(handle))
            }
            Entry::Vacant(e) => {
                let next = self
                    .next_handle
                    .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |h| h.checked_add(1))
                    .map_err(|_| Error::HandlesExhausted)?;
                let handle = Handle(next);
                e.insert(handle);
                tracing::debug!(class = %class_name, handle = %handle, "registered object");
                Ok(Registration::Fresh(handle))
            }
        }
    }

    pub fn lookup(&self, class_name: &str, object: &ObjectKey) -> Result<Handle> {
        let key = EntryKey {
            class_name: class_name.to_string(),
            object: object.clone(),
        };

        self.entries
            .get(&key)
            .map(|entry| *entry.value())
            .ok_or_else(|| Error::HandleNotFound {
                class_name: class_name.to_string(),
            })
    }

    pub fn unregister(&self, class_name: &str, object: &ObjectKey) -> Result<Handle> {
        let key = EntryKey {
            class_name: class_name.to_string(),
            object: object.clone(),
        };

        match self.entries.remove(&key) {
            Some((_, handle)) => {
                tracing::debug!(class = %class_name, handle = %handle, "unregistered object");
                Ok(handle)
            }
            None => Err(Error::HandleNotFound {
                class_name: class_name.to_string(),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::collections::HashMap;
    use std::collections::HashSet;

    #[derive(PartialEq)]
    struct Point(i32, i32);

    #[test]
    fn test_first_registration_is_handle_one() {
        let registry = ClientRegistry::new();
        let obj = ObjectKey::new(&Arc::new(Point(0, 0)));
        assert_eq!(registry.register("demo.Point", &obj), Ok(Registration::Fresh(Handle(1))));
    }

    #[test]
    fn test_reregistration_returns_existing_handle() {
        let registry = ClientRegistry::new();
        let obj = ObjectKey::new(&Arc::new(Point(0, 0)));

        let first = registry.register("demo.Point", &obj).unwrap();
        let second = registry.register("demo.Point", &obj).unwrap();

        assert!(first.is_fresh());
        assert_eq!(second, Registration::Existing(first.handle()));
        assert_eq!(registry.len(), 1);

        // The counter did not move for the conflicting registration.
        let other = ObjectKey::new(&Arc::new(Point(0, 0)));
        assert_eq!(registry.register("demo.Point", &other), Ok(Registration::Fresh(Handle(2))));
    }

    #[test]
    fn test_identity_is_by_reference_not_value() {
        let registry = ClientRegistry::new();
        let a = Arc::new(Point(1, 1));
        let b = Arc::new(Point(1, 1));
        assert!(*a == *b);

        let ha = registry.register("demo.Point", &ObjectKey::new(&a)).unwrap().handle();
        let hb = registry.register("demo.Point", &ObjectKey::new(&b)).unwrap().handle();
        assert_ne!(ha, hb);

        // A clone of the same Arc is the same object.
        let again = registry.lookup("demo.Point", &ObjectKey::new(&a.clone())).unwrap();
        assert_eq!(again, ha);
    }

    #[test]
    fn test_counter_is_shared_across_classes() {
        let registry = ClientRegistry::new();
        let a = ObjectKey::new(&Arc::new(1u8));
        let b = ObjectKey::new(&Arc::new(2u8));

        assert_eq!(registry.register("demo.A", &a).unwrap().handle(), Handle(1));
        assert_eq!(registry.register("demo.B", &b).unwrap().handle(), Handle(2));
        // The same object under another class is a separate entry.
        assert_eq!(registry.register("demo.B", &a).unwrap().handle(), Handle(3));
    }

    #[test]
    fn test_lookup_and_unregister_miss() {
        let registry = ClientRegistry::new();
        let obj = ObjectKey::new(&Arc::new(Point(0, 0)));

        let expected = Error::HandleNotFound { class_name: "demo.Point".into() };
        assert_eq!(registry.lookup("demo.Point", &obj), Err(expected.clone()));
        assert_eq!(registry.unregister("demo.Point", &obj), Err(expected));
    }

    #[test]
    fn test_unregister_never_recycles_handles() {
        let registry = ClientRegistry::new();
        let obj = ObjectKey::new(&Arc::new(Point(0, 0)));

        let h1 = registry.register("demo.Point", &obj).unwrap().handle();
        assert_eq!(registry.unregister("demo.Point", &obj), Ok(h1));
        assert!(registry.is_empty());

        let h2 = registry.register("demo.Point", &obj).unwrap().handle();
        assert!(h2.0 > h1.0);
    }

    #[test]
    fn test_exhausted_counter_refuses_instead_of_wrapping() {
        let registry = ClientRegistry::starting_at(i32::MAX - 1);
        let a = ObjectKey::new(&Arc::new(Point(0, 0)));
        let b = ObjectKey::new(&Arc::new(Point(0, 0)));

        assert_eq!(registry.register("demo.Point", &a), Ok(Registration::Fresh(Handle(i32::MAX - 1))));
        assert_eq!(registry.register("demo.Point", &b), Err(Error::HandlesExhausted));
        assert_eq!(registry.register("demo.Point", &b), Err(Error::HandlesExhausted));

        // Known objects still resolve; the refused one left no entry.
        assert_eq!(registry.register("demo.Point", &a), Ok(Registration::Existing(Handle(i32::MAX - 1))));
        assert_eq!(registry.len(), 1);
        assert!(registry.lookup("demo.Point", &b).is_err());
    }

    #[test]
    fn test_random_operation_sequence_matches_model() {
        let registry = ClientRegistry::new();
        let objects: Vec<ObjectKey> = (0..8).map(|i| ObjectKey::new(&Arc::new(i))).collect();
        let classes = ["demo.A", "demo.B"];

        let mut model: HashMap<(usize, usize), Handle> = HashMap::new();
        let mut issued: HashSet<Handle> = HashSet::new();
        let mut rng = rand::thread_rng();

        for _ in 0..500 {
            let o = rng.gen_range(0..objects.len());
            let c = rng.gen_range(0..classes.len());

            if rng.gen_bool(0.6) {
                match registry.register(classes[c], &objects[o]).unwrap() {
                    Registration::Fresh(h) => {
                        assert!(!model.contains_key(&(o, c)));
                        assert!(issued.insert(h), "handle {} issued twice", h);
                        model.insert((o, c), h);
                    }
                    Registration::Existing(h) => assert_eq!(model.get(&(o, c)), Some(&h)),
                }
            } else {
                let res = registry.unregister(classes[c], &objects[o]);
                assert_eq!(res.ok(), model.remove(&(o, c)));
            }
            assert_eq!(registry.len(), model.len());
        }
    }

    #[test]
    fn test_concurrent_registrations_get_unique_handles() {
        let registry = Arc::new(ClientRegistry::new());
        let mut threads = Vec::new();

        for _ in 0..8 {
            let registry = registry.clone();
            threads.push(std::thread::spawn(move || {
                (0..100)
                    .map(|i| registry.register("demo.Point", &ObjectKey::new(&Arc::new(i))).unwrap().handle())
                    .collect::<Vec<_>>()
            }));
        }

        let mut all = HashSet::new();
        for t in threads {
            for h in t.join().unwrap() {
                assert!(all.insert(h));
            }
        }
        assert_eq!(all.len(), 800);
        assert_eq!(registry.len(), 800);
    }
}
