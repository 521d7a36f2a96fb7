//! Watch-fed, read-only resource caches.
//!
//! An [`Informer`] owns the watch on one resource kind.  Every event first
//! lands in a reflector [`Store`] (exposed read-only as a [`ResourceCache`])
//! and is then mapped to zero or one [`ObjectKey`] per subscriber and sent
//! down that subscriber's channel.  Controllers never see the watch itself,
//! only keys and the cache.

use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use kube::runtime::reflector::{self, ObjectRef, Store};
use kube::runtime::watcher::{self, watcher};
use kube::runtime::WatchStreamExt;
use kube::{Api, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{Error, Result};

// ── ObjectKey ───────────────────────────────────────────────────────────────

/// `namespace/name` identity of a namespaced object; the unit of work of every
/// controller.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn for_object<K: Resource>(obj: &K) -> Self {
        Self::new(obj.namespace().unwrap_or_default(), obj.name_any())
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

impl FromStr for ObjectKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('/').collect();
        match parts.as_slice() {
            [name] if !name.is_empty() => Ok(Self::new("", *name)),
            [ns, name] if !name.is_empty() => Ok(Self::new(*ns, *name)),
            _ => Err(Error::InvalidKey(s.to_string())),
        }
    }
}

// ── ResourceCache ───────────────────────────────────────────────────────────

/// Read-only view of one resource kind, shared by every worker.
pub struct ResourceCache<K>
where
    K: Resource + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    store: Store<K>,
}

impl<K> Clone for ResourceCache<K>
where
    K: Resource + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<K> ResourceCache<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Eq + Hash + Clone + Default,
{
    pub fn new(store: Store<K>) -> Self {
        Self { store }
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<Arc<K>> {
        self.store.get(&ObjectRef::new(name).within(namespace))
    }

    pub fn get_key(&self, key: &ObjectKey) -> Option<Arc<K>> {
        self.get(&key.namespace, &key.name)
    }

    /// Every cached object in `namespace`, in no particular order.
    pub fn list(&self, namespace: &str) -> Vec<Arc<K>> {
        self.store
            .state()
            .into_iter()
            .filter(|obj| obj.namespace().as_deref() == Some(namespace))
            .collect()
    }

    /// Resolves once the initial list has been received.
    pub async fn wait_until_ready(&self) -> Result<()> {
        self.store
            .wait_until_ready()
            .await
            .map_err(|_| Error::config("cache writer dropped before the initial list completed"))
    }
}

// ── Informer ────────────────────────────────────────────────────────────────

type KeyMapper<K> = Box<dyn Fn(&K) -> Option<ObjectKey> + Send + Sync>;

struct Subscriber<K> {
    map: KeyMapper<K>,
    tx: mpsc::UnboundedSender<ObjectKey>,
}

/// Builder for a watch that feeds a cache and notifies subscribers.
pub struct Informer<K> {
    api: Api<K>,
    config: watcher::Config,
    subscribers: Vec<Subscriber<K>>,
}

impl<K> Informer<K>
where
    K: Resource + Clone + DeserializeOwned + fmt::Debug + Send + Sync + 'static,
    K::DynamicType: Eq + Hash + Clone + Default,
{
    pub fn new(api: Api<K>, config: watcher::Config) -> Self {
        Self {
            api,
            config,
            subscribers: Vec::new(),
        }
    }

    /// Send `map(obj)` to `tx` for every added, updated or deleted object.
    pub fn notify(
        mut self,
        tx: mpsc::UnboundedSender<ObjectKey>,
        map: impl Fn(&K) -> Option<ObjectKey> + Send + Sync + 'static,
    ) -> Self {
        self.subscribers.push(Subscriber {
            map: Box::new(map),
            tx,
        });
        self
    }

    /// Split into the cache and the future driving the watch.  The future
    /// runs until the process stops; spawn it.
    pub fn run(self) -> (ResourceCache<K>, BoxFuture<'static, ()>) {
        let kind = K::kind(&K::DynamicType::default()).to_string();
        let (store, writer) = reflector::store();
        let events =
            reflector::reflector(writer, watcher(self.api, self.config).default_backoff());
        let subscribers = self.subscribers;

        let driver = async move {
            let mut objects = events.touched_objects().boxed();
            while let Some(res) = objects.next().await {
                match res {
                    Ok(obj) => {
                        for sub in &subscribers {
                            if let Some(key) = (sub.map)(&obj) {
                                debug!(%kind, %key, "change notification");
                                // A closed channel means the controller is gone.
                                let _ = sub.tx.send(key);
                            }
                        }
                    }
                    Err(e) => warn!(%kind, error = %e, "watch error"),
                }
            }
            warn!(%kind, "watch stream ended");
        }
        .boxed();

        (ResourceCache::new(store), driver)
    }
}

/// Map an object to its own key.
pub fn own_key<K: Resource>(obj: &K) -> Option<ObjectKey> {
    Some(ObjectKey::for_object(obj))
}

/// Map an object to the key of its controlling owner of kind `K`.
pub fn controller_owner_key<O, K>(obj: &O) -> Option<ObjectKey>
where
    O: Resource,
    K: Resource<DynamicType = ()>,
{
    let kind = K::kind(&());
    let owner = obj
        .owner_references()
        .iter()
        .find(|o| o.controller == Some(true) && o.kind == kind)?;
    Some(ObjectKey::new(
        obj.namespace().unwrap_or_default(),
        owner.name.clone(),
    ))
}
