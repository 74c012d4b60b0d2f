//! Interception router: one store API, optionally seen through a proxy.
//!
//! Without a proxy every call is the plain [`Store`] call. With one, calls
//! on paths at or under the proxy's mount are rewritten through the
//! [`MappingProxy`]; everything else passes through untouched.

use std::rc::Rc;

use formstate_path::{deep_remove, deep_set, Path, SetAction};
use serde_json::Value;

use crate::error::{ProxyError, StoreError};
use crate::observers::{Observer, WatchHandle};
use crate::proxy::MappingProxy;
use crate::store::Store;

/// `true` iff `proxy` is present and active and `path` lies at or under
/// its mount path.
pub fn should_intercept(proxy: Option<&MappingProxy>, path: &Path) -> bool {
    proxy.is_some_and(|proxy| proxy.is_active() && proxy.covers(path))
}

/// A [`Store`] handle that routes every call through an optional proxy.
#[derive(Clone, Debug)]
pub struct StoreView {
    store: Store,
    proxy: Option<Rc<MappingProxy>>,
}

impl StoreView {
    /// Route `store` through `proxy`, which must already be active.
    pub fn new(store: Store, proxy: Option<Rc<MappingProxy>>) -> Result<Self, StoreError> {
        if let Some(proxy) = &proxy {
            if !proxy.is_active() {
                return Err(ProxyError::NotActivated.into());
            }
        }
        Ok(StoreView { store, proxy })
    }

    /// A view with no proxy.
    pub fn direct(store: Store) -> Self {
        StoreView { store, proxy: None }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn proxy(&self) -> Option<&MappingProxy> {
        self.proxy.as_deref()
    }

    fn intercepting(&self, path: &Path) -> Option<&MappingProxy> {
        self.proxy().filter(|proxy| should_intercept(Some(*proxy), path))
    }

    pub fn get_value(&self, path: &Path) -> Result<Option<Value>, StoreError> {
        match self.intercepting(path) {
            Some(proxy) => Ok(proxy.get_value(path, &|real| self.store.get_value(real))?),
            None => Ok(self.store.get_value(path)),
        }
    }

    pub fn set_value(&self, path: &Path, action: impl Into<SetAction>) -> Result<(), StoreError> {
        match self.intercepting(path) {
            Some(proxy) => {
                let store = &self.store;
                proxy.set_value(
                    path,
                    action.into(),
                    &mut |real, value| store.set_value(real, value),
                    &|real| store.get_value(real),
                )?;
                Ok(())
            }
            None => {
                self.store.set_value(path, action);
                Ok(())
            }
        }
    }

    /// The whole tree, with the virtual shape spliced in at the mount.
    pub fn get_values(&self) -> Result<Value, StoreError> {
        let mut values = self.store.get_values();
        if let Some(proxy) = self.proxy() {
            let mount = proxy.mount_path();
            let virtual_value = proxy.get_value(mount, &|real| self.store.get_value(real))?;
            if let Some(virtual_value) = virtual_value {
                deep_set(&mut values, mount, virtual_value);
            }
        }
        Ok(values)
    }

    /// Replace the whole tree given in the shape [`get_values`](Self::get_values)
    /// returns: the sub-tree at the mount is taken out and written back
    /// through the proxy before the store is updated in one batch.
    pub fn set_values(&self, mut values: Value) -> Result<(), StoreError> {
        if let Some(proxy) = self.proxy() {
            let mount = proxy.mount_path().clone();
            let virtual_value = deep_remove(&mut values, &mount);
            let snapshot = self.store.get_values();
            if let Some(virtual_value) = virtual_value {
                proxy.set_value(
                    &mount,
                    SetAction::Value(virtual_value),
                    &mut |real, value| deep_set(&mut values, real, value),
                    &|real| formstate_path::deep_get(&snapshot, real).cloned(),
                )?;
            }
        }
        self.store.set_values(values);
        Ok(())
    }

    pub fn watch(
        &self,
        path: &Path,
        observer: impl Fn(Option<&Value>) + 'static,
    ) -> Result<WatchHandle, StoreError> {
        let observer: Observer = Rc::new(observer);
        match self.intercepting(path) {
            Some(proxy) => Ok(proxy.watch(path, observer, &|real, observer| {
                self.store.watch_observer(real, observer)
            })?),
            None => Ok(self.store.watch_observer(path, observer)),
        }
    }

    pub fn watch_effect(
        &self,
        path: &Path,
        observer: impl Fn(Option<&Value>) + 'static,
    ) -> Result<WatchHandle, StoreError> {
        let observer: Observer = Rc::new(observer);
        match self.intercepting(path) {
            Some(proxy) => Ok(proxy.watch_effect(path, observer, &|real, observer| {
                self.store.watch_effect_observer(real, observer)
            })?),
            None => Ok(self.store.watch_effect_observer(path, observer)),
        }
    }

    pub fn unwatch(&self, handle: WatchHandle) -> Result<(), StoreError> {
        self.store.unwatch(handle)
    }
}

impl From<Store> for StoreView {
    fn from(store: Store) -> Self {
        StoreView::direct(store)
    }
}
