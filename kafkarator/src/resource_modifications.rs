use json_patch::diff;
use kube::{
    Api, Client, ResourceExt,
    api::{Patch, PatchParams},
};
use serde_json::{Value, json};
use std::ops::DerefMut;

use crate::{
    MANAGER,
    errors::{ControllerError, ExtKubeApiError},
    synchronizer::SyncResource,
};

/// Helper construct to simplify patching the status and finalizers of [`SyncResource`] objects.
pub(crate) struct ResourceModifications<K: SyncResource> {
    original: K,
    pub modified: K,
}

impl<K: SyncResource> std::ops::Deref for ResourceModifications<K> {
    type Target = K;

    fn deref(&self) -> &Self::Target {
        &self.modified
    }
}

impl<K: SyncResource> DerefMut for ResourceModifications<K> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.modified
    }
}

fn status_document<K: SyncResource>(resource: &K) -> Result<Value, ControllerError> {
    Ok(match resource.sync_status() {
        Some(status) => json!({ "status": serde_json::to_value(status)? }),
        None => json!({}),
    })
}

fn finalizers_document<K: SyncResource>(resource: &K) -> Value {
    match &resource.meta().finalizers {
        Some(finalizers) => json!({ "metadata": { "finalizers": finalizers } }),
        None => json!({ "metadata": {} }),
    }
}

fn non_empty(patch: json_patch::Patch) -> Option<json_patch::Patch> {
    if patch.0.is_empty() { None } else { Some(patch) }
}

impl<K: SyncResource> ResourceModifications<K> {
    pub(crate) fn new(original: K) -> Self {
        let modified = original.clone();
        Self { original, modified }
    }

    pub(crate) fn is_deleted(&self) -> bool {
        self.modified.meta().deletion_timestamp.is_some()
    }

    fn api(&self, client: Client) -> Api<K> {
        let namespace = self.original.namespace().unwrap_or_default();
        Api::<K>::namespaced(client, namespace.as_str())
    }

    fn get_status_patch(&self) -> Result<Option<json_patch::Patch>, ControllerError> {
        Ok(non_empty(diff(
            &status_document(&self.original)?,
            &status_document(&self.modified)?,
        )))
    }

    fn get_finalizers_patch(&self) -> Option<json_patch::Patch> {
        non_empty(diff(
            &finalizers_document(&self.original),
            &finalizers_document(&self.modified),
        ))
    }

    fn patch_params() -> PatchParams {
        PatchParams {
            field_manager: Some(MANAGER.to_string()),
            ..Default::default()
        }
    }

    /// Writes changed finalizers, keeping local status changes.
    pub(crate) async fn patch_finalizers(&mut self, client: Client) -> Result<(), ControllerError> {
        let Some(patch) = self.get_finalizers_patch() else {
            return Ok(());
        };
        let name = self.original.name_any();
        debug!(
            "patch finalizers of {} {} ({:?}) with {}",
            K::KIND,
            self.original.id(),
            self.original.resource_version(),
            serde_json::to_string(&patch)?
        );
        let response = self
            .api(client)
            .patch(name.as_str(), &Self::patch_params(), &Patch::<()>::Json(patch))
            .await;
        match response {
            Ok(new) => {
                let pending = self.modified.sync_status().cloned();
                self.original = new.clone();
                self.modified = new;
                if let Some(status) = pending {
                    *self.modified.sync_status_mut() = status;
                }
                Ok(())
            }
            // Finalizer removal may let the object disappear right away.
            Err(e) if e.is_not_found() && self.is_deleted() => Ok(()),
            Err(e) => Err(ControllerError::StateWrite(e)),
        }
    }

    /// Writes the status sub-resource if it changed.
    pub(crate) async fn patch_status(&mut self, client: Client) -> Result<(), ControllerError> {
        let Some(patch) = self.get_status_patch()? else {
            return Ok(());
        };
        let name = self.original.name_any();
        let new = self
            .api(client)
            .patch_status(name.as_str(), &Self::patch_params(), &Patch::<()>::Json(patch))
            .await
            .map_err(|e| {
                if e.is_conflict() {
                    debug!("status of {} {} changed concurrently", K::KIND, self.original.id());
                }
                ControllerError::StateWrite(e)
            })?;
        self.original = new.clone();
        self.modified = new;
        Ok(())
    }
}
