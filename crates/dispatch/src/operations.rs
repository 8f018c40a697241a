//! Save, fetch, and delete over an [`ObjectGraph`].
//!
//! A save encodes the root, runs every dependency step in order (uploads and
//! child saves), sends the root, and finally patches any fields deferred
//! because they closed a cycle. Each response is merged back into the graph
//! as it arrives, so a failed step leaves earlier results in place.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use serde_json::Value;

use objects::{
    pending_references, resolve_body, CommandDescriptor, DeferredField, DomainObject, Encoded,
    Encoder, ObjectGraph, ObjectKey, Pointer, RemoteFile, SaveStep, SavedSet, SkipPolicy,
    StoreError, WireBody,
};

use crate::Dispatcher;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    name: String,
    url: String,
}

impl Dispatcher {
    /// Saves `root` and every unsaved object or attachment it reaches.
    #[tracing::instrument(skip(self, graph), fields(%root))]
    pub async fn save(&self, graph: &mut ObjectGraph, root: ObjectKey) -> Result<(), StoreError> {
        let policy = self.save_policy();
        let mut saved = SavedSet::new();
        let encoded = Encoder::new(graph, policy).encode(root, &mut saved)?;

        for step in &encoded.children {
            self.run_step(graph, step, &mut saved).await?;
        }
        let command = object_command(graph, root, resolve_body(&encoded.body, &saved)?, policy)?;
        let response = self.execute(&command).await?;
        let pointer = apply_save_result(graph, root, &encoded.body, &response)?;
        saved.record_object(root, pointer);

        self.patch_deferred(graph, &encoded.deferred, &saved).await?;
        tracing::info!(children = encoded.children.len(), "object saved");
        Ok(())
    }

    /// Saves several roots, sending the roots themselves through the batch
    /// endpoint.
    ///
    /// Returns one result per entry of `roots`. A root that fails to encode,
    /// or whose dependencies fail to save, gets its own error without
    /// affecting the others. A root that another root depends on is saved as
    /// that dependency and shares its result.
    #[tracing::instrument(skip_all, fields(roots = roots.len()))]
    pub async fn save_all(
        &self,
        graph: &mut ObjectGraph,
        roots: &[ObjectKey],
    ) -> Vec<Result<(), StoreError>> {
        let policy = self.save_policy();
        let mut saved = SavedSet::new();
        let mut outcomes: HashMap<ObjectKey, Result<(), StoreError>> = HashMap::new();
        let mut plans: Vec<Encoded> = Vec::new();

        for &root in roots {
            if outcomes.contains_key(&root) || plans.iter().any(|p| p.root == root) {
                continue;
            }
            match Encoder::new(graph, policy).encode(root, &mut saved) {
                Ok(encoded) => plans.push(encoded),
                Err(err) => {
                    outcomes.insert(root, Err(err));
                }
            }
        }

        // Dependencies of every plan run first, in encode order.
        let mut plan_errors: Vec<Option<StoreError>> = vec![None; plans.len()];
        let mut saved_as_child: HashMap<ObjectKey, Result<(), StoreError>> = HashMap::new();
        for (index, plan) in plans.iter().enumerate() {
            for step in &plan.children {
                let failed = match step {
                    SaveStep::Object { body, .. } => failed_reference(body, &saved_as_child),
                    SaveStep::Upload { .. } => None,
                };
                let result = match failed {
                    Some(err) => Err(err),
                    None => self.run_step(graph, step, &mut saved).await,
                };
                if let SaveStep::Object { key, .. } = step {
                    saved_as_child.insert(*key, result.clone());
                }
                if let Err(err) = result {
                    plan_errors[index].get_or_insert(err);
                }
            }
        }

        // Roots in one batch.
        let mut batched: Vec<usize> = Vec::new();
        let mut commands = Vec::new();
        for (index, plan) in plans.iter().enumerate() {
            if let Some(result) = saved_as_child.get(&plan.root) {
                outcomes.insert(plan.root, result.clone());
                continue;
            }
            // A dependency another plan scheduled fails this root with its error.
            let failed = plan_errors[index]
                .take()
                .or_else(|| failed_reference(&plan.body, &saved_as_child));
            if let Some(err) = failed {
                outcomes.insert(plan.root, Err(err));
                continue;
            }
            let command = resolve_body(&plan.body, &saved)
                .and_then(|body| object_command(graph, plan.root, body, policy));
            match command {
                Ok(command) => {
                    batched.push(index);
                    commands.push(command);
                }
                Err(err) => {
                    outcomes.insert(plan.root, Err(err));
                }
            }
        }

        let responses = self.execute_batch(commands).await;
        for (index, response) in batched.into_iter().zip(responses) {
            let plan = &plans[index];
            let result = response
                .and_then(|body| apply_save_result(graph, plan.root, &plan.body, &body))
                .map(|pointer| saved.record_object(plan.root, pointer));
            outcomes.insert(plan.root, result);
        }

        for plan in &plans {
            if plan.deferred.is_empty() {
                continue;
            }
            if let Err(err) = self.patch_deferred(graph, &plan.deferred, &saved).await {
                if let Some(slot) = outcomes.get_mut(&plan.root) {
                    if slot.is_ok() {
                        *slot = Err(err);
                    }
                }
            }
        }

        roots
            .iter()
            .map(|root| {
                outcomes.get(root).cloned().unwrap_or_else(|| {
                    Err(StoreError::child_resolution(format!("{root} was not saved")))
                })
            })
            .collect()
    }

    /// Refreshes `key` from the server.
    #[tracing::instrument(skip(self, graph), fields(%key))]
    pub async fn fetch(&self, graph: &mut ObjectGraph, key: ObjectKey) -> Result<(), StoreError> {
        let pointer = saved_pointer(graph, key, "fetch")?;
        let body = self.execute(&CommandDescriptor::fetch(&pointer)).await?;
        let data = body
            .as_object()
            .ok_or_else(|| StoreError::protocol("fetch response is not an object"))?;
        object_mut(graph, key)?.merge_server_data(data)
    }

    /// Deletes `key` on the server.
    #[tracing::instrument(skip(self, graph), fields(%key))]
    pub async fn delete(&self, graph: &ObjectGraph, key: ObjectKey) -> Result<(), StoreError> {
        let pointer = saved_pointer(graph, key, "delete")?;
        self.execute(&CommandDescriptor::delete(&pointer)).await?;
        Ok(())
    }

    /// Deletes several objects through the batch endpoint, one result per key.
    #[tracing::instrument(skip_all, fields(keys = keys.len()))]
    pub async fn delete_all(
        &self,
        graph: &ObjectGraph,
        keys: &[ObjectKey],
    ) -> Vec<Result<(), StoreError>> {
        let mut results: Vec<Result<(), StoreError>> = Vec::with_capacity(keys.len());
        let mut batched = Vec::new();
        let mut commands = Vec::new();
        for (index, &key) in keys.iter().enumerate() {
            match saved_pointer(graph, key, "delete") {
                Ok(pointer) => {
                    batched.push(index);
                    commands.push(CommandDescriptor::delete(&pointer));
                    results.push(Ok(()));
                }
                Err(err) => results.push(Err(err)),
            }
        }
        let responses = self.execute_batch(commands).await;
        for (index, response) in batched.into_iter().zip(responses) {
            results[index] = response.map(|_| ());
        }
        results
    }

    // -----------------------------------------------------------------------
    // Steps
    // -----------------------------------------------------------------------

    async fn run_step(
        &self,
        graph: &mut ObjectGraph,
        step: &SaveStep,
        saved: &mut SavedSet,
    ) -> Result<(), StoreError> {
        match step {
            SaveStep::Upload { key } => {
                let file = graph.file(*key).ok_or_else(|| {
                    StoreError::child_resolution(format!("{key} is not in the graph"))
                })?;
                let data = file.data().ok_or_else(|| {
                    StoreError::child_resolution(format!("{key} has no data to upload"))
                })?;
                let command =
                    CommandDescriptor::upload(file.name(), file.content_type(), data.to_vec());
                let body = self.execute(&command).await?;
                let uploaded: UploadResponse = serde_json::from_value(body)?;
                let remote = RemoteFile {
                    name: uploaded.name,
                    url: uploaded.url,
                };
                if let Some(file) = graph.file_mut(*key) {
                    file.mark_uploaded(remote.clone());
                }
                tracing::debug!(%key, url = %remote.url, "attachment uploaded");
                saved.record_file(*key, remote);
            }
            SaveStep::Object { key, body } => {
                let policy = self.save_policy();
                let command = object_command(graph, *key, resolve_body(body, saved)?, policy)?;
                let response = self.execute(&command).await?;
                let pointer = apply_save_result(graph, *key, body, &response)?;
                tracing::debug!(%key, object_id = %pointer.object_id, "dependency saved");
                saved.record_object(*key, pointer);
            }
        }
        Ok(())
    }

    async fn patch_deferred(
        &self,
        graph: &mut ObjectGraph,
        deferred: &[DeferredField],
        saved: &SavedSet,
    ) -> Result<(), StoreError> {
        let mut by_owner: BTreeMap<ObjectKey, Vec<String>> = BTreeMap::new();
        for field in deferred {
            by_owner.entry(field.owner).or_default().push(field.field.clone());
        }
        for (owner, fields) in by_owner {
            let body =
                Encoder::new(graph, self.save_policy()).encode_fields(owner, &fields, saved)?;
            let pointer = saved_pointer(graph, owner, "patch")?;
            let command = CommandDescriptor::update(&pointer, resolve_body(&body, saved)?);
            let response = self.execute(&command).await?;
            apply_save_result(graph, owner, &body, &response)?;
            tracing::debug!(%owner, fields = fields.len(), "deferred fields patched");
        }
        Ok(())
    }
}

/// The recorded error of the first failed dependency `body` points at.
fn failed_reference(
    body: &WireBody,
    results: &HashMap<ObjectKey, Result<(), StoreError>>,
) -> Option<StoreError> {
    pending_references(body)
        .into_iter()
        .find_map(|key| results.get(&key)?.clone().err())
}

fn object_command(
    graph: &ObjectGraph,
    key: ObjectKey,
    body: Value,
    policy: SkipPolicy,
) -> Result<CommandDescriptor, StoreError> {
    let object = graph
        .get(key)
        .ok_or_else(|| StoreError::child_resolution(format!("{key} is not in the graph")))?;
    match object.pointer() {
        Some(pointer) if policy.is_persisted(object) => {
            Ok(CommandDescriptor::update(&pointer, body))
        }
        _ => Ok(CommandDescriptor::create(object.class_name(), body)),
    }
}

fn apply_save_result(
    graph: &mut ObjectGraph,
    key: ObjectKey,
    sent: &WireBody,
    response: &Value,
) -> Result<Pointer, StoreError> {
    let object = object_mut(graph, key)?;
    object.mark_sent(sent.keys().map(String::as_str));
    if let Some(data) = response.as_object() {
        object.merge_server_data(data)?;
    }
    object
        .pointer()
        .ok_or_else(|| StoreError::protocol(format!("save of {key} returned no objectId")))
}

fn object_mut(graph: &mut ObjectGraph, key: ObjectKey) -> Result<&mut DomainObject, StoreError> {
    graph
        .get_mut(key)
        .ok_or_else(|| StoreError::child_resolution(format!("{key} is not in the graph")))
}

fn saved_pointer(graph: &ObjectGraph, key: ObjectKey, action: &str) -> Result<Pointer, StoreError> {
    graph
        .get(key)
        .ok_or_else(|| StoreError::child_resolution(format!("{key} is not in the graph")))?
        .pointer()
        .ok_or_else(|| StoreError::encoding(format!("cannot {action} {key}: it has no objectId")))
}
