//! Stack operations: refresh, preview, up, destroy, cancel, outputs

use super::events::{EngineEvent, EventSender, Severity, diagnostic, emit};
use super::output::{OutputRef, resolve};
use super::plan::{ChangeSummary, OpType, Plan, Step, dependency_levels};
use super::policy::{EnforcementLevel, Policy, evaluate};
use super::program::{DesiredResource, Program, ProgramContext, Registrations, StackOutputs};
use super::provider::{ResourceOutputs, ResourceRequest};
use super::state::{
    OutputValue, ResourceState, StackState, StateBackend, open_outputs, seal_outputs,
};
use crate::error::{ProvisionerError, Result};
use crate::secrets::SecretsProvider;
use crate::stackref::StackReference;
use chrono::Utc;
use futures_util::future::join_all;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Reads and decrypts the exported outputs of a stack
pub async fn read_stack_outputs(
    backend: &StateBackend,
    secrets: &dyn SecretsProvider,
    reference: &StackReference,
) -> Result<StackOutputs> {
    let state = backend.require_stack(reference).await?;
    open_outputs(&state.outputs, secrets).await
}

/// Options shared by every engine operation
#[derive(Debug, Clone, Default)]
pub struct OperationOptions {
    pub events: Option<EventSender>,
    /// Restricts `up` to these URNs
    pub targets: Option<Vec<String>>,
}

impl OperationOptions {
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_targets(mut self, targets: Vec<String>) -> Self {
        self.targets = Some(targets);
        self
    }
}

/// Outcome of a destroy
#[derive(Debug, Clone, Default)]
pub struct DestroyOutcome {
    pub summary: ChangeSummary,
    /// Resources still recorded after the destroy
    pub remaining: usize,
}

type Outputs = BTreeMap<String, BTreeMap<String, Value>>;

/// One stack in a state backend, operated through a program
#[derive(Clone)]
pub struct EngineStack {
    reference: StackReference,
    backend: StateBackend,
    secrets: Arc<dyn SecretsProvider>,
    policies: Vec<Arc<dyn Policy>>,
}

/// Streams a failure of a whole operation as [`EngineEvent::Error`]
fn fail_event<T>(events: Option<&EventSender>, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        emit(
            events,
            EngineEvent::Error {
                message: e.to_string(),
            },
        );
    }
    result
}

impl EngineStack {
    pub fn new(
        reference: StackReference,
        backend: StateBackend,
        secrets: Arc<dyn SecretsProvider>,
    ) -> Self {
        Self {
            reference,
            backend,
            secrets,
            policies: Vec::new(),
        }
    }

    pub fn with_policies(mut self, policies: Vec<Arc<dyn Policy>>) -> Self {
        self.policies = policies;
        self
    }

    pub fn reference(&self) -> &StackReference {
        &self.reference
    }

    pub fn backend(&self) -> &StateBackend {
        &self.backend
    }

    /// Runs the program and returns what it declared
    pub async fn run_program(&self, program: &dyn Program) -> Result<Registrations> {
        let ctx = ProgramContext::new(
            self.reference.clone(),
            self.backend.clone(),
            self.secrets.clone(),
        );
        debug!(program = program.name(), stack = %self.reference, "Running program");
        program.run(&ctx).await?;
        Ok(ctx.into_registrations())
    }

    /// URNs of the resources a program declares
    pub async fn registered_urns(&self, program: &dyn Program) -> Result<Vec<String>> {
        Ok(self
            .run_program(program)
            .await?
            .resources
            .into_iter()
            .map(|r| r.urn)
            .collect())
    }

    /// Reconciles recorded outputs with what the providers report
    #[instrument(skip_all, fields(stack = %self.reference))]
    pub async fn refresh(
        &self,
        program: &dyn Program,
        options: &OperationOptions,
    ) -> Result<ChangeSummary> {
        let started = Instant::now();
        let events = options.events.as_ref();
        let result = async {
            let lock = self.backend.acquire_lock(&self.reference, "refresh").await?;
            let result = self.refresh_locked(program, events).await;
            lock.release().await?;
            result
        }
        .await;
        let summary = fail_event(events, result)?;
        emit(
            events,
            EngineEvent::Summary {
                summary: summary.clone(),
                duration_ms: started.elapsed().as_millis() as u64,
            },
        );
        Ok(summary)
    }

    async fn refresh_locked(
        &self,
        program: &dyn Program,
        events: Option<&EventSender>,
    ) -> Result<ChangeSummary> {
        let mut state = self.backend.require_stack(&self.reference).await?;
        let registrations = self.run_program(program).await?;
        let mut summary = ChangeSummary::default();

        for recorded in state.resources.clone() {
            let Some(provider) = registrations.providers.get(&recorded.provider) else {
                diagnostic(
                    events,
                    Severity::Warning,
                    Some(&recorded.urn),
                    format!("provider {} is not registered, skipping refresh", recorded.provider),
                );
                summary.record(OpType::Same);
                continue;
            };

            let previous = open_outputs(&recorded.outputs, self.secrets.as_ref()).await?;
            let request = ResourceRequest {
                urn: recorded.urn.clone(),
                kind: recorded.kind.clone(),
                name: recorded.name.clone(),
                inputs: recorded.inputs.clone(),
                outputs: previous.clone(),
            };

            match provider.handle.read(&request).await? {
                None => {
                    state.remove_resource(&recorded.urn);
                    summary.record(OpType::Delete);
                    diagnostic(
                        events,
                        Severity::Info,
                        Some(&recorded.urn),
                        "resource no longer exists, removed from state".to_string(),
                    );
                }
                Some(current) if current.values != previous => {
                    let mut refreshed = recorded.clone();
                    refreshed.outputs =
                        seal_outputs(&current.values, &current.secrets, self.secrets.as_ref())
                            .await?;
                    refreshed.updated_at = Utc::now();
                    state.upsert_resource(refreshed);
                    summary.record(OpType::Update);
                }
                Some(_) => summary.record(OpType::Same),
            }
        }

        self.backend.save_stack(&state).await?;
        info!(stack = %self.reference, summary = %summary, "Refresh complete");
        Ok(summary)
    }

    /// Computes the plan without applying it
    #[instrument(skip_all, fields(stack = %self.reference))]
    pub async fn preview(&self, program: &dyn Program, options: &OperationOptions) -> Result<Plan> {
        let started = Instant::now();
        let events = options.events.as_ref();
        let state = self.backend.require_stack(&self.reference).await?;
        let registrations = self.run_program(program).await?;

        self.check_policies(&registrations.resources, events);
        dependency_levels(&registrations.resources)?;

        let plan = Plan::compute(
            &registrations.resources,
            &state,
            options.targets.as_deref(),
        );
        for step in plan.steps.iter().filter(|s| s.op.is_change()) {
            emit(
                events,
                EngineEvent::ResourcePre {
                    urn: step.urn.clone(),
                    kind: step.kind.clone(),
                    op: step.op,
                    diffs: step.diffs.clone(),
                    planning: true,
                },
            );
        }
        emit(
            events,
            EngineEvent::Summary {
                summary: plan.summary(),
                duration_ms: started.elapsed().as_millis() as u64,
            },
        );
        info!(stack = %self.reference, summary = %plan.summary(), "Preview complete");
        Ok(plan)
    }

    /// Applies the program.
    ///
    /// Resources are applied level by level in dependency order; resources
    /// within one level run concurrently. State is saved after every level,
    /// so a failure leaves every completed operation recorded.
    #[instrument(skip_all, fields(stack = %self.reference))]
    pub async fn up(&self, program: &dyn Program, options: &OperationOptions) -> Result<ChangeSummary> {
        let started = Instant::now();
        let events = options.events.as_ref();
        let result = async {
            let lock = self.backend.acquire_lock(&self.reference, "up").await?;
            let result = self.up_locked(program, options).await;
            lock.release().await?;
            result
        }
        .await;
        let summary = fail_event(events, result)?;
        emit(
            events,
            EngineEvent::Summary {
                summary: summary.clone(),
                duration_ms: started.elapsed().as_millis() as u64,
            },
        );
        Ok(summary)
    }

    async fn up_locked(
        &self,
        program: &dyn Program,
        options: &OperationOptions,
    ) -> Result<ChangeSummary> {
        let events = options.events.as_ref();
        let mut state = self.backend.require_stack(&self.reference).await?;
        let registrations = self.run_program(program).await?;
        let desired = &registrations.resources;

        let violations = self.check_policies(desired, events);
        if let Some(mandatory) = violations
            .iter()
            .find(|v| v.level == EnforcementLevel::Mandatory)
        {
            return Err(ProvisionerError::PolicyViolation(format!(
                "{} on {}: {}",
                mandatory.policy, mandatory.urn, mandatory.message
            )));
        }

        let targets = options.targets.as_deref();
        let plan = Plan::compute(desired, &state, targets);
        let levels = dependency_levels(desired)?;

        let mut outputs: Outputs = BTreeMap::new();
        for recorded in &state.resources {
            outputs.insert(
                recorded.urn.clone(),
                open_outputs(&recorded.outputs, self.secrets.as_ref()).await?,
            );
        }

        let mut summary = ChangeSummary::default();
        for level in levels {
            let snapshot = outputs.clone();
            let work: Vec<(&DesiredResource, &Step)> = level
                .iter()
                .map(|&i| &desired[i])
                .filter_map(|d| plan.step(&d.urn).map(|s| (d, s)))
                .collect();

            let results = join_all(work.iter().map(|(resource, step)| {
                apply_step(resource, step, &snapshot, events)
            }))
            .await;

            let mut first_error = None;
            for ((resource, step), result) in work.iter().zip(results) {
                match result {
                    Ok(None) => summary.record(OpType::Same),
                    Ok(Some(applied)) => {
                        let sealed =
                            seal_outputs(&applied.values, &applied.secrets, self.secrets.as_ref())
                                .await?;
                        let now = Utc::now();
                        let created_at = state
                            .resource(&resource.urn)
                            .filter(|_| step.op != OpType::Replace)
                            .map_or(now, |r| r.created_at);
                        state.upsert_resource(ResourceState {
                            urn: resource.urn.clone(),
                            kind: resource.kind.clone(),
                            name: resource.name.clone(),
                            provider: resource.provider.urn.clone(),
                            inputs: resource.inputs.clone(),
                            outputs: sealed,
                            depends_on: resource.dependencies(),
                            created_at,
                            updated_at: now,
                        });
                        outputs.insert(resource.urn.clone(), applied.values);
                        summary.record(step.op);
                    }
                    Err(e) => {
                        first_error.get_or_insert(e);
                    }
                }
            }

            self.backend.save_stack(&state).await?;
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        for step in plan.steps.iter().filter(|s| s.op == OpType::Delete) {
            let Some(recorded) = state.resource(&step.urn).cloned() else {
                continue;
            };
            let provider = registrations
                .providers
                .get(&recorded.provider)
                .ok_or_else(|| ProvisionerError::ProviderNotFound(recorded.provider.clone()))?;
            let request = ResourceRequest {
                urn: recorded.urn.clone(),
                kind: recorded.kind.clone(),
                name: recorded.name.clone(),
                inputs: recorded.inputs.clone(),
                outputs: outputs.get(&recorded.urn).cloned().unwrap_or_default(),
            };
            emit(events, pre_event(step, false));
            if let Err(e) = provider.handle.delete(&request).await {
                emit(events, failed_event(step, &e));
                self.backend.save_stack(&state).await?;
                return Err(e);
            }
            emit(events, outputs_event(step, Vec::new()));
            state.remove_resource(&step.urn);
            outputs.remove(&step.urn);
            summary.record(OpType::Delete);
            self.backend.save_stack(&state).await?;
        }

        if targets.is_none() {
            state.outputs = self.seal_exports(&registrations, &outputs).await?;
        }
        state.updated_at = Utc::now();
        self.backend.save_stack(&state).await?;

        info!(
            stack = %self.reference,
            program = program.name(),
            summary = %summary,
            "Update complete"
        );
        Ok(summary)
    }

    async fn seal_exports(
        &self,
        registrations: &Registrations,
        outputs: &Outputs,
    ) -> Result<BTreeMap<String, OutputValue>> {
        let lookup = |r: &OutputRef| outputs.get(&r.urn).and_then(|o| o.get(&r.key)).cloned();
        let mut sealed = BTreeMap::new();
        for (name, export) in &registrations.exports {
            let value = resolve(&export.value, &lookup)?;
            sealed.insert(
                name.clone(),
                OutputValue::seal(&value, export.secret, self.secrets.as_ref()).await?,
            );
        }
        Ok(sealed)
    }

    /// Deletes every recorded resource, dependents first.
    ///
    /// Failed deletions do not stop the destroy; the resources stay recorded
    /// and are reported through [`DestroyOutcome::remaining`].
    #[instrument(skip_all, fields(stack = %self.reference))]
    pub async fn destroy(
        &self,
        program: &dyn Program,
        options: &OperationOptions,
    ) -> Result<DestroyOutcome> {
        let started = Instant::now();
        let events = options.events.as_ref();
        let result = async {
            let lock = self.backend.acquire_lock(&self.reference, "destroy").await?;
            let result = self.destroy_locked(program, events).await;
            lock.release().await?;
            result
        }
        .await;
        let outcome = fail_event(events, result)?;
        emit(
            events,
            EngineEvent::Summary {
                summary: outcome.summary.clone(),
                duration_ms: started.elapsed().as_millis() as u64,
            },
        );
        Ok(outcome)
    }

    async fn destroy_locked(
        &self,
        program: &dyn Program,
        events: Option<&EventSender>,
    ) -> Result<DestroyOutcome> {
        let mut state = self.backend.require_stack(&self.reference).await?;
        let registrations = match self.run_program(program).await {
            Ok(registrations) => registrations,
            Err(e) => {
                warn!(stack = %self.reference, error = %e, "Program failed, destroying without providers");
                diagnostic(events, Severity::Warning, None, format!("program failed: {}", e));
                Registrations::default()
            }
        };

        let mut summary = ChangeSummary::default();
        for recorded in state.resources.clone().iter().rev() {
            let step = Step {
                op: OpType::Delete,
                urn: recorded.urn.clone(),
                kind: recorded.kind.clone(),
                name: recorded.name.clone(),
                diffs: Vec::new(),
            };
            let Some(provider) = registrations.providers.get(&recorded.provider) else {
                diagnostic(
                    events,
                    Severity::Warning,
                    Some(&recorded.urn),
                    format!("provider {} is not registered, resource kept", recorded.provider),
                );
                continue;
            };

            let request = ResourceRequest {
                urn: recorded.urn.clone(),
                kind: recorded.kind.clone(),
                name: recorded.name.clone(),
                inputs: recorded.inputs.clone(),
                outputs: open_outputs(&recorded.outputs, self.secrets.as_ref()).await?,
            };
            emit(events, pre_event(&step, false));
            match provider.handle.delete(&request).await {
                Ok(()) => {
                    emit(events, outputs_event(&step, Vec::new()));
                    state.remove_resource(&recorded.urn);
                    summary.record(OpType::Delete);
                    self.backend.save_stack(&state).await?;
                }
                Err(e) => emit(events, failed_event(&step, &e)),
            }
        }

        state.outputs.clear();
        self.backend.save_stack(&state).await?;
        let remaining = state.resources.len();
        info!(stack = %self.reference, summary = %summary, remaining, "Destroy complete");
        Ok(DestroyOutcome { summary, remaining })
    }

    /// Releases a lock left behind by an interrupted operation
    pub async fn cancel(&self, options: &OperationOptions) -> Result<bool> {
        let released = self.backend.force_unlock(&self.reference).await?;
        emit(options.events.as_ref(), EngineEvent::Cancel);
        if released {
            info!(stack = %self.reference, "Cancelled in-flight operation");
        } else {
            debug!(stack = %self.reference, "No operation in flight");
        }
        Ok(released)
    }

    pub async fn outputs(&self) -> Result<StackOutputs> {
        read_stack_outputs(&self.backend, self.secrets.as_ref(), &self.reference).await
    }

    fn check_policies(
        &self,
        desired: &[DesiredResource],
        events: Option<&EventSender>,
    ) -> Vec<super::policy::Violation> {
        let violations = evaluate(&self.policies, desired);
        for v in &violations {
            emit(
                events,
                EngineEvent::PolicyViolation {
                    policy: v.policy.clone(),
                    urn: v.urn.clone(),
                    message: v.message.clone(),
                    level: v.level,
                },
            );
        }
        violations
    }
}

/// Applies one planned step; `Ok(None)` when nothing had to be done
async fn apply_step(
    resource: &DesiredResource,
    step: &Step,
    snapshot: &Outputs,
    events: Option<&EventSender>,
) -> Result<Option<ResourceOutputs>> {
    if step.op == OpType::Same {
        return Ok(None);
    }

    let lookup = |r: &OutputRef| snapshot.get(&r.urn).and_then(|o| o.get(&r.key)).cloned();
    let inputs = match resolve(&resource.inputs, &lookup) {
        Ok(inputs) => inputs,
        Err(e) => {
            emit(events, failed_event(step, &e));
            return Err(e);
        }
    };
    let request = ResourceRequest {
        urn: resource.urn.clone(),
        kind: resource.kind.clone(),
        name: resource.name.clone(),
        inputs,
        outputs: snapshot.get(&resource.urn).cloned().unwrap_or_default(),
    };

    emit(events, pre_event(step, false));
    let provider = &resource.provider.handle;
    let result = match step.op {
        OpType::Create => provider.create(&request).await,
        OpType::Update => provider.update(&request).await,
        OpType::Replace => match provider.delete(&request).await {
            Ok(()) => {
                let fresh = ResourceRequest {
                    outputs: BTreeMap::new(),
                    ..request
                };
                provider.create(&fresh).await
            }
            Err(e) => Err(e),
        },
        OpType::Delete | OpType::Same => return Ok(None),
    };

    match result {
        Ok(outputs) => {
            emit(
                events,
                outputs_event(step, outputs.values.keys().cloned().collect()),
            );
            Ok(Some(outputs))
        }
        Err(e) => {
            emit(events, failed_event(step, &e));
            Err(e)
        }
    }
}

fn pre_event(step: &Step, planning: bool) -> EngineEvent {
    EngineEvent::ResourcePre {
        urn: step.urn.clone(),
        kind: step.kind.clone(),
        op: step.op,
        diffs: step.diffs.clone(),
        planning,
    }
}

fn outputs_event(step: &Step, keys: Vec<String>) -> EngineEvent {
    EngineEvent::ResourceOutputs {
        urn: step.urn.clone(),
        kind: step.kind.clone(),
        op: step.op,
        keys,
    }
}

fn failed_event(step: &Step, error: &ProvisionerError) -> EngineEvent {
    EngineEvent::ResourceOperationFailed {
        urn: step.urn.clone(),
        kind: step.kind.clone(),
        op: step.op,
        error: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::program::{ProviderRef, ResourceArgs};
    use crate::engine::provider::{AuthStatus, CloudProvider};
    use crate::engine::store::LocalObjectStore;
    use crate::secrets::PassphraseSecretsProvider;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use tempfile::tempdir;

    /// Records calls; fails creates of resources named in `fail`
    #[derive(Default)]
    struct RecordingProvider {
        calls: Mutex<Vec<String>>,
        fail: Vec<String>,
        gone: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CloudProvider for RecordingProvider {
        fn name(&self) -> &str {
            "recording"
        }
        async fn check_auth(&self) -> Result<AuthStatus> {
            Ok(AuthStatus::ok("test"))
        }
        async fn create(&self, request: &ResourceRequest) -> Result<ResourceOutputs> {
            self.calls.lock().push(format!("create {}", request.name));
            if self.fail.contains(&request.name) {
                return Err(ProvisionerError::Provider(format!("{} exploded", request.name)));
            }
            Ok(ResourceOutputs::new()
                .with("id", format!("id-{}", request.name))
                .with("inputs", request.inputs.clone())
                .with_secret("token", "t0k3n"))
        }
        async fn read(&self, request: &ResourceRequest) -> Result<Option<ResourceOutputs>> {
            if self.gone.lock().contains(&request.name) {
                return Ok(None);
            }
            Ok(Some(ResourceOutputs {
                values: request.outputs.clone(),
                secrets: ["token".to_string()].into(),
            }))
        }
        async fn delete(&self, request: &ResourceRequest) -> Result<()> {
            self.calls.lock().push(format!("delete {}", request.name));
            Ok(())
        }
    }

    struct TwoResources {
        provider: Arc<RecordingProvider>,
        location: &'static str,
        with_service: bool,
    }

    #[async_trait]
    impl Program for TwoResources {
        fn name(&self) -> &str {
            "two-resources"
        }

        async fn run(&self, ctx: &ProgramContext) -> Result<()> {
            let provider: ProviderRef = ctx.register_provider("test", self.provider.clone());
            let bucket = ctx.register_resource(
                ResourceArgs::new("test:Bucket", "assets", &provider)
                    .inputs(json!({"location": self.location}))
                    .replace_on_changes(["location"]),
            )?;
            if self.with_service {
                ctx.register_resource(
                    ResourceArgs::new("test:Service", "web", &provider)
                        .inputs(json!({"bucket": bucket.output("id")})),
                )?;
            }
            ctx.export("bucket", bucket.output("id"));
            ctx.export_secret("token", bucket.output("token"));
            Ok(())
        }
    }

    struct BrokenProgram;

    #[async_trait]
    impl Program for BrokenProgram {
        fn name(&self) -> &str {
            "broken"
        }

        async fn run(&self, _ctx: &ProgramContext) -> Result<()> {
            Err(ProvisionerError::Precondition("template web is not declared".to_string()))
        }
    }

    async fn engine(root: &std::path::Path) -> EngineStack {
        let backend = StateBackend::new(Arc::new(LocalObjectStore::new(root)));
        let reference = StackReference::new("acme", "infra", "infra");
        backend.create_stack(&reference, "passphrase").await.unwrap();
        EngineStack::new(
            reference,
            backend,
            Arc::new(PassphraseSecretsProvider::new("pw").unwrap()),
        )
    }

    #[tokio::test]
    async fn test_up_resolves_outputs_and_is_idempotent() {
        let temp_dir = tempdir().unwrap();
        let stack = engine(temp_dir.path()).await;
        let provider = Arc::new(RecordingProvider::default());
        let program = TwoResources {
            provider: provider.clone(),
            location: "EU",
            with_service: true,
        };

        let summary = stack.up(&program, &OperationOptions::default()).await.unwrap();
        assert_eq!(summary.create, 2);
        assert_eq!(
            *provider.calls.lock(),
            vec!["create assets".to_string(), "create web".to_string()]
        );

        let state = stack.backend().require_stack(stack.reference()).await.unwrap();
        let web = state.resource("urn:sc:infra::test:Service::web").unwrap();
        assert!(web.depends_on.contains(&"urn:sc:infra::test:Bucket::assets".to_string()));
        assert!(state.outputs["token"].is_secret());

        let outputs = stack.outputs().await.unwrap();
        assert_eq!(outputs["bucket"], "id-assets");
        assert_eq!(outputs["token"], "t0k3n");

        let summary = stack.up(&program, &OperationOptions::default()).await.unwrap();
        assert_eq!(summary.changes(), 0);
        assert_eq!(summary.same, 2);
        assert_eq!(provider.calls.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_replace_and_delete() {
        let temp_dir = tempdir().unwrap();
        let stack = engine(temp_dir.path()).await;
        let provider = Arc::new(RecordingProvider::default());
        let options = OperationOptions::default();

        stack
            .up(
                &TwoResources {
                    provider: provider.clone(),
                    location: "EU",
                    with_service: true,
                },
                &options,
            )
            .await
            .unwrap();
        provider.calls.lock().clear();

        let changed = TwoResources {
            provider: provider.clone(),
            location: "US",
            with_service: false,
        };
        let plan = stack.preview(&changed, &options).await.unwrap();
        let summary = plan.summary();
        assert_eq!(summary.replace, 1);
        assert_eq!(summary.delete, 1);
        assert!(provider.calls.lock().is_empty(), "preview must not touch providers");

        stack.up(&changed, &options).await.unwrap();
        assert_eq!(
            *provider.calls.lock(),
            vec![
                "delete assets".to_string(),
                "create assets".to_string(),
                "delete web".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_completed_resources() {
        let temp_dir = tempdir().unwrap();
        let stack = engine(temp_dir.path()).await;
        let provider = Arc::new(RecordingProvider {
            fail: vec!["web".to_string()],
            ..Default::default()
        });
        let program = TwoResources {
            provider,
            location: "EU",
            with_service: true,
        };

        let (tx, mut rx) = crate::engine::events::channel();
        let err = stack
            .up(&program, &OperationOptions::default().with_events(tx))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("web exploded"));

        let state = stack.backend().require_stack(stack.reference()).await.unwrap();
        assert_eq!(state.resources.len(), 1);
        assert!(state.outputs.is_empty());

        let mut failed = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, EngineEvent::ResourceOperationFailed { .. }) {
                failed += 1;
            }
        }
        assert_eq!(failed, 1);

        stack
            .backend()
            .acquire_lock(stack.reference(), "check")
            .await
            .expect("lock must be released after a failed update");
    }

    #[tokio::test]
    async fn test_refresh_drops_vanished_resources() {
        let temp_dir = tempdir().unwrap();
        let stack = engine(temp_dir.path()).await;
        let provider = Arc::new(RecordingProvider::default());
        let program = TwoResources {
            provider: provider.clone(),
            location: "EU",
            with_service: false,
        };
        let options = OperationOptions::default();
        stack.up(&program, &options).await.unwrap();

        provider.gone.lock().push("assets".to_string());
        let summary = stack.refresh(&program, &options).await.unwrap();
        assert_eq!(summary.delete, 1);
        let state = stack.backend().require_stack(stack.reference()).await.unwrap();
        assert!(state.resources.is_empty());
    }

    #[tokio::test]
    async fn test_destroy_removes_everything() {
        let temp_dir = tempdir().unwrap();
        let stack = engine(temp_dir.path()).await;
        let provider = Arc::new(RecordingProvider::default());
        let program = TwoResources {
            provider: provider.clone(),
            location: "EU",
            with_service: true,
        };
        let options = OperationOptions::default();
        stack.up(&program, &options).await.unwrap();

        let outcome = stack.destroy(&program, &options).await.unwrap();
        assert_eq!(outcome.summary.delete, 2);
        assert_eq!(outcome.remaining, 0);
        assert!(stack.outputs().await.unwrap().is_empty());
        assert_eq!(
            provider.calls.lock()[2..].to_vec(),
            vec!["delete web".to_string(), "delete assets".to_string()]
        );
    }

    #[tokio::test]
    async fn test_cancel_releases_lock() {
        let temp_dir = tempdir().unwrap();
        let stack = engine(temp_dir.path()).await;
        let _stuck = stack
            .backend()
            .acquire_lock(stack.reference(), "up")
            .await
            .unwrap();

        assert!(stack.cancel(&OperationOptions::default()).await.unwrap());
        assert!(!stack.cancel(&OperationOptions::default()).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_up_streams_error_event() {
        let temp_dir = tempdir().unwrap();
        let stack = engine(temp_dir.path()).await;
        let (sender, mut receiver) = crate::engine::channel();
        let options = OperationOptions::default().with_events(sender);

        assert!(stack.up(&BrokenProgram, &options).await.is_err());
        drop(options);

        let mut messages = Vec::new();
        while let Some(event) = receiver.recv().await {
            if let EngineEvent::Error { message } = event {
                messages.push(message);
            }
        }
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("template web is not declared"));

        // the lock was released despite the failure
        assert!(!stack.cancel(&OperationOptions::default()).await.unwrap());
    }

    #[tokio::test]
    async fn test_watched_phase_processes_error_event() {
        let temp_dir = tempdir().unwrap();
        let stack = engine(temp_dir.path()).await;
        let watcher = crate::events::EventWatcher::spawn(crate::events::Action::Refresh);

        let result = stack.refresh(&BrokenProgram, &watcher.options()).await;
        assert!(result.is_err());
        assert_eq!(watcher.stop().await, 1);
    }
}
