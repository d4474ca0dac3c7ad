//! Provisioner facade
//!
//! Lifecycle operations over parent and child stacks. Every operation logs
//! into the stack's backend afresh, runs its phases with a dedicated event
//! watcher each, and wraps backend failures with the phase and stack name.
//!
//! | operation | phases |
//! |---|---|
//! | `provision_stack` | select, init, refresh, preview, up |
//! | `deploy_stack` | select, refresh, preview, up |
//! | `preview_*` | select, refresh, preview |
//! | `destroy_*` | require, refresh, destroy, remove |
//! | `cancel_stack` | force unlock |
//! | `outputs_stack` | read outputs |

use crate::engine::{ChangeSummary, EngineStack, Program};
use crate::error::{ProvisionerError, Result};
use crate::events::{Action, EventWatcher};
use crate::program::{DeployProgram, ProvisionProgram, resolve_parent};
use crate::registry::Registry;
use crate::session::{Session, login};
use crate::stackref::{child_stack_name, collapse_stack_reference};
use sc_api::{
    Cryptor, DeployParams, DestroyResult, OperationResult, OutputsResult, PreviewResult,
    ProvisionParams, Stack, StackParams, UpdateResult,
};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

fn operation_result(session: &Session, summary: &ChangeSummary) -> OperationResult {
    OperationResult {
        stack_name: session.reference().to_string(),
        summary: summary.to_string(),
        operations: summary.operations(),
        remaining: 0,
    }
}

/// Runs one engine phase with its own event watcher
async fn phase<T, F, Fut>(action: Action, operation: &'static str, session: &Session, run: F) -> Result<T>
where
    F: FnOnce(crate::engine::OperationOptions) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let watcher = EventWatcher::spawn(action);
    let result = run(watcher.options()).await;
    watcher.stop().await;
    result.map_err(|e| ProvisionerError::remote(operation, session.reference().to_string(), e))
}

pub struct Provisioner {
    registry: Arc<Registry>,
    cryptor: Option<Arc<dyn Cryptor>>,
}

impl Provisioner {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            cryptor: None,
        }
    }

    /// Decrypts secrets files through `cryptor` before stacks are read, so the
    /// credentials every login uses come from the decrypted values
    pub fn with_cryptor(mut self, cryptor: Arc<dyn Cryptor>) -> Self {
        self.cryptor = Some(cryptor);
        self
    }

    fn decrypt_secrets(&self) -> Result<()> {
        let Some(cryptor) = &self.cryptor else {
            return Ok(());
        };
        match cryptor.public_key() {
            Some(key) => debug!(public_key = %key, "Decrypting secrets files"),
            None => debug!("Decrypting secrets files"),
        }
        cryptor.decrypt_all()?;
        Ok(())
    }

    /// Reads one stack from `<root>/.sc/stacks` after decrypting its secrets
    pub fn read_stack(&self, root: &Path, name: &str) -> Result<Stack> {
        self.decrypt_secrets()?;
        Ok(sc_api::read_stack(root, name)?)
    }

    /// Reads every stack from `<root>/.sc/stacks` after decrypting secrets
    pub fn read_stacks(&self, root: &Path) -> Result<BTreeMap<String, Stack>> {
        self.decrypt_secrets()?;
        Ok(sc_api::read_stacks(root)?)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    fn check_stack(stack: &Stack) -> Result<()> {
        if stack.name.is_empty() {
            return Err(ProvisionerError::Precondition(
                "stack name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn parent_session(&self, stack: &Stack) -> Result<Session> {
        Self::check_stack(stack)?;
        login(self.registry.clone(), stack, &stack.name, &stack.name)
    }

    fn child_session(&self, stack: &Stack, params: &StackParams) -> Result<Session> {
        Self::check_stack(stack)?;
        if params.stack_name.is_empty() || params.environment.is_empty() {
            return Err(ProvisionerError::Precondition(format!(
                "deploying {} needs a stack name and an environment",
                stack.name
            )));
        }
        let parent = resolve_parent(stack, params)?;
        login(
            self.registry.clone(),
            stack,
            &collapse_stack_reference(&parent),
            &child_stack_name(&params.stack_name, &parent, &params.environment),
        )
    }

    fn session(&self, stack: &Stack, params: Option<&StackParams>) -> Result<Session> {
        match params {
            Some(params) => self.child_session(stack, params),
            None => self.parent_session(stack),
        }
    }

    async fn refresh_preview_up(
        &self,
        session: &Session,
        program: &dyn Program,
        action: Action,
        skip_refresh: bool,
        skip_preview: bool,
    ) -> Result<UpdateResult> {
        let engine = &session.engine_stack();
        if !skip_refresh {
            refresh(session, engine, program).await?;
        }
        if !skip_preview {
            let plan = phase(Action::Preview, "preview", session, |options| async move {
                engine.preview(program, &options).await
            })
            .await?;
            info!(stack = %session.reference(), plan = %plan.summary(), "Preview complete");
        }
        let summary = phase(action, "update", session, |options| async move {
            engine.up(program, &options).await
        })
        .await?;
        info!(stack = %session.reference(), summary = %summary, "Update complete");
        Ok(operation_result(session, &summary))
    }

    /// Provisions a parent stack: its secrets provider first, then every
    /// resource and template.
    #[instrument(skip_all, fields(stack = %stack.name))]
    pub async fn provision_stack(
        &self,
        stack: &Stack,
        params: &ProvisionParams,
    ) -> Result<UpdateResult> {
        let session = self.parent_session(stack)?;
        session.select_stack().await?;

        let init = EventWatcher::spawn(Action::Init);
        let initial = session.initial_provision(Some(init.sender())).await;
        init.stop().await;
        if let Some(output) = initial? {
            info!(
                secrets = %output.provider.url(),
                resource = %output.resource.urn,
                "Secrets provider ready"
            );
        }

        let program = ProvisionProgram::new(&session, stack);
        self.refresh_preview_up(
            &session,
            &program,
            Action::Provision,
            params.skip_refresh,
            params.skip_preview,
        )
        .await
    }

    /// Deploys a child stack into its parent's environment
    #[instrument(skip_all, fields(stack = %stack.name, env = %params.stack_params.environment))]
    pub async fn deploy_stack(&self, stack: &Stack, params: &DeployParams) -> Result<UpdateResult> {
        let session = self.child_session(stack, &params.stack_params)?;
        session.select_stack().await?;
        let program = DeployProgram::new(&session, stack, &params.stack_params)?;
        self.refresh_preview_up(
            &session,
            &program,
            Action::Deploy,
            params.skip_refresh,
            params.skip_preview,
        )
        .await
    }

    #[instrument(skip_all, fields(stack = %stack.name))]
    pub async fn preview_provision(
        &self,
        stack: &Stack,
        params: &ProvisionParams,
    ) -> Result<PreviewResult> {
        let session = self.parent_session(stack)?;
        session.select_stack().await?;
        let program = ProvisionProgram::new(&session, stack);
        preview(&session, &program, params.skip_refresh).await
    }

    #[instrument(skip_all, fields(stack = %stack.name, env = %params.stack_params.environment))]
    pub async fn preview_stack(&self, stack: &Stack, params: &DeployParams) -> Result<PreviewResult> {
        let session = self.child_session(stack, &params.stack_params)?;
        session.select_stack().await?;
        let program = DeployProgram::new(&session, stack, &params.stack_params)?;
        preview(&session, &program, params.skip_refresh).await
    }

    #[instrument(skip_all, fields(stack = %stack.name, env = %params.stack_params.environment))]
    pub async fn destroy_child_stack(
        &self,
        stack: &Stack,
        params: &DeployParams,
    ) -> Result<DestroyResult> {
        let session = self.child_session(stack, &params.stack_params)?;
        session.require_stack().await?;
        let program = DeployProgram::new(&session, stack, &params.stack_params)?;
        destroy(&session, &program, params.skip_refresh).await
    }

    #[instrument(skip_all, fields(stack = %stack.name))]
    pub async fn destroy_parent_stack(
        &self,
        stack: &Stack,
        params: &ProvisionParams,
    ) -> Result<DestroyResult> {
        let session = self.parent_session(stack)?;
        session.require_stack().await?;
        let program = ProvisionProgram::new(&session, stack);
        destroy(&session, &program, params.skip_refresh).await
    }

    /// Releases the lock a stuck operation left behind.
    ///
    /// `params` selects a child stack; `None` the parent.
    #[instrument(skip_all, fields(stack = %stack.name))]
    pub async fn cancel_stack(&self, stack: &Stack, params: Option<&StackParams>) -> Result<bool> {
        let session = self.session(stack, params)?;
        let engine = session.engine_stack();
        let released = phase(Action::Cancel, "cancel", &session, |options| async move {
            engine.cancel(&options).await
        })
        .await?;
        if released {
            info!(stack = %session.reference(), "Stack lock released");
        } else {
            info!(stack = %session.reference(), "Stack was not locked");
        }
        Ok(released)
    }

    #[instrument(skip_all, fields(stack = %stack.name))]
    pub async fn outputs_stack(
        &self,
        stack: &Stack,
        params: Option<&StackParams>,
    ) -> Result<OutputsResult> {
        let session = self.session(stack, params)?;
        session.require_stack().await?;
        let outputs = session
            .engine_stack()
            .outputs()
            .await
            .map_err(|e| ProvisionerError::remote("read outputs", session.reference().to_string(), e))?;
        Ok(OutputsResult {
            stack_name: session.reference().to_string(),
            outputs,
        })
    }
}

async fn refresh(session: &Session, engine: &EngineStack, program: &dyn Program) -> Result<()> {
    let summary = phase(Action::Refresh, "refresh", session, |options| async move {
        engine.refresh(program, &options).await
    })
    .await?;
    info!(stack = %session.reference(), summary = %summary, "Refresh complete");
    Ok(())
}

async fn preview(session: &Session, program: &dyn Program, skip_refresh: bool) -> Result<PreviewResult> {
    let engine = session.engine_stack();
    if !skip_refresh {
        refresh(session, &engine, program).await?;
    }
    let plan = phase(Action::Preview, "preview", session, |options| async move {
        engine.preview(program, &options).await
    })
    .await?;
    Ok(operation_result(session, &plan.summary()))
}

async fn destroy(session: &Session, program: &dyn Program, skip_refresh: bool) -> Result<DestroyResult> {
    let engine = session.engine_stack();
    if !skip_refresh {
        refresh(session, &engine, program).await?;
    }
    let outcome = phase(Action::Destroy, "destroy", session, |options| async move {
        engine.destroy(program, &options).await
    })
    .await?;

    session.remove_stack().await?;
    if outcome.remaining == 0 {
        info!(stack = %session.reference(), summary = %outcome.summary, "Stack destroyed");
    } else {
        warn!(
            stack = %session.reference(),
            remaining = outcome.remaining,
            "Stack record removed but some resources have remained"
        );
    }

    let mut result = operation_result(session, &outcome.summary);
    result.remaining = outcome.remaining;
    Ok(result)
}
