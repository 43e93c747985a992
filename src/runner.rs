//! Build orchestration
//!
//! Everything between the host payload and the process exit code:
//! rendering secrets and parameters into the pipeline text, compiling it,
//! and walking the stages in their fixed order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::compiler::{CompileError, HttpProxy, RuleOptions, RuleSet, Tree, compile};
use crate::executor::{Engine, ExecError, ExecutionState, container};
use crate::infrastructure::Config as HostConfig;
use crate::pipeline::{
    Build, Config, EventKind, Job, Keypair, Netrc, ParseError, Repo, Stage, System, Workspace,
    workspace_path,
};
use crate::secure::{self, Secrets, SecureError, TrustDecision};

/// Errors raised before any container runs
#[derive(Error, Debug)]
pub enum PrepareError {
    /// Secret or parameter substitution failed
    #[error(transparent)]
    Secure(#[from] SecureError),

    /// The pipeline text could not be decoded
    #[error("Error parsing the pipeline: {0}")]
    Parse(#[from] ParseError),

    /// The pipeline failed a compile rule
    #[error("Error compiling the pipeline: {0}")]
    Compile(#[from] CompileError),
}

/// Build description handed over by the host
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Payload {
    /// Raw pipeline text
    pub config: String,
    /// Decrypted secrets, if the repository has any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secrets: Option<Secrets>,
    /// Repository descriptor
    pub repo: Repo,
    /// Build descriptor
    pub build: Build,
    /// Job descriptor
    pub job: Job,
    /// Clone credentials
    #[serde(skip_serializing_if = "Option::is_none")]
    pub netrc: Option<Netrc>,
    /// Clone keys
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<Keypair>,
    /// Platform descriptor
    pub system: System,
}

/// Stage walks requested by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct StageFlags {
    /// Restore and save the cache
    pub cache: bool,
    /// Clone the repository
    pub clone: bool,
    /// Start services and run build steps
    pub build: bool,
    /// Run publish and deploy plugins
    pub deploy: bool,
    /// Run notify plugins
    pub notify: bool,
}

impl StageFlags {
    /// Every walk enabled
    #[must_use]
    pub fn all() -> Self {
        Self {
            cache: true,
            clone: true,
            build: true,
            deploy: true,
            notify: true,
        }
    }

    /// Returns true if no walk was requested
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A compiled build ready to run
#[derive(Debug, Clone)]
pub struct Prepared {
    /// Decoded pipeline
    pub config: Config,
    /// Compiled tree
    pub tree: Tree,
    /// Workspace including clone credentials
    pub workspace: Workspace,
    /// Trust check outcome
    pub decision: TrustDecision,
}

/// Returns true if the pipeline text asks for verbose logs
#[must_use]
pub fn wants_debug(raw: &str) -> bool {
    Config::from_yaml(raw).is_ok_and(|config| config.debug)
}

/// Substitutes secrets, matrix values, build values and globals.
///
/// Secrets go first, subject to the trust gate. Globals are only ever
/// substituted into plugin sections.
pub fn render(payload: &Payload) -> Result<(String, TrustDecision), SecureError> {
    let mut text = payload.config.clone();

    let decision = match &payload.secrets {
        Some(secrets) => {
            let event = EventKind::classify(&payload.build);
            let decision = secure::resolve(
                &secrets.checksum,
                &text,
                event,
                payload.repo.is_private,
            );
            text = secure::apply(decision, &text, &secrets.environment)?;
            decision
        }
        None => TrustDecision::without_secrets(),
    };

    text = secure::inject(&text, &payload.job.environment);

    let commit = &payload.build.commit;
    let build_params: BTreeMap<String, String> = [
        ("COMMIT", commit.sha.chars().take(7).collect()),
        ("BRANCH", commit.branch.clone()),
        ("BUILD_NUMBER", payload.build.number.to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect();
    text = secure::inject(&text, &build_params);

    let globals = secure::parse_params(&payload.system.globals);
    text = secure::inject_safe(&text, &globals)?;

    Ok((text, decision))
}

/// Renders, decodes and compiles the pipeline
pub fn prepare(
    payload: &Payload,
    host: &HostConfig,
    force_pull: bool,
) -> Result<Prepared, PrepareError> {
    let (text, decision) = render(payload)?;
    let config = Config::from_yaml(&text)?;

    let workspace = Workspace {
        root: host.workspace_root.clone(),
        path: workspace_path(&config, &payload.repo.link, &host.workspace_root),
        netrc: payload.netrc.clone(),
        keys: payload.keys.clone(),
    };

    let rules = RuleSet::standard(&RuleOptions {
        whitelist: payload.system.plugins.clone(),
        force_pull,
        trusted: payload.repo.is_trusted,
        cache_root: host.cache_root.clone(),
        repo: payload.repo.full_name.clone(),
        proxy: HttpProxy::from_env().into_vars(),
    });
    debug!(rules = ?rules, "Assembled rules");

    let tree = compile(&config, &rules)?;
    Ok(Prepared {
        config,
        tree,
        workspace,
        decision,
    })
}

/// Walks the requested stages in order and removes every container
/// afterwards.
///
/// Services and builds run only while the build is passing; publish and
/// deploy additionally need a verified pipeline. The build is marked
/// successful before the post-build cache and notify walks.
pub async fn execute(
    tree: &Tree,
    state: &ExecutionState,
    flags: StageFlags,
    decision: TrustDecision,
) -> Result<(), ExecError> {
    let engine = Engine::new(tree);
    let allowed = decision.allows_deploy();
    if !allowed {
        info!("Pipeline not verified, skipping deploy and notify");
    }

    let result = async {
        if flags.cache {
            engine.run(state, Stage::Cache.into()).await?;
        }
        if flags.clone {
            engine.run(state, Stage::Clone.into()).await?;
        }
        if flags.build && !state.failed() {
            engine.run(state, Stage::Compose | Stage::Build).await?;
        }
        if flags.deploy && allowed && !state.failed() {
            engine.run(state, Stage::Publish | Stage::Deploy).await?;
        }

        state.mark_success();

        if flags.cache {
            engine.run(state, Stage::Cache.into()).await?;
        }
        if flags.notify && allowed {
            engine.run(state, Stage::Notify.into()).await?;
        }
        Ok(())
    }
    .await;

    container::destroy(state).await;
    info!(exit_code = state.exit_code(), status = %state.status(), "Build finished");
    result
}
