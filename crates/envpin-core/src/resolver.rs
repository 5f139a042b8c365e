use crate::concurrency::check_interrupted;
use crate::CoreError;
use envpin_provider::{FetchRequest, Provider};
use envpin_schema::{
    compute_manifest_hash, Artifact, ArtifactKind, ExprError, ManifestError, ManifestIdentity,
    NormalizedManifest, ResolvedEnvironment, Template, ToolchainSpec,
};
use envpin_store::LockStore;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{self, AtomicBool};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default)]
pub struct ResolveOptions {
    /// Skip the lock store lookup and query the provider again. The result is
    /// still written through the idempotent store `put`, so a provider that now
    /// answers differently surfaces as a lock conflict.
    pub force_refresh: bool,
    /// Forbid provider queries. A manifest with no lock entry cannot resolve.
    pub offline: bool,
}

/// Result of a successful resolution.
#[derive(Debug, Clone)]
pub struct ResolveOutcome {
    pub identity: ManifestIdentity,
    pub environment: ResolvedEnvironment,
    /// Whether the environment came from the lock store without any provider query.
    pub cache_hit: bool,
}

/// Turns manifests into resolved environments, at most once per manifest content.
///
/// The lock store is consulted first; only on a miss is the provider queried.
/// Fresh resolutions are persisted before they are returned, so every later
/// resolution of the same manifest is answered from the store.
pub struct Resolver<'a> {
    provider: &'a dyn Provider,
    store: &'a LockStore,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> Resolver<'a> {
    pub fn new(provider: &'a dyn Provider, store: &'a LockStore) -> Self {
        Self {
            provider,
            store,
            cancel: None,
        }
    }

    /// Abort resolution once `flag` is set, in addition to the process-wide
    /// interrupt flag.
    #[must_use]
    pub fn with_cancel_flag(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn resolve(&self, manifest: &NormalizedManifest) -> Result<ResolvedEnvironment, CoreError> {
        Ok(self
            .resolve_with_options(manifest, ResolveOptions::default())?
            .environment)
    }

    pub fn resolve_with_options(
        &self,
        manifest: &NormalizedManifest,
        options: ResolveOptions,
    ) -> Result<ResolveOutcome, CoreError> {
        let identity = compute_manifest_hash(manifest);

        if !options.force_refresh {
            if let Some(environment) = self.store.get(&identity.hash)? {
                debug!("lock store hit for manifest {}", identity.short);
                return Ok(ResolveOutcome {
                    identity,
                    environment,
                    cache_hit: true,
                });
            }
        }

        if options.offline {
            return Err(CoreError::UnresolvableReference {
                reference: identity.short.to_string(),
                reason: "offline and no lock entry exists for this manifest".to_owned(),
            });
        }

        info!(
            "resolving manifest {} through provider '{}'",
            identity.short,
            self.provider.name()
        );

        let mut artifacts = Vec::with_capacity(manifest.toolchains.len() + manifest.packages.len());
        for spec in &manifest.toolchains {
            self.check_interrupted()?;
            artifacts.push(self.resolve_toolchain(spec)?);
        }
        for id in &manifest.packages {
            self.check_interrupted()?;
            artifacts.push(self.select(&FetchRequest::Package(id), &[])?);
        }

        check_targets(manifest, &artifacts)?;
        let variables = expand_variables(manifest, &artifacts)?;

        self.check_interrupted()?;
        let proposed = ResolvedEnvironment {
            manifest_hash: identity.hash.clone(),
            artifacts,
            variables,
            created_at: chrono::Utc::now().to_rfc3339(),
            provider_snapshot: self.provider.snapshot_id().map(str::to_owned),
        };
        let environment = self.store.put(&identity.hash, &proposed)?;
        info!(
            "manifest {} resolved to {} artifact(s)",
            identity.short,
            environment.artifacts.len()
        );

        Ok(ResolveOutcome {
            identity,
            environment,
            cache_hit: false,
        })
    }

    fn resolve_toolchain(&self, spec: &ToolchainSpec) -> Result<Artifact, CoreError> {
        let artifact = self
            .select(&FetchRequest::Toolchain(spec), &spec.extensions)
            .map_err(|e| match e {
                CoreError::UnresolvableReference { reference, reason } => {
                    CoreError::UnresolvableReference {
                        reference,
                        reason: format!("{reason} on channel {}", spec.channel),
                    }
                }
                other => other,
            })?;
        if spec.channel.is_floating() {
            info!(
                "floating channel '{}' for {} pinned to {} by this resolution",
                spec.channel, spec.name, artifact.version
            );
        }
        Ok(artifact)
    }

    /// Query the provider and pick the greatest candidate carrying every
    /// required extension.
    fn select(
        &self,
        request: &FetchRequest<'_>,
        required_extensions: &[String],
    ) -> Result<Artifact, CoreError> {
        let name = request.name();
        let candidates =
            self.provider
                .fetch(request)
                .map_err(|e| CoreError::UnresolvableReference {
                    reference: name.to_owned(),
                    reason: e.to_string(),
                })?;
        let offered = candidates.len();

        let best = candidates
            .into_iter()
            .filter(|a| a.name == name)
            .filter(|a| required_extensions.iter().all(|e| a.has_extension(e)))
            .max_by(|a, b| self.rank(a, b));

        match best {
            Some(artifact) => {
                debug!(
                    "selected {} {} out of {offered} candidate(s)",
                    artifact.name, artifact.version
                );
                Ok(artifact)
            }
            None if offered == 0 => Err(CoreError::UnresolvableReference {
                reference: name.to_owned(),
                reason: "provider offers no matching artifact".to_owned(),
            }),
            None => Err(CoreError::UnresolvableReference {
                reference: name.to_owned(),
                reason: format!(
                    "none of {offered} candidate(s) carries extensions [{}]",
                    required_extensions.join(", ")
                ),
            }),
        }
    }

    /// Total order over candidates: version first, then the channel label
    /// (which carries a nightly's build date), then install location. Catalog
    /// order never decides.
    fn rank(&self, a: &Artifact, b: &Artifact) -> Ordering {
        self.provider
            .compare_versions(&a.version, &b.version)
            .then_with(|| a.channel.cmp(&b.channel))
            .then_with(|| a.install_path.cmp(&b.install_path))
            .then_with(|| a.targets.cmp(&b.targets))
            .then_with(|| a.extensions.cmp(&b.extensions))
            .then_with(|| a.bin_dir.cmp(&b.bin_dir))
    }

    fn check_interrupted(&self) -> Result<(), CoreError> {
        if self.cancel.is_some_and(|flag| flag.load(atomic::Ordering::SeqCst)) {
            return Err(CoreError::Interrupted);
        }
        check_interrupted()
    }
}

/// Every target a toolchain declares must be supported by some resolved toolchain.
fn check_targets(manifest: &NormalizedManifest, artifacts: &[Artifact]) -> Result<(), CoreError> {
    for spec in &manifest.toolchains {
        for target in &spec.targets {
            let supported = artifacts
                .iter()
                .filter(|a| a.kind == ArtifactKind::Toolchain)
                .any(|a| a.supports_target(target));
            if !supported {
                return Err(CoreError::UnsatisfiedConstraint(format!(
                    "target '{target}' required by toolchain '{}' is not supported by any resolved toolchain",
                    spec.name
                )));
            }
        }
    }
    Ok(())
}

fn expand_variables(
    manifest: &NormalizedManifest,
    artifacts: &[Artifact],
) -> Result<BTreeMap<String, String>, CoreError> {
    let by_name: BTreeMap<&str, &Artifact> =
        artifacts.iter().map(|a| (a.name.as_str(), a)).collect();

    let mut variables = BTreeMap::new();
    for (name, raw) in &manifest.variables {
        let template = Template::parse(raw).map_err(|source| {
            CoreError::MalformedManifest(ManifestError::InvalidExpression {
                name: name.clone(),
                source,
            })
        })?;
        let value = template
            .expand(|kind, artifact| by_name.get(artifact).map(|a| a.reference_value(kind)))
            .map_err(|source| match source {
                ExprError::Unbound { .. } => CoreError::UnboundVariableReference {
                    variable: name.clone(),
                    source,
                },
                other => CoreError::MalformedManifest(ManifestError::InvalidExpression {
                    name: name.clone(),
                    source: other,
                }),
            })?;
        variables.insert(name.clone(), value);
    }
    Ok(variables)
}
